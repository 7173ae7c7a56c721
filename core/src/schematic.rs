use serde::{Deserialize, Serialize};

/// The static view of a flow graph.
///
/// `Schematic` is extracted from a built flow without running it. It is used
/// for visualization, documentation and structural assertions in tests.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Schematic {
    pub name: String,
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl Schematic {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Add a node and return its id.
    pub fn push_node(&mut self, kind: NodeKind, output_type: impl Into<String>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            kind,
            output_type: output_type.into(),
        });
        id
    }

    pub fn push_edge(&mut self, from: usize, to: usize, kind: EdgeType) {
        self.edges.push(Edge { from, to, kind });
    }

    /// Number of nodes of the given kind.
    pub fn count(&self, kind: NodeKind) -> usize {
        self.nodes.iter().filter(|n| n.kind == kind).count()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: usize,
    pub kind: NodeKind,
    /// Readable name of the node's value type.
    pub output_type: String,
}

/// Every kind of node a flow graph can contain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Succeed,
    Fail,
    Create,
    Select,
    Chain,
    DoOnSuccess,
    DoOnFailure,
    Validate,
    Recover,
    All,
    Any,
    WithResource,
    /// A deadline installed around a composite by the timeout behaviour.
    Deadline,
}

impl NodeKind {
    /// `All` and `Any` evaluate several branches.
    pub fn is_composite(self) -> bool {
        matches!(self, NodeKind::All | NodeKind::Any)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    /// The downstream node.
    pub from: usize,
    /// The node `from` depends on.
    pub to: usize,
    pub kind: EdgeType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum EdgeType {
    /// Same-type upstream linked directly.
    Upstream,
    /// Upstream of a different value type, evaluated as a nested execution.
    Nested,
    /// Branch `n` of an `All` or `Any`, in declaration order.
    Branch(usize),
    /// The body guarded by a deadline.
    Guarded,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schematic_serializes_nodes_and_edges() {
        let mut schematic = Schematic::new("checkout");
        let select = schematic.push_node(NodeKind::Select, "u32");
        let create = schematic.push_node(NodeKind::Create, "u32");
        schematic.push_edge(select, create, EdgeType::Upstream);

        let json = schematic.to_json();
        assert_eq!(json["name"], "checkout");
        assert_eq!(json["nodes"][1]["kind"], "Create");
        assert_eq!(json["edges"][0]["kind"], "Upstream");
        assert_eq!(schematic.count(NodeKind::Create), 1);
    }
}
