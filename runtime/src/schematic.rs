//! Static export of a flow's structure.
//!
//! Only what is known before execution is exported: flows produced at run time
//! by `chain`, `recover` or resource bodies are not part of the schematic.
//! Flows shared between several parents are exported once per parent.

use crate::flow::{Flow, Node};
use rivulet_core::{EdgeType, NodeKind, Schematic, Value};

/// A flow of any value type, viewed structurally.
pub(crate) trait Inspect: Send + Sync {
    fn kind(&self) -> NodeKind;
    fn output_type(&self) -> String;
    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)>;
}

impl<T: Value> Inspect for Flow<T> {
    fn kind(&self) -> NodeKind {
        Flow::kind(self)
    }

    fn output_type(&self) -> String {
        type_name_of::<T>()
    }

    fn inputs(&self) -> Vec<(EdgeType, Box<dyn Inspect>)> {
        match self.node() {
            Node::Succeed(_) | Node::Fail(_) | Node::Create(_) => Vec::new(),
            Node::Linked { upstream, .. } => {
                vec![(EdgeType::Upstream, Box::new(upstream.clone()) as Box<dyn Inspect>)]
            }
            Node::Any(branches) => branches
                .iter()
                .enumerate()
                .map(|(idx, branch)| (EdgeType::Branch(idx), Box::new(branch.clone()) as Box<dyn Inspect>))
                .collect(),
            Node::Nested(nested) => nested.inputs(),
        }
    }
}

pub(crate) fn export<T: Value>(flow: &Flow<T>, name: impl Into<String>) -> Schematic {
    let mut schematic = Schematic::new(name);
    let root = schematic.push_node(flow.kind(), type_name_of::<T>());
    let mut pending: Vec<(usize, Box<dyn Inspect>)> = vec![(root, Box::new(flow.clone()) as Box<dyn Inspect>)];

    while let Some((id, node)) = pending.pop() {
        for (edge, input) in node.inputs() {
            let child = schematic.push_node(input.kind(), input.output_type());
            schematic.push_edge(id, child, edge);
            pending.push((child, input));
        }
    }
    schematic
}

/// Readable type name with module paths stripped, generics included.
pub(crate) fn type_name_of<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let mut short = String::with_capacity(full.len());
    let mut segment = String::new();
    for ch in full.chars() {
        if ch.is_alphanumeric() || ch == '_' || ch == ':' {
            segment.push(ch);
        } else {
            short.push_str(last_path_segment(&segment));
            segment.clear();
            short.push(ch);
        }
    }
    short.push_str(last_path_segment(&segment));
    short
}

fn last_path_segment(path: &str) -> &str {
    path.rsplit("::").next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names_are_shortened() {
        assert_eq!(type_name_of::<u32>(), "u32");
        assert_eq!(type_name_of::<Vec<String>>(), "Vec<String>");
        assert_eq!(type_name_of::<Option<(u8, String)>>(), "Option<(u8, String)>");
    }

    #[test]
    fn test_export_follows_links_and_branches() {
        let flow = Flow::all(vec![
            Flow::succeed(1u32).select(|v| Ok(v + 1)),
            Flow::create(|| Ok(2u32)),
        ])
        .select(|values| Ok(values.len()));

        let schematic = flow.schematic("fan-out");
        assert_eq!(schematic.nodes[0].kind, NodeKind::Select);
        assert_eq!(schematic.nodes[0].output_type, "usize");
        assert_eq!(schematic.count(NodeKind::All), 1);
        assert_eq!(schematic.count(NodeKind::Select), 2);
        assert_eq!(schematic.count(NodeKind::Succeed), 1);
        assert_eq!(schematic.count(NodeKind::Create), 1);
        assert!(schematic.edges.iter().any(|e| e.kind == EdgeType::Branch(1)));
        assert!(schematic.edges.iter().any(|e| e.kind == EdgeType::Nested));
    }

    #[test]
    fn test_long_chain_export_is_iterative() {
        let mut flow = Flow::succeed(0u32);
        for _ in 0..20_000 {
            flow = flow.do_on_success(|_| Ok(()));
        }
        assert_eq!(flow.schematic("long").nodes.len(), 20_001);
    }
}
