use crate::error::FlowError;

/// The terminal result of running a flow.
///
/// `Outcome` is produced only by the interpreter. Every well-formed flow
/// resolves to exactly one `Outcome`; user errors never escape as panics or
/// `Err` values from `execute`.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The flow produced a value.
    Success(T),

    /// The flow failed. Concurrent failures arrive as [`FlowError::Aggregate`].
    Failure(FlowError),
}

impl<T> Outcome<T> {
    pub fn success(value: T) -> Self {
        Outcome::Success(value)
    }

    pub fn failure(err: impl Into<FlowError>) -> Self {
        Outcome::Failure(err.into())
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// The value on success, otherwise `default`.
    pub fn value_or(self, default: T) -> T {
        match self {
            Outcome::Success(value) => value,
            Outcome::Failure(_) => default,
        }
    }

    pub fn value_or_else<F: FnOnce(&FlowError) -> T>(self, op: F) -> T {
        match self {
            Outcome::Success(value) => value,
            Outcome::Failure(err) => op(&err),
        }
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&FlowError> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(err) => Some(err),
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn into_result(self) -> Result<T, FlowError> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Failure(err) => Err(err),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, op: F) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(op(value)),
            Outcome::Failure(err) => Outcome::Failure(err),
        }
    }
}

impl<T: Default> Outcome<T> {
    /// The value on success, otherwise `T::default()`.
    pub fn value_or_default(self) -> T {
        self.value_or_else(|_| T::default())
    }
}

impl<T> From<Result<T, FlowError>> for Outcome<T> {
    fn from(result: Result<T, FlowError>) -> Self {
        match result {
            Ok(value) => Outcome::Success(value),
            Err(err) => Outcome::Failure(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_accessors() {
        let ok: Outcome<u32> = Outcome::success(7);
        let failed: Outcome<u32> = Outcome::failure(FlowError::Cancelled);

        assert!(ok.is_success());
        assert!(failed.is_failure());
        assert_eq!(ok.clone().value_or(0), 7);
        assert_eq!(failed.clone().value_or(3), 3);
        assert_eq!(failed.value_or_default(), 0);
    }

    #[test]
    fn test_map_leaves_failure_untouched() {
        let failed: Outcome<u32> = Outcome::failure(FlowError::Cancelled);
        let mapped = failed.map(|v| v.to_string());
        assert!(matches!(mapped, Outcome::Failure(FlowError::Cancelled)));
    }
}
