//! Common types used across opflow.

use serde::{Deserialize, Serialize};

/// Input for operations that take no parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct EmptyInput {}

/// Kind of unit of work a report was produced by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitKind {
    /// A single-handler operation.
    Operation,
    /// A sequence whose handler invokes other units of work.
    Sequence,
}

impl UnitKind {
    /// Name used for tracing spans.
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitKind::Operation => "operation",
            UnitKind::Sequence => "sequence",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_serializes_to_object() {
        let json = serde_json::to_string(&EmptyInput {}).unwrap();
        assert_eq!(json, "{}");
    }

    #[test]
    fn test_unit_kind_names() {
        assert_eq!(UnitKind::Operation.as_str(), "operation");
        assert_eq!(UnitKind::Sequence.as_str(), "sequence");
    }
}
