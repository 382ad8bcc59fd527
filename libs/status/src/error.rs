//! Error types for status parsing.

use thiserror::Error;

/// The type a recognized status key is expected to carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Bool,
    Int,
}

impl ValueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueKind::Bool => "bool",
            ValueKind::Int => "int64",
        }
    }
}

/// A recognized key carried a value that could not be parsed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid {} value for '{key}': {raw_value:?}", .kind.as_str())]
pub struct ParseError {
    /// The status key whose value was rejected.
    pub key: String,

    /// The value exactly as it appeared in the report.
    pub raw_value: String,

    /// What the key should have held.
    pub kind: ValueKind,
}
