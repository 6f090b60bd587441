//! Error types for IOP, definition and mapping operations.

use thiserror::Error;

use crate::iop::IopKind;
use crate::value::ValueType;

/// Recoverable failures returned by registry, definition and mapping operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum IopError {
    #[error("duplicate name: {0}")]
    DuplicateName(String),
    #[error("unknown input: {0}")]
    UnknownInput(String),
    #[error("unknown output: {0}")]
    UnknownOutput(String),
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    #[error("type mismatch on {name}: expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: ValueType,
        actual: ValueType,
    },
    #[error("cannot convert {from} value to {to}")]
    Conversion { from: ValueType, to: ValueType },
    #[error("unknown call: {0}")]
    UnknownCall(String),
    #[error("unknown argument {argument} of call {call}")]
    UnknownArgument { call: String, argument: String },
    #[error("unknown mapping entry: {0}")]
    UnknownMappingEntry(String),
    #[error("malformed definition: {0}")]
    MalformedDefinition(String),
    #[error("invalid name: {0:?}")]
    InvalidName(String),
    #[error("agent is frozen")]
    Frozen,
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl IopError {
    /// Lookup miss for `name` in the namespace of `kind`.
    pub fn unknown(kind: IopKind, name: impl Into<String>) -> Self {
        let name = name.into();
        match kind {
            IopKind::Input => Self::UnknownInput(name),
            IopKind::Output => Self::UnknownOutput(name),
            IopKind::Parameter => Self::UnknownParameter(name),
        }
    }
}

impl From<serde_json::Error> for IopError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience result type for iopmesh operations.
pub type IopResult<T> = Result<T, IopError>;
