use thiserror::Error;

use crate::types::Conflict;

// ── Error ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq)]
pub enum Error {
    /// The operation breaks one of the structural rules checked by
    /// [`check_valid_op`](crate::check_valid_op).
    #[error("invalid operation: {0}")]
    InvalidOp(String),
    /// The operation does not fit the document it is applied to.
    #[error("invalid document: {0}")]
    InvalidDocument(String),
    #[error("missing type: {0}")]
    MissingSubtype(String),
    #[error("subtype {name}: {message}")]
    Subtype { name: String, message: String },
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("transforming incompatible types {0} and {1}")]
    IncompatibleEdits(String, String),
    #[error("transform detected write conflict ({:?})", .0.kind)]
    WriteConflict(Box<Conflict>),
    #[error("conflict resolution did not converge after {rounds} rounds")]
    ConflictRoundsExceeded { rounds: usize, conflict: Box<Conflict> },
    #[error("invalid configuration: {0}")]
    Config(String),
    /// A cursor invariant broke. Always a bug in this crate.
    #[error("internal consistency error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidOp(msg.into())
    }

    pub(crate) fn document(msg: impl Into<String>) -> Self {
        Error::InvalidDocument(msg.into())
    }

    pub(crate) fn subtype(name: &str, msg: impl Into<String>) -> Self {
        Error::Subtype { name: name.to_string(), message: msg.into() }
    }

    /// The conflict behind a transform failure, if that is what this is.
    pub fn conflict(&self) -> Option<&Conflict> {
        match self {
            Error::WriteConflict(c) => Some(c),
            Error::ConflictRoundsExceeded { conflict, .. } => Some(conflict),
            _ => None,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
