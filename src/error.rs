//! Crate-wide error type.

use thiserror::Error;

/// The single error type threaded through the IR core, the protocol
/// stitcher, and the uprobe manager.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    // Graph mutation errors
    /// Caller supplied an inconsistent graph edit.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// An internal invariant was violated.
    #[error("internal error: {message}")]
    Internal { message: String },

    // Compiler-surfaced errors (source-span decorated)
    /// Error surfaced to the user during type resolution or planning.
    #[error("compiler error: {message}")]
    Compiler {
        message: String,
        span: Option<SourceSpan>,
    },

    /// An expression declared a `type_cast` that changes the underlying
    /// data type rather than only the semantic tag.
    #[error("semantic type cast mismatch: cannot cast {from:?} to {to:?}")]
    SemanticTypeCastMismatch {
        from: crate::ir::types::DataType,
        to: crate::ir::types::DataType,
    },

    /// Referenced a table not present in the relation map.
    #[error("unknown table: {name}")]
    UnknownTable { name: String },

    /// Union inputs disagree on schema.
    #[error("schema mismatch across union: {message}")]
    SchemaMismatch { message: String },

    // Stitcher-level errors (never fatal; degrade to per-record error count)
    /// Frame is incomplete; caller should retain `buf` and retry once more
    /// bytes arrive.
    #[error("needs more data")]
    NeedsMoreData,

    /// Frame body could not be decoded.
    #[error("parse error: {message}")]
    ParseError { message: String },

    // Probe-target resolution (not fatal; degrades to zero attachments)
    /// Probe target library was not found.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Probe target is temporarily unavailable.
    #[error("unavailable: {message}")]
    Unavailable { message: String },
}

/// A location within a source query, attached to compiler errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSpan {
    pub line: u32,
    pub column: u32,
}

impl From<bincode::Error> for CoreError {
    fn from(e: bincode::Error) -> Self {
        CoreError::ParseError {
            message: e.to_string(),
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(e: std::io::Error) -> Self {
        CoreError::Internal {
            message: format!("IO error: {e}"),
        }
    }
}

impl From<String> for CoreError {
    fn from(message: String) -> Self {
        CoreError::Internal { message }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
