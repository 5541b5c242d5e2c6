//! SQL compilation and execution errors

use octofhir_cqm_diagnostics::{CQM0203, CQM0400, CQM0401, CQM0402, CQM0403, CQM0404, ErrorCode};
use octofhir_cqm_model::SchemaError;
use octofhir_cqm_terminology::TerminologyError;
use thiserror::Error;

/// Result type for SQL compilation
pub type CompileResult<T> = Result<T, CompileError>;

/// Errors raised while lowering a library to SQL
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// A define uses a construct with no SQL lowering, or a population and a
    /// scalar are mixed
    #[error("Define \"{define}\" cannot be compiled to SQL: {construct}")]
    UnsupportedConstruct { define: String, construct: String },

    /// The schema maps no table for a queried resource type
    #[error("Define \"{define}\" queries {resource_type}, which has no table in the schema")]
    UnknownResourceType { define: String, resource_type: String },

    #[error("Parameter \"{name}\" has no value")]
    UndefinedParameter { name: String },

    #[error(transparent)]
    InvalidSchema(#[from] SchemaError),

    #[error(transparent)]
    Terminology(#[from] TerminologyError),
}

impl CompileError {
    pub fn unsupported(define: impl Into<String>, construct: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            define: define.into(),
            construct: construct.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedConstruct { .. } => CQM0400,
            Self::UnknownResourceType { .. } => CQM0401,
            Self::UndefinedParameter { .. } => CQM0203,
            Self::InvalidSchema(_) => CQM0403,
            Self::Terminology(err) => err.code(),
        }
    }
}

/// A backend failed to run a compiled statement
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SqlExecutionError {
    #[error("SQL execution failed: {0}")]
    Failed(String),

    /// The schema cannot hold the snapshot unambiguously
    #[error(transparent)]
    InvalidSchema(#[from] SchemaError),

    /// The snapshot itself cannot be loaded (e.g. a repeated identifier)
    #[error("Snapshot rejected: {0}")]
    InvalidData(String),
}

impl SqlExecutionError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Failed(_) => CQM0402,
            Self::InvalidSchema(_) => CQM0403,
            Self::InvalidData(_) => CQM0404,
        }
    }

    /// Whether running the same request again may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for SqlExecutionError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Failed(err.to_string())
    }
}
