//! Errors surfaced by the engine entry points

use octofhir_cqm_diagnostics::{CQM0500, ErrorCode};
use octofhir_cqm_eval::EvalError;
use octofhir_cqm_graph::GraphError;
use octofhir_cqm_parser::ParseError;
use octofhir_cqm_sql::{CompileError, SqlExecutionError};
use octofhir_cqm_terminology::TerminologyError;
use thiserror::Error;

/// Result type for engine operations
pub type MeasureResult<T> = Result<T, MeasureError>;

/// Any failure of a measure run. Nothing is retried internally; see
/// [`MeasureError::is_retryable`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MeasureError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    SqlExecution(#[from] SqlExecutionError),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl MeasureError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Parse(err) => err.code(),
            Self::Graph(err) => err.code(),
            Self::Eval(err) => err.code(),
            Self::Compile(err) => err.code(),
            Self::SqlExecution(err) => err.code(),
            Self::Config(_) => CQM0500,
        }
    }

    /// The terminology error behind this failure, on either path
    pub fn terminology(&self) -> Option<&TerminologyError> {
        match self {
            Self::Eval(EvalError::Terminology(err)) | Self::Compile(CompileError::Terminology(err)) => Some(err),
            _ => None,
        }
    }

    /// Transient failures a caller may retry: terminology outages and failed
    /// SQL statements. A rejected schema or snapshot fails the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SqlExecution(err) => err.is_transient(),
            _ => self.terminology().is_some_and(TerminologyError::is_transient),
        }
    }
}
