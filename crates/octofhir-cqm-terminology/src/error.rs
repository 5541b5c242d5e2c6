//! Terminology errors

use octofhir_cqm_diagnostics::{CQM0300, CQM0301, ErrorCode};
use thiserror::Error;

/// Result type for terminology operations
pub type TerminologyResult<T> = Result<T, TerminologyError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TerminologyError {
    /// The source failed or timed out. Transient; the cache is untouched and
    /// the caller may retry.
    #[error("Terminology unavailable for {url}: {reason}")]
    Unavailable { url: String, reason: String },

    /// A value set was used that was not resolved before the run
    #[error("Value set {url} was not resolved")]
    NotResolved { url: String },
}

impl TerminologyError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TerminologyError::Unavailable { .. } => CQM0300,
            TerminologyError::NotResolved { .. } => CQM0301,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, TerminologyError::Unavailable { .. })
    }
}
