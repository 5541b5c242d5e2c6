//! Evaluation errors for the interpreted path

use octofhir_cqm_diagnostics::{CQM0200, CQM0201, CQM0202, CQM0203, CQM0204, CQM0205, ErrorCode};
use octofhir_cqm_model::DuplicateIdentifier;
use octofhir_cqm_terminology::TerminologyError;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Errors that stop an interpreted run. A define that matches no subjects is
/// an empty population, never an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EvalError {
    /// The snapshot holds no patients and no resources
    #[error("Clinical data snapshot is empty")]
    EmptySnapshot,

    /// A patient id, or a resource id within one resource type, repeats
    #[error("Clinical data snapshot is ambiguous: {0}")]
    DuplicateIdentifier(DuplicateIdentifier),

    /// A define uses a construct the evaluator does not execute
    #[error("Define \"{define}\" uses an unsupported construct: {construct}")]
    UnsupportedConstruct { define: String, construct: String },

    /// A population was used where a scalar was expected, or the reverse
    #[error("Define \"{define}\": expected {expected}, found {found}")]
    UnexpectedValueShape {
        define: String,
        expected: String,
        found: String,
    },

    /// A parameter has no caller value and no default
    #[error("Parameter \"{name}\" has no value")]
    UndefinedParameter { name: String },

    /// A referenced define has not been evaluated; the order was not built
    /// from this library
    #[error("Define \"{define}\" references \"{name}\", which has no result")]
    MissingResult { define: String, name: String },

    #[error(transparent)]
    Terminology(#[from] TerminologyError),
}

impl EvalError {
    pub fn unsupported(define: impl Into<String>, construct: impl Into<String>) -> Self {
        Self::UnsupportedConstruct {
            define: define.into(),
            construct: construct.into(),
        }
    }

    pub fn shape(define: impl Into<String>, expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::UnexpectedValueShape {
            define: define.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::EmptySnapshot => CQM0200,
            Self::DuplicateIdentifier(_) => CQM0205,
            Self::UnsupportedConstruct { .. } => CQM0201,
            Self::UnexpectedValueShape { .. } => CQM0202,
            Self::UndefinedParameter { .. } => CQM0203,
            Self::MissingResult { .. } => CQM0204,
            Self::Terminology(err) => err.code(),
        }
    }
}
