//! Graph construction errors

use octofhir_cqm_diagnostics::{CQM0100, CQM0101, ErrorCode};
use thiserror::Error;

/// Result type for graph operations
pub type GraphResult<T> = Result<T, GraphError>;

/// Reasons a library cannot be ordered. Evaluation never starts after one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GraphError {
    /// Defines that reference each other, in traversal order
    #[error("Circular reference between defines: {}", format_cycle(.0))]
    Cycle(Vec<String>),

    /// A define references a name no define declares
    #[error("Define \"{referenced_by}\" references undefined \"{name}\"")]
    UnknownReference { name: String, referenced_by: String },
}

impl GraphError {
    pub fn code(&self) -> ErrorCode {
        match self {
            GraphError::Cycle(_) => CQM0100,
            GraphError::UnknownReference { .. } => CQM0101,
        }
    }
}

/// `"A" -> "B" -> "A"`
fn format_cycle(names: &[String]) -> String {
    let mut parts: Vec<String> = names.iter().map(|n| format!("\"{n}\"")).collect();
    if let Some(first) = parts.first().cloned() {
        parts.push(first);
    }
    parts.join(" -> ")
}
