//! Parse errors

use octofhir_cqm_diagnostics::{
    CQM0001, CQM0002, CQM0003, CQM0004, CQM0010, CQM0011, Diagnostic, ErrorCode, SourceLocation,
};
use thiserror::Error;

/// Result type for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors that stop a library from parsing. No partial library is returned.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    /// A define was declared without an expression body
    #[error("Define \"{name}\" has no expression body at {location}")]
    MalformedDefine {
        name: String,
        location: SourceLocation,
    },

    /// A retrieve or code filter names a value set or code that was not declared
    #[error("Undefined terminology reference \"{name}\" at {location}")]
    UndefinedTerminology {
        name: String,
        location: SourceLocation,
    },

    /// Any other tokenizer or grammar failure
    #[error("{message} at {location}")]
    Syntax {
        code: ErrorCode,
        message: String,
        location: SourceLocation,
    },
}

impl ParseError {
    pub fn syntax(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Self::Syntax {
            code,
            message: message.into(),
            location,
        }
    }

    pub fn unexpected_token(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::syntax(CQM0001, message, location)
    }

    pub fn unexpected_end(expected: &str, location: SourceLocation) -> Self {
        Self::syntax(
            CQM0002,
            format!("Unexpected end of input, expected {expected}"),
            location,
        )
    }

    pub fn unterminated(what: &str, location: SourceLocation) -> Self {
        Self::syntax(CQM0003, format!("Unterminated {what}"), location)
    }

    pub fn invalid_literal(message: impl Into<String>, location: SourceLocation) -> Self {
        Self::syntax(CQM0004, message, location)
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MalformedDefine { .. } => CQM0010,
            Self::UndefinedTerminology { .. } => CQM0011,
            Self::Syntax { code, .. } => *code,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        match self {
            Self::MalformedDefine { location, .. }
            | Self::UndefinedTerminology { location, .. }
            | Self::Syntax { location, .. } => location,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        let message = match self {
            Self::MalformedDefine { name, .. } => format!("Define \"{name}\" has no expression body"),
            Self::UndefinedTerminology { name, .. } => {
                format!("Undefined terminology reference \"{name}\"")
            }
            Self::Syntax { message, .. } => message.clone(),
        };
        Diagnostic::error(self.code(), message).with_location(self.location().clone())
    }
}
