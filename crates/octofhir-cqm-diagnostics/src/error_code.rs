//! Structured error codes
//!
//! Code ranges:
//! - CQM0001-CQM0099: library text (tokenizer, parser, validation warnings)
//! - CQM0100-CQM0199: dependency graph
//! - CQM0200-CQM0299: interpreted evaluation
//! - CQM0300-CQM0399: terminology resolution
//! - CQM0400-CQM0499: SQL compilation and execution
//! - CQM0500-CQM0599: system (configuration, I/O)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

/// Error code identifier, rendered as `CQMnnnn`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Short description registered for this code
    pub fn description(&self) -> &'static str {
        DESCRIPTIONS.get(&self.0).copied().unwrap_or("Unknown error")
    }

    pub const fn category(&self) -> ErrorCategory {
        match self.0 {
            1..=99 => ErrorCategory::Parse,
            100..=199 => ErrorCategory::Graph,
            200..=299 => ErrorCategory::Evaluation,
            300..=399 => ErrorCategory::Terminology,
            400..=499 => ErrorCategory::Sql,
            _ => ErrorCategory::System,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CQM{:04}", self.0)
    }
}

/// Pipeline stage an error code belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    Parse,
    Graph,
    Evaluation,
    Terminology,
    Sql,
    System,
}

static DESCRIPTIONS: LazyLock<HashMap<u16, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        (1, "Unexpected token"),
        (2, "Unexpected end of input"),
        (3, "Unterminated literal"),
        (4, "Invalid literal"),
        (10, "Define has no expression body"),
        (11, "Undefined terminology reference"),
        (12, "Duplicate definition"),
        (13, "Missing library declaration"),
        (14, "Library declares no defines"),
        (100, "Circular define reference"),
        (101, "Unknown define reference"),
        (200, "Clinical data snapshot is empty"),
        (201, "Unsupported construct"),
        (202, "Unexpected value shape"),
        (203, "Undefined parameter"),
        (204, "Define result missing"),
        (205, "Duplicate identifier in snapshot"),
        (300, "Terminology source unavailable"),
        (301, "Value set not resolved"),
        (400, "Unsupported construct in SQL compilation"),
        (401, "Resource type not mapped in schema"),
        (402, "SQL execution failed"),
        (403, "Invalid relational schema"),
        (404, "Snapshot cannot be loaded into the backend"),
        (500, "Configuration error"),
        (501, "I/O error"),
    ])
});

// Library text
pub const CQM0001: ErrorCode = ErrorCode::new(1);
pub const CQM0002: ErrorCode = ErrorCode::new(2);
pub const CQM0003: ErrorCode = ErrorCode::new(3);
pub const CQM0004: ErrorCode = ErrorCode::new(4);
pub const CQM0010: ErrorCode = ErrorCode::new(10);
pub const CQM0011: ErrorCode = ErrorCode::new(11);
pub const CQM0012: ErrorCode = ErrorCode::new(12);
pub const CQM0013: ErrorCode = ErrorCode::new(13);
pub const CQM0014: ErrorCode = ErrorCode::new(14);

// Dependency graph
pub const CQM0100: ErrorCode = ErrorCode::new(100);
pub const CQM0101: ErrorCode = ErrorCode::new(101);

// Interpreted evaluation
pub const CQM0200: ErrorCode = ErrorCode::new(200);
pub const CQM0201: ErrorCode = ErrorCode::new(201);
pub const CQM0202: ErrorCode = ErrorCode::new(202);
pub const CQM0203: ErrorCode = ErrorCode::new(203);
pub const CQM0204: ErrorCode = ErrorCode::new(204);
pub const CQM0205: ErrorCode = ErrorCode::new(205);

// Terminology
pub const CQM0300: ErrorCode = ErrorCode::new(300);
pub const CQM0301: ErrorCode = ErrorCode::new(301);

// SQL
pub const CQM0400: ErrorCode = ErrorCode::new(400);
pub const CQM0401: ErrorCode = ErrorCode::new(401);
pub const CQM0402: ErrorCode = ErrorCode::new(402);
pub const CQM0403: ErrorCode = ErrorCode::new(403);
pub const CQM0404: ErrorCode = ErrorCode::new(404);

// System
pub const CQM0500: ErrorCode = ErrorCode::new(500);
pub const CQM0501: ErrorCode = ErrorCode::new(501);
