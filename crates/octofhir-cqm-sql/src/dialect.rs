//! SQL dialects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Quoting rules of the target engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    /// Double-quoted identifiers, doubled single quotes in strings
    /// (SQLite, PostgreSQL)
    #[default]
    Ansi,
    /// Back-quoted identifiers, backslash escapes in strings
    Spark,
}

impl SqlDialect {
    pub fn quote_identifier(&self, name: &str) -> String {
        match self {
            Self::Ansi => format!("\"{}\"", name.replace('"', "\"\"")),
            Self::Spark => format!("`{}`", name.replace('`', "``")),
        }
    }

    pub fn string_literal(&self, value: &str) -> String {
        match self {
            Self::Ansi => format!("'{}'", value.replace('\'', "''")),
            Self::Spark => format!("'{}'", value.replace('\\', "\\\\").replace('\'', "\\'")),
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Ansi => "ansi",
            Self::Spark => "spark",
        }
    }
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SqlDialect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ansi" | "sqlite" | "postgres" | "postgresql" => Ok(Self::Ansi),
            "spark" | "databricks" => Ok(Self::Spark),
            other => Err(format!("Unknown SQL dialect '{other}' (expected ansi or spark)")),
        }
    }
}
