//! Compiled statements and their results

use crate::SqlDialect;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One SQL query computing every population of a library.
///
/// Executing it yields one `(population, subject_count)` row per entry of
/// `populations`, in that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub dialect: SqlDialect,
    /// Population define names, in evaluation order
    pub populations: Vec<String>,
}

impl SqlStatement {
    /// No population defines: there is nothing to run
    pub fn is_empty(&self) -> bool {
        self.populations.is_empty()
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Distinct subjects in one population
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PopulationCount {
    pub population: String,
    pub subject_count: u64,
}

impl PopulationCount {
    pub fn new(population: impl Into<String>, subject_count: u64) -> Self {
        Self {
            population: population.into(),
            subject_count,
        }
    }
}
