//! Execution backend contract

use crate::{PopulationCount, SqlExecutionError, SqlStatement};
use async_trait::async_trait;

/// Runs compiled statements against a relational store.
///
/// Implementations return one count per population of the statement, in
/// statement order. Connection handling and timeouts are the backend's
/// concern; a timeout surfaces as [`SqlExecutionError::Failed`].
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(&self, statement: &SqlStatement) -> Result<Vec<PopulationCount>, SqlExecutionError>;
}
