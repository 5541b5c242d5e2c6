//! SQL command implementation

use super::{load_config, load_schema, load_valuesets, output, parse_period, read_file};
use crate::MeasureEngine;
use anyhow::{Context, Result};
use octofhir_cqm_sql::SqlDialect;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for sql command
pub struct SqlConfig {
    pub file: PathBuf,
    pub dialect: Option<SqlDialect>,
    pub schema: Option<PathBuf>,
    pub valuesets: Option<PathBuf>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub config: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Compile a library and print the statement
pub async fn sql(config: SqlConfig) -> Result<()> {
    let mut engine_config = load_config(config.config.as_deref())?;
    if let Some(dialect) = config.dialect {
        engine_config.sql_dialect = dialect;
    }
    let schema = load_schema(config.schema.as_deref())?;
    let source = load_valuesets(config.valuesets.as_deref())?;
    let period = parse_period(config.period_start.as_deref(), config.period_end.as_deref())?;
    let text = read_file(&config.file, "library file")?;

    let engine = MeasureEngine::new(engine_config, Arc::new(source));
    let statement = engine
        .compile_sql(&text, &schema, period)
        .await
        .with_context(|| format!("Failed to compile {}", config.file.display()))?;

    if config.verbose {
        eprintln!(
            "Compiled {} population(s) to {} SQL: {}",
            statement.populations.len(),
            statement.dialect,
            statement.populations.join(", ")
        );
    }
    output::write_output(&statement.sql, config.output_file.as_deref())
}
