//! Evaluate command implementation

use super::{load_config, load_schema, load_valuesets, output, parse_period, read_file};
use crate::{MeasureEngine, MeasureReport};
use anyhow::{Context, Result};
use octofhir_cqm_model::ClinicalDataSnapshot;
use octofhir_cqm_sql::SqliteExecutor;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for evaluate command
pub struct EvaluateConfig {
    pub file: PathBuf,
    pub data: PathBuf,
    pub valuesets: Option<PathBuf>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    /// Run the compiled SQL on an in-memory SQLite copy of the data instead
    /// of interpreting
    pub sql: bool,
    pub schema: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
    pub verbose: bool,
}

/// Evaluate a library over a snapshot and print the MeasureReport
pub async fn evaluate(config: EvaluateConfig) -> Result<()> {
    let engine_config = load_config(config.config.as_deref())?;
    let source = load_valuesets(config.valuesets.as_deref())?;
    let period = parse_period(config.period_start.as_deref(), config.period_end.as_deref())?;
    let text = read_file(&config.file, "library file")?;
    let snapshot = ClinicalDataSnapshot::from_json(&read_file(&config.data, "data file")?)
        .with_context(|| format!("Invalid data file: {}", config.data.display()))?;

    if config.verbose {
        eprintln!(
            "Loaded {} patients and {} resources from {}",
            snapshot.patients.len(),
            snapshot.resources.len(),
            config.data.display()
        );
    }

    let engine = MeasureEngine::new(engine_config, Arc::new(source));
    let report = if config.sql {
        run_sql(&engine, &config, &text, &snapshot, period).await?
    } else {
        engine
            .evaluate_library(&text, &snapshot, period)
            .await
            .with_context(|| format!("Failed to evaluate {}", config.file.display()))?
    };

    output::write_output(&output::to_pretty_json(&report)?, config.output_file.as_deref())
}

async fn run_sql(
    engine: &MeasureEngine,
    config: &EvaluateConfig,
    text: &str,
    snapshot: &ClinicalDataSnapshot,
    period: Option<octofhir_cqm_model::Interval>,
) -> Result<MeasureReport> {
    let schema = load_schema(config.schema.as_deref())?;
    let executor = SqliteExecutor::open_in_memory().context("Failed to open SQLite database")?;
    executor
        .load_snapshot(snapshot, &schema)
        .context("Failed to load data into SQLite")?;
    engine
        .compile_and_execute(text, &schema, &executor, period)
        .await
        .with_context(|| format!("Failed to run {} as SQL", config.file.display()))
}
