//! CLI functionality for the `cqm` tool
//!
//! - `validate`: parse libraries and report diagnostics
//! - `sql`: compile a library to SQL
//! - `evaluate`: run a library over a snapshot and print the MeasureReport
//!
//! Shared loaders for the files those commands read live here.

pub mod evaluate;
pub mod output;
pub mod sql;
pub mod validate;

use crate::EngineConfig;
use anyhow::{Context, Result, bail};
use octofhir_cqm_model::{Interval, SchemaDescriptor, parse_instant};
use octofhir_cqm_terminology::InMemoryTerminologySource;
use std::fs;
use std::path::Path;

/// Read a text file with the path in the error
pub fn read_file(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {what}: {}", path.display()))
}

/// Engine configuration from `path`, or the defaults
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => {
            let text = read_file(path, "config file")?;
            EngineConfig::from_json(&text).with_context(|| format!("Invalid config file: {}", path.display()))
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Schema from `path`, or the default flattened layout
pub fn load_schema(path: Option<&Path>) -> Result<SchemaDescriptor> {
    match path {
        Some(path) => {
            let text = read_file(path, "schema file")?;
            SchemaDescriptor::from_json(&text).with_context(|| format!("Invalid schema file: {}", path.display()))
        }
        None => Ok(SchemaDescriptor::flattened()),
    }
}

/// FHIR ValueSet resources from `path`; an empty source when absent
pub fn load_valuesets(path: Option<&Path>) -> Result<InMemoryTerminologySource> {
    match path {
        Some(path) => {
            let text = read_file(path, "value set file")?;
            let source = InMemoryTerminologySource::from_fhir_json(&text)
                .with_context(|| format!("Invalid value set file: {}", path.display()))?;
            log::info!("Loaded {} value sets from {}", source.len(), path.display());
            Ok(source)
        }
        None => Ok(InMemoryTerminologySource::new()),
    }
}

/// Closed period from `--period-start` / `--period-end`. Both or neither
/// must be given.
pub fn parse_period(start: Option<&str>, end: Option<&str>) -> Result<Option<Interval>> {
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => {
            let low = parse_instant(start).with_context(|| format!("Invalid period start: {start}"))?;
            let high = parse_instant(end).with_context(|| format!("Invalid period end: {end}"))?;
            if low > high {
                bail!("Period start {start} is after period end {end}");
            }
            Ok(Some(Interval::closed(low, high)))
        }
        _ => bail!("--period-start and --period-end must be given together"),
    }
}
