//! Clinical quality measure evaluation for Rust
//!
//! A measure library is a set of named, interdependent population defines.
//! This crate runs one down two independent paths that must agree:
//! - Interpretation over an in-memory [`ClinicalDataSnapshot`](model::ClinicalDataSnapshot)
//! - Compilation to one SQL statement over a flattened FHIR schema, executed
//!   by a [`SqlExecutor`](sql::SqlExecutor)
//!
//! Either way the result is a FHIR [`MeasureReport`].
//!
//! # Example
//!
//! ```ignore
//! use octofhir_cqm::{EngineConfig, MeasureEngine};
//! use octofhir_cqm::terminology::InMemoryTerminologySource;
//! use std::sync::Arc;
//!
//! let engine = MeasureEngine::new(EngineConfig::default(), Arc::new(InMemoryTerminologySource::new()));
//! let report = engine.evaluate_library(text, &snapshot, None).await?;
//! println!("{}", report.to_json());
//! ```

// Re-export all public APIs from internal crates
pub use octofhir_cqm_ast as ast;
pub use octofhir_cqm_diagnostics as diagnostics;
pub use octofhir_cqm_eval as eval;
pub use octofhir_cqm_graph as graph;
pub use octofhir_cqm_model as model;
pub use octofhir_cqm_parser as parser;
pub use octofhir_cqm_sql as sql;
pub use octofhir_cqm_terminology as terminology;

mod config;
mod engine;
mod error;
mod report;

pub use config::EngineConfig;
pub use engine::MeasureEngine;
pub use error::{MeasureError, MeasureResult};
pub use report::{
    CodeableConcept, GroupPopulation, MeasureReport, MeasureReportBuilder, MeasureScore, POPULATION_SYSTEM,
    PopulationCode, ReportCoding, ReportGroup, ReportPeriod, ReportStatus, ReportType,
};

// Convenience re-exports
pub use octofhir_cqm_ast::Library;
pub use octofhir_cqm_parser::parse;

// CLI module (only available with cli feature)
#[cfg(feature = "cli")]
pub mod cli;
