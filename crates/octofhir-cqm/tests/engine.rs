//! Engine entry points on both execution paths
//!
//! Covers:
//! - The heart-rate measure reported identically by interpretation and SQL
//! - Measurement period precedence
//! - The empty-snapshot asymmetry between the paths
//! - One terminology cache shared by both paths and by engine clones
//! - Errors surfaced through `MeasureError`

#![cfg(feature = "sqlite")]

mod common;

use async_trait::async_trait;
use common::{
    HEART_RATE_MEASURE, HEART_RATE_VS, LOINC, at, heart_rate_snapshot, sqlite_with,
    terminology_source,
};
use mockall::mock;
use octofhir_cqm::eval::EvalError;
use octofhir_cqm::model::{ClinicalDataSnapshot, Interval, SchemaDescriptor};
use octofhir_cqm::sql::{CompileError, SqlDialect};
use octofhir_cqm::terminology::{
    SourceError, TerminologyError, TerminologySource, ValueSetExpansion, ValueSetKey,
};
use octofhir_cqm::{EngineConfig, MeasureEngine, MeasureError, PopulationCode};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use std::sync::Arc;

mock! {
    pub Source {}

    #[async_trait]
    impl TerminologySource for Source {
        async fn fetch_expansion(&self, key: &ValueSetKey) -> Result<ValueSetExpansion, SourceError>;
    }
}

fn engine() -> MeasureEngine {
    MeasureEngine::new(EngineConfig::default(), Arc::new(terminology_source()))
}

fn year_2023() -> Interval {
    Interval::half_open(at("2023-01-01T00:00:00"), at("2024-01-01T00:00:00"))
}

// === Heart-rate measure ===

#[tokio::test]
async fn test_heart_rate_on_both_paths() {
    let engine = engine();
    let snapshot = heart_rate_snapshot();

    let interpreted = engine
        .evaluate_library(HEART_RATE_MEASURE, &snapshot, None)
        .await
        .unwrap();
    assert_eq!(interpreted.measure, "HeartRate|1.0.0");
    assert_eq!(interpreted.count(PopulationCode::InitialPopulation), Some(3));
    assert_eq!(interpreted.count(PopulationCode::Denominator), Some(3));
    assert_eq!(interpreted.count(PopulationCode::Numerator), Some(2));
    assert_eq!(interpreted.count(PopulationCode::DenominatorExclusion), None);
    assert_eq!(interpreted.score(), Some(Decimal::from(2) / Decimal::from(3)));

    let period = interpreted.period.as_ref().unwrap();
    assert_eq!(period.start, "2024-01-01T00:00:00");
    assert_eq!(period.end, "2024-12-31T23:59:59");

    let executed = engine
        .compile_and_execute(
            HEART_RATE_MEASURE,
            &SchemaDescriptor::flattened(),
            &sqlite_with(&snapshot),
            None,
        )
        .await
        .unwrap();
    assert_eq!(executed, interpreted);
}

#[tokio::test]
async fn test_passed_period_overrides_library_default() {
    let engine = engine();
    let snapshot = heart_rate_snapshot();

    let interpreted = engine
        .evaluate_library(HEART_RATE_MEASURE, &snapshot, Some(year_2023()))
        .await
        .unwrap();
    let executed = engine
        .compile_and_execute(
            HEART_RATE_MEASURE,
            &SchemaDescriptor::flattened(),
            &sqlite_with(&snapshot),
            Some(year_2023()),
        )
        .await
        .unwrap();

    assert_eq!(interpreted.count(PopulationCode::Numerator), Some(1));
    assert_eq!(interpreted.score(), Some(Decimal::from(1) / Decimal::from(3)));
    assert_eq!(interpreted.period.as_ref().unwrap().start, "2023-01-01T00:00:00");
    assert_eq!(executed, interpreted);
}

#[tokio::test]
async fn test_configured_period() {
    let config = EngineConfig {
        measure_period: Some(year_2023()),
        ..EngineConfig::default()
    };
    let engine = MeasureEngine::new(config, Arc::new(terminology_source()));
    let report = engine
        .evaluate_library(HEART_RATE_MEASURE, &heart_rate_snapshot(), None)
        .await
        .unwrap();
    assert_eq!(report.count(PopulationCode::Numerator), Some(1));
}

// === Empty snapshot ===

#[tokio::test]
async fn test_empty_snapshot_asymmetry() {
    let engine = engine();
    let empty = ClinicalDataSnapshot::default();

    let err = engine
        .evaluate_library(HEART_RATE_MEASURE, &empty, None)
        .await
        .unwrap_err();
    assert_eq!(err, MeasureError::Eval(EvalError::EmptySnapshot));

    let report = engine
        .compile_and_execute(
            HEART_RATE_MEASURE,
            &SchemaDescriptor::flattened(),
            &sqlite_with(&empty),
            None,
        )
        .await
        .unwrap();
    assert_eq!(report.count(PopulationCode::InitialPopulation), Some(0));
    assert_eq!(report.count(PopulationCode::Denominator), Some(0));
    assert_eq!(report.count(PopulationCode::Numerator), Some(0));
    assert_eq!(report.score(), None);
}

// === Terminology ===

#[tokio::test]
async fn test_paths_and_clones_share_the_cache() {
    let mut source = MockSource::new();
    source
        .expect_fetch_expansion()
        .times(2)
        .returning(|key| Ok(ValueSetExpansion::new(key.url.clone()).with_code(LOINC, "8867-4")));

    let engine = MeasureEngine::new(EngineConfig::default(), Arc::new(source));
    let clone = engine.clone();
    let snapshot = heart_rate_snapshot();
    let schema = SchemaDescriptor::flattened();

    let report = engine
        .evaluate_library(HEART_RATE_MEASURE, &snapshot, None)
        .await
        .unwrap();
    assert_eq!(report.count(PopulationCode::Numerator), Some(2));
    clone.compile_sql(HEART_RATE_MEASURE, &schema, None).await.unwrap();
    assert_eq!(engine.resolver().cached_len(), 1);

    // Dropping the cache forces the second fetch
    clone.clear_terminology_cache();
    assert_eq!(engine.resolver().cached_len(), 0);
    engine.compile_sql(HEART_RATE_MEASURE, &schema, None).await.unwrap();
}

#[tokio::test]
async fn test_terminology_outage_is_retryable() {
    let mut source = MockSource::new();
    source
        .expect_fetch_expansion()
        .returning(|key| Err(SourceError::Network(format!("{} unreachable", key.url))));
    let engine = MeasureEngine::new(EngineConfig::default(), Arc::new(source));

    let err = engine
        .evaluate_library(HEART_RATE_MEASURE, &heart_rate_snapshot(), None)
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(
        err.terminology(),
        Some(TerminologyError::Unavailable { url, .. }) if url == HEART_RATE_VS
    ));

    let err = engine
        .compile_sql(HEART_RATE_MEASURE, &SchemaDescriptor::flattened(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MeasureError::Compile(CompileError::Terminology(_))));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_concurrent_evaluations() {
    let engine = engine();
    let snapshot = heart_rate_snapshot();
    let other = engine.clone();

    let (a, b) = tokio::join!(
        engine.evaluate_library(HEART_RATE_MEASURE, &snapshot, None),
        other.evaluate_library(HEART_RATE_MEASURE, &snapshot, Some(year_2023())),
    );
    assert_eq!(a.unwrap().count(PopulationCode::Numerator), Some(2));
    assert_eq!(b.unwrap().count(PopulationCode::Numerator), Some(1));
}

// === Errors and dialects ===

#[tokio::test]
async fn test_unsupported_construct_on_both_paths() {
    let text = format!(
        r#"{HEART_RATE_MEASURE}
define "Either": "Denominator" xor "Numerator"
"#
    );
    let engine = engine();
    let snapshot = heart_rate_snapshot();

    let err = engine.evaluate_library(&text, &snapshot, None).await.unwrap_err();
    assert!(matches!(
        err,
        MeasureError::Eval(EvalError::UnsupportedConstruct { ref define, .. }) if define == "Either"
    ));

    let err = engine
        .compile_and_execute(&text, &SchemaDescriptor::flattened(), &sqlite_with(&snapshot), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MeasureError::Compile(CompileError::UnsupportedConstruct { ref define, .. }) if define == "Either"
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_cycle_is_a_graph_error() {
    let text = r#"
library Loop version '1'
define "A": "B"
define "B": "A"
"#;
    let err = engine()
        .evaluate_library(text, &heart_rate_snapshot(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MeasureError::Graph(_)));
}

#[tokio::test]
async fn test_configured_dialect() {
    let config = EngineConfig {
        sql_dialect: SqlDialect::Spark,
        ..EngineConfig::default()
    };
    let engine = MeasureEngine::new(config, Arc::new(terminology_source()));
    let statement = engine
        .compile_sql(HEART_RATE_MEASURE, &SchemaDescriptor::flattened(), None)
        .await
        .unwrap();
    assert_eq!(statement.dialect, SqlDialect::Spark);
    assert!(statement.sql.starts_with("WITH `Initial Population` AS ("));

    // SQLite only runs ANSI statements
    let err = engine
        .compile_and_execute(
            HEART_RATE_MEASURE,
            &SchemaDescriptor::flattened(),
            &sqlite_with(&heart_rate_snapshot()),
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, MeasureError::SqlExecution(_)));
}
