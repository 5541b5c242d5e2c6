//! Engine entry points
//!
//! [`MeasureEngine`] runs a measure library down either execution path:
//! - [`MeasureEngine::evaluate_library`]: parse, order, interpret over a
//!   snapshot, report
//! - [`MeasureEngine::compile_and_execute`]: parse, order, compile to SQL,
//!   execute on a backend, report
//!
//! Both paths resolve value sets through one shared, cached resolver and
//! return the same [`MeasureReport`] shape.

use crate::{EngineConfig, MeasureReport, MeasureResult};
use octofhir_cqm_ast::Library;
use octofhir_cqm_graph::EvaluationOrder;
use octofhir_cqm_model::{ClinicalDataSnapshot, Interval, MEASUREMENT_PERIOD, Parameters, ScalarValue, SchemaDescriptor};
use octofhir_cqm_sql::{SqlCompiler, SqlExecutor, SqlStatement};
use octofhir_cqm_terminology::{TerminologyResolver, TerminologySource};
use std::sync::Arc;

/// Measure evaluation engine.
///
/// Cheap to clone; clones share the terminology cache and nothing else, so
/// one engine can serve concurrent evaluations.
#[derive(Debug, Clone)]
pub struct MeasureEngine {
    config: EngineConfig,
    resolver: Arc<TerminologyResolver>,
}

impl MeasureEngine {
    pub fn new(config: EngineConfig, source: Arc<dyn TerminologySource>) -> Self {
        let resolver = TerminologyResolver::new(source)
            .with_ttl(config.terminology_ttl())
            .with_fetch_timeout(config.fetch_timeout());
        Self {
            config,
            resolver: Arc::new(resolver),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn resolver(&self) -> &TerminologyResolver {
        &self.resolver
    }

    /// Interpret `text` over `snapshot`.
    ///
    /// `period` overrides the configured measurement period, which in turn
    /// overrides the library's declared default.
    pub async fn evaluate_library(
        &self,
        text: &str,
        snapshot: &ClinicalDataSnapshot,
        period: Option<Interval>,
    ) -> MeasureResult<MeasureReport> {
        let (library, order) = prepare(text)?;
        let period = self.period(period);
        let result = octofhir_cqm_eval::evaluate(
            &library,
            &order,
            snapshot,
            &self.resolver,
            &parameters(period.as_ref()),
        )
        .await?;

        Ok(MeasureReport::from_result(
            library.measure_identifier(),
            report_period(&library, period.as_ref()).as_ref(),
            result,
        ))
    }

    /// Compile `text` to SQL over `schema` and run it on `executor`
    pub async fn compile_and_execute(
        &self,
        text: &str,
        schema: &SchemaDescriptor,
        executor: &dyn SqlExecutor,
        period: Option<Interval>,
    ) -> MeasureResult<MeasureReport> {
        let (library, order) = prepare(text)?;
        let period = self.period(period);
        let statement = self.compile(&library, &order, schema, period.as_ref()).await?;

        let counts = executor.execute(&statement).await?;
        log::info!(
            "Executed {} population queries of {}",
            counts.len(),
            library.measure_identifier()
        );
        Ok(MeasureReport::from_counts(
            library.measure_identifier(),
            report_period(&library, period.as_ref()).as_ref(),
            &counts,
        ))
    }

    /// Compile `text` without executing it
    pub async fn compile_sql(
        &self,
        text: &str,
        schema: &SchemaDescriptor,
        period: Option<Interval>,
    ) -> MeasureResult<SqlStatement> {
        let (library, order) = prepare(text)?;
        let period = self.period(period);
        self.compile(&library, &order, schema, period.as_ref()).await
    }

    /// Drop every cached value set expansion
    pub fn clear_terminology_cache(&self) {
        self.resolver.clear();
        log::debug!("Cleared terminology cache");
    }

    async fn compile(
        &self,
        library: &Library,
        order: &EvaluationOrder,
        schema: &SchemaDescriptor,
        period: Option<&Interval>,
    ) -> MeasureResult<SqlStatement> {
        let statement = SqlCompiler::new(schema)
            .with_dialect(self.config.sql_dialect)
            .compile(library, order, &self.resolver, &parameters(period))
            .await?;
        Ok(statement)
    }

    fn period(&self, period: Option<Interval>) -> Option<Interval> {
        period.or(self.config.measure_period)
    }
}

fn prepare(text: &str) -> MeasureResult<(Library, EvaluationOrder)> {
    let library = octofhir_cqm_parser::parse(text)?;
    for warning in &library.diagnostics {
        log::warn!("{}: {}", library.measure_identifier(), warning.message);
    }
    let order = octofhir_cqm_graph::build(&library)?;
    Ok((library, order))
}

fn parameters(period: Option<&Interval>) -> Parameters {
    period.map_or_else(Parameters::new, |period| Parameters::with_measurement_period(*period))
}

/// The period the run used: the caller's, or else the library default
fn report_period(library: &Library, period: Option<&Interval>) -> Option<Interval> {
    period.copied().or_else(|| {
        match library.parameter(MEASUREMENT_PERIOD).and_then(|p| p.default.as_ref()) {
            Some(ScalarValue::Interval(interval)) => Some(*interval),
            _ => None,
        }
    })
}
