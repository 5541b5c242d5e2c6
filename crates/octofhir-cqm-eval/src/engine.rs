//! Interpreted evaluation of a library over an in-memory snapshot

use crate::context::EvaluationContext;
use crate::{DefineValue, EvalError, EvalResult, PopulationResult};
use octofhir_cqm_ast::{Edge, Expression, Library, SetOperation, SetOperator};
use octofhir_cqm_graph::EvaluationOrder;
use octofhir_cqm_model::{ClinicalDataSnapshot, Parameters, ScalarValue};
use octofhir_cqm_terminology::{ResolvedTerminology, TerminologyResolver};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Evaluate every define of `library` in `order` against `snapshot`.
///
/// All value sets the library declares are resolved through `resolver`
/// before the first define runs, so a terminology outage fails the run
/// up front instead of halfway through.
pub async fn evaluate(
    library: &Library,
    order: &EvaluationOrder,
    snapshot: &ClinicalDataSnapshot,
    resolver: &TerminologyResolver,
    parameters: &Parameters,
) -> EvalResult<PopulationResult> {
    check_snapshot(snapshot)?;
    let terminology = resolver.resolve_library(library).await?;
    evaluate_resolved(library, order, snapshot, &terminology, parameters)
}

fn check_snapshot(snapshot: &ClinicalDataSnapshot) -> EvalResult<()> {
    if snapshot.is_empty() {
        return Err(EvalError::EmptySnapshot);
    }
    match snapshot.duplicate_identifier() {
        Some(duplicate) => Err(EvalError::DuplicateIdentifier(duplicate)),
        None => Ok(()),
    }
}

/// Evaluate with value sets already resolved
pub fn evaluate_resolved(
    library: &Library,
    order: &EvaluationOrder,
    snapshot: &ClinicalDataSnapshot,
    terminology: &ResolvedTerminology,
    parameters: &Parameters,
) -> EvalResult<PopulationResult> {
    check_snapshot(snapshot)?;

    let mut ctx = EvaluationContext::new(library, snapshot, terminology, parameters);
    for name in order.iter() {
        let define = library.define(name).ok_or_else(|| EvalError::MissingResult {
            define: name.to_string(),
            name: name.to_string(),
        })?;
        ctx.define = define.name.clone();

        let value = ctx.eval_expression(&define.expression)?;
        match &value {
            DefineValue::Population(subjects) => {
                log::debug!("Define \"{name}\" selected {} subjects", subjects.len());
            }
            DefineValue::Scalar(scalar) => log::debug!("Define \"{name}\" = {scalar}"),
        }
        ctx.results.insert(define.name.clone(), value);
    }

    log::info!(
        "Evaluated {} defines of {} over {} patients",
        ctx.results.len(),
        library.measure_identifier(),
        ctx.universe.len()
    );
    Ok(ctx.results.into_iter().collect())
}

impl EvaluationContext<'_> {
    fn eval_expression(&self, expression: &Expression) -> EvalResult<DefineValue> {
        match expression {
            Expression::Query(query) => self.query_subjects(query).map(DefineValue::population),
            Expression::DefineRef(reference) => self.result(&reference.name).cloned(),
            Expression::SetOperation(operation) => self.set_operation(operation).map(DefineValue::population),
            Expression::Literal(value) => Ok(DefineValue::Scalar(value.clone())),
            Expression::Parameter(name) => self.parameter(name).map(DefineValue::Scalar),
            Expression::Boundary(boundary) => {
                let interval = self.interval(&boundary.interval)?;
                let at = match boundary.edge {
                    Edge::Start => interval.start(),
                    Edge::End => interval.end(),
                };
                Ok(DefineValue::Scalar(ScalarValue::DateTime(at)))
            }
            Expression::Unsupported(construct) => Err(self.unsupported(construct.construct.clone())),
        }
    }

    fn operand(&self, expression: &Expression) -> EvalResult<Arc<BTreeSet<String>>> {
        match self.eval_expression(expression)? {
            DefineValue::Population(subjects) => Ok(subjects),
            DefineValue::Scalar(value) => Err(self.shape_error("population", value.type_name())),
        }
    }

    fn set_operation(&self, operation: &SetOperation) -> EvalResult<BTreeSet<String>> {
        match operation {
            SetOperation::Binary { op, left, right } => {
                let left = self.operand(left)?;
                let right = self.operand(right)?;
                Ok(match op {
                    SetOperator::Union => left.union(&right).cloned().collect(),
                    SetOperator::Intersect => left.intersection(&right).cloned().collect(),
                    SetOperator::Except => left.difference(&right).cloned().collect(),
                })
            }
            SetOperation::Exists(operand) => {
                let subjects = self.operand(operand)?;
                Ok(subjects.intersection(&self.universe).cloned().collect())
            }
            SetOperation::Not(operand) => {
                let subjects = self.operand(operand)?;
                Ok(self.universe.difference(&subjects).cloned().collect())
            }
        }
    }
}
