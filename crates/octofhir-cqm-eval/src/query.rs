//! Resource query evaluation
//!
//! A query is first prepared into a [`Filter`]: every parameter, define and
//! value set it mentions is resolved once, and predicates that do not apply
//! to the queried type are rejected. The prepared filter is then run over
//! the snapshot index.
//! - Patient queries yield the ids of patients passing gender and age checks
//! - Other queries yield the subjects of resources passing coded, temporal
//!   and value checks plus their `with` / `without` clauses

use crate::context::EvaluationContext;
use crate::EvalResult;
use chrono::NaiveDateTime;
use octofhir_cqm_ast::{CodeFilter, Comparison, Predicate, RelationshipKind, ResourceQuery};
use octofhir_cqm_model::{Interval, Patient, Quantity, Resource};
use octofhir_cqm_terminology::{ValueSetExpansion, ValueSetKey};
use std::collections::BTreeSet;

/// A query with all operands resolved
struct Filter<'q> {
    checks: Vec<Check<'q>>,
    relationships: Vec<RelatedFilter<'q>>,
}

struct RelatedFilter<'q> {
    kind: RelationshipKind,
    resource_type: &'q str,
    filter: Filter<'q>,
    correlated: bool,
}

enum Check<'q> {
    ValueSet(&'q ValueSetExpansion),
    Code { system: &'q str, code: &'q str },
    Temporal(Interval),
    Value { op: Comparison, quantity: Quantity },
    Gender { negated: bool, gender: &'q str },
    Age { op: Comparison, at: NaiveDateTime, years: i64 },
}

impl EvaluationContext<'_> {
    /// Subject ids selected by `query`
    pub(crate) fn query_subjects(&self, query: &ResourceQuery) -> EvalResult<BTreeSet<String>> {
        let filter = self.prepare(query)?;
        let subjects: BTreeSet<String> = if query.is_patient() {
            self.index
                .patients()
                .iter()
                .filter(|patient| self.patient_passes(patient, &filter))
                .map(|patient| patient.id.clone())
                .collect()
        } else {
            self.index
                .resources(&query.resource_type)
                .iter()
                .filter(|resource| self.resource_passes(resource, &filter))
                .map(|resource| resource.subject.clone())
                .collect()
        };
        log::trace!(
            "Query [{}] in \"{}\" selected {} subjects",
            query.resource_type,
            self.define,
            subjects.len()
        );
        Ok(subjects)
    }

    fn prepare<'q>(&'q self, query: &'q ResourceQuery) -> EvalResult<Filter<'q>> {
        let patient = query.is_patient();
        let mut checks = Vec::with_capacity(query.predicates.len() + 1);

        if let Some(code) = &query.code {
            if patient {
                return Err(self.unsupported("coded filter on a Patient retrieve"));
            }
            checks.push(self.code_check(code)?);
        }

        for predicate in &query.predicates {
            let check = match (predicate, patient) {
                (Predicate::Gender(gender), true) => Check::Gender {
                    negated: gender.negated,
                    gender: &gender.gender,
                },
                (Predicate::Age(age), true) => Check::Age {
                    op: age.op,
                    at: self.instant(&age.at)?,
                    years: age.years,
                },
                (Predicate::Code(code), false) => self.code_check(code)?,
                // Only the resource's effective time is modelled
                (Predicate::Temporal(temporal), false) => Check::Temporal(self.interval(&temporal.interval)?),
                (Predicate::Value(value), false) => Check::Value {
                    op: value.op,
                    quantity: self.quantity(&value.quantity)?,
                },
                (predicate, _) => {
                    return Err(self.unsupported(format!(
                        "{} predicate on a {} query",
                        predicate_name(predicate),
                        query.resource_type
                    )));
                }
            };
            checks.push(check);
        }

        let mut relationships = Vec::with_capacity(query.relationships.len());
        for relationship in &query.relationships {
            if relationship.query.is_patient() {
                return Err(self.unsupported("Patient as a related query"));
            }
            let correlated = relationship.correlation.is_some();
            if correlated && patient {
                return Err(self.unsupported("temporal correlation with a Patient query"));
            }
            relationships.push(RelatedFilter {
                kind: relationship.kind,
                resource_type: &relationship.query.resource_type,
                filter: self.prepare(&relationship.query)?,
                correlated,
            });
        }

        Ok(Filter { checks, relationships })
    }

    fn code_check<'q>(&'q self, code: &'q CodeFilter) -> EvalResult<Check<'q>> {
        Ok(match code {
            CodeFilter::ValueSet(vs) => Check::ValueSet(self.terminology.expansion(&ValueSetKey::from(vs))?),
            CodeFilter::Code(code) => Check::Code {
                system: &code.system,
                code: &code.code,
            },
        })
    }

    fn patient_passes(&self, patient: &Patient, filter: &Filter<'_>) -> bool {
        let checks = filter.checks.iter().all(|check| match check {
            Check::Gender { negated, gender } => patient
                .gender
                .as_deref()
                .is_some_and(|g| (g == *gender) != *negated),
            Check::Age { op, at, years } => patient
                .age_in_years_at(*at)
                .is_some_and(|age| op.apply(&age, years)),
            _ => false,
        });
        checks
            && filter.relationships.iter().all(|related| {
                let found = self
                    .index
                    .resources_of_subject(related.resource_type, &patient.id)
                    .iter()
                    .any(|candidate| self.resource_passes(candidate, &related.filter));
                found == (related.kind == RelationshipKind::With)
            })
    }

    fn resource_passes(&self, resource: &Resource, filter: &Filter<'_>) -> bool {
        filter.checks.iter().all(|check| resource_check(resource, check))
            && filter
                .relationships
                .iter()
                .all(|related| self.related_holds(resource, related))
    }

    fn related_holds(&self, resource: &Resource, related: &RelatedFilter<'_>) -> bool {
        let window = if related.correlated {
            match resource.effective_bounds() {
                (Some(start), Some(end)) => Some(Interval::closed(start, end)),
                // Without both bounds nothing can lie within the left resource
                _ => return related.kind == RelationshipKind::Without,
            }
        } else {
            None
        };

        let found = self
            .index
            .resources_of_subject(related.resource_type, &resource.subject)
            .iter()
            .any(|candidate| {
                self.resource_passes(candidate, &related.filter)
                    && window.is_none_or(|window| {
                        let (start, end) = candidate.effective_bounds();
                        window.includes(start, end)
                    })
            });
        found == (related.kind == RelationshipKind::With)
    }
}

fn resource_check(resource: &Resource, check: &Check<'_>) -> bool {
    match check {
        Check::ValueSet(expansion) => resource
            .codings
            .iter()
            .any(|coding| expansion.contains(&coding.system, &coding.code)),
        Check::Code { system, code } => resource
            .codings
            .iter()
            .any(|coding| coding.system == *system && coding.code == *code),
        Check::Temporal(interval) => {
            let (start, end) = resource.effective_bounds();
            interval.includes(start, end)
        }
        Check::Value { op, quantity } => resource.value.as_ref().is_some_and(|value| {
            (quantity.unit.is_none() || value.unit == quantity.unit)
                && op.apply(&value.comparable(), &quantity.comparable())
        }),
        Check::Gender { .. } | Check::Age { .. } => false,
    }
}

fn predicate_name(predicate: &Predicate) -> &'static str {
    match predicate {
        Predicate::Temporal(_) => "temporal",
        Predicate::Value(_) => "value",
        Predicate::Gender(_) => "gender",
        Predicate::Age(_) => "age",
        Predicate::Code(_) => "code",
    }
}
