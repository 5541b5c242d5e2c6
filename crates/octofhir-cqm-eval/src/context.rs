//! Evaluation context for one interpreted run

use crate::{DefineValue, EvalError, EvalResult};
use chrono::NaiveDateTime;
use indexmap::IndexMap;
use octofhir_cqm_ast::{Edge, InstantSource, IntervalSource, Library, QuantitySource};
use octofhir_cqm_model::{ClinicalDataSnapshot, Interval, Parameters, Patient, Quantity, Resource, ScalarValue};
use octofhir_cqm_terminology::ResolvedTerminology;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Resources grouped by type, and by type then subject
pub(crate) struct SnapshotIndex<'a> {
    by_type: HashMap<&'a str, Vec<&'a Resource>>,
    by_subject: HashMap<&'a str, HashMap<&'a str, Vec<&'a Resource>>>,
    patients: Vec<&'a Patient>,
}

impl<'a> SnapshotIndex<'a> {
    pub(crate) fn new(snapshot: &'a ClinicalDataSnapshot) -> Self {
        let mut by_type: HashMap<&str, Vec<&Resource>> = HashMap::new();
        let mut by_subject: HashMap<&str, HashMap<&str, Vec<&Resource>>> = HashMap::new();
        for resource in &snapshot.resources {
            let resource_type = resource.resource_type.as_str();
            by_type.entry(resource_type).or_default().push(resource);
            by_subject
                .entry(resource_type)
                .or_default()
                .entry(resource.subject.as_str())
                .or_default()
                .push(resource);
        }
        Self {
            by_type,
            by_subject,
            patients: snapshot.patients.iter().collect(),
        }
    }

    pub(crate) fn resources(&self, resource_type: &str) -> &[&'a Resource] {
        self.by_type.get(resource_type).map(Vec::as_slice).unwrap_or_default()
    }

    pub(crate) fn resources_of_subject(&self, resource_type: &str, subject: &str) -> &[&'a Resource] {
        self.by_subject
            .get(resource_type)
            .and_then(|subjects| subjects.get(subject))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub(crate) fn patients(&self) -> &[&'a Patient] {
        &self.patients
    }
}

/// State shared by every define of a run: inputs, the subject universe and
/// the results computed so far.
pub(crate) struct EvaluationContext<'a> {
    pub(crate) library: &'a Library,
    pub(crate) index: SnapshotIndex<'a>,
    pub(crate) terminology: &'a ResolvedTerminology,
    parameters: &'a Parameters,
    /// Every patient id in the snapshot
    pub(crate) universe: BTreeSet<String>,
    pub(crate) results: IndexMap<String, DefineValue>,
    /// Define being evaluated, for error reporting
    pub(crate) define: String,
}

impl<'a> EvaluationContext<'a> {
    pub(crate) fn new(
        library: &'a Library,
        snapshot: &'a ClinicalDataSnapshot,
        terminology: &'a ResolvedTerminology,
        parameters: &'a Parameters,
    ) -> Self {
        Self {
            library,
            index: SnapshotIndex::new(snapshot),
            terminology,
            parameters,
            universe: snapshot.patient_ids(),
            results: IndexMap::new(),
            define: String::new(),
        }
    }

    pub(crate) fn unsupported(&self, construct: impl Into<String>) -> EvalError {
        EvalError::unsupported(self.define.clone(), construct)
    }

    pub(crate) fn shape_error(&self, expected: &str, found: &str) -> EvalError {
        EvalError::shape(self.define.clone(), expected, found)
    }

    /// Result of an already evaluated define
    pub(crate) fn result(&self, name: &str) -> EvalResult<&DefineValue> {
        self.results.get(name).ok_or_else(|| EvalError::MissingResult {
            define: self.define.clone(),
            name: name.to_string(),
        })
    }

    pub(crate) fn population(&self, name: &str) -> EvalResult<Arc<BTreeSet<String>>> {
        match self.result(name)? {
            DefineValue::Population(subjects) => Ok(Arc::clone(subjects)),
            other => Err(self.shape_error("population", other.shape())),
        }
    }

    /// Caller value, then the library default
    pub(crate) fn parameter(&self, name: &str) -> EvalResult<ScalarValue> {
        if let Some(value) = self.parameters.get(name) {
            return Ok(value.clone());
        }
        self.library
            .parameter(name)
            .and_then(|p| p.default.clone())
            .ok_or_else(|| EvalError::UndefinedParameter {
                name: name.to_string(),
            })
    }

    fn scalar_define(&self, name: &str) -> EvalResult<ScalarValue> {
        match self.result(name)? {
            DefineValue::Scalar(value) => Ok(value.clone()),
            other => Err(self.shape_error("scalar", other.shape())),
        }
    }

    pub(crate) fn interval(&self, source: &IntervalSource) -> EvalResult<Interval> {
        let value = match source {
            IntervalSource::Literal(interval) => return Ok(*interval),
            IntervalSource::Parameter(name) => self.parameter(name)?,
            IntervalSource::Define(name) => self.scalar_define(name)?,
        };
        match value {
            ScalarValue::Interval(interval) => Ok(interval),
            other => Err(self.shape_error("Interval", other.type_name())),
        }
    }

    pub(crate) fn quantity(&self, source: &QuantitySource) -> EvalResult<Quantity> {
        let value = match source {
            QuantitySource::Literal(quantity) => return Ok(quantity.clone()),
            QuantitySource::Parameter(name) => self.parameter(name)?,
            QuantitySource::Define(name) => self.scalar_define(name)?,
        };
        match value {
            ScalarValue::Quantity(quantity) => Ok(quantity),
            other => Err(self.shape_error("Quantity", other.type_name())),
        }
    }

    pub(crate) fn instant(&self, source: &InstantSource) -> EvalResult<NaiveDateTime> {
        let value = match source {
            InstantSource::Literal(at) => return Ok(*at),
            InstantSource::Boundary(boundary) => {
                let interval = self.interval(&boundary.interval)?;
                return Ok(match boundary.edge {
                    Edge::Start => interval.start(),
                    Edge::End => interval.end(),
                });
            }
            InstantSource::Parameter(name) => self.parameter(name)?,
            InstantSource::Define(name) => self.scalar_define(name)?,
        };
        match value {
            ScalarValue::DateTime(at) => Ok(at),
            other => Err(self.shape_error("DateTime", other.type_name())),
        }
    }
}
