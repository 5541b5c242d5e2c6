//! Define results

use indexmap::IndexMap;
use octofhir_cqm_model::ScalarValue;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Result of one define: a set of subject ids or a scalar
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DefineValue {
    /// Shared with every define that references it
    Population(Arc<BTreeSet<String>>),
    Scalar(ScalarValue),
}

impl DefineValue {
    pub fn population(subjects: BTreeSet<String>) -> Self {
        Self::Population(Arc::new(subjects))
    }

    pub fn as_population(&self) -> Option<&BTreeSet<String>> {
        match self {
            DefineValue::Population(subjects) => Some(subjects),
            DefineValue::Scalar(_) => None,
        }
    }

    /// `population` or the scalar's type name
    pub fn shape(&self) -> &'static str {
        match self {
            DefineValue::Population(_) => "population",
            DefineValue::Scalar(value) => value.type_name(),
        }
    }
}

/// Results of every define of a library, in evaluation order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PopulationResult {
    values: IndexMap<String, DefineValue>,
}

impl FromIterator<(String, DefineValue)> for PopulationResult {
    fn from_iter<I: IntoIterator<Item = (String, DefineValue)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

impl PopulationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: DefineValue) {
        self.values.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&DefineValue> {
        self.values.get(name)
    }

    pub fn population(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.get(name).and_then(DefineValue::as_population)
    }

    /// Number of subjects in the population define `name`
    pub fn count(&self, name: &str) -> Option<usize> {
        self.population(name).map(BTreeSet::len)
    }

    /// `(define, subject count)` for every population define
    pub fn counts(&self) -> impl Iterator<Item = (&str, usize)> {
        self.values
            .iter()
            .filter_map(|(name, value)| value.as_population().map(|subjects| (name.as_str(), subjects.len())))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &DefineValue)> {
        self.values.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
