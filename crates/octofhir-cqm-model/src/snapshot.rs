//! In-memory clinical data read by the interpreted path

use crate::Quantity;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;

/// Patients and clinical resources for one evaluation run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClinicalDataSnapshot {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub resources: Vec<Resource>,
}

impl ClinicalDataSnapshot {
    pub fn new(patients: Vec<Patient>, resources: Vec<Resource>) -> Self {
        Self {
            patients,
            resources,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// No patients and no resources
    pub fn is_empty(&self) -> bool {
        self.patients.is_empty() && self.resources.is_empty()
    }

    /// Identifiers of every patient in the snapshot (the subject universe)
    pub fn patient_ids(&self) -> BTreeSet<String> {
        self.patients.iter().map(|p| p.id.clone()).collect()
    }

    pub fn patient(&self, id: &str) -> Option<&Patient> {
        self.patients.iter().find(|p| p.id == id)
    }

    /// First patient id, or resource id within one resource type, that
    /// occurs more than once
    pub fn duplicate_identifier(&self) -> Option<DuplicateIdentifier> {
        let mut patients = HashSet::with_capacity(self.patients.len());
        if let Some(patient) = self.patients.iter().find(|p| !patients.insert(p.id.as_str())) {
            return Some(DuplicateIdentifier::Patient(patient.id.clone()));
        }
        let mut resources = HashSet::with_capacity(self.resources.len());
        self.resources
            .iter()
            .find(|r| !resources.insert((r.resource_type.as_str(), r.id.as_str())))
            .map(|r| DuplicateIdentifier::Resource {
                resource_type: r.resource_type.clone(),
                id: r.id.clone(),
            })
    }

    pub fn resources_of<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .iter()
            .filter(move |r| r.resource_type == resource_type)
    }
}

/// An identifier repeated within a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateIdentifier {
    Patient(String),
    Resource { resource_type: String, id: String },
}

impl fmt::Display for DuplicateIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DuplicateIdentifier::Patient(id) => write!(f, "patient {id} appears more than once"),
            DuplicateIdentifier::Resource { resource_type, id } => {
                write!(f, "{resource_type} {id} appears more than once")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: String,
    #[serde(default)]
    pub gender: Option<String>,
    #[serde(default)]
    pub birth_date: Option<NaiveDate>,
}

impl Patient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            gender: None,
            birth_date: None,
        }
    }

    pub fn with_gender(mut self, gender: impl Into<String>) -> Self {
        self.gender = Some(gender.into());
        self
    }

    pub fn with_birth_date(mut self, birth_date: NaiveDate) -> Self {
        self.birth_date = Some(birth_date);
        self
    }

    /// Whole years between the birth date and `at`; `None` without a birth date
    pub fn age_in_years_at(&self, at: NaiveDateTime) -> Option<i64> {
        let birth = self.birth_date?;
        let on = at.date();
        let mut years = i64::from(on.year() - birth.year());
        if (on.month(), on.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        Some(years)
    }
}

/// A clinical resource (observation, condition, encounter, ...) about one subject
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub resource_type: String,
    /// Patient id this resource is about
    pub subject: String,
    #[serde(default)]
    pub codings: Vec<Coding>,
    #[serde(default)]
    pub effective: Option<Effective>,
    #[serde(default)]
    pub value: Option<Quantity>,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            subject: subject.into(),
            codings: Vec::new(),
            effective: None,
            value: None,
        }
    }

    pub fn with_coding(mut self, system: impl Into<String>, code: impl Into<String>) -> Self {
        self.codings.push(Coding::new(system, code));
        self
    }

    pub fn with_instant(mut self, at: NaiveDateTime) -> Self {
        self.effective = Some(Effective::Instant(at));
        self
    }

    pub fn with_period(mut self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        self.effective = Some(Effective::Period { start, end });
        self
    }

    pub fn with_value(mut self, value: Quantity) -> Self {
        self.value = Some(value);
        self
    }

    /// Effective start and end; an instant is both
    pub fn effective_bounds(&self) -> (Option<NaiveDateTime>, Option<NaiveDateTime>) {
        match &self.effective {
            Some(Effective::Instant(at)) => (Some(*at), Some(*at)),
            Some(Effective::Period { start, end }) => (*start, *end),
            None => (None, None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Coding {
    pub system: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<String>,
}

impl Coding {
    pub fn new(system: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            code: code.into(),
            display: None,
        }
    }
}

/// When a resource applies: a single instant or a (possibly open-ended) period
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Effective {
    Instant(NaiveDateTime),
    Period {
        #[serde(default)]
        start: Option<NaiveDateTime>,
        #[serde(default)]
        end: Option<NaiveDateTime>,
    },
}
