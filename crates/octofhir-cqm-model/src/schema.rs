//! Relational layout of the clinical data ("flattened FHIR" tables)

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Resource types mapped by [`SchemaDescriptor::flattened`]
const FLATTENED_RESOURCE_TYPES: &[&str] = &[
    "Observation",
    "Condition",
    "Encounter",
    "Procedure",
    "MedicationRequest",
    "MedicationAdministration",
    "Immunization",
    "DiagnosticReport",
    "ServiceRequest",
    "AllergyIntolerance",
];

/// Table and column names the SQL compiler targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    #[serde(default)]
    pub patient: PatientTable,
    /// Resource type to table mapping
    #[serde(default)]
    pub resources: IndexMap<String, ResourceTable>,
}

impl SchemaDescriptor {
    /// Default convention: a `patient` table plus one snake_case table per
    /// common resource type, with one row per resource coding.
    pub fn flattened() -> Self {
        let resources = FLATTENED_RESOURCE_TYPES
            .iter()
            .map(|ty| (ty.to_string(), ResourceTable::named(snake_case(ty))))
            .collect();
        Self {
            patient: PatientTable::default(),
            resources,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn with_resource(mut self, resource_type: impl Into<String>, table: ResourceTable) -> Self {
        self.resources.insert(resource_type.into(), table);
        self
    }

    pub fn resource_table(&self, resource_type: &str) -> Option<&ResourceTable> {
        self.resources.get(resource_type)
    }

    /// Check that every mapped resource type has a table of its own.
    ///
    /// Resource tables carry no resource type column, so two types on one
    /// table (or a type on the patient table) would be read as each other.
    /// Table names compare case-insensitively.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let mut owners: Vec<(&str, &str)> = Vec::with_capacity(self.resources.len());
        for (resource_type, table) in &self.resources {
            if table.table.eq_ignore_ascii_case(&self.patient.table) {
                return Err(SchemaError::PatientTable {
                    resource_type: resource_type.clone(),
                    table: table.table.clone(),
                });
            }
            if let Some((owner, _)) = owners
                .iter()
                .find(|(_, name)| name.eq_ignore_ascii_case(&table.table))
            {
                return Err(SchemaError::SharedTable {
                    table: table.table.clone(),
                    first: owner.to_string(),
                    second: resource_type.clone(),
                });
            }
            owners.push((resource_type.as_str(), table.table.as_str()));
        }
        Ok(())
    }
}

/// A schema descriptor the relational backends cannot query unambiguously
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("Resource types {first} and {second} are both mapped to table {table}")]
    SharedTable {
        table: String,
        first: String,
        second: String,
    },

    #[error("Resource type {resource_type} is mapped to the patient table {table}")]
    PatientTable { resource_type: String, table: String },
}

impl Default for SchemaDescriptor {
    fn default() -> Self {
        Self::flattened()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientTable {
    pub table: String,
    pub id: String,
    pub gender: String,
    pub birth_date: String,
}

impl Default for PatientTable {
    fn default() -> Self {
        Self {
            table: "patient".into(),
            id: "id".into(),
            gender: "gender".into(),
            birth_date: "birth_date".into(),
        }
    }
}

/// Columns of one resource table. Only `table` is required when deserialising.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTable {
    pub table: String,
    #[serde(default = "column::id")]
    pub id: String,
    #[serde(default = "column::subject")]
    pub subject: String,
    #[serde(default = "column::code_system")]
    pub code_system: String,
    #[serde(default = "column::code")]
    pub code: String,
    #[serde(default = "column::effective_start")]
    pub effective_start: String,
    #[serde(default = "column::effective_end")]
    pub effective_end: String,
    #[serde(default = "column::value")]
    pub value: String,
    #[serde(default = "column::unit")]
    pub unit: String,
}

impl ResourceTable {
    /// Table with conventional column names
    pub fn named(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            id: column::id(),
            subject: column::subject(),
            code_system: column::code_system(),
            code: column::code(),
            effective_start: column::effective_start(),
            effective_end: column::effective_end(),
            value: column::value(),
            unit: column::unit(),
        }
    }
}

mod column {
    pub(super) fn id() -> String {
        "id".into()
    }

    pub(super) fn subject() -> String {
        "subject_id".into()
    }

    pub(super) fn code_system() -> String {
        "code_system".into()
    }

    pub(super) fn code() -> String {
        "code".into()
    }

    pub(super) fn effective_start() -> String {
        "effective_start".into()
    }

    pub(super) fn effective_end() -> String {
        "effective_end".into()
    }

    pub(super) fn value() -> String {
        "value".into()
    }

    pub(super) fn unit() -> String {
        "unit".into()
    }
}

fn snake_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}
