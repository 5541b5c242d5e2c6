//! Shared fixtures for engine tests
//!
//! A heart-rate measure over four patients: three women, two of whom have a
//! tachycardic reading inside 2024.

#![allow(dead_code)]

use chrono::NaiveDateTime;
use octofhir_cqm::model::{ClinicalDataSnapshot, Patient, Quantity, Resource, SchemaDescriptor};
use octofhir_cqm::sql::SqliteExecutor;
use octofhir_cqm::terminology::{InMemoryTerminologySource, ValueSetExpansion};
use rust_decimal::Decimal;

pub const LOINC: &str = "http://loinc.org";
pub const SNOMED: &str = "http://snomed.info/sct";
pub const HEART_RATE_VS: &str = "http://example.org/fhir/ValueSet/heart-rate";
pub const INPATIENT_VS: &str = "http://example.org/fhir/ValueSet/inpatient";

pub const HEART_RATE_MEASURE: &str = r#"
library HeartRate version '1.0.0'

using FHIR version '4.0.1'

codesystem "LOINC": 'http://loinc.org'
valueset "Heart Rate": 'http://example.org/fhir/ValueSet/heart-rate'

parameter "Measurement Period" Interval<DateTime>
  default Interval[@2024-01-01T00:00:00, @2025-01-01T00:00:00)

context Patient

define "Initial Population":
  Patient.gender = 'female'

define "Denominator":
  "Initial Population"

define "Numerator":
  "Denominator"
    and exists (
      [Observation: "Heart Rate"] O
        where O.effective during "Measurement Period"
          and O.value > 100 '/min'
    )
"#;

pub fn at(text: &str) -> NaiveDateTime {
    text.parse().unwrap()
}

pub fn heart_rate(id: &str, subject: &str, when: &str, value: i64) -> Resource {
    Resource::new(id, "Observation", subject)
        .with_coding(LOINC, "8867-4")
        .with_instant(at(when))
        .with_value(Quantity::new(Decimal::from(value), "/min"))
}

pub fn heart_rate_snapshot() -> ClinicalDataSnapshot {
    ClinicalDataSnapshot::new(
        vec![
            Patient::new("p1").with_gender("female"),
            Patient::new("p2").with_gender("female"),
            Patient::new("p3").with_gender("female"),
            Patient::new("p4").with_gender("male"),
        ],
        vec![
            heart_rate("o1", "p1", "2024-03-01T08:00:00", 120),
            heart_rate("o2", "p2", "2024-03-01T08:00:00", 80),
            heart_rate("o3", "p2", "2023-06-01T08:00:00", 130),
            heart_rate("o4", "p3", "2024-11-30T23:59:59", 101),
            heart_rate("o5", "p4", "2024-05-05T10:00:00", 140),
        ],
    )
}

pub fn terminology_source() -> InMemoryTerminologySource {
    InMemoryTerminologySource::new()
        .with_expansion(
            ValueSetExpansion::new(HEART_RATE_VS)
                .with_code(LOINC, "8867-4")
                .with_code(LOINC, "40443-4"),
        )
        .with_expansion(ValueSetExpansion::new(INPATIENT_VS).with_code(SNOMED, "183452005"))
}

/// In-memory SQLite database holding `snapshot` in the flattened layout
pub fn sqlite_with(snapshot: &ClinicalDataSnapshot) -> SqliteExecutor {
    let executor = SqliteExecutor::open_in_memory().unwrap();
    executor
        .load_snapshot(snapshot, &SchemaDescriptor::flattened())
        .unwrap();
    executor
}
