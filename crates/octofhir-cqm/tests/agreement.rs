//! Interpreted evaluation and compiled SQL must count the same subjects
//!
//! Snapshots are generated with missing genders, birth dates, timestamps,
//! values and units, with resources pointing at subjects outside the patient
//! list, so NULL handling and universe-based negation are exercised on both
//! paths. Observations carry zero or more codings from two systems, and
//! values include fractions and decimals a digit past double precision on
//! either side of the comparison thresholds.

#![cfg(feature = "sqlite")]

mod common;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use common::{HEART_RATE_VS, LOINC, SNOMED, sqlite_with};
use octofhir_cqm::eval::EvalError;
use octofhir_cqm::model::{
    ClinicalDataSnapshot, DuplicateIdentifier, MEASUREMENT_PERIOD, Parameters, Patient, Quantity, Resource,
    ResourceTable, SchemaDescriptor, SchemaError,
};
use octofhir_cqm::sql::{CompileError, SqlExecutionError, SqliteExecutor};
use octofhir_cqm::terminology::{ResolvedTerminology, ValueSetExpansion};
use octofhir_cqm::{eval, graph, parse, sql};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

const LIBRARY: &str = r#"
library Agreement version '1'

codesystem "LOINC": 'http://loinc.org'
valueset "Heart Rate": 'http://example.org/fhir/ValueSet/heart-rate'

parameter "Measurement Period" Interval<DateTime>
  default Interval[@2024-01-01T00:00:00, @2025-01-01T00:00:00)

context Patient

define "Women": Patient.gender = 'female'

define "Not Male": Patient.gender != 'male'

define "Adults": AgeInYearsAt(start of "Measurement Period") >= 18

define "Tachycardia":
  [Observation: "Heart Rate"] O
    where O.effective during "Measurement Period"
      and O.value > 100 '/min'

define "Any High Reading": [Observation] O where O.value >= 90

define "Exactly Hundred": [Observation] O where O.value = 100 '/min'

define "Monitored Stays":
  [Encounter] E
    with [Observation: "Heart Rate"] O such that O.effective during E.period

define "Unmonitored Stays":
  [Encounter] E
    without [Observation: "Heart Rate"] O such that O.effective during E.period

define "Stays In Period": [Encounter] E where E.period during "Measurement Period"

define "Women With Tachycardia": "Women" and exists "Tachycardia"

define "Adults Or Readings": "Adults" or "Any High Reading"

define "Women Without Stays": "Women" except "Stays In Period"

define "Never Monitored": not "Monitored Stays"
"#;

#[derive(Debug, Clone)]
struct GeneratedPatient {
    gender: Option<&'static str>,
    birth: Option<(i32, u32, u32)>,
}

#[derive(Debug, Clone)]
struct GeneratedObservation {
    subject: usize,
    codings: Vec<(&'static str, &'static str)>,
    offset_hours: Option<i64>,
    value: Option<(Decimal, Option<&'static str>)>,
}

#[derive(Debug, Clone)]
struct GeneratedEncounter {
    subject: usize,
    start_hours: Option<i64>,
    length_hours: Option<i64>,
}

fn arb_patient() -> impl Strategy<Value = GeneratedPatient> {
    (
        prop::option::of(prop_oneof![Just("female"), Just("male"), Just("other")]),
        prop::option::of((1990i32..2010, 1u32..=12, 1u32..=28)),
    )
        .prop_map(|(gender, birth)| GeneratedPatient { gender, birth })
}

/// Whole numbers, hundredths, and values within a few units of the 20th
/// decimal place around 90 and 100
fn arb_value() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        (60i64..140).prop_map(Decimal::from),
        (6_000i64..14_000).prop_map(|hundredths| Decimal::new(hundredths, 2)),
        (prop_oneof![Just(90i64), Just(100i64)], -3i64..=3, 12u32..=20)
            .prop_map(|(threshold, step, scale)| Decimal::from(threshold) + Decimal::new(step, scale)),
    ]
}

fn arb_coding() -> impl Strategy<Value = (&'static str, &'static str)> {
    prop::sample::select(vec![
        (LOINC, "8867-4"),
        (LOINC, "40443-4"),
        (LOINC, "2708-6"),
        // Heart-rate code under the wrong system
        (SNOMED, "8867-4"),
    ])
}

fn arb_observation() -> impl Strategy<Value = GeneratedObservation> {
    (
        0usize..8,
        prop::collection::vec(arb_coding(), 0..3),
        prop::option::of(0i64..3 * 365 * 24),
        prop::option::of((arb_value(), prop::option::of(prop_oneof![Just("/min"), Just("/s")]))),
    )
        .prop_map(|(subject, codings, offset_hours, value)| GeneratedObservation {
            subject,
            codings,
            offset_hours,
            value,
        })
}

fn arb_encounter() -> impl Strategy<Value = GeneratedEncounter> {
    (
        0usize..8,
        prop::option::of(0i64..3 * 365 * 24),
        prop::option::of(0i64..24 * 20),
    )
        .prop_map(|(subject, start_hours, length_hours)| GeneratedEncounter {
            subject,
            start_hours,
            length_hours,
        })
}

fn origin() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2023, 1, 1)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap()
}

fn snapshot(
    patients: &[GeneratedPatient],
    observations: &[GeneratedObservation],
    encounters: &[GeneratedEncounter],
) -> ClinicalDataSnapshot {
    let patients = patients
        .iter()
        .enumerate()
        .map(|(i, generated)| {
            let mut patient = Patient::new(format!("p{i}"));
            if let Some(gender) = generated.gender {
                patient = patient.with_gender(gender);
            }
            if let Some((year, month, day)) = generated.birth {
                patient = patient.with_birth_date(NaiveDate::from_ymd_opt(year, month, day).unwrap());
            }
            patient
        })
        .collect();

    let mut resources = Vec::new();
    for (i, generated) in observations.iter().enumerate() {
        let mut observation = Resource::new(format!("o{i}"), "Observation", format!("p{}", generated.subject));
        for (system, code) in &generated.codings {
            observation = observation.with_coding(*system, *code);
        }
        if let Some(hours) = generated.offset_hours {
            observation = observation.with_instant(origin() + Duration::hours(hours));
        }
        if let Some((value, unit)) = generated.value {
            observation = observation.with_value(match unit {
                Some(unit) => Quantity::new(value, unit),
                None => Quantity::unitless(value),
            });
        }
        resources.push(observation);
    }
    for (i, generated) in encounters.iter().enumerate() {
        let start = generated.start_hours.map(|hours| origin() + Duration::hours(hours));
        let end = start
            .zip(generated.length_hours)
            .map(|(start, hours)| start + Duration::hours(hours));
        resources.push(
            Resource::new(format!("e{i}"), "Encounter", format!("p{}", generated.subject)).with_period(start, end),
        );
    }

    ClinicalDataSnapshot::new(patients, resources)
}

fn interpreted_counts(snapshot: &ClinicalDataSnapshot) -> BTreeMap<String, u64> {
    let library = parse(LIBRARY).unwrap();
    let order = graph::build(&library).unwrap();
    let result = eval::evaluate_resolved(&library, &order, snapshot, &terminology(), &parameters()).unwrap();
    result
        .counts()
        .map(|(name, count)| (name.to_string(), count as u64))
        .collect()
}

fn sql_counts(snapshot: &ClinicalDataSnapshot) -> BTreeMap<String, u64> {
    let library = parse(LIBRARY).unwrap();
    let order = graph::build(&library).unwrap();
    let statement = sql::compile_resolved(
        &library,
        &order,
        &SchemaDescriptor::flattened(),
        &terminology(),
        &parameters(),
    )
    .unwrap();
    sqlite_with(snapshot)
        .execute_blocking(&statement)
        .unwrap()
        .into_iter()
        .map(|count| (count.population, count.subject_count))
        .collect()
}

fn terminology() -> ResolvedTerminology {
    ResolvedTerminology::new().with_expansion(
        ValueSetExpansion::new(HEART_RATE_VS)
            .with_code(LOINC, "8867-4")
            .with_code(LOINC, "40443-4"),
    )
}

fn parameters() -> Parameters {
    let library = parse(LIBRARY).unwrap();
    let mut parameters = Parameters::new();
    if let Some(default) = library.parameter(MEASUREMENT_PERIOD).and_then(|p| p.default.clone()) {
        parameters.set(MEASUREMENT_PERIOD, default);
    }
    parameters
}

#[test]
fn test_both_paths_report_every_population() {
    let snapshot = snapshot(
        &[GeneratedPatient {
            gender: Some("female"),
            birth: Some((2000, 6, 15)),
        }],
        &[],
        &[],
    );
    let interpreted = interpreted_counts(&snapshot);
    assert_eq!(interpreted.len(), 13);
    assert_eq!(sql_counts(&snapshot), interpreted);
}

#[test]
fn test_values_past_double_precision_agree() {
    let reading = |id: &str, subject: &str, value: &str| {
        Resource::new(id, "Observation", subject)
            .with_coding(LOINC, "8867-4")
            .with_instant(origin() + Duration::days(400))
            .with_value(Quantity::new(value.parse().unwrap(), "/min"))
    };
    let snapshot = ClinicalDataSnapshot::new(
        vec![Patient::new("p0"), Patient::new("p1"), Patient::new("p2")],
        vec![
            reading("o0", "p0", "100.00000000000000001"),
            reading("o1", "p1", "100.000000000001"),
            reading("o2", "p2", "89.99999999999999999"),
        ],
    );
    let interpreted = interpreted_counts(&snapshot);
    assert_eq!(interpreted["Tachycardia"], 1);
    assert_eq!(interpreted["Exactly Hundred"], 1);
    assert_eq!(interpreted["Any High Reading"], 3);
    assert_eq!(sql_counts(&snapshot), interpreted);
}

#[test]
fn test_duplicate_resource_id_rejected_on_both_paths() {
    let snapshot = ClinicalDataSnapshot::new(
        vec![Patient::new("p0"), Patient::new("p1")],
        vec![
            Resource::new("o0", "Observation", "p0").with_coding(LOINC, "2708-6"),
            Resource::new("o0", "Observation", "p1").with_coding(LOINC, "8867-4"),
        ],
    );
    let library = parse(LIBRARY).unwrap();
    let order = graph::build(&library).unwrap();
    let duplicate = DuplicateIdentifier::Resource {
        resource_type: "Observation".into(),
        id: "o0".into(),
    };

    assert_eq!(
        eval::evaluate_resolved(&library, &order, &snapshot, &terminology(), &parameters()),
        Err(EvalError::DuplicateIdentifier(duplicate.clone()))
    );
    let executor = SqliteExecutor::open_in_memory().unwrap();
    assert_eq!(
        executor.load_snapshot(&snapshot, &SchemaDescriptor::flattened()),
        Err(SqlExecutionError::InvalidData(duplicate.to_string()))
    );
}

#[test]
fn test_shared_table_rejected_by_compiler_and_loader() {
    let library = parse(LIBRARY).unwrap();
    let order = graph::build(&library).unwrap();
    let schema = SchemaDescriptor::flattened().with_resource("Condition", ResourceTable::named("observation"));
    let shared = SchemaError::SharedTable {
        table: "observation".into(),
        first: "Observation".into(),
        second: "Condition".into(),
    };

    assert_eq!(
        sql::compile_resolved(&library, &order, &schema, &terminology(), &parameters()),
        Err(CompileError::InvalidSchema(shared.clone()))
    );
    let snapshot = snapshot(
        &[GeneratedPatient {
            gender: None,
            birth: None,
        }],
        &[],
        &[],
    );
    assert_eq!(
        SqliteExecutor::open_in_memory().unwrap().load_snapshot(&snapshot, &schema),
        Err(SqlExecutionError::InvalidSchema(shared))
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_paths_agree(
        patients in prop::collection::vec(arb_patient(), 1..8),
        observations in prop::collection::vec(arb_observation(), 0..16),
        encounters in prop::collection::vec(arb_encounter(), 0..8),
    ) {
        let snapshot = snapshot(&patients, &observations, &encounters);
        prop_assert_eq!(sql_counts(&snapshot), interpreted_counts(&snapshot));
    }
}
