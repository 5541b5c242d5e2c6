//! Tests for SQL lowering
//!
//! Covers:
//! - Statement layout (one CTE per population, scalar folding)
//! - Coded, temporal, value, gender and age conditions
//! - Set operations and relationships
//! - Dialect quoting
//! - Compile errors

use octofhir_cqm_ast::Library;
use octofhir_cqm_graph::EvaluationOrder;
use octofhir_cqm_model::{Interval, Parameters, ResourceTable, SchemaDescriptor, SchemaError};
use octofhir_cqm_sql::{CompileError, SqlCompiler, SqlDialect, SqlStatement, compile_resolved};
use octofhir_cqm_terminology::{ResolvedTerminology, TerminologyError, ValueSetExpansion};
use pretty_assertions::assert_eq;
use rstest::rstest;

const HEADER: &str = r#"
library SqlTests version '2'
codesystem "LOINC": 'http://loinc.org'
valueset "Heart Rate": 'http://example.org/vs/hr'
valueset "Empty": 'http://example.org/vs/empty'
code "Heart rate code": '8867-4' from "LOINC"
parameter "Measurement Period" Interval<DateTime>
  default Interval[@2024-01-01T00:00:00, @2025-01-01T00:00:00)
context Patient
"#;

fn terminology() -> ResolvedTerminology {
    ResolvedTerminology::new()
        .with_expansion(
            ValueSetExpansion::new("http://example.org/vs/hr")
                .with_code("http://loinc.org", "8867-4")
                .with_code("http://loinc.org", "40443-4")
                .with_code("http://snomed.info/sct", "364075005"),
        )
        .with_expansion(ValueSetExpansion::new("http://example.org/vs/empty"))
}

fn compile_library(defines: &str) -> (Library, EvaluationOrder) {
    let library = octofhir_cqm_parser::parse(&format!("{HEADER}{defines}")).unwrap();
    let order = octofhir_cqm_graph::build(&library).unwrap();
    (library, order)
}

fn sql(defines: &str) -> SqlStatement {
    let (library, order) = compile_library(defines);
    compile_resolved(
        &library,
        &order,
        &SchemaDescriptor::flattened(),
        &terminology(),
        &Parameters::new(),
    )
    .unwrap()
}

fn compile_err(defines: &str) -> CompileError {
    let (library, order) = compile_library(defines);
    compile_resolved(
        &library,
        &order,
        &SchemaDescriptor::flattened(),
        &terminology(),
        &Parameters::new(),
    )
    .unwrap_err()
}

// === Statement layout ===

#[test]
fn test_statement_layout() {
    let statement = sql(r#"
define "Women": Patient.gender = 'female'
define "Stays": [Encounter] E where E.period during "Measurement Period"
"#);
    insta::assert_snapshot!(statement.sql, @r#"
    WITH "Women" AS (
      SELECT DISTINCT _t0."id" AS subject_id FROM "patient" AS _t0 WHERE _t0."gender" = 'female'
    ),
    "Stays" AS (
      SELECT DISTINCT _t1."subject_id" AS subject_id FROM "encounter" AS _t1 WHERE _t1."effective_start" >= '2024-01-01T00:00:00' AND _t1."effective_end" < '2025-01-01T00:00:00'
    )
    SELECT 'Women' AS population, COUNT(DISTINCT subject_id) AS subject_count FROM "Women"
    UNION ALL
    SELECT 'Stays' AS population, COUNT(DISTINCT subject_id) AS subject_count FROM "Stays"
    "#);
    assert_eq!(statement.populations, vec!["Women", "Stays"]);
    assert_eq!(statement.dialect, SqlDialect::Ansi);
}

#[test]
fn test_scalar_defines_are_folded() {
    let statement = sql(r#"
define "Window": Interval[@2024-03-01T00:00:00, @2024-04-01T00:00:00]
define "Spring Stays": [Encounter] E where E.period during "Window"
"#);
    assert_eq!(statement.populations, vec!["Spring Stays"]);
    assert!(!statement.sql.contains("\"Window\""));
    assert!(statement.sql.contains(
        r#"_t0."effective_start" >= '2024-03-01T00:00:00' AND _t0."effective_end" <= '2024-04-01T00:00:00'"#
    ));
}

#[test]
fn test_only_scalars_yields_no_rows() {
    let statement = sql(r#"define "Period End": end of "Measurement Period""#);
    assert!(statement.is_empty());
    assert_eq!(
        statement.sql,
        "SELECT NULL AS population, 0 AS subject_count WHERE 1 = 0"
    );
}

#[test]
fn test_caller_period_is_inlined() {
    let (library, order) = compile_library(
        r#"define "Readings": [Observation] O where O.effective during "Measurement Period""#,
    );
    let period = Interval::closed(
        "2023-01-01T00:00:00".parse().unwrap(),
        "2023-12-31T23:59:59".parse().unwrap(),
    );
    let statement = compile_resolved(
        &library,
        &order,
        &SchemaDescriptor::flattened(),
        &terminology(),
        &Parameters::with_measurement_period(period),
    )
    .unwrap();
    assert!(statement.sql.contains(
        r#"_t0."effective_start" >= '2023-01-01T00:00:00' AND _t0."effective_end" <= '2023-12-31T23:59:59'"#
    ));
}

// === Conditions ===

#[test]
fn test_value_set_codes_grouped_by_system() {
    let statement = sql(r#"define "HR": [Observation: "Heart Rate"]"#);
    assert!(statement.sql.contains(
        r#"EXISTS (SELECT 1 FROM "observation" AS _c1 WHERE _c1."id" = _t0."id" AND _c1."subject_id" = _t0."subject_id" AND ((_c1."code_system" = 'http://loinc.org' AND _c1."code" IN ('40443-4', '8867-4')) OR (_c1."code_system" = 'http://snomed.info/sct' AND _c1."code" IN ('364075005'))))"#
    ));
}

#[test]
fn test_empty_expansion_matches_nothing() {
    let statement = sql(r#"define "None": [Observation: "Empty"]"#);
    assert!(statement.sql.contains("AND (1 = 0))"));
}

#[test]
fn test_single_code_filter() {
    let statement = sql(r#"define "HR": [Observation: code ~ "Heart rate code"]"#);
    assert!(statement
        .sql
        .contains(r#"(_c1."code_system" = 'http://loinc.org' AND _c1."code" = '8867-4')"#));
}

#[rstest]
#[case("O.value > 100 '/min'", r#"_t0."value" > 100 AND _t0."unit" = '/min'"#)]
#[case("O.value != 98.6", r#"_t0."value" <> 98.6"#)]
#[case("O.value <= 40 '/min'", r#"_t0."value" <= 40 AND _t0."unit" = '/min'"#)]
#[case("O.value >= 100.00000000000000001 '/min'", r#"_t0."value" >= 100 AND _t0."unit" = '/min'"#)]
#[case("O.value < 72.50", r#"_t0."value" < 72.5"#)]
fn test_value_condition(#[case] condition: &str, #[case] expected: &str) {
    let statement = sql(&format!("define \"V\": [Observation] O where {condition}"));
    assert!(
        statement.sql.contains(expected),
        "Expected `{expected}` in:\n{}",
        statement.sql
    );
}

#[test]
fn test_gender_inequality() {
    let statement = sql(r#"define "Not Male": Patient.gender != 'male'"#);
    assert!(statement.sql.contains(r#"_t0."gender" <> 'male'"#));
}

#[test]
fn test_age_at_period_start() {
    let statement = sql(r#"define "Adults": AgeInYearsAt(start of "Measurement Period") >= 18"#);
    assert!(statement.sql.contains(
        r#"(2024 - CAST(substr(_t0."birth_date", 1, 4) AS INTEGER) - CASE WHEN substr(_t0."birth_date", 6, 5) > '01-01' THEN 1 ELSE 0 END) >= 18"#
    ));
}

// === Set operations and relationships ===

#[test]
fn test_define_reference_and_set_operations() {
    let statement = sql(r#"
define "Women": Patient.gender = 'female'
define "Seen": [Encounter]
define "Women Seen": "Women" intersect "Seen"
define "Unseen": not "Seen"
define "Known Seen": exists "Seen"
"#);
    let sql = &statement.sql;
    assert!(sql.contains(
        r#"SELECT s2.subject_id FROM (SELECT subject_id FROM "Women") AS s2 INTERSECT SELECT s3.subject_id FROM (SELECT subject_id FROM "Seen") AS s3"#
    ));
    assert!(sql.contains(
        r#"SELECT "id" AS subject_id FROM "patient" EXCEPT SELECT s4.subject_id FROM (SELECT subject_id FROM "Seen") AS s4"#
    ));
    assert!(sql.contains(
        r#"SELECT s5.subject_id FROM (SELECT subject_id FROM "Seen") AS s5 WHERE s5.subject_id IN (SELECT "id" FROM "patient")"#
    ));
}

#[test]
fn test_correlated_with() {
    let statement = sql(r#"
define "Monitored Stays":
  [Encounter] E
    with [Observation: "Heart Rate"] O such that O.effective during E.period
"#);
    assert!(statement.sql.contains(
        r#"EXISTS (SELECT 1 FROM "observation" AS _t1 WHERE _t1."subject_id" = _t0."subject_id" AND EXISTS (SELECT 1 FROM "observation" AS _c2"#
    ));
    assert!(statement.sql.contains(
        r#"_t1."effective_start" >= _t0."effective_start" AND _t1."effective_end" <= _t0."effective_end")"#
    ));
}

#[test]
fn test_without_on_patient_query() {
    let statement = sql(r#"
define "Never Seen":
  [Patient] P without [Encounter] E such that E.period during "Measurement Period"
"#);
    assert!(statement
        .sql
        .contains(r#"NOT EXISTS (SELECT 1 FROM "encounter" AS _t1 WHERE _t1."subject_id" = _t0."id" AND "#));
}

// === Dialects ===

#[test]
fn test_spark_quoting() {
    let (library, order) = compile_library(r#"define "Women": Patient.gender = 'female'"#);
    let schema = SchemaDescriptor::flattened();
    let statement = SqlCompiler::new(&schema)
        .with_dialect(SqlDialect::Spark)
        .compile_resolved(&library, &order, &terminology(), &Parameters::new())
        .unwrap();
    insta::assert_snapshot!(statement.sql, @r#"
    WITH `Women` AS (
      SELECT DISTINCT _t0.`id` AS subject_id FROM `patient` AS _t0 WHERE _t0.`gender` = 'female'
    )
    SELECT 'Women' AS population, COUNT(DISTINCT subject_id) AS subject_count FROM `Women`
    "#);
}

#[test]
fn test_custom_table_names() {
    let (library, order) = compile_library(r#"define "Labs": [Observation]"#);
    let mut table = ResourceTable::named("obs_flat");
    table.subject = "patient_ref".into();
    let schema = SchemaDescriptor::flattened().with_resource("Observation", table);
    let statement = compile_resolved(&library, &order, &schema, &terminology(), &Parameters::new()).unwrap();
    assert!(statement
        .sql
        .contains(r#"SELECT DISTINCT _t0."patient_ref" AS subject_id FROM "obs_flat" AS _t0"#));
}

// === Errors ===

#[test]
fn test_unknown_resource_type() {
    assert_eq!(
        compile_err(r#"define "Claims": [Claim]"#),
        CompileError::UnknownResourceType {
            define: "Claims".into(),
            resource_type: "Claim".into()
        }
    );
}

#[test]
fn test_shared_resource_table_rejected() {
    let (library, order) = compile_library(r#"define "Procedures": [Procedure]"#);
    let schema = SchemaDescriptor::flattened().with_resource("Procedure", ResourceTable::named("observation"));
    let err = compile_resolved(&library, &order, &schema, &terminology(), &Parameters::new()).unwrap_err();
    assert_eq!(
        err,
        CompileError::InvalidSchema(SchemaError::SharedTable {
            table: "observation".into(),
            first: "Observation".into(),
            second: "Procedure".into(),
        })
    );
    assert_eq!(err.code().to_string(), "CQM0403");
}

#[test]
fn test_unsupported_construct() {
    match compile_err(
        r#"
define "A": [Encounter]
define "B": [Condition]
define "Either": "A" xor "B"
"#,
    ) {
        CompileError::UnsupportedConstruct { define, .. } => assert_eq!(define, "Either"),
        other => panic!("Expected UnsupportedConstruct, got: {other:?}"),
    }
}

#[test]
fn test_scalar_used_as_population() {
    let err = compile_err(
        r#"
define "Window": Interval[@2024-03-01T00:00:00, @2024-04-01T00:00:00]
define "Bad": exists "Window"
"#,
    );
    assert_eq!(
        err,
        CompileError::unsupported("Bad", "Interval used where population is expected")
    );
}

#[test]
fn test_parameter_without_value() {
    let err = compile_err(
        r#"
parameter "Cutoff" Quantity
define "High": [Observation] O where O.value > "Cutoff"
"#,
    );
    assert_eq!(
        err,
        CompileError::UndefinedParameter {
            name: "Cutoff".into()
        }
    );
}

#[test]
fn test_unresolved_value_set() {
    let (library, order) = compile_library(r#"define "HR": [Observation: "Heart Rate"]"#);
    let err = compile_resolved(
        &library,
        &order,
        &SchemaDescriptor::flattened(),
        &ResolvedTerminology::new(),
        &Parameters::new(),
    )
    .unwrap_err();
    assert_eq!(
        err,
        CompileError::Terminology(TerminologyError::NotResolved {
            url: "http://example.org/vs/hr".into()
        })
    );
}
