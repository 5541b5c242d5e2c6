//! Tests for library-level parsing
//!
//! Covers:
//! - Header declarations (library, using, terminology, parameters, context)
//! - Define ordering, references and result kinds
//! - Duplicate define replacement
//! - Validation warnings

use octofhir_cqm_ast::{AccessModifier, DefineKind, Expression, Literal, SetOperation};
use octofhir_cqm_diagnostics::{CQM0012, CQM0013, CQM0014, CQM0201, Severity};
use octofhir_cqm_parser::{parse, validate};
use pretty_assertions::assert_eq;
use rstest::rstest;

const HEART_RATE: &str = r#"
library HeartRateMonitoring version '1.0.0'

using FHIR version '4.0.1'

codesystem "LOINC": 'http://loinc.org'

valueset "Heart Rate": 'http://example.org/fhir/ValueSet/heart-rate'

code "Heart rate code": '8867-4' from "LOINC" display 'Heart rate'

parameter "Measurement Period" Interval<DateTime>
  default Interval[@2024-01-01T00:00:00, @2025-01-01T00:00:00)

context Patient

define "Initial Population":
  Patient.gender = 'female'

define "Denominator":
  "Initial Population"

// Tachycardic readings during the period
define "Numerator":
  "Denominator"
    and exists (
      [Observation: "Heart Rate"] O
        where O.effective during "Measurement Period"
          and O.value > 100 '/min'
    )
"#;

#[test]
fn test_header_declarations() {
    let library = parse(HEART_RATE).unwrap();

    assert_eq!(library.name(), Some("HeartRateMonitoring"));
    assert_eq!(library.version(), Some("1.0.0"));
    assert_eq!(library.measure_identifier(), "HeartRateMonitoring|1.0.0");
    assert_eq!(library.usings.len(), 1);
    assert_eq!(library.usings[0].model, "FHIR");
    assert_eq!(library.context.as_deref(), Some("Patient"));

    let code = library.code("Heart rate code").unwrap();
    assert_eq!(code.system, "http://loinc.org");
    assert_eq!(code.code, "8867-4");
    assert_eq!(code.display.as_deref(), Some("Heart rate"));

    let valueset = library.valueset("Heart Rate").unwrap();
    assert_eq!(valueset.url, "http://example.org/fhir/ValueSet/heart-rate");
    assert_eq!(valueset.version, None);
}

#[test]
fn test_parameter_default() {
    let library = parse(HEART_RATE).unwrap();
    let parameter = library.parameter("Measurement Period").unwrap();

    assert_eq!(parameter.type_name.as_deref(), Some("Interval<DateTime>"));
    match &parameter.default {
        Some(Literal::Interval(period)) => {
            assert!(period.low_closed);
            assert!(!period.high_closed);
            assert_eq!(period.low.to_string(), "2024-01-01 00:00:00");
        }
        other => panic!("Expected interval default, got: {other:?}"),
    }
}

#[test]
fn test_defines_keep_declaration_order() {
    let library = parse(HEART_RATE).unwrap();
    let names: Vec<_> = library.define_names().collect();
    assert_eq!(names, vec!["Initial Population", "Denominator", "Numerator"]);
}

#[test]
fn test_define_references() {
    let library = parse(HEART_RATE).unwrap();

    assert!(library.define("Initial Population").unwrap().references.is_empty());
    assert_eq!(
        library.define("Denominator").unwrap().references.as_slice(),
        ["Initial Population".to_string()]
    );
    // Parameters are not define references
    assert_eq!(
        library.define("Numerator").unwrap().references.as_slice(),
        ["Denominator".to_string()]
    );
}

#[rstest]
#[case(r#""A" xor "B""#, &["A", "B"])]
#[case(r#"[Encounter] implies "B""#, &["B"])]
#[case(r#"Count("A") > 1"#, &["A"])]
#[case(r#"if "A" then "B" else [Condition]"#, &["A", "B"])]
#[case(r#"[Observation] O where O.value > 100 or O.effective during "Window""#, &["Window"])]
#[case(r#"Count([Encounter], "Measurement Period") > 1"#, &[])]
fn test_unsupported_keeps_references(#[case] body: &str, #[case] expected: &[&str]) {
    let library = parse(&format!(
        "library Refs\nparameter \"Measurement Period\" Interval<DateTime>\ndefine \"Test\": {body}\n"
    ))
    .unwrap();
    let define = library.define("Test").unwrap();
    assert!(define.expression.find_unsupported().is_some());
    assert_eq!(define.references.to_vec(), expected.iter().map(|n| n.to_string()).collect::<Vec<_>>());
}

#[test]
fn test_define_kinds() {
    let library = parse(
        r#"
        library Kinds
        define "Period": Interval[@2024-01-01, @2024-07-01)
        define "Women": Patient.gender = 'female'
        define "Alias": "Women"
        define "Cutoff": 100 '/min'
        define "Period Start": start of "Period"
        "#,
    )
    .unwrap();

    let kind = |name: &str| library.define(name).unwrap().kind;
    assert_eq!(kind("Period"), Some(DefineKind::Scalar));
    assert_eq!(kind("Women"), Some(DefineKind::Population));
    assert_eq!(kind("Alias"), None);
    assert_eq!(kind("Cutoff"), Some(DefineKind::Scalar));
    assert_eq!(kind("Period Start"), Some(DefineKind::Scalar));
    assert_eq!(
        library.define("Period Start").unwrap().references.as_slice(),
        ["Period".to_string()]
    );
}

#[test]
fn test_access_modifiers() {
    let library = parse(
        r#"
        private define "Helper": Patient.gender = 'male'
        public define "Visible": "Helper"
        "#,
    )
    .unwrap();

    assert_eq!(library.define("Helper").unwrap().access, AccessModifier::Private);
    assert_eq!(library.define("Visible").unwrap().access, AccessModifier::Public);
}

#[test]
fn test_duplicate_define_replaces_in_place() {
    let library = parse(
        r#"
        define "A": Patient.gender = 'female'
        define "B": "A"
        define "A": Patient.gender = 'male'
        "#,
    )
    .unwrap();

    let names: Vec<_> = library.define_names().collect();
    assert_eq!(names, vec!["A", "B"]);

    match &library.define("A").unwrap().expression {
        Expression::Query(query) => match &query.predicates[0] {
            octofhir_cqm_ast::Predicate::Gender(g) => assert_eq!(g.gender, "male"),
            other => panic!("Expected gender predicate, got: {other:?}"),
        },
        other => panic!("Expected Query, got: {other:?}"),
    }

    assert_eq!(library.diagnostics.len(), 1);
    let warning = &library.diagnostics[0];
    assert_eq!(warning.severity, Severity::Warning);
    assert_eq!(warning.code, CQM0012);
    assert_eq!(warning.location.as_ref().unwrap().line, 4);
}

#[test]
fn test_comments_are_ignored() {
    let library = parse(
        r#"
        /* block
           comment */
        define "A": // trailing
          Patient.gender = 'female'
        "#,
    )
    .unwrap();
    assert!(library.define("A").is_some());
}

#[test]
fn test_required_valuesets_in_declaration_order() {
    let library = parse(
        r#"
        valueset "Heart Rate": 'http://example.org/vs/hr'
        valueset "Unused": 'http://example.org/vs/unused'
        valueset "Encounters": 'http://example.org/vs/enc' version '2024'
        define "A": exists [Observation: "Heart Rate"]
        define "B": exists ([Encounter: "Encounters"] E with [Observation: "Heart Rate"] O such that O.effective during E.period)
        "#,
    )
    .unwrap();

    let urls: Vec<_> = library
        .required_valuesets()
        .into_iter()
        .map(|vs| (vs.url, vs.version))
        .collect();
    assert_eq!(
        urls,
        vec![
            ("http://example.org/vs/hr".to_string(), None),
            ("http://example.org/vs/unused".to_string(), None),
            ("http://example.org/vs/enc".to_string(), Some("2024".to_string())),
        ]
    );
}

#[test]
fn test_not_and_exists_wrap_operands() {
    let library = parse(r#"define "Men": not Patient.gender = 'female'"#).unwrap();
    match &library.define("Men").unwrap().expression {
        Expression::SetOperation(SetOperation::Not(operand)) => {
            assert!(matches!(operand.as_ref(), Expression::Query(_)));
        }
        other => panic!("Expected Not, got: {other:?}"),
    }
}

// === Validation ===

#[test]
fn test_validate_clean_library() {
    let report = validate(HEART_RATE);
    assert!(report.is_valid());
    assert!(report.warnings.is_empty(), "{:?}", report.warnings);
}

#[test]
fn test_validate_missing_library_and_defines() {
    let report = validate("using FHIR version '4.0.1'");
    assert!(report.is_valid());
    let codes: Vec<_> = report.warnings.iter().map(|w| w.code).collect();
    assert_eq!(codes, vec![CQM0013, CQM0014]);
}

#[test]
fn test_validate_reports_unsupported_construct() {
    let report = validate(
        r#"
        library Unsupported
        define "A": Patient.gender = 'female' xor Patient.gender = 'male'
        "#,
    );
    assert!(report.is_valid());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].code, CQM0201);
    assert!(report.warnings[0].message.contains("xor"));
}

#[test]
fn test_validate_reports_parse_error() {
    let report = validate("define \"A\":");
    assert!(!report.is_valid());
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].is_error());
}
