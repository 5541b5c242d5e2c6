//! Library validation without evaluation

use crate::parse;
use octofhir_cqm_diagnostics::{CQM0013, CQM0014, CQM0201, Diagnostic};
use serde::Serialize;

/// Errors and warnings found in library text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Parse `source` and report problems instead of failing.
///
/// Warnings cover a missing `library` declaration, a library without
/// defines, duplicate definitions, and defines that use constructs neither
/// execution path supports.
pub fn validate(source: &str) -> ValidationReport {
    let mut report = ValidationReport::default();
    let library = match parse(source) {
        Ok(library) => library,
        Err(err) => {
            report.errors.push(err.to_diagnostic());
            return report;
        }
    };

    if library.identifier.is_none() {
        report.warnings.push(Diagnostic::warning(
            CQM0013,
            "Missing library declaration",
        ));
    }
    if library.defines.is_empty() {
        report.warnings.push(Diagnostic::warning(
            CQM0014,
            "Library declares no defines",
        ));
    }
    report.warnings.extend(library.diagnostics.iter().cloned());
    for define in &library.defines {
        if let Some(construct) = define.expression.find_unsupported() {
            report.warnings.push(
                Diagnostic::warning(
                    CQM0201,
                    format!("Define \"{}\" uses an unsupported construct: {construct}", define.name),
                )
                .with_span(construct.span, source),
            );
        }
    }
    report
}
