//! Validate command implementation

use super::{output, read_file};
use anyhow::{Result, bail};
use colored::Colorize;
use octofhir_cqm_parser::ValidationReport;
use std::path::{Path, PathBuf};

/// Configuration for validate command
pub struct ValidateConfig {
    pub files: Vec<PathBuf>,
    pub strict: bool,
    pub verbose: bool,
}

/// Validate measure library files
pub fn validate(config: ValidateConfig) -> Result<()> {
    if config.files.is_empty() {
        bail!("No files specified for validation");
    }

    let mut total_errors = 0;
    let mut total_warnings = 0;
    for file in &config.files {
        if config.verbose {
            eprintln!("Validating: {}", file.display());
        }
        let source = read_file(file, "library file")?;
        let report = octofhir_cqm_parser::validate(&source);
        print_report(file, &report);

        total_errors += report.errors.len();
        total_warnings += report.warnings.len();
    }

    println!();
    if total_errors == 0 && total_warnings == 0 {
        println!(
            "{}",
            output::format_success(&format!(
                "All {} file(s) validated successfully",
                config.files.len()
            ))
        );
        return Ok(());
    }

    let mut summary = Vec::new();
    if total_errors > 0 {
        summary.push(format!("{total_errors} error(s)").red().to_string());
    }
    if total_warnings > 0 {
        summary.push(format!("{total_warnings} warning(s)").yellow().to_string());
    }
    eprintln!("{} {}", "Found".bold(), summary.join(", "));

    if total_errors > 0 {
        bail!("Validation failed");
    }
    if config.strict {
        bail!("Validation failed: strict mode treats warnings as errors");
    }
    Ok(())
}

fn print_report(file: &Path, report: &ValidationReport) {
    for diagnostic in report.errors.iter().chain(&report.warnings) {
        eprintln!("{}", output::format_diagnostic(file, diagnostic));
    }
}
