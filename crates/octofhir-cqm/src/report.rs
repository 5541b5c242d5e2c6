//! FHIR `MeasureReport` construction
//!
//! Both execution paths end here: the interpreted path hands over a
//! [`PopulationResult`], the SQL path its [`PopulationCount`] rows. Only the
//! four standard population defines are reported; any other define is an
//! intermediate and is left out.

use chrono::{Duration, NaiveDateTime, SubsecRound};
use octofhir_cqm_eval::PopulationResult;
use octofhir_cqm_model::{INSTANT_FORMAT, Interval};
use octofhir_cqm_sql::PopulationCount;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code system of the population codes
pub const POPULATION_SYSTEM: &str = "http://terminology.hl7.org/CodeSystem/measure-population";

/// A standard measure population
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PopulationCode {
    InitialPopulation,
    Denominator,
    DenominatorExclusion,
    Numerator,
}

impl PopulationCode {
    pub const ALL: [PopulationCode; 4] = [
        Self::InitialPopulation,
        Self::Denominator,
        Self::DenominatorExclusion,
        Self::Numerator,
    ];

    /// Population computed by the define named `name`. Matching is exact and
    /// case-sensitive.
    pub fn from_define(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|code| code.define_name() == name)
    }

    pub const fn define_name(&self) -> &'static str {
        match self {
            Self::InitialPopulation => "Initial Population",
            Self::Denominator => "Denominator",
            Self::DenominatorExclusion => "Denominator Exclusion",
            Self::Numerator => "Numerator",
        }
    }

    pub const fn code(&self) -> &'static str {
        match self {
            Self::InitialPopulation => "initial-population",
            Self::Denominator => "denominator",
            Self::DenominatorExclusion => "denominator-exclusion",
            Self::Numerator => "numerator",
        }
    }
}

impl fmt::Display for PopulationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportType {
    Summary,
}

/// A summary `MeasureReport` resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "resourceType", rename = "MeasureReport")]
pub struct MeasureReport {
    pub status: ReportStatus,
    #[serde(rename = "type")]
    pub report_type: ReportType,
    /// `Name|version` of the measure library
    pub measure: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period: Option<ReportPeriod>,
    #[serde(default)]
    pub group: Vec<ReportGroup>,
}

/// Inclusive start and end, at second precision
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    pub start: String,
    pub end: String,
}

/// An open bound is reported as the nearest whole second inside the interval,
/// so `[2024-01-01, 2025-01-01)` ends at `2024-12-31T23:59:59`.
impl From<&Interval> for ReportPeriod {
    fn from(period: &Interval) -> Self {
        let start = if period.low_closed {
            period.low
        } else {
            period
                .low
                .trunc_subsecs(0)
                .checked_add_signed(Duration::seconds(1))
                .unwrap_or(period.low)
        };
        let end = if period.high_closed {
            period.high
        } else {
            period
                .high
                .checked_sub_signed(Duration::nanoseconds(1))
                .unwrap_or(period.high)
        };
        Self {
            start: instant(start),
            end: instant(end),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportGroup {
    #[serde(default)]
    pub population: Vec<GroupPopulation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_score: Option<MeasureScore>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPopulation {
    pub code: CodeableConcept,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeableConcept {
    pub coding: Vec<ReportCoding>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportCoding {
    pub system: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasureScore {
    #[serde(with = "rust_decimal::serde::float")]
    pub value: Decimal,
}

impl MeasureReport {
    pub fn builder(measure: impl Into<String>) -> MeasureReportBuilder {
        MeasureReportBuilder::new(measure)
    }

    /// Report built from an interpreted run. Takes the result by value; the
    /// subject sets are not needed past this point.
    pub fn from_result(measure: impl Into<String>, period: Option<&Interval>, result: PopulationResult) -> Self {
        Self::builder(measure)
            .period(period)
            .populations(result.counts().map(|(name, count)| (name, count as u64)))
            .build()
    }

    /// Report built from the rows of an executed SQL statement
    pub fn from_counts(measure: impl Into<String>, period: Option<&Interval>, counts: &[PopulationCount]) -> Self {
        Self::builder(measure)
            .period(period)
            .populations(counts.iter().map(|row| (row.population.as_str(), row.subject_count)))
            .build()
    }

    /// Count of one population, when reported
    pub fn count(&self, code: PopulationCode) -> Option<u64> {
        self.group.first().and_then(|group| {
            group
                .population
                .iter()
                .find(|p| p.code.coding.iter().any(|c| c.code == code.code()))
                .map(|p| p.count)
        })
    }

    pub fn score(&self) -> Option<Decimal> {
        self.group
            .first()
            .and_then(|group| group.measure_score.as_ref())
            .map(|score| score.value)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Collects population counts, then computes the score
#[derive(Debug, Clone)]
pub struct MeasureReportBuilder {
    measure: String,
    period: Option<ReportPeriod>,
    counts: Vec<(PopulationCode, u64)>,
}

impl MeasureReportBuilder {
    pub fn new(measure: impl Into<String>) -> Self {
        Self {
            measure: measure.into(),
            period: None,
            counts: Vec::new(),
        }
    }

    pub fn period(mut self, period: Option<&Interval>) -> Self {
        self.period = period.map(ReportPeriod::from);
        self
    }

    /// Record the count of define `name`; ignored unless it names a standard
    /// population. A later count for the same population replaces the earlier.
    pub fn population(mut self, name: &str, count: u64) -> Self {
        if let Some(code) = PopulationCode::from_define(name) {
            self.counts.retain(|(existing, _)| *existing != code);
            self.counts.push((code, count));
        }
        self
    }

    pub fn populations<'a>(self, counts: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        counts
            .into_iter()
            .fold(self, |builder, (name, count)| builder.population(name, count))
    }

    pub fn build(mut self) -> MeasureReport {
        self.counts.sort_by_key(|(code, _)| *code);
        let measure_score = score(&self.counts).map(|value| MeasureScore { value });
        let population = self
            .counts
            .iter()
            .map(|(code, count)| GroupPopulation {
                code: CodeableConcept {
                    coding: vec![ReportCoding {
                        system: POPULATION_SYSTEM.to_string(),
                        code: code.code().to_string(),
                    }],
                },
                count: *count,
            })
            .collect();

        MeasureReport {
            status: ReportStatus::Complete,
            report_type: ReportType::Summary,
            measure: self.measure,
            period: self.period,
            group: vec![ReportGroup {
                population,
                measure_score,
            }],
        }
    }
}

/// numerator / (denominator - exclusion), absent when either operand is
/// missing or the divisor is not positive
fn score(counts: &[(PopulationCode, u64)]) -> Option<Decimal> {
    let count = |wanted: PopulationCode| {
        counts
            .iter()
            .find(|(code, _)| *code == wanted)
            .map(|(_, count)| Decimal::from(*count))
    };
    let numerator = count(PopulationCode::Numerator)?;
    let denominator = count(PopulationCode::Denominator)?;
    let exclusion = count(PopulationCode::DenominatorExclusion).unwrap_or(Decimal::ZERO);

    let divisor = denominator - exclusion;
    if divisor <= Decimal::ZERO {
        return None;
    }
    numerator.checked_div(divisor)
}

fn instant(at: NaiveDateTime) -> String {
    at.format(INSTANT_FORMAT).to_string()
}
