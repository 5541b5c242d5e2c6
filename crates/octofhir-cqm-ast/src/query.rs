//! Resource queries and their predicates

use crate::{Comparison, Edge, RelationshipKind};
use chrono::NaiveDateTime;
use octofhir_cqm_model::{Interval, Quantity};

/// A retrieve of one resource type with filters: `[Observation: "VS"] O where ...`
///
/// All predicates are conjunctive. Patient queries (`resource_type ==
/// "Patient"`) may only carry gender and age predicates; other queries may
/// only carry coded, temporal and value predicates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceQuery {
    /// Resource type name (e.g. `Observation`)
    pub resource_type: String,
    /// Query alias, required once the query has a `where` clause
    pub alias: Option<String>,
    /// Coded filter from the retrieve brackets
    pub code: Option<CodeFilter>,
    /// `where` conditions
    pub predicates: Vec<Predicate>,
    /// `with` / `without` clauses
    pub relationships: Vec<Relationship>,
}

impl ResourceQuery {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            alias: None,
            code: None,
            predicates: Vec::new(),
            relationships: Vec::new(),
        }
    }

    pub fn is_patient(&self) -> bool {
        self.resource_type == PATIENT
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_code(mut self, code: CodeFilter) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }
}

/// Resource type of the subject of every measure
pub const PATIENT: &str = "Patient";

/// Coded-concept membership: a value set expansion or a single code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeFilter {
    ValueSet(ValueSetRef),
    Code(CodeRef),
}

impl CodeFilter {
    /// Declared name the filter was written with
    pub fn name(&self) -> &str {
        match self {
            CodeFilter::ValueSet(vs) => &vs.name,
            CodeFilter::Code(code) => &code.name,
        }
    }
}

/// A declared value set, resolved to its canonical URL
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueSetRef {
    pub name: String,
    pub url: String,
    pub version: Option<String>,
}

/// A declared code, resolved to its code system URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CodeRef {
    pub name: String,
    pub system: String,
    pub code: String,
    pub display: Option<String>,
}

/// One conjunct of a `where` or `such that` clause
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `O.effective during <interval>`
    Temporal(TemporalPredicate),
    /// `O.value > 100 '/min'`
    Value(ValuePredicate),
    /// `P.gender = 'female'`
    Gender(GenderPredicate),
    /// `AgeInYearsAt(start of "Measurement Period") >= 18`
    Age(AgePredicate),
    /// `O.code in "VS"` / `O.code ~ "Code"`
    Code(CodeFilter),
}

/// The resource's effective time must lie within an interval
#[derive(Debug, Clone, PartialEq)]
pub struct TemporalPredicate {
    /// Property name as written (`effective`, `onset`, `period`, ...)
    pub property: String,
    pub interval: IntervalSource,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuePredicate {
    pub op: Comparison,
    pub quantity: QuantitySource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenderPredicate {
    /// `!=` instead of `=`
    pub negated: bool,
    pub gender: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgePredicate {
    /// Reference instant the age is computed at
    pub at: InstantSource,
    pub op: Comparison,
    pub years: i64,
}

/// `with [Type: ..] R such that ...` / `without ...`
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub kind: RelationshipKind,
    /// Related query; its predicates come from the `such that` clause
    pub query: ResourceQuery,
    /// `R.<prop> during L[.<prop>]`: the related resource's effective period
    /// must lie within the left resource's effective period
    pub correlation: Option<TemporalCorrelation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalCorrelation {
    pub related_property: String,
    pub left_property: Option<String>,
}

/// Where an interval operand comes from
#[derive(Debug, Clone, PartialEq)]
pub enum IntervalSource {
    Literal(Interval),
    Parameter(String),
    Define(String),
}

/// Where a quantity operand comes from
#[derive(Debug, Clone, PartialEq)]
pub enum QuantitySource {
    Literal(Quantity),
    Parameter(String),
    Define(String),
}

/// Where an instant operand comes from
#[derive(Debug, Clone, PartialEq)]
pub enum InstantSource {
    Literal(NaiveDateTime),
    Boundary(Boundary),
    Parameter(String),
    Define(String),
}

/// `start of <interval>` / `end of <interval>`
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub edge: Edge,
    pub interval: IntervalSource,
}
