//! Expression nodes

use crate::{
    BoxExpr, InstantSource, IntervalSource, Literal, Predicate, QuantitySource, ResourceQuery,
    SetOperator,
};
use octofhir_cqm_diagnostics::Span;
use std::fmt;

/// Body of a define
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Resource retrieve with filters, yields a population
    Query(ResourceQuery),
    /// Reference to another define by name
    DefineRef(DefineRef),
    /// Set algebra over populations
    SetOperation(SetOperation),
    /// Interval, quantity or date-time literal
    Literal(Literal),
    /// Reference to a declared parameter (or `"Measurement Period"`)
    Parameter(String),
    /// `start of` / `end of` an interval
    Boundary(crate::Boundary),
    /// Recognised construct outside the supported operator subset
    Unsupported(UnsupportedConstruct),
}

/// Reference to a define by name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefineRef {
    pub name: String,
}

impl DefineRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Set operation over subject populations
///
/// `exists` keeps the operand's subjects that are in the subject universe,
/// `not` is the complement of the operand against that universe.
#[derive(Debug, Clone, PartialEq)]
pub enum SetOperation {
    Binary {
        op: SetOperator,
        left: BoxExpr,
        right: BoxExpr,
    },
    Exists(BoxExpr),
    Not(BoxExpr),
}

impl SetOperation {
    pub fn union(left: Expression, right: Expression) -> Self {
        Self::binary(SetOperator::Union, left, right)
    }

    pub fn intersect(left: Expression, right: Expression) -> Self {
        Self::binary(SetOperator::Intersect, left, right)
    }

    pub fn except(left: Expression, right: Expression) -> Self {
        Self::binary(SetOperator::Except, left, right)
    }

    pub fn binary(op: SetOperator, left: Expression, right: Expression) -> Self {
        Self::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
}

/// Operator or form the engine recognises but does not execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsupportedConstruct {
    /// Human-readable description (e.g. `xor operator`)
    pub construct: String,
    pub span: Span,
    /// Defines referenced by the operands that were parsed before the node
    /// was replaced; the dependency graph still orders and checks them.
    pub references: Vec<String>,
}

impl UnsupportedConstruct {
    pub fn new(construct: impl Into<String>, span: Span) -> Self {
        Self {
            construct: construct.into(),
            span,
            references: Vec::new(),
        }
    }

    /// Add the define references of `operand`
    pub fn absorb(&mut self, operand: &Expression) {
        for name in operand.references() {
            push_unique(&mut self.references, &name);
        }
    }

    pub fn with_operand(mut self, operand: &Expression) -> Self {
        self.absorb(operand);
        self
    }

    /// Add define names found in input that was skipped rather than parsed
    pub fn extend_references(&mut self, names: impl IntoIterator<Item = String>) {
        for name in names {
            push_unique(&mut self.references, &name);
        }
    }
}

impl fmt::Display for UnsupportedConstruct {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.construct)
    }
}

/// Result shape of a define, when it can be read off the body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefineKind {
    /// Set of subject identifiers
    Population,
    /// Interval, quantity or instant
    Scalar,
}

impl Expression {
    /// Result shape of this expression; `None` for bare references and
    /// unsupported constructs, whose shape is only known at evaluation.
    pub fn kind(&self) -> Option<DefineKind> {
        match self {
            Expression::Query(_) | Expression::SetOperation(_) => Some(DefineKind::Population),
            Expression::Literal(_) | Expression::Parameter(_) | Expression::Boundary(_) => {
                Some(DefineKind::Scalar)
            }
            Expression::DefineRef(_) | Expression::Unsupported(_) => None,
        }
    }

    /// Define names referenced anywhere in this expression, in order of first
    /// occurrence and without duplicates.
    pub fn references(&self) -> Vec<String> {
        let mut names = Vec::new();
        self.collect_references(&mut names);
        names
    }

    fn collect_references(&self, names: &mut Vec<String>) {
        match self {
            Expression::Query(query) => query_references(query, names),
            Expression::DefineRef(r) => push_unique(names, &r.name),
            Expression::SetOperation(SetOperation::Binary { left, right, .. }) => {
                left.collect_references(names);
                right.collect_references(names);
            }
            Expression::SetOperation(SetOperation::Exists(operand) | SetOperation::Not(operand)) => {
                operand.collect_references(names)
            }
            Expression::Boundary(boundary) => interval_reference(&boundary.interval, names),
            Expression::Unsupported(construct) => {
                for name in &construct.references {
                    push_unique(names, name);
                }
            }
            Expression::Literal(_) | Expression::Parameter(_) => {}
        }
    }

    /// First unsupported construct in this expression, depth first
    pub fn find_unsupported(&self) -> Option<&UnsupportedConstruct> {
        match self {
            Expression::Unsupported(construct) => Some(construct),
            Expression::SetOperation(SetOperation::Binary { left, right, .. }) => {
                left.find_unsupported().or_else(|| right.find_unsupported())
            }
            Expression::SetOperation(SetOperation::Exists(operand) | SetOperation::Not(operand)) => {
                operand.find_unsupported()
            }
            _ => None,
        }
    }
}

fn query_references(query: &ResourceQuery, names: &mut Vec<String>) {
    for predicate in &query.predicates {
        match predicate {
            Predicate::Temporal(temporal) => interval_reference(&temporal.interval, names),
            Predicate::Value(value) => {
                if let QuantitySource::Define(name) = &value.quantity {
                    push_unique(names, name);
                }
            }
            Predicate::Age(age) => instant_reference(&age.at, names),
            Predicate::Gender(_) | Predicate::Code(_) => {}
        }
    }
    for relationship in &query.relationships {
        query_references(&relationship.query, names);
    }
}

fn interval_reference(source: &IntervalSource, names: &mut Vec<String>) {
    if let IntervalSource::Define(name) = source {
        push_unique(names, name);
    }
}

fn instant_reference(source: &InstantSource, names: &mut Vec<String>) {
    match source {
        InstantSource::Define(name) => push_unique(names, name),
        InstantSource::Boundary(boundary) => interval_reference(&boundary.interval, names),
        InstantSource::Literal(_) | InstantSource::Parameter(_) => {}
    }
}

fn push_unique(names: &mut Vec<String>, name: &str) {
    if !names.iter().any(|n| n == name) {
        names.push(name.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Boundary, Edge, TemporalPredicate};
    use pretty_assertions::assert_eq;

    fn reference(name: &str) -> Expression {
        Expression::DefineRef(DefineRef::new(name))
    }

    #[test]
    fn test_references_in_first_occurrence_order() {
        let query = ResourceQuery::new("Encounter")
            .with_alias("E")
            .with_predicate(Predicate::Temporal(TemporalPredicate {
                property: "period".into(),
                interval: IntervalSource::Define("Lookback".into()),
            }));
        let expr = Expression::SetOperation(SetOperation::except(
            Expression::SetOperation(SetOperation::union(reference("B"), reference("A"))),
            Expression::SetOperation(SetOperation::intersect(Expression::Query(query), reference("B"))),
        ));

        assert_eq!(expr.references(), vec!["B", "A", "Lookback"]);
    }

    #[test]
    fn test_kind() {
        assert_eq!(reference("A").kind(), None);
        assert_eq!(
            Expression::Query(ResourceQuery::new("Patient")).kind(),
            Some(DefineKind::Population)
        );
        let boundary = Expression::Boundary(Boundary {
            edge: Edge::Start,
            interval: IntervalSource::Parameter("Measurement Period".into()),
        });
        assert_eq!(boundary.kind(), Some(DefineKind::Scalar));
        assert!(boundary.references().is_empty());
    }

    #[test]
    fn test_find_unsupported() {
        let unsupported = Expression::Unsupported(UnsupportedConstruct::new("xor operator", Span::new(3, 6)));
        let expr = Expression::SetOperation(SetOperation::Not(Box::new(unsupported)));
        assert_eq!(expr.find_unsupported().map(ToString::to_string), Some("xor operator".into()));
        assert_eq!(reference("A").find_unsupported(), None);
    }

    #[test]
    fn test_unsupported_keeps_operand_references() {
        let operand = Expression::SetOperation(SetOperation::union(reference("B"), reference("C")));
        let unsupported = Expression::Unsupported(
            UnsupportedConstruct::new("xor operator", Span::new(4, 7))
                .with_operand(&operand)
                .with_operand(&reference("B")),
        );
        assert_eq!(unsupported.references(), vec!["B", "C"]);

        let expr = Expression::SetOperation(SetOperation::except(reference("A"), unsupported));
        assert_eq!(expr.references(), vec!["A", "B", "C"]);
    }
}
