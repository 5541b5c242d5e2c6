//! Expression parser (recursive descent)
//!
//! Precedence, lowest to highest:
//! 1. `or`, `union`, `|`
//! 2. `and`, `intersect`
//! 3. `except`
//! 4. `not`, `exists`
//! 5. primaries: retrieves/queries, literals, references, `start of`/`end of`,
//!    `AgeInYearsAt(..) <op> n`, `Patient.gender = '..'`
//!
//! Constructs outside this subset (`xor`, arithmetic, function calls, `or`
//! inside a `where` clause, ...) are consumed and become
//! [`Expression::Unsupported`] nodes.

use crate::lexer::{Symbol, Token, TokenKind};
use crate::parser::{Parser, is_reserved};
use crate::{ParseError, ParseResult};
use chrono::NaiveDateTime;
use octofhir_cqm_ast::{
    AgePredicate, Boundary, CodeFilter, CodeRef, DefineRef, Edge, Expression, GenderPredicate,
    InstantSource, IntervalSource, Literal, PATIENT, Predicate, QuantitySource, Relationship,
    RelationshipKind, ResourceQuery, SetOperation, SetOperator, TemporalCorrelation,
    TemporalPredicate, UnsupportedConstruct, ValuePredicate, ValueSetRef,
};
use octofhir_cqm_diagnostics::Span;
use octofhir_cqm_model::{Interval, Quantity, parse_instant};
use rust_decimal::Decimal;
use std::str::FromStr;

/// Binary operators outside the subset that may follow an operand
const UNSUPPORTED_BINARY_KEYWORDS: &[&str] = &[
    "during", "included", "includes", "in", "contains", "overlaps", "before", "after", "starts",
    "ends", "meets", "properly", "same", "is", "as", "div", "mod",
];

/// Aliases in scope while parsing a `where` or `such that` clause
struct Scope {
    alias: String,
    resource_type: String,
    /// Outer query alias inside `such that`
    outer: Option<String>,
}

fn unsupported(construct: impl Into<String>, span: Span) -> Expression {
    Expression::Unsupported(UnsupportedConstruct::new(construct, span))
}

/// Unsupported node over input that was skipped, keeping the define names
/// seen in it
fn unsupported_skipped(construct: impl Into<String>, span: Span, names: Vec<String>) -> Expression {
    let mut node = UnsupportedConstruct::new(construct, span);
    node.extend_references(names);
    Expression::Unsupported(node)
}

/// Unsupported node over `operands`. A left operand that is already
/// unsupported keeps its own construct; define references of every operand
/// are carried over.
fn unsupported_over(operands: &[&Expression], construct: impl Into<String>, span: Span) -> Expression {
    let mut node = match operands.first() {
        Some(Expression::Unsupported(inner)) => inner.clone(),
        _ => UnsupportedConstruct::new(construct, span),
    };
    for operand in operands {
        node.absorb(operand);
    }
    Expression::Unsupported(node)
}

/// Keep only the first unsupported construct met in a query
fn note(slot: &mut Option<UnsupportedConstruct>, construct: impl Into<String>, span: Span) {
    if slot.is_none() {
        *slot = Some(UnsupportedConstruct::new(construct, span));
    }
}

fn keep_skipped(slot: &mut Option<UnsupportedConstruct>, names: Vec<String>) {
    if let Some(node) = slot {
        node.extend_references(names);
    }
}

impl Parser<'_> {
    pub(crate) fn expression(&mut self) -> ParseResult<Expression> {
        self.union_expression()
    }

    fn union_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.intersect_expression()?;
        loop {
            let span = self.current_span();
            if self.eat_keyword("or") || self.eat_keyword("union") || self.eat_symbol(Symbol::Pipe) {
                let right = self.intersect_expression()?;
                left = Expression::SetOperation(SetOperation::binary(SetOperator::Union, left, right));
            } else if let Some(op) = self.eat_any_keyword(&["xor", "implies"]) {
                let right = self.intersect_expression()?;
                left = unsupported_over(&[&left, &right], format!("{op} operator"), span);
            } else {
                return Ok(left);
            }
        }
    }

    fn intersect_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.except_expression()?;
        while self.eat_keyword("and") || self.eat_keyword("intersect") {
            let right = self.except_expression()?;
            left = Expression::SetOperation(SetOperation::binary(SetOperator::Intersect, left, right));
        }
        Ok(left)
    }

    fn except_expression(&mut self) -> ParseResult<Expression> {
        let mut left = self.unary_expression()?;
        while self.eat_keyword("except") {
            let right = self.unary_expression()?;
            left = Expression::SetOperation(SetOperation::binary(SetOperator::Except, left, right));
        }
        Ok(left)
    }

    fn unary_expression(&mut self) -> ParseResult<Expression> {
        if self.eat_keyword("not") {
            let operand = self.unary_expression()?;
            return Ok(Expression::SetOperation(SetOperation::Not(Box::new(operand))));
        }
        if self.eat_keyword("exists") {
            let operand = self.unary_expression()?;
            return Ok(Expression::SetOperation(SetOperation::Exists(Box::new(operand))));
        }
        self.postfix_expression()
    }

    fn postfix_expression(&mut self) -> ParseResult<Expression> {
        let expr = self.primary()?;
        let span = self.current_span();

        if let Some(TokenKind::Symbol(
            symbol @ (Symbol::Plus
            | Symbol::Minus
            | Symbol::Star
            | Symbol::Slash
            | Symbol::Caret
            | Symbol::Ampersand),
        )) = self.peek_kind().cloned()
        {
            self.advance();
            let right = self.unary_expression()?;
            return Ok(unsupported_over(
                &[&expr, &right],
                format!("arithmetic operator '{}'", symbol.text()),
                span,
            ));
        }
        if let Some(op) = self.eat_comparison() {
            let right = self.unary_expression()?;
            return Ok(unsupported_over(&[&expr, &right], format!("comparison '{op}'"), span));
        }
        if let Some(keyword) = self.eat_any_keyword(UNSUPPORTED_BINARY_KEYWORDS) {
            self.eat_keyword("in");
            self.eat_keyword("of");
            let right = self.unary_expression()?;
            return Ok(unsupported_over(&[&expr, &right], format!("'{keyword}' operator"), span));
        }
        Ok(expr)
    }

    fn primary(&mut self) -> ParseResult<Expression> {
        let Some(Token { kind, span }) = self.peek().cloned() else {
            return Err(self.unexpected("an expression"));
        };
        match kind {
            TokenKind::Symbol(Symbol::LParen) => {
                self.advance();
                let expr = self.expression()?;
                self.expect_symbol(Symbol::RParen)?;
                Ok(expr)
            }
            TokenKind::Symbol(Symbol::LBracket) => self.query(),
            TokenKind::Symbol(Symbol::LBrace) => {
                let names = self.skip_balanced()?;
                Ok(unsupported_skipped("list literal", span, names))
            }
            TokenKind::Number(_) | TokenKind::Symbol(Symbol::Minus) => {
                Ok(Expression::Literal(Literal::Quantity(self.quantity_literal()?)))
            }
            TokenKind::DateTime(_) => Ok(Expression::Literal(Literal::DateTime(self.datetime_literal()?))),
            TokenKind::Str(_) => {
                self.advance();
                Ok(unsupported("string literal", span))
            }
            TokenKind::Ident(name) => self.identifier_primary(name, span),
            TokenKind::QuotedIdent(name) => self.name_reference(name, span),
            TokenKind::Symbol(_) => Err(self.unexpected("an expression")),
        }
    }

    fn identifier_primary(&mut self, name: String, span: Span) -> ParseResult<Expression> {
        match name.as_str() {
            "Interval" if self.nth_is_symbol(1, Symbol::LBracket) || self.nth_is_symbol(1, Symbol::LParen) => {
                Ok(Expression::Literal(Literal::Interval(self.interval_literal()?)))
            }
            "start" | "end" if self.nth_is_keyword(1, "of") => Ok(Expression::Boundary(self.boundary()?)),
            "AgeInYearsAt" => {
                let predicate = self.age_predicate()?;
                Ok(Expression::Query(
                    ResourceQuery::new(PATIENT).with_predicate(Predicate::Age(predicate)),
                ))
            }
            "Patient" if self.nth_is_symbol(1, Symbol::Dot) => self.patient_attribute(span),
            "true" | "false" | "null" => {
                self.advance();
                Ok(unsupported(format!("{name} literal"), span))
            }
            "if" | "case" | "from" | "let" | "Tuple" | "List" | "Code" | "Concept" => {
                self.advance();
                let names = self.skip_until(|_| false);
                Ok(unsupported_skipped(format!("'{name}' expression"), span, names))
            }
            _ if is_reserved(&name) => Err(self.unexpected("an expression")),
            _ => self.name_reference(name, span),
        }
    }

    /// A bare name: parameter, define reference, or an unsupported call
    fn name_reference(&mut self, name: String, span: Span) -> ParseResult<Expression> {
        self.advance();
        if self.at_symbol(Symbol::LParen) {
            let names = self.skip_balanced()?;
            return Ok(unsupported_skipped(format!("function {name}()"), span, names));
        }
        if self.eat_symbol(Symbol::Dot) {
            let (property, _) = self.expect_name("a property name")?;
            return Ok(unsupported(format!("property access {name}.{property}"), span));
        }
        if self.library.is_parameter(&name) {
            return Ok(Expression::Parameter(name));
        }
        if self.library.valueset(&name).is_some() || self.library.code(&name).is_some() {
            return Ok(unsupported(
                format!("terminology reference \"{name}\" used as an expression"),
                span,
            ));
        }
        Ok(Expression::DefineRef(DefineRef::new(name)))
    }

    fn patient_attribute(&mut self, span: Span) -> ParseResult<Expression> {
        self.expect_keyword("Patient")?;
        self.expect_symbol(Symbol::Dot)?;
        let (property, _) = self.expect_name("a Patient attribute")?;
        if property == "gender" {
            let predicate = self.gender_predicate()?;
            return Ok(Expression::Query(
                ResourceQuery::new(PATIENT).with_predicate(Predicate::Gender(predicate)),
            ));
        }
        let mut node = UnsupportedConstruct::new(format!("Patient.{property}"), span);
        if self.eat_comparison().is_some() {
            node.absorb(&self.unary_expression()?);
        }
        Ok(Expression::Unsupported(node))
    }

    // === Queries ===

    fn query(&mut self) -> ParseResult<Expression> {
        let mut found: Option<UnsupportedConstruct> = None;
        let mut query = self.retrieve(&mut found)?;
        query.alias = self.eat_alias();

        while let Some(kind) = self.eat_relationship_keyword() {
            let clause_span = self.current_span();
            let mut related = self.retrieve(&mut found)?;
            let Some(related_alias) = self.eat_alias() else {
                return Err(self.unexpected("an alias for the related query"));
            };
            self.expect_keyword("such")?;
            self.expect_keyword("that")?;
            let Some(outer) = query.alias.clone() else {
                return Err(ParseError::unexpected_token(
                    "A with/without clause requires the outer query to have an alias",
                    self.location(clause_span),
                ));
            };
            let scope = Scope {
                alias: related_alias.clone(),
                resource_type: related.resource_type.clone(),
                outer: Some(outer),
            };
            let (predicates, correlation) = self.conditions(&scope, &mut found)?;
            related.alias = Some(related_alias);
            related.predicates = predicates;
            query.relationships.push(Relationship {
                kind,
                query: related,
                correlation,
            });
        }

        if self.at_keyword("where") {
            let where_span = self.current_span();
            self.advance();
            let Some(alias) = query.alias.clone() else {
                return Err(ParseError::unexpected_token(
                    "A where clause requires the query to have an alias",
                    self.location(where_span),
                ));
            };
            let scope = Scope {
                alias,
                resource_type: query.resource_type.clone(),
                outer: None,
            };
            let (predicates, _) = self.conditions(&scope, &mut found)?;
            query.predicates.extend(predicates);
        }

        let clause_span = self.current_span();
        if let Some(clause) = self.eat_any_keyword(&["return", "sort", "aggregate"]) {
            note(&mut found, format!("'{clause}' clause"), clause_span);
            let names = self.skip_until(is_set_keyword);
            keep_skipped(&mut found, names);
        }

        let query = Expression::Query(query);
        Ok(match found {
            Some(construct) => Expression::Unsupported(construct.with_operand(&query)),
            None => query,
        })
    }

    /// `[Type]`, `[Type: "Name"]`, `[Type: code in "Name"]`, `[Type: code ~ "Name"]`
    fn retrieve(&mut self, found: &mut Option<UnsupportedConstruct>) -> ParseResult<ResourceQuery> {
        self.expect_symbol(Symbol::LBracket)?;
        let (resource_type, _) = self.expect_name("a resource type")?;
        let mut query = ResourceQuery::new(resource_type);

        if self.eat_symbol(Symbol::Colon) {
            if self.eat_keyword("code")
                && !(self.eat_keyword("in") || self.eat_symbol(Symbol::Tilde) || self.eat_symbol(Symbol::Equal))
            {
                return Err(self.unexpected("'in', '~' or '='"));
            }
            let (name, span) = self.expect_name("a value set or code name")?;
            let filter = self.terminology(&name, span)?;
            if query.is_patient() {
                note(found, "coded filter on a Patient retrieve", span);
            } else {
                query.code = Some(filter);
            }
        }

        self.expect_symbol(Symbol::RBracket)?;
        Ok(query)
    }

    fn terminology(&self, name: &str, span: Span) -> ParseResult<CodeFilter> {
        if let Some(vs) = self.library.valueset(name) {
            return Ok(CodeFilter::ValueSet(ValueSetRef {
                name: vs.name.clone(),
                url: vs.url.clone(),
                version: vs.version.clone(),
            }));
        }
        if let Some(code) = self.library.code(name) {
            return Ok(CodeFilter::Code(CodeRef {
                name: code.name.clone(),
                system: code.system.clone(),
                code: code.code.clone(),
                display: code.display.clone(),
            }));
        }
        Err(ParseError::UndefinedTerminology {
            name: name.to_string(),
            location: self.location(span),
        })
    }

    fn eat_alias(&mut self) -> Option<String> {
        match self.peek_kind() {
            Some(TokenKind::Ident(name)) if !is_reserved(name) => {
                let alias = name.clone();
                self.advance();
                Some(alias)
            }
            _ => None,
        }
    }

    fn eat_relationship_keyword(&mut self) -> Option<RelationshipKind> {
        if self.eat_keyword("with") {
            Some(RelationshipKind::With)
        } else if self.eat_keyword("without") {
            Some(RelationshipKind::Without)
        } else {
            None
        }
    }

    /// `and`-joined conditions of a `where` or `such that` clause
    fn conditions(
        &mut self,
        scope: &Scope,
        found: &mut Option<UnsupportedConstruct>,
    ) -> ParseResult<(Vec<Predicate>, Option<TemporalCorrelation>)> {
        let mut predicates = Vec::new();
        let mut correlation = None;
        loop {
            self.condition(scope, &mut predicates, &mut correlation, found)?;
            if !self.eat_keyword("and") {
                break;
            }
        }

        let span = self.current_span();
        if let Some(op) = self.eat_any_keyword(&["or", "xor", "implies"]) {
            note(found, format!("'{op}' inside a where clause"), span);
            let names = self.skip_until(is_set_keyword);
            keep_skipped(found, names);
        }
        Ok((predicates, correlation))
    }

    fn condition(
        &mut self,
        scope: &Scope,
        predicates: &mut Vec<Predicate>,
        correlation: &mut Option<TemporalCorrelation>,
        found: &mut Option<UnsupportedConstruct>,
    ) -> ParseResult<()> {
        let span = self.current_span();

        if self.eat_symbol(Symbol::LParen) {
            let (inner, inner_correlation) = self.conditions(scope, found)?;
            predicates.extend(inner);
            if inner_correlation.is_some() {
                *correlation = inner_correlation;
            }
            self.expect_symbol(Symbol::RParen)?;
            return Ok(());
        }

        if self.at_keyword("AgeInYearsAt") {
            let predicate = self.age_predicate()?;
            if scope.resource_type == PATIENT {
                predicates.push(Predicate::Age(predicate));
            } else {
                note(found, format!("patient age on a {} query", scope.resource_type), span);
            }
            return Ok(());
        }

        let on_alias = self.at_name(&scope.alias);
        let on_outer = scope.outer.as_deref().is_some_and(|outer| self.at_name(outer));
        if !(on_alias || on_outer) || !self.nth_is_symbol(1, Symbol::Dot) {
            note(found, "condition", span);
            self.skip_condition(found);
            return Ok(());
        }
        self.advance();
        self.advance();
        let (property, _) = self.expect_name("a property name")?;
        if on_outer && !on_alias {
            note(found, "condition on the outer query alias", span);
            self.skip_condition(found);
            return Ok(());
        }

        let is_patient = scope.resource_type == PATIENT;
        if is_patient && property == "gender" {
            predicates.push(Predicate::Gender(self.gender_predicate()?));
        } else if !is_patient
            && property == "code"
            && (self.at_keyword("in") || self.at_symbol(Symbol::Tilde) || self.at_symbol(Symbol::Equal))
        {
            self.advance();
            let (name, name_span) = self.expect_name("a value set or code name")?;
            predicates.push(Predicate::Code(self.terminology(&name, name_span)?));
        } else if !is_patient && property == "value" && self.at_comparison() {
            let op = self.eat_comparison().ok_or_else(|| self.unexpected("a comparison"))?;
            let quantity = self.quantity_source()?;
            predicates.push(Predicate::Value(ValuePredicate { op, quantity }));
        } else if !is_patient && self.eat_temporal_operator()? {
            match scope.outer.as_deref() {
                Some(outer) if self.at_name(outer) => {
                    self.advance();
                    let left_property = if self.eat_symbol(Symbol::Dot) {
                        Some(self.expect_name("a property name")?.0)
                    } else {
                        None
                    };
                    if correlation.is_some() {
                        note(found, "more than one temporal correlation", span);
                    }
                    *correlation = Some(TemporalCorrelation {
                        related_property: property,
                        left_property,
                    });
                }
                _ => {
                    let interval = self.interval_source()?;
                    predicates.push(Predicate::Temporal(TemporalPredicate { property, interval }));
                }
            }
        } else {
            let construct = if is_patient {
                format!("Patient.{property} filter")
            } else if matches!(property.as_str(), "gender" | "birthDate") {
                format!("patient attribute {property} on a {} query", scope.resource_type)
            } else {
                format!("filter on {property}")
            };
            note(found, construct, span);
            self.skip_condition(found);
        }
        Ok(())
    }

    /// `during`, `in`, `included in`
    fn eat_temporal_operator(&mut self) -> ParseResult<bool> {
        if self.eat_keyword("during") || self.eat_keyword("in") {
            return Ok(true);
        }
        if self.eat_keyword("included") {
            self.expect_keyword("in")?;
            return Ok(true);
        }
        Ok(false)
    }

    fn skip_condition(&mut self, found: &mut Option<UnsupportedConstruct>) {
        let names = self.skip_until(|kind| {
            is_set_keyword(kind)
                || matches!(kind, TokenKind::Ident(word) if matches!(word.as_str(), "and" | "or" | "xor" | "implies"))
        });
        keep_skipped(found, names);
    }

    fn gender_predicate(&mut self) -> ParseResult<GenderPredicate> {
        let negated = if self.eat_symbol(Symbol::Equal) {
            false
        } else if self.eat_symbol(Symbol::NotEqual) {
            true
        } else {
            return Err(self.unexpected("'=' or '!='"));
        };
        let gender = self.expect_string("a gender code")?;
        Ok(GenderPredicate { negated, gender })
    }

    /// `AgeInYearsAt(<instant>) <op> <integer>`
    fn age_predicate(&mut self) -> ParseResult<AgePredicate> {
        self.expect_keyword("AgeInYearsAt")?;
        self.expect_symbol(Symbol::LParen)?;
        let at = self.instant_source()?;
        self.expect_symbol(Symbol::RParen)?;
        let op = self
            .eat_comparison()
            .ok_or_else(|| self.unexpected("a comparison operator"))?;
        let years = self.integer_literal()?;
        Ok(AgePredicate { at, op, years })
    }

    // === Operand sources ===

    fn interval_source(&mut self) -> ParseResult<IntervalSource> {
        if self.eat_symbol(Symbol::LParen) {
            let source = self.interval_source()?;
            self.expect_symbol(Symbol::RParen)?;
            return Ok(source);
        }
        if self.at_keyword("Interval") {
            return Ok(IntervalSource::Literal(self.interval_literal()?));
        }
        let (name, _) = self.expect_name("an interval")?;
        Ok(if self.library.is_parameter(&name) {
            IntervalSource::Parameter(name)
        } else {
            IntervalSource::Define(name)
        })
    }

    fn quantity_source(&mut self) -> ParseResult<QuantitySource> {
        if matches!(
            self.peek_kind(),
            Some(TokenKind::Number(_) | TokenKind::Symbol(Symbol::Minus))
        ) {
            return Ok(QuantitySource::Literal(self.quantity_literal()?));
        }
        let (name, _) = self.expect_name("a quantity")?;
        Ok(if self.library.is_parameter(&name) {
            QuantitySource::Parameter(name)
        } else {
            QuantitySource::Define(name)
        })
    }

    fn instant_source(&mut self) -> ParseResult<InstantSource> {
        if matches!(self.peek_kind(), Some(TokenKind::DateTime(_))) {
            return Ok(InstantSource::Literal(self.datetime_literal()?));
        }
        if (self.at_keyword("start") || self.at_keyword("end")) && self.nth_is_keyword(1, "of") {
            return Ok(InstantSource::Boundary(self.boundary()?));
        }
        let (name, _) = self.expect_name("an instant")?;
        Ok(if self.library.is_parameter(&name) {
            InstantSource::Parameter(name)
        } else {
            InstantSource::Define(name)
        })
    }

    /// `start of <interval>` / `end of <interval>`
    fn boundary(&mut self) -> ParseResult<Boundary> {
        let edge = if self.eat_keyword("start") {
            Edge::Start
        } else {
            self.expect_keyword("end")?;
            Edge::End
        };
        self.expect_keyword("of")?;
        let interval = self.interval_source()?;
        Ok(Boundary { edge, interval })
    }

    // === Literals ===

    /// Interval, quantity or date-time literal (parameter defaults)
    pub(crate) fn scalar_literal(&mut self) -> ParseResult<Literal> {
        match self.peek_kind() {
            Some(TokenKind::Ident(word)) if word == "Interval" => {
                Ok(Literal::Interval(self.interval_literal()?))
            }
            Some(TokenKind::Number(_) | TokenKind::Symbol(Symbol::Minus)) => {
                Ok(Literal::Quantity(self.quantity_literal()?))
            }
            Some(TokenKind::DateTime(_)) => Ok(Literal::DateTime(self.datetime_literal()?)),
            _ => Err(self.unexpected("an interval, quantity or date-time literal")),
        }
    }

    fn interval_literal(&mut self) -> ParseResult<Interval> {
        let start = self.expect_keyword("Interval")?;
        let low_closed = if self.eat_symbol(Symbol::LBracket) {
            true
        } else if self.eat_symbol(Symbol::LParen) {
            false
        } else {
            return Err(self.unexpected("'[' or '('"));
        };
        let low = self.datetime_literal()?;
        self.expect_symbol(Symbol::Comma)?;
        let high = self.datetime_literal()?;
        let high_closed = if self.eat_symbol(Symbol::RBracket) {
            true
        } else if self.eat_symbol(Symbol::RParen) {
            false
        } else {
            return Err(self.unexpected("']' or ')'"));
        };
        if high < low {
            return Err(ParseError::invalid_literal(
                "Interval low bound is after its high bound",
                self.location(Span::new(start.start, self.previous_end())),
            ));
        }
        Ok(Interval::new(low, high, low_closed, high_closed))
    }

    fn datetime_literal(&mut self) -> ParseResult<NaiveDateTime> {
        let Some(Token {
            kind: TokenKind::DateTime(text),
            span,
        }) = self.peek().cloned()
        else {
            return Err(self.unexpected("a date-time literal"));
        };
        self.advance();
        parse_instant(&text).ok_or_else(|| {
            ParseError::invalid_literal(format!("Invalid date-time literal @{text}"), self.location(span))
        })
    }

    /// `[-]<number> ['<unit>']`
    fn quantity_literal(&mut self) -> ParseResult<Quantity> {
        let negative = self.eat_symbol(Symbol::Minus);
        let Some(Token {
            kind: TokenKind::Number(digits),
            span,
        }) = self.peek().cloned()
        else {
            return Err(self.unexpected("a number"));
        };
        self.advance();
        let mut value = Decimal::from_str(&digits).map_err(|_| {
            ParseError::invalid_literal(format!("Invalid number {digits}"), self.location(span))
        })?;
        if negative {
            value = -value;
        }
        let unit = match self.peek_kind() {
            Some(TokenKind::Str(unit)) => {
                let unit = unit.clone();
                self.advance();
                Some(unit)
            }
            _ => None,
        };
        Ok(Quantity { value, unit })
    }

    fn integer_literal(&mut self) -> ParseResult<i64> {
        let Some(Token {
            kind: TokenKind::Number(digits),
            span,
        }) = self.peek().cloned()
        else {
            return Err(self.unexpected("an integer"));
        };
        self.advance();
        digits.parse().map_err(|_| {
            ParseError::invalid_literal(format!("Expected an integer, found {digits}"), self.location(span))
        })
    }
}

/// Tokens that end a query: set operators and closing of an enclosing group
fn is_set_keyword(kind: &TokenKind) -> bool {
    matches!(kind, TokenKind::Ident(word) if matches!(word.as_str(), "union" | "intersect" | "except"))
        || matches!(kind, TokenKind::Symbol(Symbol::Pipe))
}
