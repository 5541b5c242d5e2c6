//! Define/expression tree for measure libraries
//!
//! A parsed [`Library`] holds its terminology and parameter declarations and
//! an ordered list of [`Define`]s. Each define's body is an [`Expression`]
//! restricted to the operators both execution paths support; anything else
//! the parser recognises is kept as [`Expression::Unsupported`] so that
//! evaluation and compilation can report it instead of dropping it.

mod expression;
mod library;
mod operator;
mod query;

pub use expression::*;
pub use library::*;
pub use operator::*;
pub use query::*;

/// Literal values are the same scalar values parameters and defines hold
pub use octofhir_cqm_model::ScalarValue as Literal;

/// A node with source span information
pub type Spanned<T> = octofhir_cqm_diagnostics::Spanned<T>;

/// Type alias for boxed expressions
pub type BoxExpr = Box<Expression>;
