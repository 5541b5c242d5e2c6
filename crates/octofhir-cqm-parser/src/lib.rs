//! Measure library parser using Winnow
//!
//! A Winnow tokenizer turns library text into spanned tokens; a
//! recursive-descent parser over those tokens builds the
//! [`Library`](octofhir_cqm_ast::Library) tree with its defines, their
//! reference lists and type hints.

mod error;
mod expression;
mod lexer;
mod library;
mod parser;
mod validate;

pub use error::{ParseError, ParseResult};
pub use lexer::{LexError, LexErrorKind, Symbol, Token, TokenKind, tokenize};
pub use library::parse;
pub use validate::{ValidationReport, validate};
