//! Diagnostics shared by every stage of the measure engine
//!
//! Each stage (parser, graph builder, terminology, evaluator, SQL compiler)
//! owns its own error enum; this crate supplies what they have in common:
//! structured error codes, byte spans with line/column resolution, and
//! non-fatal diagnostics such as parse warnings.

mod diagnostic;
mod error_code;
mod span;

pub use diagnostic::*;
pub use error_code::*;
pub use span::*;
