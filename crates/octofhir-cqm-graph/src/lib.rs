//! Dependency ordering of library defines
//!
//! [`build`] turns the reference lists the parser records on each define
//! into an [`EvaluationOrder`]: every define appears after the defines it
//! references. Both execution paths walk this order.

mod error;
mod order;

pub use error::{GraphError, GraphResult};
pub use order::{EvaluationOrder, build};
