//! Interpreted evaluation of measure libraries
//!
//! Defines are evaluated one by one in dependency order over an in-memory
//! [`ClinicalDataSnapshot`](octofhir_cqm_model::ClinicalDataSnapshot). Queries
//! yield populations (sets of patient ids); scalar defines yield intervals,
//! quantities or date-times that later defines read.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_cqm_eval::evaluate;
//!
//! let library = octofhir_cqm_parser::parse(source)?;
//! let order = octofhir_cqm_graph::build(&library)?;
//! let result = evaluate(&library, &order, &snapshot, &resolver, &parameters).await?;
//! println!("{:?}", result.count("Numerator"));
//! ```
//!
//! # Populations
//!
//! - A resource query selects the subjects of matching resources, whether or
//!   not they appear in the snapshot's patient list
//! - `exists` keeps the operand's subjects that are known patients
//! - `not` is every known patient outside the operand

mod context;
mod engine;
mod error;
mod query;
mod value;

pub use engine::{evaluate, evaluate_resolved};
pub use error::{EvalError, EvalResult};
pub use value::{DefineValue, PopulationResult};
