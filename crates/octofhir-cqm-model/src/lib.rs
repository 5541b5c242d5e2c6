//! Data model for measure evaluation
//!
//! This crate defines what both execution paths read:
//! - [`ClinicalDataSnapshot`]: patients and clinical resources held in memory
//! - [`SchemaDescriptor`]: where the same data lives in a relational store
//! - Scalar values ([`Interval`], [`Quantity`], date-times) and the
//!   [`Parameters`] a caller supplies for a run

mod parameters;
mod schema;
mod snapshot;
mod value;

pub use parameters::*;
pub use schema::*;
pub use snapshot::*;
pub use value::*;
