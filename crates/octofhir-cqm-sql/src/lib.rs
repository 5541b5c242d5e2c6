//! SQL compilation of measure libraries
//!
//! The same dependency-ordered defines the interpreter evaluates are lowered
//! to one SQL statement over a flattened relational layout described by a
//! [`SchemaDescriptor`](octofhir_cqm_model::SchemaDescriptor). Coded filters
//! use the literal code lists of the run's
//! [`ResolvedTerminology`](octofhir_cqm_terminology::ResolvedTerminology), so
//! both execution paths see identical value set contents.
//!
//! # Example
//!
//! ```ignore
//! use octofhir_cqm_sql::{SqlCompiler, SqlDialect};
//!
//! let statement = SqlCompiler::new(&schema)
//!     .with_dialect(SqlDialect::Spark)
//!     .compile(&library, &order, &resolver, &parameters)
//!     .await?;
//! println!("{statement}");
//! ```
//!
//! Executing the statement yields `(population, subject_count)` rows. The
//! [`SqlExecutor`] trait abstracts the backend; the `sqlite` feature provides
//! [`SqliteExecutor`].

mod compiler;
mod dialect;
mod error;
mod executor;
#[cfg(feature = "sqlite")]
mod sqlite;
mod statement;

pub use compiler::{SqlCompiler, compile, compile_resolved};
pub use dialect::SqlDialect;
pub use error::{CompileError, CompileResult, SqlExecutionError};
pub use executor::SqlExecutor;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteExecutor;
pub use statement::{PopulationCount, SqlStatement};
