//! Terminology resolution for measure evaluation
//!
//! A [`TerminologySource`] answers `$expand`-style requests. The
//! [`TerminologyResolver`] sits in front of it with a TTL cache shared by
//! every evaluation, and [`TerminologyResolver::resolve_all`] produces the
//! [`ResolvedTerminology`] snapshot both execution paths read codes from.

mod error;
mod expansion;
mod resolver;
mod source;

pub use error::{TerminologyError, TerminologyResult};
pub use expansion::{ResolvedTerminology, ValueSetExpansion, ValueSetKey};
pub use resolver::{DEFAULT_FETCH_TIMEOUT, DEFAULT_TTL, TerminologyResolver};
pub use source::{InMemoryTerminologySource, SourceError, TerminologySource};
