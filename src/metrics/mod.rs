//! Record-level time metrics.
//!
//! Each record gets a resolved start of work, a processing time (PT), a
//! standard time (ST) and a completion status. Records missing the inputs
//! for a metric get a null value rather than an error.

pub mod completion;
pub mod enrich;
pub mod operation;
pub mod processing;
pub mod standard;
pub mod time_basis;
pub mod utility;

/// Why a derived metric is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unavailable {
    /// A required timestamp, quantity or rate is absent.
    MissingInput,
    /// Track-out is at or before the resolved start.
    InvalidInterval,
}
