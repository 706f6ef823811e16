//! Variable-to-value assignments and per-variable value ranges.
//!
//! [`Assignment`] is the currency passed between conditions, effects, and
//! distributions; [`ValueRange`] collects the possible values of several
//! variables and linearizes them into concrete assignments.

pub mod assignment;
pub mod range;

pub use assignment::Assignment;
pub use range::ValueRange;
