//! Error types for value parsing, distribution construction, and rule evaluation.

use thiserror::Error;

/// Errors that can occur while parsing values, building distributions,
/// sampling, or grounding rules.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Not every anomaly is an error: ill-formed but recoverable situations
/// (a missing parameter variable, an effect value that fails to ground, a
/// posterior key collision) log a warning through `tracing` and fall back to
/// a documented default instead of returning one of these variants.
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum DialError {
    /// Syntax error while parsing a value, assignment, effect, or
    /// mathematical expression.
    ///
    /// Contains a human-readable description, typically with line/column
    /// information from Pest when the source is an expression.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input to a constructor or builder.
    ///
    /// Covers probabilities outside [0, 1], unresolved custom-value or
    /// function registrations, and structurally impossible requests such as
    /// asking the best row of an empty table.
    #[error("validation error: {0}")]
    Validation(String),

    /// Sampling from a distribution with no usable probability mass.
    ///
    /// Raised when every row has vanishing weight, so no interval can be
    /// constructed to draw from.
    #[error("sampling error: {0}")]
    Sampling(String),

    /// Concatenation of two values with no defined combination.
    #[error("concatenation error: {0}")]
    Concatenation(String),

    /// Numerical stability error.
    ///
    /// Indicates NaN weights, non-finite probabilities, or other numeric
    /// states the algorithms cannot recover from.
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal invariant violation.
    ///
    /// This should be used only for programmer errors, not user errors.
    #[error("internal error: {0}")]
    Internal(String),
}
