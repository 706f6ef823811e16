//! # Probdial - Probabilistic Dialogue Rule Core
//!
//! Probdial implements the probabilistic core of a dialogue manager: tagged
//! values for random variables, discrete probability distributions over
//! those values, and template-grounded rules that turn symbolic conditions
//! and effects into distributions.
//!
//! ## Architecture
//!
//! The system is organized into several modules:
//!
//! - **values**: the tagged value algebra and its parsing factory
//! - **templates**: `{slot}` string patterns with matching and filling
//! - **state**: assignments of values to variables, and value ranges
//! - **sampling**: weighted sampling over cumulative intervals
//! - **distribs**: the distribution family and its builders
//! - **rules**: conditions, effects, parameters and rule evaluation
//! - **errors**: the crate-wide error type
//!
//! ## Usage
//!
//! ```rust,ignore
//! use probdial::distribs::CategoricalTableBuilder;
//! use probdial::values::Value;
//!
//! let mut builder = CategoricalTableBuilder::new("weather");
//! builder.add_row(Value::from_string("sunny"), 0.7)?;
//! builder.add_row(Value::from_string("rainy"), 0.3)?;
//! let weather = builder.build();
//! ```

#![forbid(unsafe_code)]

pub mod distribs;
pub mod errors;
pub mod rules;
pub mod sampling;
pub mod state;
pub mod templates;
pub mod values;

// Re-export commonly used types
pub use errors::DialError;
pub use state::Assignment;
pub use templates::Template;
pub use values::{Value, ValueFactory};
