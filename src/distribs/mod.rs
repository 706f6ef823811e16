//! # Probability Distributions
//!
//! This module implements the distribution family over tagged values.
//!
//! ## Key Components
//!
//! - **SingleValueDistribution**: point mass, P(X=v) = 1
//! - **CategoricalTable** (+ builder): unconditional discrete table with
//!   nearest-neighbour fallback for continuous-like tables
//! - **ConditionalTable** (+ builder): one sub-distribution per conditioning
//!   assignment, with a wildcard default row
//! - **MultivariateTable** (+ builder): joint discrete table over full
//!   assignments
//! - **MarginalDistribution**: P(X|Y) = Σ_z P(X|Y,Z=z)·P(Z=z), integrating
//!   out latent variables
//!
//! ## Design
//!
//! Distributions are built once through their builders, which validate row
//! probabilities and normalize total mass, and are treated as immutable
//! value objects afterwards. The two sanctioned in-place transforms,
//! [`ProbDistribution::prune_values`] and
//! [`ProbDistribution::modify_variable_id`], take `&mut self`, so exclusive
//! access is compiler-enforced; read paths are safe under concurrent shared
//! access and the lazy sampling index is a `OnceLock` populated
//! idempotently.

use std::collections::BTreeSet;
use std::fmt;

use crate::errors::DialError;
use crate::state::Assignment;
use crate::values::Value;

pub mod categorical;
pub mod conditional;
pub mod marginal;
pub mod multivariate;
pub mod single;

pub use categorical::{CategoricalTable, CategoricalTableBuilder};
pub use conditional::{ConditionalTable, ConditionalTableBuilder};
pub use marginal::MarginalDistribution;
pub use multivariate::{MultivariateTable, MultivariateTableBuilder};
pub use single::SingleValueDistribution;

/// Tolerance on total probability mass.
///
/// Builders accept masses in `[1 - PROB_EPSILON, 1 + PROB_EPSILON]` as
/// already normalized; below the window the missing mass goes to a none
/// row, above it the rows are rescaled proportionally.
pub const PROB_EPSILON: f64 = 0.01;

/// Distribution of one head variable given zero or more input variables.
pub trait ProbDistribution: fmt::Debug + fmt::Display + Send + Sync {
    /// Label of the head (output) variable.
    fn get_variable(&self) -> &str;

    /// Labels of the conditioning (input) variables.
    fn get_input_variables(&self) -> BTreeSet<String>;

    /// P(head | condition). Unknown conditions or values yield 0.
    fn get_prob(&self, condition: &Assignment, head: &Value) -> f64;

    /// The distribution over the head variable under `condition`.
    fn get_prob_distrib(
        &self,
        condition: &Assignment,
    ) -> Result<Box<dyn IndependentDistribution>, DialError>;

    /// Draws a head value under `condition`.
    fn sample(&self, condition: &Assignment) -> Result<Value, DialError>;

    /// Every head value with recorded probability mass.
    fn get_values(&self) -> BTreeSet<Value>;

    /// The distribution after conditioning on a (possibly partial)
    /// assignment of input variables.
    fn get_posterior(&self, condition: &Assignment)
        -> Result<Box<dyn ProbDistribution>, DialError>;

    /// Drops head values below `threshold` and renormalizes.
    ///
    /// Returns true if anything was removed. Idempotent at a fixed
    /// threshold.
    fn prune_values(&mut self, threshold: f64) -> bool;

    /// Renames a variable wherever it occurs in the distribution.
    fn modify_variable_id(&mut self, old_id: &str, new_id: &str);

    /// Clones through the trait object.
    fn clone_box(&self) -> Box<dyn ProbDistribution>;
}

impl Clone for Box<dyn ProbDistribution> {
    fn clone(&self) -> Box<dyn ProbDistribution> {
        self.clone_box()
    }
}

/// Unconditional distribution over a single variable.
pub trait IndependentDistribution: ProbDistribution {
    /// P(head), with no conditioning context.
    fn prob_of(&self, head: &Value) -> f64;

    /// Draws a value without conditioning context.
    fn sample_value(&self) -> Result<Value, DialError>;

    /// The most probable value.
    ///
    /// Ties break toward the smaller value; an empty table is an error.
    fn get_best(&self) -> Result<Value, DialError>;

    /// A categorical-table view of this distribution.
    fn to_discrete(&self) -> CategoricalTable;

    /// Clones through the trait object.
    fn clone_independent(&self) -> Box<dyn IndependentDistribution>;
}

impl Clone for Box<dyn IndependentDistribution> {
    fn clone(&self) -> Box<dyn IndependentDistribution> {
        self.clone_independent()
    }
}

/// Joint distribution over several variables simultaneously.
pub trait MultivariateDistribution: fmt::Debug + fmt::Display + Send + Sync {
    /// Labels of the covered variables.
    fn get_variables(&self) -> BTreeSet<String>;

    /// P(assignment); rows are full assignments.
    fn get_prob(&self, assignment: &Assignment) -> f64;

    /// Draws a full assignment.
    fn sample(&self) -> Result<Assignment, DialError>;

    /// Every row assignment with recorded probability mass.
    fn get_values(&self) -> Vec<Assignment>;

    /// Projects the joint onto a single variable.
    fn get_marginal(&self, variable: &str) -> Box<dyn IndependentDistribution>;

    /// Drops rows below `threshold` and renormalizes.
    fn prune_values(&mut self, threshold: f64) -> bool;

    /// Renames a variable wherever it occurs.
    fn modify_variable_id(&mut self, old_id: &str, new_id: &str);

    /// Clones through the trait object.
    fn clone_multivariate(&self) -> Box<dyn MultivariateDistribution>;
}

impl Clone for Box<dyn MultivariateDistribution> {
    fn clone(&self) -> Box<dyn MultivariateDistribution> {
        self.clone_multivariate()
    }
}
