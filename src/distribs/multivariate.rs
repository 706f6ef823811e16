//! # Multivariate Tables
//!
//! A [`MultivariateTable`] is a joint discrete distribution whose rows are
//! full assignments over several variables at once. It supports projection
//! onto a single variable ([`MultivariateTable::get_marginal`]), argmax row
//! selection, and row extension with a fixed assignment, which is how a
//! conditioning context gets folded into a latent joint.
//!
//! [`MultivariateTableBuilder`] normalizes mass the same way the categorical
//! builder does, except that missing mass goes to the all-none default
//! assignment instead of a single none value.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::distribs::categorical::{validate_prob, CategoricalTable};
use crate::distribs::{IndependentDistribution, MultivariateDistribution, PROB_EPSILON};
use crate::errors::DialError;
use crate::sampling::Intervals;
use crate::state::Assignment;
use crate::values::{format_short, Value};

/// Joint discrete distribution P(X1..Xn) keyed by full assignments.
#[derive(Debug, Clone)]
pub struct MultivariateTable {
    head_vars: BTreeSet<String>,
    table: FxHashMap<Assignment, f64>,
    /// Lazily built sampling index; `None` once building failed.
    intervals: OnceLock<Option<Intervals<Assignment>>>,
}

impl MultivariateTable {
    pub(crate) fn from_map(table: FxHashMap<Assignment, f64>) -> MultivariateTable {
        let head_vars = table
            .keys()
            .flat_map(|a| a.variables().map(str::to_string))
            .collect();
        MultivariateTable {
            head_vars,
            table,
            intervals: OnceLock::new(),
        }
    }

    /// Builds a table directly from rows, without validation or
    /// normalization. [`MultivariateTableBuilder`] is the checked path.
    pub fn from_rows(rows: impl IntoIterator<Item = (Assignment, f64)>) -> MultivariateTable {
        MultivariateTable::from_map(rows.into_iter().collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Probability of one row, after trimming to the covered variables.
    pub fn get_prob_of_row(&self, row: &Assignment) -> f64 {
        let trimmed = row.trim_to(self.head_vars.iter().map(String::as_str));
        self.table.get(&trimmed).copied().unwrap_or(0.0)
    }

    /// The most probable row.
    ///
    /// Ties break deterministically toward the smaller assignment string.
    pub fn get_best(&self) -> Result<Assignment, DialError> {
        self.ranked_rows()
            .first()
            .map(|(a, _)| (*a).clone())
            .ok_or_else(|| {
                DialError::Validation("no best row in empty multivariate table".to_string())
            })
    }

    /// Right-extends every row with a fixed assignment.
    pub fn extend_rows(&mut self, extra: &Assignment) {
        if extra.is_empty() {
            return;
        }
        self.head_vars
            .extend(extra.variables().map(str::to_string));
        let rows = std::mem::take(&mut self.table);
        for (key, p) in rows {
            *self.table.entry(key.union(extra)).or_insert(0.0) += p;
        }
        self.intervals = OnceLock::new();
    }

    fn ranked_rows(&self) -> Vec<(&Assignment, f64)> {
        let mut rows: Vec<(&Assignment, f64)> = self.table.iter().map(|(a, p)| (a, *p)).collect();
        rows.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.to_string().cmp(&b.0.to_string()))
        });
        rows
    }

    fn sampling_index(&self) -> &Option<Intervals<Assignment>> {
        self.intervals.get_or_init(|| {
            match Intervals::from_pairs(self.table.iter().map(|(a, p)| (a.clone(), *p))) {
                Ok(iv) => Some(iv),
                Err(e) => {
                    tracing::warn!(error = %e, "cannot build sampling intervals over rows");
                    None
                }
            }
        })
    }
}

impl MultivariateDistribution for MultivariateTable {
    fn get_variables(&self) -> BTreeSet<String> {
        self.head_vars.clone()
    }

    fn get_prob(&self, assignment: &Assignment) -> f64 {
        self.get_prob_of_row(assignment)
    }

    fn sample(&self) -> Result<Assignment, DialError> {
        match self.sampling_index() {
            Some(iv) => match iv.sample() {
                Ok(a) => Ok(a.clone()),
                Err(e) => {
                    tracing::warn!(error = %e, "row sampling failed, returning default");
                    Ok(Assignment::default_for(
                        self.head_vars.iter().map(String::as_str),
                    ))
                }
            },
            None => Ok(Assignment::default_for(
                self.head_vars.iter().map(String::as_str),
            )),
        }
    }

    fn get_values(&self) -> Vec<Assignment> {
        self.table.keys().cloned().collect()
    }

    fn get_marginal(&self, variable: &str) -> Box<dyn IndependentDistribution> {
        let mut rows: FxHashMap<Value, f64> = FxHashMap::default();
        for (assign, p) in &self.table {
            let value = assign.get_value(variable).cloned().unwrap_or(Value::None);
            *rows.entry(value).or_insert(0.0) += p;
        }
        Box::new(CategoricalTable::from_map(variable.to_string(), rows))
    }

    fn prune_values(&mut self, threshold: f64) -> bool {
        let before = self.table.len();
        self.table.retain(|_, p| *p >= threshold);
        let changed = self.table.len() != before;
        if changed {
            let total: f64 = self.table.values().sum();
            if total > 0.0 {
                for p in self.table.values_mut() {
                    *p /= total;
                }
            }
            self.intervals = OnceLock::new();
        }
        changed
    }

    fn modify_variable_id(&mut self, old_id: &str, new_id: &str) {
        if self.head_vars.remove(old_id) {
            self.head_vars.insert(new_id.to_string());
        }
        let rows = std::mem::take(&mut self.table);
        for (key, p) in rows {
            let key: Assignment = key
                .iter()
                .map(|(var, val)| {
                    let var = if var == old_id { new_id } else { var };
                    (var.to_string(), val.clone())
                })
                .collect();
            *self.table.entry(key).or_insert(0.0) += p;
        }
        self.intervals = OnceLock::new();
    }

    fn clone_multivariate(&self) -> Box<dyn MultivariateDistribution> {
        Box::new(self.clone())
    }
}

impl PartialEq for MultivariateTable {
    fn eq(&self, other: &Self) -> bool {
        self.table.len() == other.table.len()
            && self.table.iter().all(|(a, p)| {
                other
                    .table
                    .get(a)
                    .map(|q| (p - q).abs() < 1e-9)
                    .unwrap_or(false)
            })
    }
}

impl fmt::Display for MultivariateTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.ranked_rows();
        for (i, (a, p)) in rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "P({})={}", a, format_short(*p))?;
        }
        Ok(())
    }
}

/// Accumulates rows for a [`MultivariateTable`].
#[derive(Debug, Clone, Default)]
pub struct MultivariateTableBuilder {
    table: FxHashMap<Assignment, f64>,
}

impl MultivariateTableBuilder {
    pub fn new() -> MultivariateTableBuilder {
        MultivariateTableBuilder::default()
    }

    /// Sets a row, replacing any previous probability for the assignment.
    pub fn add_row(&mut self, row: Assignment, prob: f64) -> Result<&mut Self, DialError> {
        validate_prob(prob)?;
        self.table.insert(row, prob);
        Ok(self)
    }

    /// Adds probability mass to a row, creating it if absent.
    pub fn increment_row(&mut self, row: Assignment, prob: f64) -> Result<&mut Self, DialError> {
        validate_prob(prob)?;
        *self.table.entry(row).or_insert(0.0) += prob;
        Ok(self)
    }

    pub fn remove_row(&mut self, row: &Assignment) -> Option<f64> {
        self.table.remove(row)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.table.values().sum()
    }

    /// Advisory check that the mass is within epsilon of 1.
    pub fn is_well_formed(&self) -> bool {
        (self.total() - 1.0).abs() < PROB_EPSILON
    }

    pub fn normalize(&mut self) {
        let total = self.total();
        if total <= 0.0 {
            tracing::warn!("cannot normalize zero-mass multivariate table");
            return;
        }
        for p in self.table.values_mut() {
            *p /= total;
        }
    }

    /// Finalizes the table. Missing mass goes to the all-none default row
    /// over the covered variables; excess mass is rescaled proportionally.
    pub fn build(self) -> MultivariateTable {
        let mut table = self.table;
        let total: f64 = table.values().sum();
        if total < 1.0 - PROB_EPSILON {
            let vars: BTreeSet<String> = table
                .keys()
                .flat_map(|a| a.variables().map(str::to_string))
                .collect();
            let default = Assignment::default_for(vars.iter().map(String::as_str));
            *table.entry(default).or_insert(0.0) += 1.0 - total;
        } else if total > 1.0 + PROB_EPSILON {
            for p in table.values_mut() {
                *p /= total;
            }
        }
        MultivariateTable::from_map(table)
    }
}

// ============================================================================
// Tests
// ============================================================================
