//! # Categorical Tables
//!
//! A [`CategoricalTable`] is an unconditional discrete distribution over the
//! values of one variable. Tables are assembled through
//! [`CategoricalTableBuilder`], which validates row probabilities and
//! normalizes total mass at build time:
//!
//! - mass below `1 - PROB_EPSILON` is topped up with a none row, so "no
//!   information" keeps the unaccounted remainder
//! - mass above `1 + PROB_EPSILON` is rescaled proportionally
//! - a table that normalizes to a single row collapses to a
//!   [`SingleValueDistribution`]
//!
//! Lookup on a continuous-like table (every value a double, array, or none)
//! falls back to the nearest stored point, approximating density lookup for
//! discretized continuous variables. The sampling index is built lazily and
//! discarded on every mutation.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::OnceLock;

use rustc_hash::FxHashMap;

use crate::distribs::single::SingleValueDistribution;
use crate::distribs::{IndependentDistribution, ProbDistribution, PROB_EPSILON};
use crate::errors::DialError;
use crate::sampling::Intervals;
use crate::state::Assignment;
use crate::values::{format_short, Value};

/// Discrete distribution P(variable) as a value-to-probability table.
#[derive(Debug, Clone)]
pub struct CategoricalTable {
    variable: String,
    table: FxHashMap<Value, f64>,
    /// Lazily built sampling index; `None` once building failed.
    intervals: OnceLock<Option<Intervals<Value>>>,
}

impl CategoricalTable {
    pub(crate) fn from_map(variable: String, table: FxHashMap<Value, f64>) -> CategoricalTable {
        CategoricalTable {
            variable,
            table,
            intervals: OnceLock::new(),
        }
    }

    /// Builds a table directly from rows, without validation or
    /// normalization. [`CategoricalTableBuilder`] is the checked path.
    pub fn from_rows(
        variable: &str,
        rows: impl IntoIterator<Item = (Value, f64)>,
    ) -> CategoricalTable {
        CategoricalTable::from_map(variable.to_string(), rows.into_iter().collect())
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// True when the table carries no information: either no rows at all or
    /// a lone none row.
    pub fn is_empty(&self) -> bool {
        match self.table.len() {
            0 => true,
            1 => self.table.keys().all(Value::is_none),
            _ => false,
        }
    }

    /// A new table keeping only the `n` most probable rows, without
    /// renormalization.
    ///
    /// Ties break deterministically toward the smaller value.
    pub fn get_n_best(&self, n: usize) -> CategoricalTable {
        let rows = self
            .ranked_rows()
            .into_iter()
            .take(n)
            .map(|(v, p)| (v.clone(), p));
        CategoricalTable::from_rows(&self.variable, rows)
    }

    /// Rows ordered by descending probability, then ascending value.
    fn ranked_rows(&self) -> Vec<(&Value, f64)> {
        let mut rows: Vec<(&Value, f64)> = self.table.iter().map(|(v, p)| (v, *p)).collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        rows
    }

    /// True when every row value is numeric-like, making nearest-neighbour
    /// lookup meaningful.
    fn is_continuous_like(&self) -> bool {
        self.table.len() > 1
            && self
                .table
                .keys()
                .all(|v| matches!(v, Value::Double(_) | Value::Array(_) | Value::None))
    }

    /// Probability of the stored point nearest to `head`.
    fn nearest_prob(&self, head: &Value) -> Option<f64> {
        let mut best: Option<(f64, f64)> = None;
        for (v, p) in &self.table {
            let d = match (v, head) {
                (Value::Double(a), Value::Double(b)) => (a - b).abs(),
                (Value::Array(a), Value::Array(b)) if a.len() == b.len() => a
                    .iter()
                    .zip(b.iter())
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f64>()
                    .sqrt(),
                _ => continue,
            };
            if best.map(|(bd, _)| d < bd).unwrap_or(true) {
                best = Some((d, *p));
            }
        }
        best.map(|(_, p)| p)
    }

    fn sampling_index(&self) -> &Option<Intervals<Value>> {
        self.intervals.get_or_init(|| {
            match Intervals::from_pairs(self.table.iter().map(|(v, p)| (v.clone(), *p))) {
                Ok(iv) => Some(iv),
                Err(e) => {
                    tracing::warn!(variable = %self.variable, error = %e,
                        "cannot build sampling intervals");
                    None
                }
            }
        })
    }
}

impl ProbDistribution for CategoricalTable {
    fn get_variable(&self) -> &str {
        &self.variable
    }

    fn get_input_variables(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    fn get_prob(&self, _condition: &Assignment, head: &Value) -> f64 {
        self.prob_of(head)
    }

    fn get_prob_distrib(
        &self,
        _condition: &Assignment,
    ) -> Result<Box<dyn IndependentDistribution>, DialError> {
        Ok(self.clone_independent())
    }

    fn sample(&self, _condition: &Assignment) -> Result<Value, DialError> {
        self.sample_value()
    }

    fn get_values(&self) -> BTreeSet<Value> {
        self.table.keys().cloned().collect()
    }

    fn get_posterior(
        &self,
        _condition: &Assignment,
    ) -> Result<Box<dyn ProbDistribution>, DialError> {
        Ok(self.clone_box())
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
        if self.variable == old_id {
            self.variable = new_id.to_string();
        }
    }

    fn clone_box(&self) -> Box<dyn ProbDistribution> {
        Box::new(self.clone())
    }
}

impl IndependentDistribution for CategoricalTable {
    fn prob_of(&self, head: &Value) -> f64 {
        if let Some(p) = self.table.get(head) {
            return *p;
        }
        if self.is_continuous_like() {
            if let Some(p) = self.nearest_prob(head) {
                return p;
            }
        }
        0.0
    }

    fn sample_value(&self) -> Result<Value, DialError> {
        match self.sampling_index() {
            Some(iv) => match iv.sample() {
                Ok(v) => Ok(v.clone()),
                Err(e) => {
                    tracing::warn!(variable = %self.variable, error = %e,
                        "sampling failed, returning none");
                    Ok(Value::None)
                }
            },
            None => Ok(Value::None),
        }
    }

    fn get_best(&self) -> Result<Value, DialError> {
        self.ranked_rows()
            .first()
            .map(|(v, _)| (*v).clone())
            .ok_or_else(|| {
                DialError::Validation(format!("no best value in empty table '{}'", self.variable))
            })
    }

    fn to_discrete(&self) -> CategoricalTable {
        self.clone()
    }

    fn clone_independent(&self) -> Box<dyn IndependentDistribution> {
        Box::new(self.clone())
    }
}

impl PartialEq for CategoricalTable {
    fn eq(&self, other: &Self) -> bool {
        self.variable == other.variable
            && self.table.len() == other.table.len()
            && self.table.iter().all(|(v, p)| {
                other
                    .table
                    .get(v)
                    .map(|q| (p - q).abs() < 1e-9)
                    .unwrap_or(false)
            })
    }
}

impl fmt::Display for CategoricalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rows = self.ranked_rows();
        for (i, (v, p)) in rows.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "P({}={})={}", self.variable, v, format_short(*p))?;
        }
        Ok(())
    }
}

/// Accumulates rows for a [`CategoricalTable`].
#[derive(Debug, Clone)]
pub struct CategoricalTableBuilder {
    variable: String,
    table: FxHashMap<Value, f64>,
}

/// Concrete outcome of a build, before boxing.
pub(crate) enum Built {
    Single(SingleValueDistribution),
    Table(CategoricalTable),
}

impl CategoricalTableBuilder {
    pub fn new(variable: impl Into<String>) -> CategoricalTableBuilder {
        CategoricalTableBuilder {
            variable: variable.into(),
            table: FxHashMap::default(),
        }
    }

    /// Sets a row, replacing any previous probability for the value.
    pub fn add_row(&mut self, value: Value, prob: f64) -> Result<&mut Self, DialError> {
        validate_prob(prob)?;
        self.table.insert(value, prob);
        Ok(self)
    }

    /// Adds probability mass to a row, creating it if absent.
    pub fn increment_row(&mut self, value: Value, prob: f64) -> Result<&mut Self, DialError> {
        validate_prob(prob)?;
        *self.table.entry(value).or_insert(0.0) += prob;
        Ok(self)
    }

    pub fn remove_row(&mut self, value: &Value) -> Option<f64> {
        self.table.remove(value)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Total accumulated probability mass.
    pub fn total(&self) -> f64 {
        self.table.values().sum()
    }

    /// Advisory check that the mass is within epsilon of 1.
    pub fn is_well_formed(&self) -> bool {
        (self.total() - 1.0).abs() < PROB_EPSILON
    }

    /// Rescales all rows so the mass sums to 1.
    pub fn normalize(&mut self) {
        let total = self.total();
        if total <= 0.0 {
            tracing::warn!(variable = %self.variable, "cannot normalize zero-mass table");
            return;
        }
        for p in self.table.values_mut() {
            *p /= total;
        }
    }

    /// Finalizes the table, normalizing mass as documented at module level.
    pub fn build(self) -> Box<dyn IndependentDistribution> {
        match self.build_concrete() {
            Built::Single(d) => Box::new(d),
            Built::Table(t) => Box::new(t),
        }
    }

    /// Like [`CategoricalTableBuilder::build`], boxed as the general
    /// conditional contract.
    pub(crate) fn build_prob(self) -> Box<dyn ProbDistribution> {
        match self.build_concrete() {
            Built::Single(d) => Box::new(d),
            Built::Table(t) => Box::new(t),
        }
    }

    pub(crate) fn build_concrete(self) -> Built {
        let CategoricalTableBuilder {
            variable,
            mut table,
        } = self;
        let total: f64 = table.values().sum();
        if total < 1.0 - PROB_EPSILON {
            *table.entry(Value::None).or_insert(0.0) += 1.0 - total;
        } else if total > 1.0 + PROB_EPSILON {
            for p in table.values_mut() {
                *p /= total;
            }
        }
        if table.len() == 1 {
            match table.into_iter().next() {
                Some((value, _)) => Built::Single(SingleValueDistribution::new(variable, value)),
                None => Built::Single(SingleValueDistribution::new(variable, Value::None)),
            }
        } else {
            Built::Table(CategoricalTable::from_map(variable, table))
        }
    }
}

pub(crate) fn validate_prob(prob: f64) -> Result<(), DialError> {
    if prob.is_nan() {
        return Err(DialError::Numerical("NaN probability".to_string()));
    }
    if !(0.0..=1.0 + PROB_EPSILON).contains(&prob) {
        return Err(DialError::Validation(format!(
            "probability {prob} outside [0, 1]"
        )));
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn three_row_table() -> CategoricalTable {
        CategoricalTable::from_rows(
            "v",
            [
                (Value::from_string("a"), 0.5),
                (Value::from_string("b"), 0.3),
                (Value::from_string("c"), 0.2),
            ],
        )
    }

    #[test]
    fn exact_mass_adds_no_none_row() {
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("a"), 0.6).unwrap();
        b.add_row(Value::from_string("b"), 0.4).unwrap();
        assert!(b.is_well_formed());
        let d = b.build();
        assert_eq!(d.prob_of(&Value::None), 0.0);
        assert_eq!(d.prob_of(&Value::from_string("a")), 0.6);
    }

    #[test]
    fn missing_mass_goes_to_a_none_row() {
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("a"), 0.3).unwrap();
        b.add_row(Value::from_string("b"), 0.4).unwrap();
        let d = b.build();
        assert!((d.prob_of(&Value::None) - 0.3).abs() < 1e-9);
        assert_eq!(d.prob_of(&Value::from_string("a")), 0.3);
        assert_eq!(d.prob_of(&Value::from_string("b")), 0.4);
    }

    #[test]
    fn excess_mass_renormalizes_proportionally() {
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("a"), 0.9).unwrap();
        b.add_row(Value::from_string("b"), 0.9).unwrap();
        let d = b.build();
        assert!((d.prob_of(&Value::from_string("a")) - 0.5).abs() < 1e-9);
        assert!((d.prob_of(&Value::from_string("b")) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn single_full_row_collapses_to_point_mass() {
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("only"), 1.0).unwrap();
        match b.build_concrete() {
            Built::Single(d) => assert_eq!(*d.get_value(), Value::from_string("only")),
            Built::Table(_) => panic!("expected a point mass"),
        }
    }

    #[test]
    fn empty_builder_collapses_to_none_point_mass() {
        let b = CategoricalTableBuilder::new("v");
        match b.build_concrete() {
            Built::Single(d) => assert_eq!(*d.get_value(), Value::None),
            Built::Table(_) => panic!("expected a point mass"),
        }
    }

    #[test]
    fn partial_single_row_stays_a_table() {
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("a"), 0.5).unwrap();
        match b.build_concrete() {
            Built::Table(t) => {
                assert_eq!(t.len(), 2);
                assert!((t.prob_of(&Value::None) - 0.5).abs() < 1e-9);
            }
            Built::Single(_) => panic!("expected a table"),
        }
    }

    #[test]
    fn out_of_range_probabilities_are_rejected() {
        let mut b = CategoricalTableBuilder::new("v");
        assert!(matches!(
            b.add_row(Value::from_string("a"), -0.1),
            Err(DialError::Validation(_))
        ));
        assert!(matches!(
            b.add_row(Value::from_string("a"), 1.5),
            Err(DialError::Validation(_))
        ));
        assert!(matches!(
            b.add_row(Value::from_string("a"), f64::NAN),
            Err(DialError::Numerical(_))
        ));
    }

    #[test]
    fn increment_accumulates_mass() {
        let mut b = CategoricalTableBuilder::new("v");
        b.increment_row(Value::from_string("a"), 0.3).unwrap();
        b.increment_row(Value::from_string("a"), 0.3).unwrap();
        b.increment_row(Value::from_string("b"), 0.4).unwrap();
        let d = b.build();
        assert!((d.prob_of(&Value::from_string("a")) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn nearest_neighbour_lookup_on_array_tables() {
        let t = CategoricalTable::from_rows(
            "x",
            [
                (Value::Array(vec![0.2, 0.2]), 0.3),
                (Value::Array(vec![0.6, 0.6]), 0.4),
            ],
        );
        assert!((t.prob_of(&Value::Array(vec![0.25, 0.3])) - 0.3).abs() < 1e-9);
        assert!((t.prob_of(&Value::Array(vec![0.5, 0.4])) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn nearest_neighbour_lookup_on_double_tables() {
        let t = CategoricalTable::from_rows(
            "x",
            [(Value::Double(1.0), 0.7), (Value::Double(5.0), 0.3)],
        );
        assert!((t.prob_of(&Value::Double(1.4)) - 0.7).abs() < 1e-9);
        assert!((t.prob_of(&Value::Double(4.0)) - 0.3).abs() < 1e-9);
    }

    #[test]
    fn discrete_tables_do_not_use_nearest_neighbour() {
        let t = CategoricalTable::from_rows(
            "x",
            [
                (Value::from_string("a"), 0.5),
                (Value::Double(1.0), 0.5),
            ],
        );
        assert_eq!(t.prob_of(&Value::Double(1.2)), 0.0);
    }

    #[test]
    fn pruning_removes_renormalizes_and_reports() {
        let mut t = three_row_table();
        assert!(t.prune_values(0.25));
        assert_eq!(t.len(), 2);
        let pa = t.prob_of(&Value::from_string("a"));
        let pb = t.prob_of(&Value::from_string("b"));
        assert!((pa + pb - 1.0).abs() < 1e-9);
        assert!((pa - 0.625).abs() < 1e-9);
        // Same threshold again: nothing left to remove.
        assert!(!t.prune_values(0.25));
    }

    #[test]
    fn pruning_keeps_rows_at_the_threshold() {
        let mut t = three_row_table();
        // Only rows strictly below the threshold go, so 0.2 survives.
        assert!(!t.prune_values(0.2));
        assert_eq!(t.len(), 3);
        assert_eq!(t.prob_of(&Value::from_string("c")), 0.2);
    }

    #[test]
    fn n_best_keeps_top_rows_without_renormalizing() {
        let t = three_row_table();
        let top2 = t.get_n_best(2);
        assert_eq!(top2.len(), 2);
        assert_eq!(top2.prob_of(&Value::from_string("a")), 0.5);
        assert_eq!(top2.prob_of(&Value::from_string("b")), 0.3);
        assert_eq!(top2.prob_of(&Value::from_string("c")), 0.0);
    }

    #[test]
    fn best_value_breaks_ties_toward_smaller_value() {
        let t = CategoricalTable::from_rows(
            "x",
            [
                (Value::from_string("b"), 0.4),
                (Value::from_string("a"), 0.4),
                (Value::from_string("c"), 0.2),
            ],
        );
        assert_eq!(t.get_best().unwrap(), Value::from_string("a"));
    }

    #[test]
    fn best_of_empty_table_is_an_error() {
        let t = CategoricalTable::from_rows("x", []);
        assert!(matches!(t.get_best(), Err(DialError::Validation(_))));
    }

    #[test]
    fn emptiness_includes_the_lone_none_row() {
        assert!(CategoricalTable::from_rows("x", []).is_empty());
        assert!(CategoricalTable::from_rows("x", [(Value::None, 1.0)]).is_empty());
        assert!(!three_row_table().is_empty());
    }

    #[test]
    fn sampling_follows_the_table() {
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("a"), 0.3).unwrap();
        b.add_row(Value::from_string("b"), 0.7).unwrap();
        let d = b.build();
        let n = 10_000;
        let mut hits = 0;
        for _ in 0..n {
            if d.sample_value().unwrap() == Value::from_string("a") {
                hits += 1;
            }
        }
        let freq = hits as f64 / n as f64;
        assert!((freq - 0.3).abs() < 0.03, "freq = {freq}");
    }

    #[test]
    fn sampling_an_empty_table_degrades_to_none() {
        let t = CategoricalTable::from_rows("x", []);
        assert_eq!(t.sample_value().unwrap(), Value::None);
    }

    #[test]
    fn display_orders_rows_by_probability() {
        let t = CategoricalTable::from_rows(
            "v",
            [(Value::from_string("low"), 0.2), (Value::from_string("high"), 0.8)],
        );
        assert_eq!(t.to_string(), "P(v=high)=0.8\nP(v=low)=0.2");
    }
}
