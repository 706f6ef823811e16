//! Value ranges: the possible values of a group of variables.
//!
//! A [`ValueRange`] accumulates, per variable, the set of values observed
//! across assignments, and can linearize those sets into the cartesian
//! product of concrete assignments. Rule grounding uses this to expand
//! underspecified conditions into their alternative instantiations.

use std::collections::BTreeSet;

use indexmap::IndexMap;
use itertools::Itertools;
use rustc_hash::FxBuildHasher;

use crate::state::Assignment;
use crate::values::Value;

/// Mapping from variable names to their possible values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueRange {
    ranges: IndexMap<String, BTreeSet<Value>, FxBuildHasher>,
}

impl ValueRange {
    pub fn new() -> ValueRange {
        ValueRange {
            ranges: IndexMap::default(),
        }
    }

    /// Builds a range from a collection of assignments.
    pub fn from_assignments<'a>(assignments: impl IntoIterator<Item = &'a Assignment>) -> ValueRange {
        let mut r = ValueRange::new();
        for a in assignments {
            r.add_assignment(a);
        }
        r
    }

    /// Records every pair of the assignment.
    pub fn add_assignment(&mut self, assignment: &Assignment) {
        for (var, val) in assignment.iter() {
            self.add_value(var, val.clone());
        }
    }

    /// Records one possible value for a variable.
    pub fn add_value(&mut self, var: &str, value: Value) {
        self.ranges.entry(var.to_string()).or_default().insert(value);
    }

    /// Records several possible values for a variable.
    pub fn add_values(&mut self, var: &str, values: impl IntoIterator<Item = Value>) {
        self.ranges
            .entry(var.to_string())
            .or_default()
            .extend(values);
    }

    /// Merges another range into this one (per-variable set union).
    pub fn extend(&mut self, other: &ValueRange) {
        for (var, vals) in &other.ranges {
            self.ranges
                .entry(var.clone())
                .or_default()
                .extend(vals.iter().cloned());
        }
    }

    pub fn get_values(&self, var: &str) -> Option<&BTreeSet<Value>> {
        self.ranges.get(var)
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Number of variables in the range.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Expands the range into the cartesian product of assignments.
    ///
    /// The empty range linearizes to the single empty assignment. A variable
    /// with an empty value set makes the product empty.
    pub fn linearize(&self) -> Vec<Assignment> {
        if self.ranges.is_empty() {
            return vec![Assignment::new()];
        }
        let vars: Vec<&str> = self.ranges.keys().map(String::as_str).collect();
        self.ranges
            .values()
            .map(|set| set.iter())
            .multi_cartesian_product()
            .map(|combo| {
                let mut a = Assignment::new();
                for (var, val) in vars.iter().zip(combo) {
                    a.add_pair(*var, val.clone());
                }
                a
            })
            .collect()
    }
}

// ============================================================================
// Tests
// ============================================================================
