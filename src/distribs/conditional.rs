//! # Conditional Tables
//!
//! A [`ConditionalTable`] represents P(X | Y1..Yn) as one independent
//! sub-distribution per conditioning assignment. Lookups trim the incoming
//! condition to the variables the table actually conditions on, then resolve
//! in three steps:
//!
//! 1. exact match on the trimmed condition
//! 2. a row keyed by the empty assignment, acting as a wildcard
//! 3. for probability lookups only, a fully-default condition sums the head
//!    probability across every row (a rough marginal); anything else is 0
//!
//! [`ConditionalTableBuilder`] accumulates rows per condition and collapses
//! to the underlying independent distribution when only the unconditioned
//! row exists.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;

use crate::distribs::categorical::CategoricalTableBuilder;
use crate::distribs::{IndependentDistribution, ProbDistribution};
use crate::errors::DialError;
use crate::state::Assignment;
use crate::values::{format_short, Value};

/// Discrete distribution P(head | conditions) as a two-level table.
#[derive(Debug, Clone)]
pub struct ConditionalTable {
    head_var: String,
    cond_vars: BTreeSet<String>,
    table: FxHashMap<Assignment, Box<dyn IndependentDistribution>>,
}

impl ConditionalTable {
    pub fn new(head_var: impl Into<String>) -> ConditionalTable {
        ConditionalTable {
            head_var: head_var.into(),
            cond_vars: BTreeSet::new(),
            table: FxHashMap::default(),
        }
    }

    /// Attaches the distribution for one conditioning assignment.
    ///
    /// The sub-distribution must be over this table's head variable.
    pub fn add_distrib(
        &mut self,
        condition: Assignment,
        distrib: Box<dyn IndependentDistribution>,
    ) -> Result<(), DialError> {
        if distrib.get_variable() != self.head_var {
            return Err(DialError::Validation(format!(
                "sub-distribution over '{}' cannot be attached to table over '{}'",
                distrib.get_variable(),
                self.head_var
            )));
        }
        self.cond_vars
            .extend(condition.variables().map(str::to_string));
        self.table.insert(condition, distrib);
        Ok(())
    }

    /// Number of conditioning rows.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    fn trim(&self, condition: &Assignment) -> Assignment {
        condition.trim_to(self.cond_vars.iter().map(String::as_str))
    }

    /// Exact row, falling back to the empty-assignment wildcard row.
    fn row_for(&self, trimmed: &Assignment) -> Option<&dyn IndependentDistribution> {
        if let Some(sub) = self.table.get(trimmed) {
            return Some(sub.as_ref());
        }
        if !trimmed.is_empty() {
            if let Some(sub) = self.table.get(&Assignment::new()) {
                return Some(sub.as_ref());
            }
        }
        None
    }
}

impl ProbDistribution for ConditionalTable {
    fn get_variable(&self) -> &str {
        &self.head_var
    }

    fn get_input_variables(&self) -> BTreeSet<String> {
        self.cond_vars.clone()
    }

    fn get_prob(&self, condition: &Assignment, head: &Value) -> f64 {
        let trimmed = self.trim(condition);
        if let Some(sub) = self.row_for(&trimmed) {
            return sub.prob_of(head);
        }
        if trimmed.is_default() {
            // No information on the condition: sum over every row.
            return self.table.values().map(|sub| sub.prob_of(head)).sum();
        }
        0.0
    }

    fn get_prob_distrib(
        &self,
        condition: &Assignment,
    ) -> Result<Box<dyn IndependentDistribution>, DialError> {
        let trimmed = self.trim(condition);
        self.row_for(&trimmed)
            .map(|sub| sub.clone_independent())
            .ok_or_else(|| {
                DialError::Validation(format!(
                    "no distribution for '{}' under condition '{}'",
                    self.head_var, trimmed
                ))
            })
    }

    fn sample(&self, condition: &Assignment) -> Result<Value, DialError> {
        let trimmed = self.trim(condition);
        match self.row_for(&trimmed) {
            Some(sub) => sub.sample_value(),
            None => {
                tracing::warn!(variable = %self.head_var, condition = %trimmed,
                    "no row for condition, sampling none");
                Ok(Value::None)
            }
        }
    }

    fn get_values(&self) -> BTreeSet<Value> {
        self.table
            .values()
            .flat_map(|sub| sub.get_values())
            .collect()
    }

    fn get_posterior(
        &self,
        condition: &Assignment,
    ) -> Result<Box<dyn ProbDistribution>, DialError> {
        let trimmed = self.trim(condition);
        if let Some(sub) = self.table.get(&trimmed) {
            return Ok(sub.clone_box());
        }
        let mut posterior = ConditionalTable::new(&self.head_var);
        for (key, sub) in &self.table {
            if !key.consistent_with(&trimmed) {
                continue;
            }
            let remaining: Assignment = key
                .iter()
                .filter(|(var, _)| !trimmed.contains_var(var))
                .map(|(var, val)| (var.to_string(), val.clone()))
                .collect();
            if posterior.table.contains_key(&remaining) {
                tracing::warn!(variable = %self.head_var, condition = %remaining,
                    "overlapping rows in posterior, keeping the first");
                continue;
            }
            posterior.add_distrib(remaining, sub.clone_independent())?;
        }
        Ok(Box::new(posterior))
    }

    fn prune_values(&mut self, threshold: f64) -> bool {
        let mut changed = false;
        for sub in self.table.values_mut() {
            changed |= sub.prune_values(threshold);
        }
        changed
    }

    fn modify_variable_id(&mut self, old_id: &str, new_id: &str) {
        if self.head_var == old_id {
            self.head_var = new_id.to_string();
        }
        if self.cond_vars.remove(old_id) {
            self.cond_vars.insert(new_id.to_string());
        }
        let rows = std::mem::take(&mut self.table);
        for (key, mut sub) in rows {
            let key: Assignment = key
                .iter()
                .map(|(var, val)| {
                    let var = if var == old_id { new_id } else { var };
                    (var.to_string(), val.clone())
                })
                .collect();
            sub.modify_variable_id(old_id, new_id);
            self.table.insert(key, sub);
        }
    }

    fn clone_box(&self) -> Box<dyn ProbDistribution> {
        Box::new(self.clone())
    }
}

impl fmt::Display for ConditionalTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut conditions: Vec<&Assignment> = self.table.keys().collect();
        conditions.sort_by_key(|c| c.to_string());
        let mut lines = Vec::new();
        for condition in conditions {
            if let Some(sub) = self.table.get(condition) {
                let discrete = sub.to_discrete();
                for value in discrete.get_values() {
                    let p = discrete.prob_of(&value);
                    if condition.is_empty() {
                        lines.push(format!(
                            "P({}={})={}",
                            self.head_var,
                            value,
                            format_short(p)
                        ));
                    } else {
                        lines.push(format!(
                            "P({}={}|{})={}",
                            self.head_var,
                            value,
                            condition,
                            format_short(p)
                        ));
                    }
                }
            }
        }
        write!(f, "{}", lines.join("\n"))
    }
}

/// Accumulates per-condition rows for a [`ConditionalTable`].
#[derive(Debug, Clone)]
pub struct ConditionalTableBuilder {
    head_var: String,
    rows: FxHashMap<Assignment, CategoricalTableBuilder>,
}

impl ConditionalTableBuilder {
    pub fn new(head_var: impl Into<String>) -> ConditionalTableBuilder {
        ConditionalTableBuilder {
            head_var: head_var.into(),
            rows: FxHashMap::default(),
        }
    }

    fn row_builder(&mut self, condition: Assignment) -> &mut CategoricalTableBuilder {
        let head_var = self.head_var.clone();
        self.rows
            .entry(condition)
            .or_insert_with(|| CategoricalTableBuilder::new(head_var))
    }

    /// Sets P(head=value | condition), replacing any previous row.
    pub fn add_row(
        &mut self,
        condition: Assignment,
        value: Value,
        prob: f64,
    ) -> Result<&mut Self, DialError> {
        self.row_builder(condition).add_row(value, prob)?;
        Ok(self)
    }

    /// Adds mass to P(head=value | condition).
    pub fn increment_row(
        &mut self,
        condition: Assignment,
        value: Value,
        prob: f64,
    ) -> Result<&mut Self, DialError> {
        self.row_builder(condition).increment_row(value, prob)?;
        Ok(self)
    }

    pub fn remove_row(&mut self, condition: &Assignment, value: &Value) -> Option<f64> {
        self.rows.get_mut(condition).and_then(|b| b.remove_row(value))
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Advisory check that every conditioning row has mass within epsilon
    /// of 1.
    pub fn is_well_formed(&self) -> bool {
        self.rows.values().all(CategoricalTableBuilder::is_well_formed)
    }

    pub fn normalize(&mut self) {
        for b in self.rows.values_mut() {
            b.normalize();
        }
    }

    /// Finalizes the table. A lone unconditioned row collapses to its
    /// independent distribution.
    pub fn build(mut self) -> Result<Box<dyn ProbDistribution>, DialError> {
        if self.rows.len() == 1 {
            if let Some(lone) = self.rows.remove(&Assignment::new()) {
                return Ok(lone.build_prob());
            }
        }
        let mut table = ConditionalTable::new(self.head_var);
        for (condition, builder) in self.rows {
            table.add_distrib(condition, builder.build())?;
        }
        Ok(Box::new(table))
    }
}

// ============================================================================
// Tests
// ============================================================================
