//! Point-mass distributions.
//!
//! A [`SingleValueDistribution`] gives its one value probability 1. The
//! categorical builder collapses to this representation whenever exactly one
//! row survives normalization, so point masses skip the table machinery.

use std::collections::BTreeSet;
use std::fmt;

use crate::distribs::categorical::CategoricalTable;
use crate::distribs::{IndependentDistribution, ProbDistribution};
use crate::errors::DialError;
use crate::state::Assignment;
use crate::values::Value;

/// P(variable = value) = 1.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleValueDistribution {
    variable: String,
    value: Value,
}

impl SingleValueDistribution {
    pub fn new(variable: impl Into<String>, value: Value) -> SingleValueDistribution {
        SingleValueDistribution {
            variable: variable.into(),
            value,
        }
    }

    pub fn get_value(&self) -> &Value {
        &self.value
    }
}

impl ProbDistribution for SingleValueDistribution {
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
        Ok(self.value.clone())
    }

    fn get_values(&self) -> BTreeSet<Value> {
        BTreeSet::from([self.value.clone()])
    }

    fn get_posterior(
        &self,
        _condition: &Assignment,
    ) -> Result<Box<dyn ProbDistribution>, DialError> {
        Ok(self.clone_box())
    }

    fn prune_values(&mut self, _threshold: f64) -> bool {
        false
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

impl IndependentDistribution for SingleValueDistribution {
    fn prob_of(&self, head: &Value) -> f64 {
        if *head == self.value {
            1.0
        } else {
            0.0
        }
    }

    fn sample_value(&self) -> Result<Value, DialError> {
        Ok(self.value.clone())
    }

    fn get_best(&self) -> Result<Value, DialError> {
        Ok(self.value.clone())
    }

    fn to_discrete(&self) -> CategoricalTable {
        CategoricalTable::from_rows(&self.variable, [(self.value.clone(), 1.0)])
    }

    fn clone_independent(&self) -> Box<dyn IndependentDistribution> {
        Box::new(self.clone())
    }
}

impl fmt::Display for SingleValueDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P({}={})=1", self.variable, self.value)
    }
}

// ============================================================================
// Tests
// ============================================================================
