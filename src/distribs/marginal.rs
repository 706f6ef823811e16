//! # Marginal Distributions
//!
//! A [`MarginalDistribution`] represents P(X | Y) as the integration of a
//! latent joint: P(X | Y) = sum over z of P(X | Y, Z=z) * P(Z=z). The
//! conditional part keeps Z among its inputs; the unconditional part
//! enumerates Z's rows with their weights.
//!
//! Every aggregation path weights by P(Z=z). Sampling is two-stage: draw z
//! from the latent joint, then draw from the conditional under the augmented
//! context. Mutation takes exclusive access; shared concurrent readers only
//! ever see the immutable parts.

use std::collections::BTreeSet;
use std::fmt;

use crate::distribs::categorical::CategoricalTableBuilder;
use crate::distribs::multivariate::MultivariateTableBuilder;
use crate::distribs::{IndependentDistribution, MultivariateDistribution, ProbDistribution};
use crate::errors::DialError;
use crate::state::Assignment;
use crate::values::Value;

/// P(X | Y) expressed as a conditional P(X | Y, Z) integrated against a
/// latent joint P(Z).
#[derive(Debug, Clone)]
pub struct MarginalDistribution {
    cond: Box<dyn ProbDistribution>,
    uncond: Box<dyn MultivariateDistribution>,
}

impl MarginalDistribution {
    pub fn new(
        cond: Box<dyn ProbDistribution>,
        uncond: Box<dyn MultivariateDistribution>,
    ) -> MarginalDistribution {
        MarginalDistribution { cond, uncond }
    }

    /// Wraps a conditional with a point-mass latent joint fixed to `latent`.
    pub fn with_assignment(
        cond: Box<dyn ProbDistribution>,
        latent: Assignment,
    ) -> Result<MarginalDistribution, DialError> {
        let mut builder = MultivariateTableBuilder::new();
        builder.add_row(latent, 1.0)?;
        Ok(MarginalDistribution {
            cond,
            uncond: Box::new(builder.build()),
        })
    }

    /// The conditional part P(X | Y, Z).
    pub fn conditional_part(&self) -> &dyn ProbDistribution {
        self.cond.as_ref()
    }

    /// The latent joint P(Z).
    pub fn latent_part(&self) -> &dyn MultivariateDistribution {
        self.uncond.as_ref()
    }
}

impl ProbDistribution for MarginalDistribution {
    fn get_variable(&self) -> &str {
        self.cond.get_variable()
    }

    fn get_input_variables(&self) -> BTreeSet<String> {
        let latent = self.uncond.get_variables();
        self.cond
            .get_input_variables()
            .into_iter()
            .filter(|v| !latent.contains(v))
            .collect()
    }

    fn get_prob(&self, condition: &Assignment, head: &Value) -> f64 {
        self.uncond
            .get_values()
            .iter()
            .map(|z| {
                let w = self.uncond.get_prob(z);
                if w <= 0.0 {
                    return 0.0;
                }
                self.cond.get_prob(&condition.union(z), head) * w
            })
            .sum()
    }

    fn get_prob_distrib(
        &self,
        condition: &Assignment,
    ) -> Result<Box<dyn IndependentDistribution>, DialError> {
        let mut builder = CategoricalTableBuilder::new(self.cond.get_variable());
        for z in self.uncond.get_values() {
            let w = self.uncond.get_prob(&z);
            if w <= 0.0 {
                continue;
            }
            let augmented = condition.union(&z);
            for head in self.cond.get_values() {
                let p = self.cond.get_prob(&augmented, &head) * w;
                if p > 0.0 {
                    builder.increment_row(head, p)?;
                }
            }
        }
        Ok(builder.build())
    }

    fn sample(&self, condition: &Assignment) -> Result<Value, DialError> {
        let z = self.uncond.sample()?;
        self.cond.sample(&condition.union(&z))
    }

    fn get_values(&self) -> BTreeSet<Value> {
        self.cond.get_values()
    }

    fn get_posterior(
        &self,
        condition: &Assignment,
    ) -> Result<Box<dyn ProbDistribution>, DialError> {
        let mut builder = MultivariateTableBuilder::new();
        for z in self.uncond.get_values() {
            builder.increment_row(z.union(condition), self.uncond.get_prob(&z))?;
        }
        Ok(Box::new(MarginalDistribution {
            cond: self.cond.clone_box(),
            uncond: Box::new(builder.build()),
        }))
    }

    fn prune_values(&mut self, threshold: f64) -> bool {
        let cond_changed = self.cond.prune_values(threshold);
        let uncond_changed = self.uncond.prune_values(threshold);
        cond_changed || uncond_changed
    }

    fn modify_variable_id(&mut self, old_id: &str, new_id: &str) {
        self.cond.modify_variable_id(old_id, new_id);
        self.uncond.modify_variable_id(old_id, new_id);
    }

    fn clone_box(&self) -> Box<dyn ProbDistribution> {
        Box::new(self.clone())
    }
}

impl fmt::Display for MarginalDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (integrating {})", self.cond, self.uncond)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribs::conditional::ConditionalTable;
    use crate::distribs::multivariate::MultivariateTable;

    /// P(v | theta) with theta=1 forcing "a" and theta=2 forcing "b",
    /// integrated against P(theta=1)=0.6, P(theta=2)=0.4.
    fn marginal() -> MarginalDistribution {
        let mut cond = ConditionalTable::new("v");
        for (theta, head) in [("1", "a"), ("2", "b")] {
            let mut b = CategoricalTableBuilder::new("v");
            b.add_row(Value::from_string(head), 1.0).unwrap();
            cond.add_distrib(
                Assignment::from_pair("theta", Value::from_string(theta)),
                b.build(),
            )
            .unwrap();
        }
        let uncond = MultivariateTable::from_rows([
            (Assignment::from_pair("theta", Value::from_string("1")), 0.6),
            (Assignment::from_pair("theta", Value::from_string("2")), 0.4),
        ]);
        MarginalDistribution::new(Box::new(cond), Box::new(uncond))
    }

    #[test]
    fn probability_weights_each_latent_row() {
        let m = marginal();
        let p_a = m.get_prob(&Assignment::new(), &Value::from_string("a"));
        let p_b = m.get_prob(&Assignment::new(), &Value::from_string("b"));
        assert!((p_a - 0.6).abs() < 1e-9);
        assert!((p_b - 0.4).abs() < 1e-9);
    }

    #[test]
    fn flattened_distribution_matches_the_weighted_sum() {
        let m = marginal();
        let flat = m.get_prob_distrib(&Assignment::new()).unwrap();
        assert!((flat.prob_of(&Value::from_string("a")) - 0.6).abs() < 1e-9);
        assert!((flat.prob_of(&Value::from_string("b")) - 0.4).abs() < 1e-9);
    }

    #[test]
    fn latent_variables_are_not_exposed_as_inputs() {
        let m = marginal();
        assert!(m.get_input_variables().is_empty());
        assert_eq!(m.get_variable(), "v");
    }

    #[test]
    fn sampling_follows_the_integrated_distribution() {
        let m = marginal();
        let n = 10_000;
        let mut hits = 0;
        for _ in 0..n {
            if m.sample(&Assignment::new()).unwrap() == Value::from_string("a") {
                hits += 1;
            }
        }
        let freq = hits as f64 / n as f64;
        assert!((freq - 0.6).abs() < 0.03, "freq = {freq}");
    }

    #[test]
    fn posterior_extends_latent_rows_with_the_condition() {
        let m = marginal();
        let posterior = m
            .get_posterior(&Assignment::from_pair("x", Value::from_string("1")))
            .unwrap();
        // The extension leaves theta weights untouched.
        let p_a = posterior.get_prob(&Assignment::new(), &Value::from_string("a"));
        assert!((p_a - 0.6).abs() < 1e-9);
    }

    #[test]
    fn renaming_reaches_both_parts() {
        let mut m = marginal();
        m.modify_variable_id("theta", "phi");
        let p_a = m.get_prob(&Assignment::new(), &Value::from_string("a"));
        assert!((p_a - 0.6).abs() < 1e-9);
        m.modify_variable_id("v", "w");
        assert_eq!(m.get_variable(), "w");
    }

    #[test]
    fn pruning_drops_weak_latent_rows() {
        let mut m = marginal();
        assert!(m.prune_values(0.5));
        let p_a = m.get_prob(&Assignment::new(), &Value::from_string("a"));
        assert!((p_a - 1.0).abs() < 1e-9);
    }

    #[test]
    fn point_mass_latent_behaves_like_direct_conditioning() {
        let mut cond = ConditionalTable::new("v");
        let mut b = CategoricalTableBuilder::new("v");
        b.add_row(Value::from_string("a"), 0.7).unwrap();
        b.add_row(Value::from_string("b"), 0.3).unwrap();
        cond.add_distrib(
            Assignment::from_pair("theta", Value::from_string("1")),
            b.build(),
        )
        .unwrap();
        let m = MarginalDistribution::with_assignment(
            Box::new(cond),
            Assignment::from_pair("theta", Value::from_string("1")),
        )
        .unwrap();
        assert!((m.get_prob(&Assignment::new(), &Value::from_string("a")) - 0.7).abs() < 1e-9);
    }
}
