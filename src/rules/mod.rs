//! # Probabilistic and Utility Rules
//!
//! ## Overview
//!
//! A [`Rule`] is an ordered list of cases, each pairing a [`Condition`] with
//! a [`RuleOutput`] that maps alternative [`Effect`]s to [`Parameter`]
//! weights. Evaluating a rule against an assignment proceeds in three
//! steps: enumerate the slot groundings satisfying the rule
//! ([`RuleGrounding`]), select for each grounding the first case whose
//! condition holds, and combine the grounded case outputs into a single
//! final output.
//!
//! Probability rules combine outputs multiplicatively across groundings and
//! absorb unaccounted mass into a void effect; utility rules combine
//! additively and never renormalize.

use std::collections::BTreeSet;
use std::fmt;

use indexmap::IndexMap;
use rustc_hash::FxHashSet;

use crate::distribs::PROB_EPSILON;
use crate::state::Assignment;
use crate::templates::Template;

pub mod condition;
pub mod effect;
pub mod expression;
pub mod parameter;

pub use condition::{BasicCondition, BinaryOp, Condition, Relation};
pub use effect::{BasicEffect, Effect, SubEffect, TemplateEffect};
pub use expression::{MathExpression, MathOp};
pub use parameter::Parameter;

/// Grounded effects with a fixed weight below this threshold are dropped
/// when a probability rule output is grounded.
pub const EFFECT_PRUNING_THRESHOLD: f64 = 0.01;

/// The set of alternative slot assignments under which a condition or rule
/// holds.
///
/// The failed state (no valid grounding exists) is distinct from the
/// trivial state (one valid grounding binding no slots).
#[derive(Debug, Clone, PartialEq)]
pub struct RuleGrounding {
    alternatives: FxHashSet<Assignment>,
    failed: bool,
}

impl RuleGrounding {
    /// The trivial grounding: one alternative binding nothing.
    pub fn new() -> RuleGrounding {
        let mut alternatives = FxHashSet::default();
        alternatives.insert(Assignment::new());
        RuleGrounding {
            alternatives,
            failed: false,
        }
    }

    /// The failed grounding, satisfiable under no binding.
    pub fn failed() -> RuleGrounding {
        RuleGrounding {
            alternatives: FxHashSet::default(),
            failed: true,
        }
    }

    pub fn from_assignment(binding: Assignment) -> RuleGrounding {
        let mut alternatives = FxHashSet::default();
        alternatives.insert(binding);
        RuleGrounding {
            alternatives,
            failed: false,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }

    pub fn get_alternatives(&self) -> &FxHashSet<Assignment> {
        &self.alternatives
    }

    /// Inserts one alternative, clearing any failed state.
    pub fn add_alternative(&mut self, binding: Assignment) {
        self.failed = false;
        self.alternatives.insert(binding);
        self.drop_redundant_trivial();
    }

    /// Disjunction: unions the other grounding's alternatives into this one.
    pub fn add(&mut self, other: RuleGrounding) {
        if other.failed {
            return;
        }
        if self.failed {
            *self = other;
            return;
        }
        self.alternatives.extend(other.alternatives);
        self.drop_redundant_trivial();
    }

    /// Conjunction: cross product of the two alternative sets, keeping only
    /// consistent combinations. An empty product fails the grounding.
    pub fn extend(&mut self, other: &RuleGrounding) {
        if self.failed || other.failed {
            *self = RuleGrounding::failed();
            return;
        }
        let mut combined = FxHashSet::default();
        for a in &self.alternatives {
            for b in &other.alternatives {
                if a.consistent_with(b) {
                    combined.insert(a.union(b));
                }
            }
        }
        if combined.is_empty() {
            *self = RuleGrounding::failed();
        } else {
            self.alternatives = combined;
        }
    }

    /// Conjunction with a single fixed binding.
    pub fn extend_with(&mut self, binding: &Assignment) {
        if binding.is_empty() {
            return;
        }
        self.extend(&RuleGrounding::from_assignment(binding.clone()));
    }

    /// A trivial alternative is subsumed once concrete ones exist.
    fn drop_redundant_trivial(&mut self) {
        if self.alternatives.len() > 1 {
            self.alternatives.remove(&Assignment::new());
        }
    }
}

impl Default for RuleGrounding {
    fn default() -> RuleGrounding {
        RuleGrounding::new()
    }
}

impl fmt::Display for RuleGrounding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.failed {
            return f.write_str("failed");
        }
        let mut parts: Vec<String> = self.alternatives.iter().map(|a| a.to_string()).collect();
        parts.sort();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Whether a rule assigns probabilities or utilities to its effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleType {
    Prob,
    Util,
}

/// The weighted alternative effects produced by a rule evaluation.
#[derive(Debug, Clone)]
pub struct RuleOutput {
    rule_type: RuleType,
    effects: IndexMap<Effect, Parameter>,
}

impl RuleOutput {
    pub fn new(rule_type: RuleType) -> RuleOutput {
        RuleOutput {
            rule_type,
            effects: IndexMap::new(),
        }
    }

    pub fn get_rule_type(&self) -> RuleType {
        self.rule_type
    }

    /// Records an effect alternative, replacing any previous weight.
    pub fn add_effect(&mut self, effect: Effect, param: Parameter) {
        self.effects.insert(effect, param);
    }

    pub fn get_effects(&self) -> impl Iterator<Item = &Effect> {
        self.effects.keys()
    }

    pub fn get_parameter(&self, effect: &Effect) -> Option<&Parameter> {
        self.effects.get(effect)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Folds another case output into this one.
    ///
    /// Probability outputs combine through the Cartesian product of their
    /// effects, multiplying weights and summing duplicates. Utility outputs
    /// are additive per effect.
    pub fn add_output(&mut self, other: RuleOutput) {
        if self.effects.is_empty() {
            self.effects = other.effects;
            return;
        }
        match self.rule_type {
            RuleType::Prob => {
                let mut combined: IndexMap<Effect, Parameter> = IndexMap::new();
                for (e1, p1) in &self.effects {
                    for (e2, p2) in &other.effects {
                        let effect = e1.combine(e2);
                        let mut param = p1.merge(MathOp::Mul, p2);
                        if let Some(existing) = combined.get(&effect) {
                            param = existing.merge(MathOp::Add, &param);
                        }
                        combined.insert(effect, param);
                    }
                }
                self.effects = combined;
            }
            RuleType::Util => {
                for (effect, param) in other.effects {
                    let merged = match self.effects.get(&effect) {
                        Some(existing) => existing.merge(MathOp::Add, &param),
                        None => param,
                    };
                    self.effects.insert(effect, merged);
                }
            }
        }
    }

    /// Resolves every effect and parameter under the grounding.
    ///
    /// For probability outputs, grounded effects with negligible fixed mass
    /// are dropped, and a void effect absorbs whatever mass the surviving
    /// alternatives leave unaccounted for.
    pub fn ground(&self, input: &Assignment) -> RuleOutput {
        let mut grounded = RuleOutput::new(self.rule_type);
        for (effect, param) in &self.effects {
            let grounded_effect = effect.ground(input);
            if grounded_effect.is_void() && !effect.is_void() {
                // Every sub-effect stayed underspecified.
                continue;
            }
            let grounded_param = param.ground(input);
            let merged = match grounded.effects.get(&grounded_effect) {
                Some(existing) => existing.merge(MathOp::Add, &grounded_param),
                None => grounded_param,
            };
            grounded.effects.insert(grounded_effect, merged);
        }
        if self.rule_type == RuleType::Prob {
            grounded.prune_low_mass_effects();
            grounded.add_void_effect();
        }
        grounded
    }

    fn prune_low_mass_effects(&mut self) {
        self.effects.retain(|_, param| match param.fixed_value() {
            Some(v) => v >= EFFECT_PRUNING_THRESHOLD,
            None => true,
        });
    }

    /// Absorbs unaccounted probability mass into the void effect.
    ///
    /// With only fixed weights the remainder is numeric; as soon as one
    /// weight is unresolved the remainder stays symbolic, so the mass
    /// balance survives later parameter substitution.
    fn add_void_effect(&mut self) {
        if self.effects.contains_key(&Effect::void()) {
            return;
        }
        let fixed_total: Option<f64> = self.effects.values().map(Parameter::fixed_value).sum();
        match fixed_total {
            Some(total) => {
                if total < 1.0 - PROB_EPSILON {
                    self.effects.insert(Effect::void(), Parameter::Fixed(1.0 - total));
                }
            }
            None => {
                let mut remainder = Parameter::Fixed(1.0);
                for param in self.effects.values() {
                    remainder = remainder.merge(MathOp::Sub, param);
                }
                self.effects.insert(Effect::void(), remainder);
            }
        }
    }
}

impl fmt::Display for RuleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.effects.is_empty() {
            return f.write_str("(none)");
        }
        let parts: Vec<String> = self
            .effects
            .iter()
            .map(|(effect, param)| format!("{effect} [{param}]"))
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// One case of a rule: a condition guarding an output.
#[derive(Debug, Clone)]
pub struct RuleCase {
    condition: Condition,
    output: RuleOutput,
}

impl RuleCase {
    pub fn new(condition: Condition, output: RuleOutput) -> RuleCase {
        RuleCase { condition, output }
    }

    pub fn get_condition(&self) -> &Condition {
        &self.condition
    }

    pub fn get_output(&self) -> &RuleOutput {
        &self.output
    }
}

impl fmt::Display for RuleCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if matches!(self.condition, Condition::Void) {
            write!(f, "{}", self.output)
        } else {
            write!(f, "if ({}) then {}", self.condition, self.output)
        }
    }
}

/// A probabilistic or utility rule over dialogue variables.
///
/// Case order is significant: evaluation picks the first case whose
/// condition is satisfied.
#[derive(Debug, Clone)]
pub struct Rule {
    id: String,
    rule_type: RuleType,
    cases: Vec<RuleCase>,
}

impl Rule {
    pub fn new(id: impl Into<String>, rule_type: RuleType) -> Rule {
        Rule {
            id: id.into(),
            rule_type,
            cases: Vec::new(),
        }
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_rule_type(&self) -> RuleType {
        self.rule_type
    }

    pub fn get_cases(&self) -> &[RuleCase] {
        &self.cases
    }

    /// Appends a case. A case declared after an always-true one can never
    /// be selected, which is worth a warning.
    pub fn add_case(&mut self, condition: Condition, output: RuleOutput) {
        if let Some(last) = self.cases.last() {
            if trivially_true(&last.condition) {
                tracing::warn!(rule = %self.id, "case added after an always-true case is unreachable");
            }
        }
        self.cases.push(RuleCase::new(condition, output));
    }

    /// Variable labels read by the rule's conditions, as templates.
    pub fn get_input_variables(&self) -> BTreeSet<Template> {
        self.cases
            .iter()
            .flat_map(|c| c.condition.get_input_variables())
            .collect()
    }

    /// Unresolved parameter variables referenced by the rule's outputs.
    pub fn get_parameter_variables(&self) -> BTreeSet<String> {
        self.cases
            .iter()
            .flat_map(|c| c.output.effects.values())
            .flat_map(Parameter::get_variables)
            .collect()
    }

    /// Union of the slot groundings offered by the rule's cases.
    ///
    /// A rule without matching cases keeps the trivial grounding, so it
    /// still evaluates once against the bare input.
    pub fn get_groundings(&self, input: &Assignment) -> RuleGrounding {
        let mut groundings = RuleGrounding::new();
        for case in &self.cases {
            groundings.add(case.condition.get_groundings(input));
        }
        groundings
    }

    /// Evaluates the rule against an assignment.
    ///
    /// For every grounding alternative, the first case (in declaration
    /// order) whose condition is satisfied contributes its grounded output;
    /// the contributions are then combined across alternatives.
    pub fn get_output(&self, input: &Assignment) -> RuleOutput {
        let mut output = RuleOutput::new(self.rule_type);
        let groundings = self.get_groundings(input);
        for alternative in groundings.get_alternatives() {
            let full = if alternative.is_empty() {
                input.clone()
            } else {
                input.union(alternative)
            };
            let case_output = self
                .cases
                .iter()
                .find(|case| case.condition.is_satisfied_by(&full))
                .map(|case| case.output.clone())
                .unwrap_or_else(|| RuleOutput::new(self.rule_type));
            output.add_output(case_output.ground(&full));
        }
        output
    }
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ", self.id)?;
        let parts: Vec<String> = self.cases.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join(" else "))
    }
}

fn trivially_true(condition: &Condition) -> bool {
    match condition {
        Condition::Void => true,
        Condition::Complex {
            subconditions,
            operator: BinaryOp::And,
        } => subconditions.is_empty(),
        _ => false,
    }
}

// ============================================================================
// Tests
// ============================================================================
