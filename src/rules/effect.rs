//! # Rule Effects
//!
//! Effects describe what a rule does to output variables once its condition
//! holds. A [`BasicEffect`] is one grounded assignment intent, rendered as
//! `var:=value` (exclusive set), `var+=value` (additive) or `var!=value`
//! (discard). A [`TemplateEffect`] carries the same shape with open slots on
//! either side, and downgrades to a basic effect once grounding resolves
//! them. An [`Effect`] bundles several sub-effects, implicitly conjoined.

use std::collections::BTreeSet;
use std::fmt;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::errors::DialError;
use crate::rules::condition::{Condition, Relation};
use crate::state::Assignment;
use crate::templates::Template;
use crate::values::{Value, ValueFactory};

/// Lowest priority number wins; this is the default level.
pub const DEFAULT_PRIORITY: u32 = 1;

/// Inline capacity for sub-effect lists; most effects set one or two
/// variables.
const INLINE_SUB_EFFECTS: usize = 2;

/// A single grounded assignment intent on one output variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasicEffect {
    variable: String,
    value: Value,
    priority: u32,
    exclusive: bool,
    negated: bool,
}

impl BasicEffect {
    /// Exclusive `var:=value` effect at default priority.
    pub fn new(variable: impl Into<String>, value: Value) -> BasicEffect {
        BasicEffect {
            variable: variable.into(),
            value,
            priority: DEFAULT_PRIORITY,
            exclusive: true,
            negated: false,
        }
    }

    /// Additive `var+=value` effect at default priority.
    pub fn add_value(variable: impl Into<String>, value: Value) -> BasicEffect {
        BasicEffect {
            exclusive: false,
            ..BasicEffect::new(variable, value)
        }
    }

    /// Negated `var!=value` effect at default priority.
    pub fn discard_value(variable: impl Into<String>, value: Value) -> BasicEffect {
        BasicEffect {
            negated: true,
            ..BasicEffect::new(variable, value)
        }
    }

    pub fn with_priority(mut self, priority: u32) -> BasicEffect {
        self.priority = priority;
        self
    }

    pub fn get_variable(&self) -> &str {
        &self.variable
    }

    pub fn get_value(&self) -> &Value {
        &self.value
    }

    pub fn get_priority(&self) -> u32 {
        self.priority
    }

    pub fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Condition testing whether this effect took hold on the variable.
    pub fn convert_to_condition(&self) -> Condition {
        let relation = if self.negated {
            Relation::Unequal
        } else if self.exclusive {
            Relation::Equal
        } else {
            Relation::Contains
        };
        Condition::basic(&self.variable, &self.value.to_string(), relation)
    }
}

impl fmt::Display for BasicEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.negated {
            "!="
        } else if self.exclusive {
            ":="
        } else {
            "+="
        };
        write!(f, "{}{}{}", self.variable, op, self.value)?;
        if self.priority > DEFAULT_PRIORITY {
            write!(f, " [priority={}]", self.priority)?;
        }
        Ok(())
    }
}

/// An assignment intent whose variable label or value still carries slots.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TemplateEffect {
    variable: Template,
    value: Template,
    priority: u32,
    exclusive: bool,
    negated: bool,
}

impl TemplateEffect {
    pub fn new(
        variable: Template,
        value: Template,
        priority: u32,
        exclusive: bool,
        negated: bool,
    ) -> TemplateEffect {
        TemplateEffect {
            variable,
            value,
            priority,
            exclusive,
            negated,
        }
    }

    pub fn get_variable(&self) -> &Template {
        &self.variable
    }

    pub fn get_value(&self) -> &Template {
        &self.value
    }

    pub fn is_fully_grounded(&self) -> bool {
        !self.variable.is_under_specified() && !self.value.is_under_specified()
    }

    /// Fills slots from `input`, downgrading to a basic effect once both
    /// sides are fully resolved.
    pub fn ground(&self, input: &Assignment) -> SubEffect {
        let variable = Template::new(&self.variable.fill_slots(input));
        let value = Template::new(&self.value.fill_slots(input));
        if variable.is_under_specified() || value.is_under_specified() {
            SubEffect::Template(TemplateEffect {
                variable,
                value,
                priority: self.priority,
                exclusive: self.exclusive,
                negated: self.negated,
            })
        } else {
            SubEffect::Basic(BasicEffect {
                variable: variable.raw().to_string(),
                value: ValueFactory::create(value.raw()),
                priority: self.priority,
                exclusive: self.exclusive,
                negated: self.negated,
            })
        }
    }
}

impl fmt::Display for TemplateEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = if self.negated {
            "!="
        } else if self.exclusive {
            ":="
        } else {
            "+="
        };
        write!(f, "{}{}{}", self.variable, op, self.value)?;
        if self.priority > DEFAULT_PRIORITY {
            write!(f, " [priority={}]", self.priority)?;
        }
        Ok(())
    }
}

/// Either a grounded or a still-templated sub-effect.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubEffect {
    Basic(BasicEffect),
    Template(TemplateEffect),
}

impl SubEffect {
    /// The variable label, raw pattern for templated effects.
    pub fn variable_label(&self) -> &str {
        match self {
            SubEffect::Basic(e) => &e.variable,
            SubEffect::Template(e) => e.variable.raw(),
        }
    }

    pub fn is_fully_grounded(&self) -> bool {
        match self {
            SubEffect::Basic(_) => true,
            SubEffect::Template(e) => e.is_fully_grounded(),
        }
    }

    fn ground(&self, input: &Assignment) -> SubEffect {
        match self {
            SubEffect::Basic(e) => SubEffect::Basic(e.clone()),
            SubEffect::Template(e) => e.ground(input),
        }
    }
}

impl fmt::Display for SubEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubEffect::Basic(e) => write!(f, "{e}"),
            SubEffect::Template(e) => write!(f, "{e}"),
        }
    }
}

/// An ordered bundle of sub-effects, implicitly conjoined.
///
/// The empty bundle is the void effect: the rule alternative that changes
/// nothing, used to absorb leftover probability mass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Effect {
    sub_effects: SmallVec<[SubEffect; INLINE_SUB_EFFECTS]>,
}

impl Effect {
    pub fn new(sub_effects: impl IntoIterator<Item = SubEffect>) -> Effect {
        Effect {
            sub_effects: sub_effects.into_iter().collect(),
        }
    }

    /// The void effect, changing no variable.
    pub fn void() -> Effect {
        Effect {
            sub_effects: SmallVec::new(),
        }
    }

    pub fn from_basic(effects: Vec<BasicEffect>) -> Effect {
        Effect {
            sub_effects: effects.into_iter().map(SubEffect::Basic).collect(),
        }
    }

    pub fn get_sub_effects(&self) -> &[SubEffect] {
        &self.sub_effects
    }

    pub fn is_void(&self) -> bool {
        self.sub_effects.is_empty()
    }

    /// Variable labels touched by this effect, templated ones by their raw
    /// pattern.
    pub fn get_output_variables(&self) -> BTreeSet<String> {
        self.sub_effects
            .iter()
            .map(|e| e.variable_label().to_string())
            .collect()
    }

    /// Parses the compact form used by [`fmt::Display`], e.g.
    /// `"a:=1 ^ b!=2"`. The literal `"Void"` yields the empty effect.
    pub fn parse_effect(s: &str) -> Result<Effect, DialError> {
        let trimmed = s.trim();
        if trimmed.contains(" ^ ") {
            let mut sub_effects = SmallVec::new();
            for chunk in trimmed.split(" ^ ") {
                sub_effects.extend(Effect::parse_effect(chunk)?.sub_effects);
            }
            return Ok(Effect { sub_effects });
        }
        if trimmed == "Void" {
            return Ok(Effect::void());
        }
        let (variable, value, exclusive, negated) = if let Some((var, val)) = trimmed.split_once(":=")
        {
            (var, val, true, false)
        } else if let Some((var, val)) = trimmed.split_once("!=") {
            (var, val, true, true)
        } else if let Some((var, val)) = trimmed.split_once("+=") {
            (var, val, false, false)
        } else {
            return Err(DialError::Parse(format!("cannot parse effect '{trimmed}'")));
        };
        // An unresolved slot marker on the value side means "no value".
        let value = if value.contains("{}") { "None" } else { value };
        let template = TemplateEffect::new(
            Template::new(variable),
            Template::new(value),
            DEFAULT_PRIORITY,
            exclusive,
            negated,
        );
        let sub_effect = if template.is_fully_grounded() {
            template.ground(&Assignment::new())
        } else {
            SubEffect::Template(template)
        };
        Ok(Effect::new([sub_effect]))
    }

    /// Conjunction of two effects, preserving sub-effect order.
    pub fn combine(&self, other: &Effect) -> Effect {
        let mut sub_effects = self.sub_effects.clone();
        sub_effects.extend(other.sub_effects.iter().cloned());
        Effect { sub_effects }
    }

    /// Fills slots in every sub-effect and drops those that remain
    /// underspecified.
    pub fn ground(&self, input: &Assignment) -> Effect {
        let sub_effects = self
            .sub_effects
            .iter()
            .map(|e| e.ground(input))
            .filter(SubEffect::is_fully_grounded)
            .collect();
        Effect { sub_effects }
    }

    /// Candidate values for `variable` with their repetition counts.
    ///
    /// Only the numerically lowest priority level contributes. Negated
    /// effects then remove their value from the candidates; when a candidate
    /// is a set containing the removed value, the set survives in filtered
    /// form.
    pub fn create_table(&self, variable: &str) -> FxHashMap<Value, u32> {
        let mut table: FxHashMap<Value, u32> = FxHashMap::default();
        let mut best_priority = u32::MAX;
        for part in &self.sub_effects {
            if let SubEffect::Basic(e) = part {
                if e.variable != variable || e.negated || e.priority > best_priority {
                    continue;
                }
                if e.priority < best_priority {
                    table.clear();
                    best_priority = e.priority;
                }
                *table.entry(e.value.clone()).or_insert(0) += 1;
            }
        }
        for part in &self.sub_effects {
            if let SubEffect::Basic(e) = part {
                if e.variable != variable || !e.negated {
                    continue;
                }
                table.remove(&e.value);
                let filtered_sets: Vec<Value> = table
                    .keys()
                    .filter(|v| matches!(v, Value::Set(_)) && v.contains(&e.value))
                    .cloned()
                    .collect();
                for key in filtered_sets {
                    if let (Some(count), Value::Set(set)) = (table.remove(&key), &key) {
                        let remaining = Value::from_set(
                            set.iter().filter(|v| *v != &e.value).cloned(),
                        );
                        *table.entry(remaining).or_insert(0) += count;
                    }
                }
            }
        }
        table
    }

    /// True when the variable only receives additive contributions, with no
    /// exclusive positive assignment overriding them.
    pub fn is_non_exclusive(&self, variable: &str) -> bool {
        let mut additive = false;
        for part in &self.sub_effects {
            if let SubEffect::Basic(e) = part {
                if e.variable != variable || e.negated {
                    continue;
                }
                if e.exclusive {
                    return false;
                }
                additive = true;
            }
        }
        additive
    }

    /// Condition equivalent to this effect: conjunction across distinct
    /// variables, disjunction across several effects on the same variable.
    pub fn convert_to_condition(&self) -> Condition {
        let mut per_variable: Vec<Condition> = Vec::new();
        for variable in self.get_output_variables() {
            let mut alternatives: Vec<Condition> = Vec::new();
            for part in &self.sub_effects {
                if let SubEffect::Basic(e) = part {
                    if e.variable == variable {
                        alternatives.push(e.convert_to_condition());
                    }
                }
            }
            match alternatives.len() {
                0 => {}
                1 => per_variable.extend(alternatives),
                _ => per_variable.push(Condition::or(alternatives)),
            }
        }
        match per_variable.len() {
            0 => Condition::Void,
            1 => per_variable.remove(0),
            _ => Condition::and(per_variable),
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.sub_effects.is_empty() {
            return f.write_str("Void");
        }
        let parts: Vec<String> = self.sub_effects.iter().map(|e| e.to_string()).collect();
        f.write_str(&parts.join(" ^ "))
    }
}

// ============================================================================
// Tests
// ============================================================================
