//! # Rule Conditions
//!
//! Conditions guard rule cases. A [`BasicCondition`] relates one variable to
//! one value, where both sides are templates that may carry unresolved
//! slots. [`Condition`] combines basic conditions with conjunction,
//! disjunction and negation, plus the always-true void condition.
//!
//! Beyond plain satisfaction checks, conditions drive unification: given an
//! assignment, [`Condition::get_groundings`] enumerates the alternative slot
//! bindings under which the condition holds. Slots in the variable side are
//! matched against the assignment's variable names; slots in the value side
//! are matched against the actual value's string form. Conjunction takes the
//! cross product of alternatives and disjunction their union.

use std::collections::BTreeSet;
use std::fmt;

use crate::errors::DialError;
use crate::rules::RuleGrounding;
use crate::state::Assignment;
use crate::templates::Template;
use crate::values::{Value, ValueFactory};

/// Comparison relation between the variable's value and the condition
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Equal,
    Unequal,
    Contains,
    NotContains,
    GreaterThan,
    LowerThan,
    In,
    NotIn,
    Length,
}

impl Relation {
    /// Resolves the textual relation form used by domain files.
    pub fn parse(s: &str) -> Result<Relation, DialError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" => Ok(Relation::Equal),
            "!=" => Ok(Relation::Unequal),
            "contains" => Ok(Relation::Contains),
            "!contains" => Ok(Relation::NotContains),
            ">" => Ok(Relation::GreaterThan),
            "<" => Ok(Relation::LowerThan),
            "in" => Ok(Relation::In),
            "!in" => Ok(Relation::NotIn),
            "length" => Ok(Relation::Length),
            other => Err(DialError::Parse(format!("unknown relation '{other}'"))),
        }
    }
}

/// Atomic condition relating one variable to one value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BasicCondition {
    variable: Template,
    value: Template,
    relation: Relation,
    /// Pre-parsed value, available when the value template has no slots.
    ground_value: Option<Value>,
}

impl BasicCondition {
    pub fn new(variable: &str, value: &str, relation: Relation) -> BasicCondition {
        BasicCondition::from_templates(Template::new(variable), Template::new(value), relation)
    }

    pub fn from_templates(variable: Template, value: Template, relation: Relation) -> BasicCondition {
        let ground_value = if value.is_under_specified() {
            None
        } else {
            Some(ValueFactory::create(value.raw()))
        };
        BasicCondition {
            variable,
            value,
            relation,
            ground_value,
        }
    }

    pub fn get_variable(&self) -> &Template {
        &self.variable
    }

    pub fn get_value(&self) -> &Template {
        &self.value
    }

    pub fn get_relation(&self) -> Relation {
        self.relation
    }

    /// Slots on either side of the condition.
    pub fn get_slots(&self) -> BTreeSet<String> {
        self.variable
            .slots()
            .iter()
            .chain(self.value.slots().iter())
            .cloned()
            .collect()
    }

    pub fn is_satisfied_by(&self, input: &Assignment) -> bool {
        !self.get_groundings(input).is_failed()
    }

    /// Alternative slot bindings under which this condition holds.
    pub fn get_groundings(&self, input: &Assignment) -> RuleGrounding {
        if !self.variable.is_under_specified() {
            return match input.get_value(self.variable.raw()) {
                Some(actual) => self.value_groundings(actual, input),
                None => RuleGrounding::failed(),
            };
        }
        // Slots in the variable label: try every variable of the input.
        let mut groundings = RuleGrounding::failed();
        for var in input.variables() {
            let m = self.variable.match_full(var);
            if !m.is_matching() {
                continue;
            }
            if let Some(actual) = input.get_value(var) {
                let mut value_grounding = self.value_groundings(actual, input);
                value_grounding.extend_with(m.bindings());
                groundings.add(value_grounding);
            }
        }
        groundings
    }

    fn value_groundings(&self, actual: &Value, input: &Assignment) -> RuleGrounding {
        if let Some(expected) = &self.ground_value {
            return if self.relation_holds(actual, expected) {
                RuleGrounding::new()
            } else {
                RuleGrounding::failed()
            };
        }
        // Reduce the value template with the slots the input already binds.
        let filled = Template::new(&self.value.fill_slots(input));
        if !filled.is_under_specified() {
            let expected = ValueFactory::create(filled.raw());
            return if self.relation_holds(actual, &expected) {
                RuleGrounding::new()
            } else {
                RuleGrounding::failed()
            };
        }
        self.template_groundings(&filled, actual)
    }

    /// Matching for a value side that still carries open slots. Only
    /// equality, containment and length checks can bind slots; every other
    /// relation needs a fully grounded value.
    fn template_groundings(&self, template: &Template, actual: &Value) -> RuleGrounding {
        match self.relation {
            Relation::Equal => {
                let m = template.match_full(&actual.to_string());
                if m.is_matching() {
                    RuleGrounding::from_assignment(m.into_bindings())
                } else {
                    RuleGrounding::failed()
                }
            }
            Relation::Contains => {
                let mut groundings = RuleGrounding::failed();
                for sub in actual.sub_values() {
                    let m = template.match_full(&sub.to_string());
                    if m.is_matching() {
                        groundings.add_alternative(m.into_bindings());
                    }
                }
                let m = template.match_partial(&actual.to_string());
                if m.is_matching() {
                    groundings.add_alternative(m.into_bindings());
                }
                groundings
            }
            Relation::Length => {
                let m = template.match_full(&actual.length().to_string());
                if m.is_matching() {
                    RuleGrounding::from_assignment(m.into_bindings())
                } else {
                    RuleGrounding::failed()
                }
            }
            _ => RuleGrounding::failed(),
        }
    }

    fn relation_holds(&self, actual: &Value, expected: &Value) -> bool {
        match self.relation {
            Relation::Equal => actual == expected,
            Relation::Unequal => actual != expected,
            Relation::Contains => actual.contains(expected),
            Relation::NotContains => !actual.contains(expected),
            Relation::GreaterThan => match (actual.as_double(), expected.as_double()) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            Relation::LowerThan => match (actual.as_double(), expected.as_double()) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            Relation::In => expected.contains(actual),
            Relation::NotIn => !expected.contains(actual),
            Relation::Length => match expected.as_double() {
                Some(d) => (actual.length() as f64 - d).abs() < 1e-9,
                None => false,
            },
        }
    }
}

impl fmt::Display for BasicCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.relation {
            Relation::Equal => write!(f, "{}={}", self.variable, self.value),
            Relation::Unequal => write!(f, "{}!={}", self.variable, self.value),
            Relation::GreaterThan => write!(f, "{}>{}", self.variable, self.value),
            Relation::LowerThan => write!(f, "{}<{}", self.variable, self.value),
            Relation::Contains => write!(f, "{} in {}", self.value, self.variable),
            Relation::NotContains => write!(f, "{} !in {}", self.value, self.variable),
            Relation::In => write!(f, "{} in {}", self.variable, self.value),
            Relation::NotIn => write!(f, "{} !in {}", self.variable, self.value),
            Relation::Length => write!(f, "length({})={}", self.variable, self.value),
        }
    }
}

/// Logical connective for complex conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    And,
    Or,
}

/// Guard of a rule case.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Always satisfied, producing the trivial grounding.
    Void,
    Basic(BasicCondition),
    Complex {
        subconditions: Vec<Condition>,
        operator: BinaryOp,
    },
    Negated(Box<Condition>),
}

impl Condition {
    pub fn basic(variable: &str, value: &str, relation: Relation) -> Condition {
        Condition::Basic(BasicCondition::new(variable, value, relation))
    }

    pub fn and(subconditions: Vec<Condition>) -> Condition {
        Condition::Complex {
            subconditions,
            operator: BinaryOp::And,
        }
    }

    pub fn or(subconditions: Vec<Condition>) -> Condition {
        Condition::Complex {
            subconditions,
            operator: BinaryOp::Or,
        }
    }

    pub fn negate(inner: Condition) -> Condition {
        Condition::Negated(Box::new(inner))
    }

    /// Variable labels this condition reads, as templates.
    pub fn get_input_variables(&self) -> BTreeSet<Template> {
        match self {
            Condition::Void => BTreeSet::new(),
            Condition::Basic(b) => BTreeSet::from([b.variable.clone()]),
            Condition::Complex { subconditions, .. } => subconditions
                .iter()
                .flat_map(Condition::get_input_variables)
                .collect(),
            Condition::Negated(inner) => inner.get_input_variables(),
        }
    }

    /// Slots anywhere in the condition tree.
    pub fn get_slots(&self) -> BTreeSet<String> {
        match self {
            Condition::Void => BTreeSet::new(),
            Condition::Basic(b) => b.get_slots(),
            Condition::Complex { subconditions, .. } => {
                subconditions.iter().flat_map(Condition::get_slots).collect()
            }
            Condition::Negated(inner) => inner.get_slots(),
        }
    }

    pub fn is_satisfied_by(&self, input: &Assignment) -> bool {
        match self {
            Condition::Void => true,
            Condition::Basic(b) => b.is_satisfied_by(input),
            Condition::Complex {
                subconditions,
                operator: BinaryOp::And,
            } => subconditions.iter().all(|c| c.is_satisfied_by(input)),
            Condition::Complex {
                subconditions,
                operator: BinaryOp::Or,
            } => subconditions.iter().any(|c| c.is_satisfied_by(input)),
            Condition::Negated(inner) => !inner.is_satisfied_by(input),
        }
    }

    /// Alternative slot bindings under which the condition holds.
    ///
    /// Negation never binds slots: it only passes or fails.
    pub fn get_groundings(&self, input: &Assignment) -> RuleGrounding {
        match self {
            Condition::Void => RuleGrounding::new(),
            Condition::Basic(b) => b.get_groundings(input),
            Condition::Complex {
                subconditions,
                operator: BinaryOp::And,
            } => {
                let mut groundings = RuleGrounding::new();
                for sub in subconditions {
                    groundings.extend(&sub.get_groundings(input));
                    if groundings.is_failed() {
                        break;
                    }
                }
                groundings
            }
            Condition::Complex {
                subconditions,
                operator: BinaryOp::Or,
            } => {
                let mut groundings = RuleGrounding::failed();
                for sub in subconditions {
                    groundings.add(sub.get_groundings(input));
                }
                groundings
            }
            Condition::Negated(inner) => {
                if inner.is_satisfied_by(input) {
                    RuleGrounding::failed()
                } else {
                    RuleGrounding::new()
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Void => write!(f, "true"),
            Condition::Basic(b) => write!(f, "{b}"),
            Condition::Complex {
                subconditions,
                operator,
            } => {
                let sep = match operator {
                    BinaryOp::And => " ^ ",
                    BinaryOp::Or => " v ",
                };
                let parts: Vec<String> = subconditions.iter().map(|c| c.to_string()).collect();
                write!(f, "{}", parts.join(sep))
            }
            Condition::Negated(inner) => write!(f, "!({inner})"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn input(pairs: &[(&str, &str)]) -> Assignment {
        pairs
            .iter()
            .map(|&(var, val)| (var.to_string(), ValueFactory::create(val)))
            .collect()
    }

    #[test]
    fn relation_parsing_is_case_insensitive() {
        assert_eq!(Relation::parse("Contains").unwrap(), Relation::Contains);
        assert_eq!(Relation::parse("!=").unwrap(), Relation::Unequal);
        assert_eq!(Relation::parse("LENGTH").unwrap(), Relation::Length);
        assert!(Relation::parse("between").is_err());
    }

    #[test]
    fn grounded_equality_compares_parsed_values() {
        let c = BasicCondition::new("x", "5", Relation::Equal);
        assert!(c.is_satisfied_by(&input(&[("x", "5.0")])));
        assert!(!c.is_satisfied_by(&input(&[("x", "4")])));
        assert!(!c.is_satisfied_by(&Assignment::new()));
    }

    #[test]
    fn numeric_ordering_requires_numbers_on_both_sides() {
        let c = BasicCondition::new("x", "5", Relation::GreaterThan);
        assert!(c.is_satisfied_by(&input(&[("x", "6")])));
        assert!(!c.is_satisfied_by(&input(&[("x", "4")])));
        assert!(!c.is_satisfied_by(&input(&[("x", "six")])));
        let lower = BasicCondition::new("x", "5", Relation::LowerThan);
        assert!(lower.is_satisfied_by(&input(&[("x", "4")])));
    }

    #[test]
    fn containment_and_membership_relations() {
        let contains = BasicCondition::new("x", "b", Relation::Contains);
        assert!(contains.is_satisfied_by(&input(&[("x", "[a,b,c]")])));
        assert!(!contains.is_satisfied_by(&input(&[("x", "[a,c]")])));

        let not_contains = BasicCondition::new("x", "b", Relation::NotContains);
        assert!(not_contains.is_satisfied_by(&input(&[("x", "[a,c]")])));

        let in_rel = BasicCondition::new("x", "[a,b,c]", Relation::In);
        assert!(in_rel.is_satisfied_by(&input(&[("x", "b")])));
        let not_in = BasicCondition::new("x", "[a,c]", Relation::NotIn);
        assert!(not_in.is_satisfied_by(&input(&[("x", "b")])));
    }

    #[test]
    fn length_counts_elementary_constituents() {
        let c = BasicCondition::new("x", "2", Relation::Length);
        assert!(c.is_satisfied_by(&input(&[("x", "hello world")])));
        assert!(c.is_satisfied_by(&input(&[("x", "[a,b]")])));
        assert!(!c.is_satisfied_by(&input(&[("x", "hello")])));
    }

    #[test]
    fn value_slots_bind_through_full_matching() {
        let c = BasicCondition::new("u", "bring the {object}", Relation::Equal);
        let groundings = c.get_groundings(&input(&[("u", "bring the ball")]));
        assert!(!groundings.is_failed());
        let alts = groundings.get_alternatives();
        assert_eq!(alts.len(), 1);
        let alt = alts.iter().next().unwrap();
        assert_eq!(alt.get_value("object"), Some(&Value::from_string("ball")));
    }

    #[test]
    fn contains_slots_bind_against_each_element() {
        let c = BasicCondition::new("x", "{item}", Relation::Contains);
        let groundings = c.get_groundings(&input(&[("x", "[apple,pear]")]));
        assert!(!groundings.is_failed());
        let bound: BTreeSet<Value> = groundings
            .get_alternatives()
            .iter()
            .filter_map(|a| a.get_value("item").cloned())
            .collect();
        assert!(bound.contains(&Value::from_string("apple")));
        assert!(bound.contains(&Value::from_string("pear")));
    }

    #[test]
    fn variable_slots_enumerate_matching_input_variables() {
        let c = BasicCondition::new("intent({x})", "book", Relation::Equal);
        let groundings = c.get_groundings(&input(&[
            ("intent(flight)", "book"),
            ("intent(hotel)", "cancel"),
            ("unrelated", "book"),
        ]));
        let alts = groundings.get_alternatives();
        assert_eq!(alts.len(), 1);
        let alt = alts.iter().next().unwrap();
        assert_eq!(alt.get_value("x"), Some(&Value::from_string("flight")));
    }

    #[test]
    fn shared_slots_must_agree_across_variable_and_value() {
        let c = BasicCondition::new("intent({x})", "{x} confirmed", Relation::Equal);
        let ok = c.get_groundings(&input(&[("intent(book)", "book confirmed")]));
        assert!(!ok.is_failed());
        let clash = c.get_groundings(&input(&[("intent(book)", "cancel confirmed")]));
        assert!(clash.is_failed());
    }

    #[test]
    fn underspecified_slots_only_bind_for_supported_relations() {
        let c = BasicCondition::new("u", "{x}", Relation::Unequal);
        assert!(!c.is_satisfied_by(&input(&[("u", "anything")])));
    }

    #[test]
    fn known_slots_are_filled_before_matching() {
        let c = BasicCondition::new("u", "bring the {object}", Relation::Equal);
        let mut ctx = input(&[("u", "bring the ball")]);
        ctx.add_pair("object", Value::from_string("ball"));
        assert!(c.is_satisfied_by(&ctx));
        let mut wrong = input(&[("u", "bring the ball")]);
        wrong.add_pair("object", Value::from_string("racket"));
        assert!(!c.is_satisfied_by(&wrong));
    }

    #[test]
    fn conjunction_takes_the_cross_product_of_bindings() {
        let c = Condition::and(vec![
            Condition::basic("u", "{x} please", Relation::Equal),
            Condition::basic("ctx", "{y}", Relation::Contains),
        ]);
        let groundings = c.get_groundings(&input(&[("u", "tea please"), ("ctx", "[home,office]")]));
        assert!(!groundings.is_failed());
        let alts = groundings.get_alternatives();
        // Element bindings for y, plus the whole-collection partial match.
        assert_eq!(alts.len(), 3);
        let tea = Value::from_string("tea");
        for alt in alts {
            assert_eq!(alt.get_value("x"), Some(&tea));
            assert!(alt.contains_var("y"));
        }
        let expected: Assignment = [("x", tea), ("y", Value::from_string("home"))]
            .into_iter()
            .collect();
        assert!(alts.contains(&expected));
    }

    #[test]
    fn conjunction_fails_when_any_branch_fails() {
        let c = Condition::and(vec![
            Condition::basic("a", "1", Relation::Equal),
            Condition::basic("b", "2", Relation::Equal),
        ]);
        assert!(c.get_groundings(&input(&[("a", "1"), ("b", "3")])).is_failed());
        assert!(!c.is_satisfied_by(&input(&[("a", "1"), ("b", "3")])));
    }

    #[test]
    fn disjunction_unions_alternatives() {
        let c = Condition::or(vec![
            Condition::basic("u", "{x} please", Relation::Equal),
            Condition::basic("u", "the {x}", Relation::Equal),
        ]);
        let groundings = c.get_groundings(&input(&[("u", "tea please")]));
        assert!(!groundings.is_failed());
        assert!(c.is_satisfied_by(&input(&[("u", "the kettle")])));
    }

    #[test]
    fn empty_conjunction_is_trivially_true() {
        let c = Condition::and(Vec::new());
        assert!(c.is_satisfied_by(&Assignment::new()));
        let g = c.get_groundings(&Assignment::new());
        assert!(!g.is_failed());
        assert_eq!(g.get_alternatives().len(), 1);
    }

    #[test]
    fn negation_flips_satisfaction_and_drops_bindings() {
        let c = Condition::negate(Condition::basic("x", "1", Relation::Equal));
        assert!(c.is_satisfied_by(&input(&[("x", "2")])));
        assert!(!c.is_satisfied_by(&input(&[("x", "1")])));
        let g = c.get_groundings(&input(&[("x", "2")]));
        assert_eq!(g.get_alternatives().len(), 1);
        assert!(g.get_alternatives().iter().next().unwrap().is_empty());
    }

    #[test]
    fn void_condition_is_always_true() {
        assert!(Condition::Void.is_satisfied_by(&Assignment::new()));
        assert_eq!(Condition::Void.to_string(), "true");
    }

    #[test]
    fn display_uses_the_compact_relation_forms() {
        assert_eq!(
            Condition::basic("u", "hello", Relation::Equal).to_string(),
            "u=hello"
        );
        assert_eq!(
            Condition::basic("x", "5", Relation::GreaterThan).to_string(),
            "x>5"
        );
        assert_eq!(
            Condition::basic("x", "b", Relation::Contains).to_string(),
            "b in x"
        );
        assert_eq!(
            Condition::negate(Condition::basic("x", "1", Relation::Equal)).to_string(),
            "!(x=1)"
        );
    }
}
