//! # Effect Parameters
//!
//! A [`Parameter`] attaches a probability or utility weight to a rule
//! effect. It is either a fixed constant, a reference to a single latent
//! parameter variable (optionally indexed into an array draw), or an
//! arithmetic expression over several such variables.
//!
//! Evaluation never fails: a missing variable or a failed expression logs a
//! warning and contributes 0.0, so one malformed rule cannot halt inference.
//! Grounding against a latent assignment reduces a parameter to a fixed
//! constant once all its variables are covered.

use std::collections::BTreeSet;
use std::fmt;

use crate::errors::DialError;
use crate::rules::expression::{MathExpression, MathOp};
use crate::state::Assignment;
use crate::values::{format_short, Value};

/// Weight attached to a rule effect.
#[derive(Debug, Clone, PartialEq)]
pub enum Parameter {
    /// Constant weight, ignoring the assignment.
    Fixed(f64),
    /// Reference to one latent parameter variable, with an optional index
    /// into an array-typed draw.
    Single {
        id: String,
        dimension: Option<usize>,
    },
    /// Arithmetic combination of several latent parameters.
    Complex(MathExpression),
}

impl Parameter {
    /// Parses an arithmetic expression into a complex parameter.
    pub fn complex(source: &str) -> Result<Parameter, DialError> {
        Ok(Parameter::Complex(MathExpression::parse(source)?))
    }

    /// Reference to one latent parameter variable.
    pub fn single(id: impl Into<String>) -> Parameter {
        Parameter::Single {
            id: id.into(),
            dimension: None,
        }
    }

    /// Reference to one element of an array-typed parameter draw.
    pub fn indexed(id: impl Into<String>, dimension: usize) -> Parameter {
        Parameter::Single {
            id: id.into(),
            dimension: Some(dimension),
        }
    }

    /// Numeric weight under the given latent assignment.
    ///
    /// Missing variables and evaluation failures log a warning and yield
    /// 0.0.
    pub fn get_value(&self, assignment: &Assignment) -> f64 {
        match self {
            Parameter::Fixed(v) => *v,
            Parameter::Single { id, dimension } => {
                match (assignment.get_value(id), dimension) {
                    (Some(Value::Double(d)), None) => *d,
                    (Some(Value::Array(a)), Some(i)) => match a.get(*i) {
                        Some(d) => *d,
                        None => {
                            tracing::warn!(parameter = %id, index = i,
                                "parameter index out of bounds, using 0");
                            0.0
                        }
                    },
                    (Some(other), _) => {
                        tracing::warn!(parameter = %id, value = %other,
                            "parameter value is not numeric, using 0");
                        0.0
                    }
                    (None, _) => {
                        tracing::warn!(parameter = %id,
                            "assignment does not cover parameter, using 0");
                        0.0
                    }
                }
            }
            Parameter::Complex(expr) => match expr.evaluate(assignment) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(expression = %expr, error = %e,
                        "parameter evaluation failed, using 0");
                    0.0
                }
            },
        }
    }

    /// The constant weight, when no latent variable is involved.
    pub fn fixed_value(&self) -> Option<f64> {
        match self {
            Parameter::Fixed(v) => Some(*v),
            _ => None,
        }
    }

    /// Latent variables this parameter depends on.
    pub fn get_variables(&self) -> BTreeSet<String> {
        match self {
            Parameter::Fixed(_) => BTreeSet::new(),
            Parameter::Single { id, .. } => BTreeSet::from([id.clone()]),
            Parameter::Complex(expr) => expr.variables(),
        }
    }

    /// Reduces the parameter under a latent assignment: fully covered
    /// parameters become fixed, partially covered expressions keep their
    /// unresolved variables.
    pub fn ground(&self, assignment: &Assignment) -> Parameter {
        match self {
            Parameter::Fixed(v) => Parameter::Fixed(*v),
            Parameter::Single { id, .. } => {
                if assignment.contains_var(id) {
                    Parameter::Fixed(self.get_value(assignment))
                } else {
                    self.clone()
                }
            }
            Parameter::Complex(expr) => {
                let covered = expr
                    .variables()
                    .iter()
                    .all(|v| assignment.contains_var(v));
                if covered {
                    Parameter::Fixed(self.get_value(assignment))
                } else {
                    Parameter::Complex(expr.substitute(assignment))
                }
            }
        }
    }

    /// The expression form, used when parameters are merged symbolically.
    pub fn to_expression(&self) -> MathExpression {
        match self {
            Parameter::Fixed(v) => MathExpression::Number(*v),
            Parameter::Single { id, dimension } => match dimension {
                Some(i) => MathExpression::Variable(format!("{id}[{i}]")),
                None => MathExpression::Variable(id.clone()),
            },
            Parameter::Complex(expr) => expr.clone(),
        }
    }

    /// Combines two parameters under an arithmetic operator, numerically
    /// when both are fixed and symbolically otherwise.
    pub fn merge(&self, op: MathOp, other: &Parameter) -> Parameter {
        if let (Parameter::Fixed(a), Parameter::Fixed(b)) = (self, other) {
            let v = match op {
                MathOp::Add => a + b,
                MathOp::Sub => a - b,
                MathOp::Mul => a * b,
                MathOp::Div => a / b,
            };
            return Parameter::Fixed(v);
        }
        Parameter::Complex(self.to_expression().combine(op, other.to_expression()))
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameter::Fixed(v) => write!(f, "{}", format_short(*v)),
            Parameter::Single { id, dimension } => match dimension {
                Some(i) => write!(f, "{id}[{i}]"),
                None => write!(f, "{id}"),
            },
            Parameter::Complex(expr) => write!(f, "{expr}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_parameters_ignore_the_assignment() {
        let p = Parameter::Fixed(0.75);
        assert_eq!(p.get_value(&Assignment::new()), 0.75);
        assert!(p.get_variables().is_empty());
    }

    #[test]
    fn single_parameters_read_doubles() {
        let p = Parameter::single("theta");
        let a = Assignment::from_pair("theta", Value::Double(0.3));
        assert_eq!(p.get_value(&a), 0.3);
    }

    #[test]
    fn indexed_parameters_read_array_draws() {
        let p = Parameter::indexed("theta", 1);
        let a = Assignment::from_pair("theta", Value::Array(vec![0.2, 0.5, 0.3]));
        assert_eq!(p.get_value(&a), 0.5);
        let out_of_bounds = Parameter::indexed("theta", 7);
        assert_eq!(out_of_bounds.get_value(&a), 0.0);
    }

    #[test]
    fn missing_or_mistyped_parameters_degrade_to_zero() {
        let p = Parameter::single("theta");
        assert_eq!(p.get_value(&Assignment::new()), 0.0);
        let a = Assignment::from_pair("theta", Value::from_string("oops"));
        assert_eq!(p.get_value(&a), 0.0);
    }

    #[test]
    fn complex_parameters_evaluate_their_expression() {
        let p = Parameter::complex("1-(theta+beta)").unwrap();
        let mut a = Assignment::new();
        a.add_pair("theta", Value::Double(0.4));
        a.add_pair("beta", Value::Double(0.1));
        assert!((p.get_value(&a) - 0.5).abs() < 1e-9);
        assert_eq!(
            p.get_variables(),
            BTreeSet::from(["beta".to_string(), "theta".to_string()])
        );
    }

    #[test]
    fn failed_evaluation_degrades_to_zero() {
        let p = Parameter::complex("theta*2").unwrap();
        assert_eq!(p.get_value(&Assignment::new()), 0.0);
    }

    #[test]
    fn grounding_a_covered_parameter_fixes_it() {
        let p = Parameter::complex("theta*2").unwrap();
        let grounded = p.ground(&Assignment::from_pair("theta", Value::Double(0.2)));
        assert_eq!(grounded.fixed_value(), Some(0.4));
    }

    #[test]
    fn grounding_a_partial_expression_keeps_the_rest_symbolic() {
        let p = Parameter::complex("theta+beta").unwrap();
        let grounded = p.ground(&Assignment::from_pair("theta", Value::Double(0.2)));
        assert!(grounded.fixed_value().is_none());
        assert_eq!(grounded.get_variables(), BTreeSet::from(["beta".to_string()]));
        let rest = Assignment::from_pair("beta", Value::Double(0.3));
        assert!((grounded.get_value(&rest) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn merging_fixed_parameters_computes_directly() {
        let p = Parameter::Fixed(0.5).merge(MathOp::Mul, &Parameter::Fixed(0.4));
        assert_eq!(p.fixed_value(), Some(0.2));
    }

    #[test]
    fn merging_with_a_latent_parameter_stays_symbolic() {
        let p = Parameter::Fixed(0.5).merge(MathOp::Mul, &Parameter::single("theta"));
        assert!(p.fixed_value().is_none());
        assert_eq!(p.to_string(), "0.5*theta");
        let a = Assignment::from_pair("theta", Value::Double(0.4));
        assert!((p.get_value(&a) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn display_preserves_the_indexed_form() {
        assert_eq!(Parameter::indexed("theta", 2).to_string(), "theta[2]");
        assert_eq!(Parameter::single("theta").to_string(), "theta");
        assert_eq!(Parameter::Fixed(0.25).to_string(), "0.25");
    }
}
