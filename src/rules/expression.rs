//! # Math Expressions
//!
//! This module implements the arithmetic expression language used by rule
//! parameters, using the Pest parser generator.
//!
//! ## Overview
//!
//! An expression is parsed once into a [`MathExpression`] tree and then
//! evaluated repeatedly against assignments of parameter variables. Numbers
//! are parsed at parse time to avoid repeated parsing during evaluation.
//! A variable may carry a single bracketed index, which resolves against an
//! array-typed value in the assignment.
//!
//! ## Grammar
//!
//! The grammar is defined in `grammar/expression.pest` using Pest's PEG
//! syntax.

use std::collections::BTreeSet;
use std::fmt;

use pest::Parser;
use pest_derive::Parser;

use crate::errors::DialError;
use crate::state::Assignment;
use crate::values::{format_short, Value};

#[derive(Parser)]
#[grammar = "grammar/expression.pest"]
struct ExpressionParser;

/// Binary arithmetic operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MathOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl fmt::Display for MathOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            MathOp::Add => "+",
            MathOp::Sub => "-",
            MathOp::Mul => "*",
            MathOp::Div => "/",
        };
        write!(f, "{symbol}")
    }
}

/// Parsed arithmetic expression over named variables.
#[derive(Debug, Clone, PartialEq)]
pub enum MathExpression {
    Number(f64),
    Variable(String),
    Neg(Box<MathExpression>),
    Binary {
        op: MathOp,
        left: Box<MathExpression>,
        right: Box<MathExpression>,
    },
}

impl MathExpression {
    /// Parses an infix arithmetic expression.
    pub fn parse(source: &str) -> Result<MathExpression, DialError> {
        let mut pairs = ExpressionParser::parse(Rule::expression, source)
            .map_err(|e| DialError::Parse(e.to_string()))?;
        let top = pairs
            .next()
            .ok_or_else(|| DialError::Parse("empty expression".to_string()))?;
        let expr = top
            .into_inner()
            .find(|p| p.as_rule() == Rule::expr)
            .ok_or_else(|| DialError::Parse("missing expression body".to_string()))?;
        build_expr(expr)
    }

    /// The base names of all free variables, without array indices.
    pub fn variables(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    fn collect_variables(&self, vars: &mut BTreeSet<String>) {
        match self {
            MathExpression::Number(_) => {}
            MathExpression::Variable(name) => {
                vars.insert(base_name(name).to_string());
            }
            MathExpression::Neg(inner) => inner.collect_variables(vars),
            MathExpression::Binary { left, right, .. } => {
                left.collect_variables(vars);
                right.collect_variables(vars);
            }
        }
    }

    /// Evaluates the expression numerically.
    ///
    /// Unbound or non-numeric variables fail; the usual floating-point
    /// behaviour applies otherwise, so dividing by zero yields an infinity
    /// rather than an error.
    pub fn evaluate(&self, assignment: &Assignment) -> Result<f64, DialError> {
        match self {
            MathExpression::Number(n) => Ok(*n),
            MathExpression::Variable(name) => resolve_variable(name, assignment),
            MathExpression::Neg(inner) => Ok(-inner.evaluate(assignment)?),
            MathExpression::Binary { op, left, right } => {
                let l = left.evaluate(assignment)?;
                let r = right.evaluate(assignment)?;
                Ok(match op {
                    MathOp::Add => l + r,
                    MathOp::Sub => l - r,
                    MathOp::Mul => l * r,
                    MathOp::Div => l / r,
                })
            }
        }
    }

    /// Replaces every variable the assignment resolves by its numeric value,
    /// leaving the rest in place.
    pub fn substitute(&self, assignment: &Assignment) -> MathExpression {
        match self {
            MathExpression::Number(n) => MathExpression::Number(*n),
            MathExpression::Variable(name) => match resolve_variable(name, assignment) {
                Ok(v) => MathExpression::Number(v),
                Err(_) => MathExpression::Variable(name.clone()),
            },
            MathExpression::Neg(inner) => {
                MathExpression::Neg(Box::new(inner.substitute(assignment)))
            }
            MathExpression::Binary { op, left, right } => MathExpression::Binary {
                op: *op,
                left: Box::new(left.substitute(assignment)),
                right: Box::new(right.substitute(assignment)),
            },
        }
    }

    /// Joins two expressions under a binary operator.
    pub fn combine(self, op: MathOp, other: MathExpression) -> MathExpression {
        MathExpression::Binary {
            op,
            left: Box::new(self),
            right: Box::new(other),
        }
    }

    /// Precedence-aware rendering; `prec` is the minimum level that may
    /// appear here without parentheses.
    fn fmt_with(&self, f: &mut fmt::Formatter<'_>, prec: u8) -> fmt::Result {
        match self {
            MathExpression::Number(n) => write!(f, "{}", format_short(*n)),
            MathExpression::Variable(name) => write!(f, "{name}"),
            MathExpression::Neg(inner) => {
                write!(f, "-")?;
                inner.fmt_with(f, 3)
            }
            MathExpression::Binary { op, left, right } => {
                let (own, right_min) = match op {
                    MathOp::Add => (1, 1),
                    MathOp::Sub => (1, 2),
                    MathOp::Mul => (2, 2),
                    MathOp::Div => (2, 3),
                };
                let parens = own < prec;
                if parens {
                    write!(f, "(")?;
                }
                left.fmt_with(f, own)?;
                write!(f, "{op}")?;
                right.fmt_with(f, right_min)?;
                if parens {
                    write!(f, ")")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for MathExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_with(f, 0)
    }
}

/// Strips the optional bracketed index from a variable label.
fn base_name(name: &str) -> &str {
    match name.find('[') {
        Some(pos) => &name[..pos],
        None => name,
    }
}

fn resolve_variable(name: &str, assignment: &Assignment) -> Result<f64, DialError> {
    let (base, index) = match name.find('[') {
        Some(pos) if name.ends_with(']') => {
            let idx = name[pos + 1..name.len() - 1]
                .parse::<usize>()
                .map_err(|e| DialError::Parse(format!("bad index in '{name}': {e}")))?;
            (&name[..pos], Some(idx))
        }
        _ => (name, None),
    };
    let value = assignment
        .get_value(base)
        .ok_or_else(|| DialError::Numerical(format!("unbound variable '{base}'")))?;
    match (value, index) {
        (Value::Double(d), None) => Ok(*d),
        (Value::Array(a), Some(i)) => a.get(i).copied().ok_or_else(|| {
            DialError::Numerical(format!("index {i} out of bounds for '{base}'"))
        }),
        (Value::Array(_), None) => Err(DialError::Numerical(format!(
            "array variable '{base}' used without an index"
        ))),
        (other, _) => Err(DialError::Numerical(format!(
            "variable '{base}' is not numeric: {other}"
        ))),
    }
}

fn build_expr(pair: pest::iterators::Pair<Rule>) -> Result<MathExpression, DialError> {
    match pair.as_rule() {
        Rule::expr | Rule::term => {
            let mut it = pair.into_inner();
            let first = it
                .next()
                .ok_or_else(|| DialError::Parse("empty expression term".to_string()))?;
            let mut node = build_expr(first)?;
            while let Some(op_pair) = it.next() {
                let op = match op_pair.as_str() {
                    "+" => MathOp::Add,
                    "-" => MathOp::Sub,
                    "*" => MathOp::Mul,
                    "/" => MathOp::Div,
                    other => {
                        return Err(DialError::Parse(format!("unknown operator '{other}'")));
                    }
                };
                let rhs_pair = it
                    .next()
                    .ok_or_else(|| DialError::Parse("missing right operand".to_string()))?;
                let rhs = build_expr(rhs_pair)?;
                node = MathExpression::Binary {
                    op,
                    left: Box::new(node),
                    right: Box::new(rhs),
                };
            }
            Ok(node)
        }
        Rule::factor => {
            let mut it = pair.into_inner();
            let first = it
                .next()
                .ok_or_else(|| DialError::Parse("empty factor".to_string()))?;
            if first.as_rule() == Rule::op_neg {
                let inner_pair = it
                    .next()
                    .ok_or_else(|| DialError::Parse("missing negated operand".to_string()))?;
                Ok(MathExpression::Neg(Box::new(build_expr(inner_pair)?)))
            } else {
                build_expr(first)
            }
        }
        Rule::number => {
            let value = pair
                .as_str()
                .parse::<f64>()
                .map_err(|e| DialError::Parse(format!("invalid number: {e}")))?;
            Ok(MathExpression::Number(value))
        }
        Rule::variable => Ok(MathExpression::Variable(pair.as_str().to_string())),
        other => Err(DialError::Parse(format!(
            "unexpected expression rule: {other:?}"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
