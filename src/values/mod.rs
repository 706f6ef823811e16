//! # Tagged Values
//!
//! This module implements the closed value algebra shared by every
//! distribution and rule in the crate.
//!
//! ## Key Components
//!
//! - **Value**: tagged union over none, booleans, doubles, strings, numeric
//!   arrays, ordered sets, relational graphs, and registered custom values
//! - **ValueFactory** (submodule [`factory`]): string parsing and typed
//!   construction, including the `@Class` / `@func(...)` registries
//! - **RelationalValue** (submodule [`relational`]): small labeled digraph
//!   with canonical ordering
//!
//! ## Design
//!
//! Equality, ordering, and hashing agree exactly, which lets values act as
//! keys in hashed and ordered containers alike:
//! - `Double` identity quantizes to the [`DOUBLE_EPSILON`] grid, so two
//!   doubles closer than the tolerance compare, order, and hash identically
//! - `String` identity folds ASCII case, matching the case-insensitive
//!   template matching used across the rule language
//! - values of different variants order by a fixed variant rank, giving a
//!   total order without any type-homogeneity requirement
//!
//! Values are immutable; `clone` yields a structurally independent copy.

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::errors::DialError;

pub mod factory;
pub mod relational;

pub use factory::ValueFactory;
pub use relational::{Edge, RelationalValue};

/// Tolerance under which two doubles are considered the same value.
pub const DOUBLE_EPSILON: f64 = 1e-10;

/// A single value for a random variable.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value ("no information").
    #[default]
    None,
    /// Boolean value.
    Bool(bool),
    /// Numeric value with epsilon-tolerant identity.
    Double(f64),
    /// Free-text value with ASCII-case-insensitive identity.
    String(String),
    /// Vector of doubles, e.g. a point estimate for a continuous variable.
    Array(Vec<f64>),
    /// Ordered set of values.
    Set(BTreeSet<Value>),
    /// Labeled digraph value.
    Relational(RelationalValue),
    /// Opaque value produced by a registered constructor.
    Custom(CustomValue),
}

/// Value built by a registered `@ClassName` constructor.
///
/// The class name identifies the registration; the content string is the
/// value's identity and display form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CustomValue {
    class: String,
    content: String,
}

impl CustomValue {
    pub fn new(class: impl Into<String>, content: impl Into<String>) -> CustomValue {
        CustomValue {
            class: class.into(),
            content: content.into(),
        }
    }

    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Quantized identity of a double: NaN flag plus grid cell index.
///
/// Saturating float-to-int casts make the infinities compare and hash
/// consistently at the extremes.
#[inline]
fn quantize(x: f64) -> (bool, i128) {
    if x.is_nan() {
        (true, 0)
    } else {
        (false, (x / DOUBLE_EPSILON).round() as i128)
    }
}

/// ASCII-case-folded string comparison, consistent with [`fold_hash_str`].
fn cmp_str_fold(a: &str, b: &str) -> Ordering {
    let fa = a.bytes().map(|b| b.to_ascii_lowercase());
    let fb = b.bytes().map(|b| b.to_ascii_lowercase());
    fa.cmp(fb)
}

fn fold_hash_str<H: Hasher>(s: &str, state: &mut H) {
    for b in s.bytes() {
        state.write_u8(b.to_ascii_lowercase());
    }
    // Terminator keeps the encoding prefix-free, as `Hash for str` does.
    state.write_u8(0xff);
}

fn cmp_arrays(a: &[f64], b: &[f64]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match quantize(*x).cmp(&quantize(*y)) {
            Ordering::Equal => continue,
            ord => return ord,
        }
    }
    a.len().cmp(&b.len())
}

impl Value {
    /// Fixed rank used to order values of different variants.
    fn rank(&self) -> u8 {
        match self {
            Value::None => 0,
            Value::Bool(_) => 1,
            Value::Double(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Set(_) => 5,
            Value::Relational(_) => 6,
            Value::Custom(_) => 7,
        }
    }

    /// Constructs a string value without any parsing.
    ///
    /// Unlike [`ValueFactory::create`], `"5"` stays a string here.
    pub fn from_string(s: impl Into<String>) -> Value {
        Value::String(s.into())
    }

    /// Constructs a set value from any iterable of values.
    pub fn from_set(values: impl IntoIterator<Item = Value>) -> Value {
        Value::Set(values.into_iter().collect())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Value::None)
    }

    /// The numeric content, if this is a double.
    pub fn as_double(&self) -> Option<f64> {
        match self {
            Value::Double(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Number of elementary constituents.
    ///
    /// `None` has length 0 and scalar variants length 1. Strings count their
    /// whitespace-separated tokens, mirroring how they decompose in
    /// [`Value::sub_values`]. Collections count their elements.
    pub fn length(&self) -> usize {
        match self {
            Value::None => 0,
            Value::Bool(_) | Value::Double(_) | Value::Custom(_) => 1,
            Value::String(s) => s.split_whitespace().count(),
            Value::Array(a) => a.len(),
            Value::Set(s) => s.len(),
            Value::Relational(r) => r.node_count(),
        }
    }

    /// Membership test.
    ///
    /// Strings treat the item's string form as a template and accept a
    /// token-boundary partial match, so `"my name is Pierre"` contains
    /// `"Pierre"` and also the underspecified `"name is {x}"`. Arrays test
    /// tolerance-aware element membership, sets exact membership, relational
    /// values node-content membership. Scalars degrade to equality.
    pub fn contains(&self, item: &Value) -> bool {
        match self {
            Value::None | Value::Bool(_) | Value::Double(_) | Value::Custom(_) => self == item,
            Value::String(s) => crate::templates::Template::new(&item.to_string())
                .match_partial(s)
                .is_matching(),
            Value::Array(a) => match item {
                Value::Double(d) => a.iter().any(|x| quantize(*x) == quantize(*d)),
                _ => false,
            },
            Value::Set(s) => s.contains(item),
            Value::Relational(r) => r.contains_content(&item.to_string()),
        }
    }

    /// Decomposes the value into its elementary constituents.
    ///
    /// Scalars return an empty vector. Strings split on whitespace and each
    /// token is re-parsed through the factory, so `"take 2 apples"` yields a
    /// string, a double, and a string.
    pub fn sub_values(&self) -> Vec<Value> {
        match self {
            Value::None | Value::Bool(_) | Value::Double(_) | Value::Custom(_) => Vec::new(),
            Value::String(s) => s.split_whitespace().map(ValueFactory::create).collect(),
            Value::Array(a) => a.iter().map(|d| Value::Double(*d)).collect(),
            Value::Set(s) => s.iter().cloned().collect(),
            Value::Relational(r) => r
                .nodes()
                .iter()
                .map(|n| Value::String(n.clone()))
                .collect(),
        }
    }

    /// Combines two values into one.
    ///
    /// `None` is the identity on either side. Doubles sum, strings join with
    /// a space (numbers rendered in short form), booleans conjoin, arrays
    /// extend elementwise, and sets take the union; an array meeting a set
    /// decomposes into a set first. Every other pairing is an error.
    pub fn concatenate(&self, other: &Value) -> Result<Value, DialError> {
        use Value::*;
        match (self, other) {
            (None, _) => Ok(other.clone()),
            (_, None) => Ok(self.clone()),
            (Double(a), Double(b)) => Ok(Double(a + b)),
            (Double(a), String(b)) => Ok(String(format!("{} {}", format_short(*a), b))),
            (String(a), Double(b)) => Ok(String(format!("{} {}", a, format_short(*b)))),
            (String(a), String(b)) => Ok(String(format!("{a} {b}"))),
            (Bool(a), Bool(b)) => Ok(Bool(*a && *b)),
            (Array(a), Array(b)) => {
                let mut joined = a.clone();
                joined.extend_from_slice(b);
                Ok(Array(joined))
            }
            (Array(_), Set(_)) => Value::from_set(self.sub_values()).concatenate(other),
            (Set(a), Set(b)) => Ok(Set(a.union(b).cloned().collect())),
            (a, b) => Err(DialError::Concatenation(format!(
                "cannot concatenate {a} and {b}"
            ))),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        use Value::*;
        match (self, other) {
            (None, None) => Ordering::Equal,
            (Bool(a), Bool(b)) => a.cmp(b),
            (Double(a), Double(b)) => quantize(*a).cmp(&quantize(*b)),
            (String(a), String(b)) => cmp_str_fold(a, b),
            (Array(a), Array(b)) => cmp_arrays(a, b),
            (Set(a), Set(b)) => a.cmp(b),
            (Relational(a), Relational(b)) => a.cmp(b),
            (Custom(a), Custom(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u8(self.rank());
        match self {
            Value::None => {}
            Value::Bool(b) => b.hash(state),
            Value::Double(d) => quantize(*d).hash(state),
            Value::String(s) => fold_hash_str(s, state),
            Value::Array(a) => {
                state.write_usize(a.len());
                for d in a {
                    quantize(*d).hash(state);
                }
            }
            Value::Set(s) => {
                state.write_usize(s.len());
                for v in s {
                    v.hash(state);
                }
            }
            Value::Relational(r) => r.hash(state),
            Value::Custom(c) => c.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::None => f.write_str("None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Double(d) => f.write_str(&format_short(*d)),
            Value::String(s) => f.write_str(s),
            Value::Array(a) => {
                f.write_str("[")?;
                for (i, d) in a.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    f.write_str(&format_short(*d))?;
                }
                f.write_str("]")
            }
            Value::Set(s) => {
                f.write_str("[")?;
                for (i, v) in s.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
            Value::Relational(r) => write!(f, "{r}"),
            Value::Custom(c) => f.write_str(c.content()),
        }
    }
}

impl From<f64> for Value {
    fn from(d: f64) -> Value {
        Value::Double(d)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Value {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Value {
        Value::String(s.to_string())
    }
}

/// Renders a double in short numeric form.
///
/// Integers lose their trailing `.0` and other numbers keep at most four
/// decimals, so stringified values stay readable and re-parse to an equal
/// value: `2.0` renders as `"2"` and `0.1 + 0.2` as `"0.3"`.
pub fn format_short(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_string();
    }
    if x.is_infinite() {
        return if x > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if (x - x.round()).abs() < DOUBLE_EPSILON && x.abs() < 1e15 {
        return format!("{}", x.round() as i64);
    }
    let s = format!("{x:.4}");
    s.trim_end_matches('0').trim_end_matches('.').to_string()
}

// ============================================================================
// Tests
// ============================================================================
