//! # Assignments
//!
//! An [`Assignment`] maps variable names to [`Value`]s. It preserves
//! insertion order for display and iteration, while equality and hashing are
//! order-insensitive so that `x=1 ^ y=2` and `y=2 ^ x=1` key the same table
//! row.
//!
//! The compact string syntax joins pairs with `^`: `var=value` sets a parsed
//! value, a bare `var` means true, and `!var` means false. `~` denotes the
//! empty assignment.

use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};

use indexmap::IndexMap;
use rustc_hash::{FxBuildHasher, FxHasher};

use crate::values::factory::split_top_level;
use crate::values::{Value, ValueFactory};

/// Ordered mapping from variable names to values.
#[derive(Debug, Clone, Default)]
pub struct Assignment {
    map: IndexMap<String, Value, FxBuildHasher>,
}

impl Assignment {
    /// The empty assignment.
    pub fn new() -> Assignment {
        Assignment {
            map: IndexMap::default(),
        }
    }

    /// An assignment holding a single pair.
    pub fn from_pair(var: impl Into<String>, value: Value) -> Assignment {
        let mut a = Assignment::new();
        a.map.insert(var.into(), value);
        a
    }

    pub fn from_pairs<V: Into<String>>(pairs: impl IntoIterator<Item = (V, Value)>) -> Assignment {
        let mut a = Assignment::new();
        for (var, value) in pairs {
            a.map.insert(var.into(), value);
        }
        a
    }

    /// All `vars` mapped to the none value.
    pub fn default_for<'a>(vars: impl IntoIterator<Item = &'a str>) -> Assignment {
        let mut a = Assignment::new();
        for v in vars {
            a.map.insert(v.to_string(), Value::None);
        }
        a
    }

    /// Parses the compact `var=value ^ var2 ^ !var3` syntax.
    pub fn parse(s: &str) -> Assignment {
        let mut a = Assignment::new();
        for piece in split_top_level(s, '^') {
            if piece == "~" {
                continue;
            }
            if let Some(eq) = piece.find('=') {
                let var = piece[..eq].trim();
                let value = ValueFactory::create(&piece[eq + 1..]);
                a.add_pair(var, value);
            } else if let Some(var) = piece.strip_prefix('!') {
                a.add_pair(var.trim(), Value::Bool(false));
            } else {
                a.add_pair(piece, Value::Bool(true));
            }
        }
        a
    }

    /// Inserts or overwrites a pair.
    pub fn add_pair(&mut self, var: impl Into<String>, value: Value) {
        self.map.insert(var.into(), value);
    }

    /// Inserts every pair of `other`, overwriting on conflict.
    pub fn add_all(&mut self, other: &Assignment) {
        for (k, v) in &other.map {
            self.map.insert(k.clone(), v.clone());
        }
    }

    /// New assignment combining both operands; `other` wins on conflicts.
    pub fn union(&self, other: &Assignment) -> Assignment {
        let mut a = self.clone();
        a.add_all(other);
        a
    }

    /// New assignment restricted to the given variables.
    pub fn trim_to<'a>(&self, vars: impl IntoIterator<Item = &'a str>) -> Assignment {
        let mut a = Assignment::new();
        for v in vars {
            if let Some(val) = self.map.get(v) {
                a.map.insert(v.to_string(), val.clone());
            }
        }
        a
    }

    /// New assignment without the given variable.
    pub fn without(&self, var: &str) -> Assignment {
        let mut a = self.clone();
        a.map.shift_remove(var);
        a
    }

    pub fn remove(&mut self, var: &str) -> Option<Value> {
        self.map.shift_remove(var)
    }

    pub fn get_value(&self, var: &str) -> Option<&Value> {
        self.map.get(var)
    }

    pub fn contains_var(&self, var: &str) -> bool {
        self.map.contains_key(var)
    }

    /// True if every pair of `other` appears identically in `self`.
    pub fn contains(&self, other: &Assignment) -> bool {
        other
            .map
            .iter()
            .all(|(k, v)| self.map.get(k) == Some(v))
    }

    /// True if the two assignments agree on every shared variable.
    pub fn consistent_with(&self, other: &Assignment) -> bool {
        self.map.iter().all(|(k, v)| match other.map.get(k) {
            Some(ov) => v == ov,
            None => true,
        })
    }

    /// True if every value is none.
    ///
    /// The empty assignment is trivially default.
    pub fn is_default(&self) -> bool {
        self.map.values().all(Value::is_none)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Variable names in insertion order.
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.map.keys().map(String::as_str)
    }

    /// Variable names collected into an ordered set.
    pub fn variable_set(&self) -> BTreeSet<String> {
        self.map.keys().cloned().collect()
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Values in insertion order.
    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.map.values()
    }
}

impl PartialEq for Assignment {
    fn eq(&self, other: &Self) -> bool {
        // IndexMap equality ignores insertion order.
        self.map == other.map
    }
}

impl Eq for Assignment {}

impl Hash for Assignment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Commutative combination keeps the hash insertion-order-insensitive,
        // in agreement with equality.
        let mut acc: u64 = 0;
        for (k, v) in &self.map {
            let mut h = FxHasher::default();
            k.hash(&mut h);
            v.hash(&mut h);
            acc = acc.wrapping_add(h.finish());
        }
        state.write_u64(acc);
        state.write_usize(self.map.len());
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.map.is_empty() {
            return f.write_str("~");
        }
        for (i, (k, v)) in self.map.iter().enumerate() {
            if i > 0 {
                f.write_str(" ^ ")?;
            }
            match v {
                Value::Bool(true) => f.write_str(k)?,
                Value::Bool(false) => write!(f, "!{k}")?,
                _ => write!(f, "{k}={v}")?,
            }
        }
        Ok(())
    }
}

impl<V: Into<String>> FromIterator<(V, Value)> for Assignment {
    fn from_iter<T: IntoIterator<Item = (V, Value)>>(iter: T) -> Assignment {
        Assignment::from_pairs(iter)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(a: &Assignment) -> u64 {
        let mut h = DefaultHasher::new();
        a.hash(&mut h);
        h.finish()
    }

    #[test]
    fn equality_and_hash_ignore_insertion_order() {
        let mut a = Assignment::new();
        a.add_pair("x", Value::Double(1.0));
        a.add_pair("y", Value::from_string("hi"));
        let mut b = Assignment::new();
        b.add_pair("y", Value::from_string("hi"));
        b.add_pair("x", Value::Double(1.0));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn display_preserves_insertion_order() {
        let mut a = Assignment::new();
        a.add_pair("second", Value::Double(2.0));
        a.add_pair("first", Value::Double(1.0));
        assert_eq!(a.to_string(), "second=2 ^ first=1");
    }

    #[test]
    fn compact_syntax_round_trips() {
        let a = Assignment::parse("u_u=hello there ^ flag ^ !muted ^ score=0.5");
        assert_eq!(a.get_value("u_u"), Some(&Value::from_string("hello there")));
        assert_eq!(a.get_value("flag"), Some(&Value::Bool(true)));
        assert_eq!(a.get_value("muted"), Some(&Value::Bool(false)));
        assert_eq!(a.get_value("score"), Some(&Value::Double(0.5)));
        assert_eq!(Assignment::parse(&a.to_string()), a);
    }

    #[test]
    fn empty_assignment_displays_as_tilde() {
        assert_eq!(Assignment::new().to_string(), "~");
        assert_eq!(Assignment::parse("~"), Assignment::new());
    }

    #[test]
    fn union_prefers_right_operand() {
        let a = Assignment::from_pair("x", Value::Double(1.0));
        let b = Assignment::from_pair("x", Value::Double(2.0));
        assert_eq!(a.union(&b).get_value("x"), Some(&Value::Double(2.0)));
    }

    #[test]
    fn trim_keeps_only_requested_variables() {
        let a = Assignment::parse("x=1 ^ y=2 ^ z=3");
        let t = a.trim_to(["x", "z", "missing"]);
        assert_eq!(t.len(), 2);
        assert!(t.contains_var("x"));
        assert!(!t.contains_var("y"));
    }

    #[test]
    fn consistency_checks_shared_variables_only() {
        let a = Assignment::parse("x=1 ^ y=2");
        let b = Assignment::parse("y=2 ^ z=9");
        let c = Assignment::parse("y=3");
        assert!(a.consistent_with(&b));
        assert!(b.consistent_with(&a));
        assert!(!a.consistent_with(&c));
    }

    #[test]
    fn containment_requires_identical_pairs() {
        let a = Assignment::parse("x=1 ^ y=2");
        assert!(a.contains(&Assignment::parse("x=1")));
        assert!(a.contains(&Assignment::new()));
        assert!(!a.contains(&Assignment::parse("x=2")));
        assert!(!Assignment::parse("x=1").contains(&a));
    }

    #[test]
    fn default_assignments_map_everything_to_none() {
        let d = Assignment::default_for(["a", "b"]);
        assert_eq!(d.len(), 2);
        assert!(d.is_default());
        assert_eq!(d.get_value("a"), Some(&Value::None));
        assert!(!Assignment::parse("a=1").is_default());
        assert!(Assignment::new().is_default());
    }

    #[test]
    fn assignments_key_hash_maps() {
        use rustc_hash::FxHashMap;
        let mut m: FxHashMap<Assignment, f64> = FxHashMap::default();
        m.insert(Assignment::parse("x=1 ^ y=2"), 0.4);
        assert_eq!(m.get(&Assignment::parse("y=2 ^ x=1")), Some(&0.4));
    }
}
