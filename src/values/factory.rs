//! # Value Factory
//!
//! Turns raw strings and primitive inputs into [`Value`]s.
//!
//! ## Dispatch order
//!
//! [`ValueFactory::create`] tests candidates in a fixed priority order:
//! numeric literal, boolean literal, `"none"`, bracketed all-numeric list
//! (array), bracketed relational-graph syntax, bracketed set with recursive
//! element parsing, `@ClassName` and `@func(args)` registry forms, and
//! finally a plain string.
//!
//! ## Registries
//!
//! `@ClassName` resolves through a process-wide registry of custom-value
//! constructors and `@func(args)` through a registry of named functions,
//! both populated by the domain-loading layer at configuration time. The
//! strict entry point [`ValueFactory::try_create`] surfaces unresolved
//! references as validation errors; the lenient [`ValueFactory::create`]
//! logs them and keeps the raw string, so runtime string conversions can
//! never fail.

use std::sync::{Arc, OnceLock, RwLock};

use regex::Regex;
use rustc_hash::FxHashMap;

use crate::errors::DialError;
use crate::values::relational::RelationalValue;
use crate::values::{CustomValue, Value};

/// Constructor registered for an `@ClassName` form.
pub type ClassConstructor = Arc<dyn Fn() -> CustomValue + Send + Sync>;

/// Function registered for an `@func(args)` form.
pub type NamedFunction = Arc<dyn Fn(&[Value]) -> Result<Value, DialError> + Send + Sync>;

static NUMERIC_RE: OnceLock<Regex> = OnceLock::new();
static CLASS_REGISTRY: OnceLock<RwLock<FxHashMap<String, ClassConstructor>>> = OnceLock::new();
static FUNCTION_REGISTRY: OnceLock<RwLock<FxHashMap<String, NamedFunction>>> = OnceLock::new();

fn numeric_re() -> &'static Regex {
    NUMERIC_RE.get_or_init(|| {
        Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?$").unwrap()
    })
}

fn class_registry() -> &'static RwLock<FxHashMap<String, ClassConstructor>> {
    CLASS_REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

fn function_registry() -> &'static RwLock<FxHashMap<String, NamedFunction>> {
    FUNCTION_REGISTRY.get_or_init(|| RwLock::new(FxHashMap::default()))
}

/// Namespace for value construction.
pub struct ValueFactory;

impl ValueFactory {
    /// Parses a raw string into a value, never failing.
    ///
    /// Follows the dispatch order documented at module level; anything
    /// unrecognized, including unresolved `@` forms, becomes a plain string
    /// (with a warning for the `@` case).
    pub fn create(raw: &str) -> Value {
        match Self::try_create(raw) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(raw, error = %e, "value creation failed, keeping raw string");
                Value::String(raw.trim().to_string())
            }
        }
    }

    /// Parses a raw string into a value.
    ///
    /// Identical to [`ValueFactory::create`] except that unresolved custom
    /// classes or functions, and failing function invocations, surface as
    /// errors. The domain-loading layer uses this strict form at
    /// configuration time.
    pub fn try_create(raw: &str) -> Result<Value, DialError> {
        let trimmed = raw.trim();
        if numeric_re().is_match(trimmed) {
            return trimmed
                .parse::<f64>()
                .map(Value::Double)
                .map_err(|e| DialError::Parse(format!("bad numeric literal '{trimmed}': {e}")));
        }
        if trimmed.eq_ignore_ascii_case("true") {
            return Ok(Value::Bool(true));
        }
        if trimmed.eq_ignore_ascii_case("false") {
            return Ok(Value::Bool(false));
        }
        if trimmed.eq_ignore_ascii_case("none") {
            return Ok(Value::None);
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') && trimmed.len() >= 2 {
            let inner = &trimmed[1..trimmed.len() - 1];
            if let Some(arr) = parse_numeric_array(inner) {
                return Ok(Value::Array(arr));
            }
            if let Some(rel) = RelationalValue::parse(trimmed) {
                return Ok(Value::Relational(rel));
            }
            let elements = split_top_level(inner, ',');
            return Ok(Value::Set(
                elements.into_iter().map(Self::create).collect(),
            ));
        }
        if let Some(rest) = trimmed.strip_prefix('@') {
            if let Some(v) = Self::try_create_at_form(rest)? {
                return Ok(v);
            }
        }
        Ok(Value::String(trimmed.to_string()))
    }

    /// Resolves `@ClassName` or `@func(args)`.
    ///
    /// `Ok(None)` means the text does not look like either form and should
    /// fall through to a plain string.
    fn try_create_at_form(rest: &str) -> Result<Option<Value>, DialError> {
        if let Some(open) = rest.find('(') {
            if rest.ends_with(')') {
                let name = &rest[..open];
                if !is_identifier(name) {
                    return Ok(None);
                }
                let func = lookup_function(name).ok_or_else(|| {
                    DialError::Validation(format!("no registered function '@{name}'"))
                })?;
                let args: Vec<Value> = split_top_level(&rest[open + 1..rest.len() - 1], ',')
                    .into_iter()
                    .map(Self::create)
                    .collect();
                return func(&args).map(Some);
            }
            return Ok(None);
        }
        if !is_identifier(rest) {
            return Ok(None);
        }
        let ctor = lookup_class(rest).ok_or_else(|| {
            DialError::Validation(format!("no registered value class '@{rest}'"))
        })?;
        Ok(Some(Value::Custom(ctor())))
    }

    /// The none value.
    pub fn none() -> Value {
        Value::None
    }

    pub fn create_double(d: f64) -> Value {
        Value::Double(d)
    }

    pub fn create_bool(b: bool) -> Value {
        Value::Bool(b)
    }

    /// Builds a collection value from a list of elements.
    ///
    /// A non-empty all-double list becomes an array, anything else a set.
    pub fn create_list(values: Vec<Value>) -> Value {
        if !values.is_empty() && values.iter().all(|v| matches!(v, Value::Double(_))) {
            Value::Array(values.iter().filter_map(Value::as_double).collect())
        } else {
            Value::Set(values.into_iter().collect())
        }
    }

    /// Lenient concatenation: logs and returns none on unsupported pairs.
    ///
    /// The strict, failing form is [`Value::concatenate`].
    pub fn concatenate(a: &Value, b: &Value) -> Value {
        match a.concatenate(b) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(left = %a, right = %b, error = %e, "unsupported concatenation, returning none");
                Value::None
            }
        }
    }

    /// Registers a custom-value constructor reachable as `@name`.
    ///
    /// Later registrations under the same name replace earlier ones.
    pub fn register_class(
        name: impl Into<String>,
        ctor: impl Fn() -> CustomValue + Send + Sync + 'static,
    ) {
        match class_registry().write() {
            Ok(mut reg) => {
                reg.insert(name.into(), Arc::new(ctor));
            }
            Err(_) => tracing::error!("custom value registry lock poisoned"),
        }
    }

    /// Registers a named function reachable as `@name(args)`.
    pub fn register_function(
        name: impl Into<String>,
        func: impl Fn(&[Value]) -> Result<Value, DialError> + Send + Sync + 'static,
    ) {
        match function_registry().write() {
            Ok(mut reg) => {
                reg.insert(name.into(), Arc::new(func));
            }
            Err(_) => tracing::error!("function registry lock poisoned"),
        }
    }
}

fn lookup_class(name: &str) -> Option<ClassConstructor> {
    class_registry().read().ok()?.get(name).cloned()
}

fn lookup_function(name: &str) -> Option<NamedFunction> {
    function_registry().read().ok()?.get(name).cloned()
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s.chars().next().map(|c| c.is_alphabetic() || c == '_').unwrap_or(false)
        && s.chars().all(|c| c.is_alphanumeric() || c == '_')
}

/// Parses `inner` as a comma-separated list of numeric literals.
fn parse_numeric_array(inner: &str) -> Option<Vec<f64>> {
    let parts = split_top_level(inner, ',');
    if parts.is_empty() {
        return None;
    }
    let mut out = Vec::with_capacity(parts.len());
    for p in parts {
        if !numeric_re().is_match(p) {
            return None;
        }
        out.push(p.parse::<f64>().ok()?);
    }
    Some(out)
}

/// Splits on `sep` at bracket depth zero, trimming and dropping empty parts.
///
/// Both square brackets and parentheses count toward nesting, so set
/// elements and function arguments can themselves be bracketed.
pub(crate) fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in s.char_indices() {
        match c {
            '[' | '(' => depth += 1,
            ']' | ')' => depth = depth.saturating_sub(1),
            c if c == sep && depth == 0 => {
                let piece = s[start..i].trim();
                if !piece.is_empty() {
                    parts.push(piece);
                }
                start = i + sep.len_utf8();
            }
            _ => {}
        }
    }
    let piece = s[start..].trim();
    if !piece.is_empty() {
        parts.push(piece);
    }
    parts
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_literals_become_doubles() {
        assert_eq!(ValueFactory::create("2"), Value::Double(2.0));
        assert_eq!(ValueFactory::create("-0.5"), Value::Double(-0.5));
        assert_eq!(ValueFactory::create("1e-3"), Value::Double(0.001));
        assert_eq!(ValueFactory::create(" 3.5 "), Value::Double(3.5));
    }

    #[test]
    fn nan_and_inf_words_stay_strings() {
        assert_eq!(ValueFactory::create("nan"), Value::from_string("nan"));
        assert_eq!(ValueFactory::create("inf"), Value::from_string("inf"));
    }

    #[test]
    fn boolean_and_none_literals() {
        assert_eq!(ValueFactory::create("true"), Value::Bool(true));
        assert_eq!(ValueFactory::create("FALSE"), Value::Bool(false));
        assert_eq!(ValueFactory::create("None"), Value::None);
        assert_eq!(ValueFactory::create("none"), Value::None);
    }

    #[test]
    fn all_numeric_brackets_become_arrays() {
        assert_eq!(
            ValueFactory::create("[0.2, 0.8]"),
            Value::Array(vec![0.2, 0.8])
        );
        assert_eq!(ValueFactory::create("[1]"), Value::Array(vec![1.0]));
    }

    #[test]
    fn relational_syntax_beats_set_syntax() {
        let v = ValueFactory::create("[john -knows-> mary]");
        assert!(matches!(v, Value::Relational(_)));
        assert_eq!(v.length(), 2);
    }

    #[test]
    fn mixed_brackets_become_sets() {
        let v = ValueFactory::create("[a, 2, true]");
        assert_eq!(
            v,
            Value::from_set([
                Value::from_string("a"),
                Value::Double(2.0),
                Value::Bool(true)
            ])
        );
    }

    #[test]
    fn nested_brackets_stay_in_one_element() {
        let v = ValueFactory::create("[[1,2], [3,4]]");
        assert_eq!(
            v,
            Value::from_set([
                Value::Array(vec![1.0, 2.0]),
                Value::Array(vec![3.0, 4.0])
            ])
        );
    }

    #[test]
    fn empty_brackets_are_an_empty_set() {
        assert_eq!(ValueFactory::create("[]"), Value::from_set([]));
    }

    #[test]
    fn fallback_is_a_trimmed_string() {
        assert_eq!(
            ValueFactory::create("  open the door "),
            Value::from_string("open the door")
        );
    }

    #[test]
    fn registered_class_resolves() {
        ValueFactory::register_class("FactoryTestColor", || {
            CustomValue::new("FactoryTestColor", "blue")
        });
        let v = ValueFactory::create("@FactoryTestColor");
        assert_eq!(
            v,
            Value::Custom(CustomValue::new("FactoryTestColor", "blue"))
        );
    }

    #[test]
    fn unregistered_class_errors_strictly_and_falls_back_leniently() {
        assert!(matches!(
            ValueFactory::try_create("@NoSuchClassAnywhere"),
            Err(DialError::Validation(_))
        ));
        assert_eq!(
            ValueFactory::create("@NoSuchClassAnywhere"),
            Value::from_string("@NoSuchClassAnywhere")
        );
    }

    #[test]
    fn registered_function_is_invoked_with_parsed_args() {
        ValueFactory::register_function("factory_test_sum", |args| {
            let total = args.iter().filter_map(Value::as_double).sum();
            Ok(Value::Double(total))
        });
        assert_eq!(
            ValueFactory::create("@factory_test_sum(1, 2, 3.5)"),
            Value::Double(6.5)
        );
    }

    #[test]
    fn at_text_that_is_not_a_form_stays_string() {
        assert_eq!(
            ValueFactory::create("@not a form"),
            Value::from_string("@not a form")
        );
    }

    #[test]
    fn list_construction_dispatches_on_element_type() {
        let arr = ValueFactory::create_list(vec![Value::Double(1.0), Value::Double(2.0)]);
        assert_eq!(arr, Value::Array(vec![1.0, 2.0]));
        let set = ValueFactory::create_list(vec![Value::Double(1.0), Value::from_string("a")]);
        assert!(matches!(set, Value::Set(_)));
    }

    #[test]
    fn lenient_concatenate_returns_none_on_bad_pair() {
        let out = ValueFactory::concatenate(&Value::Bool(true), &Value::Double(1.0));
        assert_eq!(out, Value::None);
    }

    #[test]
    fn split_top_level_respects_nesting() {
        assert_eq!(
            split_top_level("a, [b, c], d(e, f)", ','),
            vec!["a", "[b, c]", "d(e, f)"]
        );
        assert_eq!(split_top_level("", ','), Vec::<&str>::new());
    }
}
