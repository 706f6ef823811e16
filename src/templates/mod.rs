//! # String Templates
//!
//! Templates are strings with `{slot}` placeholders, such as
//! `"my name is {name}"`. They are the unification currency of the rule
//! language: condition values, effect values, and variable labels may all be
//! underspecified templates that get bound against concrete strings.
//!
//! ## Key Components
//!
//! - **Template**: a compiled pattern supporting anchored (`match_full`),
//!   token-boundary substring (`match_partial`), and multi-occurrence (`find`)
//!   matching, plus slot substitution (`fill_slots`)
//! - **MatchResult**: outcome of a match, carrying the slot bindings as an
//!   [`Assignment`] and the matched byte span for partial searches
//!
//! ## Design
//!
//! Matching is case-insensitive throughout. Literal segments are
//! regex-escaped and slots become greedy capture groups, so a trailing slot
//! absorbs the remainder of the input. Partial matches are only accepted on
//! token boundaries: `"45"` does not partially match `"12345"`. Captured slot
//! strings are converted to values with [`ValueFactory::create`], so a slot
//! bound against `"3.5"` yields a numeric binding.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{OnceLock, RwLock};

use regex::Regex;

use crate::state::Assignment;
use crate::values::factory::ValueFactory;

/// Upper bound on the process-wide compiled-pattern cache.
const REGEX_CACHE_MAX: usize = 1024;

static REGEX_CACHE: OnceLock<RwLock<HashMap<String, Regex>>> = OnceLock::new();

/// Compiles `pattern`, consulting the process-wide cache first.
///
/// Returns `None` if the pattern does not compile. Callers treat that as a
/// never-matching template rather than an error, since every pattern built by
/// [`Template::new`] is escaped and should always compile.
fn cached_regex(pattern: &str) -> Option<Regex> {
    let cache = REGEX_CACHE.get_or_init(|| RwLock::new(HashMap::new()));

    if let Ok(guard) = cache.read() {
        if let Some(re) = guard.get(pattern) {
            return Some(re.clone());
        }
    }

    let compiled = match Regex::new(pattern) {
        Ok(re) => re,
        Err(e) => {
            tracing::error!(pattern, error = %e, "template pattern failed to compile");
            return None;
        }
    };

    if let Ok(mut guard) = cache.write() {
        if guard.len() >= REGEX_CACHE_MAX {
            // Keep the cache bounded.
            guard.clear();
        }
        guard
            .entry(pattern.to_string())
            .or_insert_with(|| compiled.clone());
    }
    Some(compiled)
}

/// A string pattern with `{slot}` placeholders.
///
/// Slot-free templates degenerate to case-insensitive string comparison.
/// Templates are value-like: they clone cheaply enough, and equality,
/// hashing, and ordering all operate on the raw pattern so templates can sit
/// inside conditions and effects without disturbing container semantics.
#[derive(Debug, Clone)]
pub struct Template {
    /// The raw pattern as written, e.g. `"I want {x} and {y}"`.
    raw: String,
    /// Slot names in order of first appearance, duplicates removed.
    slots: Vec<String>,
    /// Slot name for each capture group, in group order (duplicates kept).
    group_slots: Vec<String>,
    /// Anchored case-insensitive pattern, `None` for slot-free templates.
    full_re: Option<Regex>,
    /// Unanchored variant of `full_re` for substring searches.
    partial_re: Option<Regex>,
}

impl Template {
    /// Compiles a template from its raw pattern.
    ///
    /// A `{...}` segment becomes a slot; unbalanced braces are kept as
    /// literal text.
    pub fn new(raw: &str) -> Template {
        let (body, group_slots) = compile_pattern(raw);
        let mut slots: Vec<String> = Vec::new();
        for s in &group_slots {
            if !slots.contains(s) {
                slots.push(s.clone());
            }
        }
        let (full_re, partial_re) = if group_slots.is_empty() {
            (None, None)
        } else {
            (
                cached_regex(&format!("(?i)^{body}$")),
                cached_regex(&format!("(?i){body}")),
            )
        };
        Template {
            raw: raw.to_string(),
            slots,
            group_slots,
            full_re,
            partial_re,
        }
    }

    /// The raw pattern as written.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Slot names, in order of first appearance.
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// True if at least one slot remains unfilled.
    pub fn is_under_specified(&self) -> bool {
        !self.slots.is_empty()
    }

    /// True if the whole pattern is a single slot, e.g. `"{x}"`.
    pub fn is_raw_slot(&self) -> bool {
        self.slots.len() == 1 && self.raw == format!("{{{}}}", self.slots[0])
    }

    /// Anchored match of `input` against the whole template.
    pub fn match_full(&self, input: &str) -> MatchResult {
        let trimmed = input.trim();
        match &self.full_re {
            None => {
                if self.raw.trim().to_lowercase() == trimmed.to_lowercase() {
                    MatchResult::success(Assignment::new(), (0, input.len()))
                } else {
                    MatchResult::failed()
                }
            }
            Some(re) => match re.captures(trimmed) {
                Some(caps) => self
                    .bindings_from(&caps)
                    .map(|a| MatchResult::success(a, (0, input.len())))
                    .unwrap_or_else(MatchResult::failed),
                None => MatchResult::failed(),
            },
        }
    }

    /// Substring match of the template inside `input`, on token boundaries.
    ///
    /// Returns the first (leftmost) acceptable occurrence.
    pub fn match_partial(&self, input: &str) -> MatchResult {
        self.find(input, 1).into_iter().next().unwrap_or_else(MatchResult::failed)
    }

    /// All non-overlapping token-boundary occurrences of the template in
    /// `input`, left to right, capped at `max_results` (0 = unlimited).
    pub fn find(&self, input: &str, max_results: usize) -> Vec<MatchResult> {
        let mut results = Vec::new();
        match &self.partial_re {
            None => {
                // Slot-free: escaped literal search keeps byte offsets exact.
                let re = match cached_regex(&format!("(?i){}", regex::escape(self.raw.trim()))) {
                    Some(re) => re,
                    None => return results,
                };
                self.scan(&re, input, max_results, &mut results);
            }
            Some(re) => {
                let re = re.clone();
                self.scan(&re, input, max_results, &mut results);
            }
        }
        results
    }

    fn scan(&self, re: &Regex, input: &str, max_results: usize, out: &mut Vec<MatchResult>) {
        let mut pos = 0;
        while pos <= input.len() {
            let caps = match re.captures_at(input, pos) {
                Some(c) => c,
                None => break,
            };
            let m = match caps.get(0) {
                Some(m) => m,
                None => break,
            };
            if on_token_boundary(input, m.start(), m.end()) {
                if let Some(bindings) = self.bindings_from(&caps) {
                    out.push(MatchResult::success(bindings, (m.start(), m.end())));
                    if max_results != 0 && out.len() >= max_results {
                        return;
                    }
                    pos = if m.end() > m.start() {
                        m.end()
                    } else {
                        next_char_boundary(input, m.end())
                    };
                    continue;
                }
            }
            // Boundary or consistency rejection: resume one byte further.
            pos = next_char_boundary(input, m.start());
        }
    }

    /// Extracts slot bindings from regex captures.
    ///
    /// Returns `None` when the same slot captured two different strings,
    /// which rejects the match.
    fn bindings_from(&self, caps: &regex::Captures) -> Option<Assignment> {
        let mut raw_bound: HashMap<&str, String> = HashMap::new();
        for (i, slot) in self.group_slots.iter().enumerate() {
            let text = caps.get(i + 1).map(|m| m.as_str().trim().to_string())?;
            if let Some(prev) = raw_bound.get(slot.as_str()) {
                if !prev.eq_ignore_ascii_case(&text) {
                    return None;
                }
            } else {
                raw_bound.insert(slot.as_str(), text);
            }
        }
        let mut a = Assignment::new();
        for slot in &self.slots {
            if let Some(text) = raw_bound.get(slot.as_str()) {
                a.add_pair(slot, ValueFactory::create(text));
            }
        }
        Some(a)
    }

    /// Substitutes bound slots with the string form of their values.
    ///
    /// Unbound slots survive as `{slot}`, leaving the result underspecified.
    pub fn fill_slots(&self, bindings: &Assignment) -> String {
        let mut out = self.raw.clone();
        for slot in &self.slots {
            if let Some(v) = bindings.get_value(slot) {
                out = out.replace(&format!("{{{slot}}}"), &v.to_string());
            }
        }
        out
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl PartialEq for Template {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for Template {}

impl Hash for Template {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl PartialOrd for Template {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Template {
    fn cmp(&self, other: &Self) -> Ordering {
        self.raw.cmp(&other.raw)
    }
}

/// Outcome of a template match.
#[derive(Debug, Clone)]
pub struct MatchResult {
    matched: bool,
    bindings: Assignment,
    span: (usize, usize),
}

impl MatchResult {
    /// A failed match with no bindings.
    pub fn failed() -> MatchResult {
        MatchResult {
            matched: false,
            bindings: Assignment::new(),
            span: (0, 0),
        }
    }

    fn success(bindings: Assignment, span: (usize, usize)) -> MatchResult {
        MatchResult {
            matched: true,
            bindings,
            span,
        }
    }

    /// Whether the match succeeded.
    pub fn is_matching(&self) -> bool {
        self.matched
    }

    /// Slot bindings captured by the match (empty for slot-free templates).
    pub fn bindings(&self) -> &Assignment {
        &self.bindings
    }

    /// Consumes the result, returning the captured bindings.
    pub fn into_bindings(self) -> Assignment {
        self.bindings
    }

    /// Byte span of the match in the searched string.
    pub fn span(&self) -> (usize, usize) {
        self.span
    }
}

/// Translates a raw pattern into a regex body plus the slot name behind each
/// capture group.
fn compile_pattern(raw: &str) -> (String, Vec<String>) {
    let mut body = String::new();
    let mut group_slots = Vec::new();
    let mut rest = raw.trim();
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) if !after[..close].contains('{') => {
                body.push_str(&regex::escape(&rest[..open]));
                body.push_str("(.+)");
                group_slots.push(after[..close].trim().to_string());
                rest = &after[close + 1..];
            }
            _ => {
                // Unbalanced brace: literal.
                body.push_str(&regex::escape(&rest[..open + 1]));
                rest = after;
            }
        }
    }
    body.push_str(&regex::escape(rest));
    (body, group_slots)
}

/// Checks that the byte range sits on token boundaries of `s`.
///
/// A boundary is the string edge or a neighbouring non-alphanumeric char, so
/// `"45"` is rejected inside `"12345"` but accepted inside `"a 45."`.
fn on_token_boundary(s: &str, start: usize, end: usize) -> bool {
    let before_ok = start == 0
        || s[..start]
            .chars()
            .next_back()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    let after_ok = end == s.len()
        || s[end..]
            .chars()
            .next()
            .map(|c| !c.is_alphanumeric())
            .unwrap_or(true);
    before_ok && after_ok
}

fn next_char_boundary(s: &str, pos: usize) -> usize {
    let mut p = pos + 1;
    while p < s.len() && !s.is_char_boundary(p) {
        p += 1;
    }
    p
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::values::Value;

    #[test]
    fn slot_free_full_match_is_case_insensitive() {
        let t = Template::new("Now opening the DOOR");
        assert!(t.match_full("now opening the door").is_matching());
        assert!(!t.match_full("now opening the window").is_matching());
        assert!(!t.is_under_specified());
    }

    #[test]
    fn single_slot_captures_value() {
        let t = Template::new("my name is {name}");
        let r = t.match_full("my name is Pierre");
        assert!(r.is_matching());
        assert_eq!(
            r.bindings().get_value("name"),
            Some(&Value::from_string("Pierre"))
        );
    }

    #[test]
    fn trailing_slot_absorbs_remainder() {
        let t = Template::new("move to {dest}");
        let r = t.match_full("move to the red room");
        assert!(r.is_matching());
        assert_eq!(
            r.bindings().get_value("dest"),
            Some(&Value::from_string("the red room"))
        );
    }

    #[test]
    fn numeric_capture_becomes_double() {
        let t = Template::new("set volume to {level}");
        let r = t.match_full("set volume to 7");
        assert!(r.is_matching());
        assert_eq!(r.bindings().get_value("level"), Some(&Value::Double(7.0)));
    }

    #[test]
    fn two_slots_bind_independently() {
        let t = Template::new("{x} bought {y}");
        let r = t.match_full("Anne bought a car");
        assert!(r.is_matching());
        assert_eq!(r.bindings().get_value("x"), Some(&Value::from_string("Anne")));
        assert_eq!(
            r.bindings().get_value("y"),
            Some(&Value::from_string("a car"))
        );
    }

    #[test]
    fn repeated_slot_must_bind_consistently() {
        let t = Template::new("{x} equals {x}");
        assert!(t.match_full("a equals a").is_matching());
        assert!(!t.match_full("a equals b").is_matching());
    }

    #[test]
    fn partial_match_respects_token_boundaries() {
        let t = Template::new("45");
        assert!(!t.match_partial("12345").is_matching());
        assert!(t.match_partial("a 45.").is_matching());
        assert!(t.match_partial("45 degrees").is_matching());
    }

    #[test]
    fn partial_match_with_slot() {
        let t = Template::new("name is {name}");
        let r = t.match_partial("well my name is Julie");
        assert!(r.is_matching());
        assert_eq!(
            r.bindings().get_value("name"),
            Some(&Value::from_string("Julie"))
        );
    }

    #[test]
    fn find_returns_successive_occurrences() {
        let t = Template::new("box");
        let rs = t.find("box in a box", 0);
        assert_eq!(rs.len(), 2);
        assert_eq!(rs[0].span(), (0, 3));
        assert_eq!(rs[1].span(), (9, 12));
    }

    #[test]
    fn greedy_slot_absorbs_later_occurrences() {
        let t = Template::new("the {obj}");
        let rs = t.find("take the box to the table", 0);
        assert_eq!(rs.len(), 1);
        assert_eq!(
            rs[0].bindings().get_value("obj"),
            Some(&Value::from_string("box to the table"))
        );
    }

    #[test]
    fn find_caps_results() {
        let t = Template::new("a");
        let rs = t.find("a a a a", 2);
        assert_eq!(rs.len(), 2);
    }

    #[test]
    fn fill_slots_replaces_bound_and_keeps_unbound() {
        let t = Template::new("{greeting}, {name}!");
        let mut a = Assignment::new();
        a.add_pair("greeting", Value::from_string("hello"));
        assert_eq!(t.fill_slots(&a), "hello, {name}!");
        a.add_pair("name", Value::from_string("world"));
        assert_eq!(t.fill_slots(&a), "hello, world!");
    }

    #[test]
    fn fill_slots_renders_numbers_in_short_form() {
        let t = Template::new("price is {p}");
        let mut a = Assignment::new();
        a.add_pair("p", Value::Double(2.0));
        assert_eq!(t.fill_slots(&a), "price is 2");
    }

    #[test]
    fn raw_slot_detection() {
        assert!(Template::new("{x}").is_raw_slot());
        assert!(!Template::new("{x} and {y}").is_raw_slot());
        assert!(!Template::new("ab").is_raw_slot());
    }

    #[test]
    fn unbalanced_brace_is_literal() {
        let t = Template::new("a { b");
        assert!(!t.is_under_specified());
        assert!(t.match_full("a { b").is_matching());
    }

    #[test]
    fn template_equality_and_ordering_use_raw_pattern() {
        let a = Template::new("abc {x}");
        let b = Template::new("abc {x}");
        let c = Template::new("abd {x}");
        assert_eq!(a, b);
        assert!(a < c);
    }
}
