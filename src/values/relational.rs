//! Relational graph values.
//!
//! A [`RelationalValue`] is a small labeled digraph written in bracket
//! syntax: `[greet -> john, john -knows-> mary, bye]`. Elements are either
//! bare node contents or directed edges `src -label-> dst` (the label is
//! optional). Nodes come into existence on first mention.
//!
//! Nodes and edges are kept sorted and deduplicated, so structural equality,
//! hashing, and ordering follow directly from the field order and the
//! `Display` form is canonical. Parsing only accepts graphs with at least
//! one edge; a plain bracketed list is a set, not a graph, and the factory
//! relies on that distinction when dispatching.

use std::fmt;

/// A directed edge between two node contents.
///
/// Field order matters: the derived ordering sorts by source, then label,
/// then target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Edge {
    source: String,
    label: Option<String>,
    target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, label: Option<String>, target: impl Into<String>) -> Edge {
        Edge {
            source: source.into(),
            label,
            target: target.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn target(&self) -> &str {
        &self.target
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.label {
            Some(l) => write!(f, "{} -{}-> {}", self.source, l, self.target),
            None => write!(f, "{} -> {}", self.source, self.target),
        }
    }
}

/// A deterministic labeled digraph value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationalValue {
    /// Node contents, sorted and deduplicated.
    nodes: Vec<String>,
    /// Edges, sorted and deduplicated; endpoints always appear in `nodes`.
    edges: Vec<Edge>,
}

impl RelationalValue {
    /// Builds a graph from nodes and edges, canonicalizing both lists.
    ///
    /// Edge endpoints are added to the node list automatically.
    pub fn new(
        nodes: impl IntoIterator<Item = String>,
        edges: impl IntoIterator<Item = Edge>,
    ) -> RelationalValue {
        let mut nodes: Vec<String> = nodes.into_iter().collect();
        let mut edges: Vec<Edge> = edges.into_iter().collect();
        for e in &edges {
            nodes.push(e.source.clone());
            nodes.push(e.target.clone());
        }
        nodes.sort();
        nodes.dedup();
        edges.sort();
        edges.dedup();
        RelationalValue { nodes, edges }
    }

    /// Parses the bracketed node/edge syntax.
    ///
    /// Returns `None` when the input is not bracketed, any element is
    /// malformed, or no edge is present.
    pub fn parse(raw: &str) -> Option<RelationalValue> {
        let trimmed = raw.trim();
        let inner = trimmed.strip_prefix('[')?.strip_suffix(']')?;
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for element in inner.split(',') {
            let element = element.trim();
            if element.is_empty() {
                return None;
            }
            match parse_edge(element) {
                Some(Some(edge)) => edges.push(edge),
                Some(None) => return None,
                None => nodes.push(element.to_string()),
            }
        }
        if edges.is_empty() {
            return None;
        }
        Some(RelationalValue::new(nodes, edges))
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True if some node content equals `content`, ignoring ASCII case.
    pub fn contains_content(&self, content: &str) -> bool {
        self.nodes.iter().any(|n| n.eq_ignore_ascii_case(content))
    }
}

impl fmt::Display for RelationalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        let mut first = true;
        for n in &self.nodes {
            let isolated = !self
                .edges
                .iter()
                .any(|e| e.source == *n || e.target == *n);
            if isolated {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(n)?;
                first = false;
            }
        }
        for e in &self.edges {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{e}")?;
            first = false;
        }
        f.write_str("]")
    }
}

/// Classifies one element of the bracket syntax.
///
/// Returns `None` for a bare node, `Some(Some(edge))` for a well-formed
/// edge, and `Some(None)` for something that tries to be an edge but is
/// malformed (which rejects the whole graph).
fn parse_edge(element: &str) -> Option<Option<Edge>> {
    let arrow = element.find("->")?;
    let left = element[..arrow].trim_end();
    let right = element[arrow + 2..].trim_start();
    if right.is_empty() || right.contains("->") {
        return Some(None);
    }
    // `src -label` before the arrow, or just `src` for an unlabeled edge.
    let (source, label) = match left.rfind(" -") {
        Some(pos) => {
            let src = left[..pos].trim();
            let lab = left[pos + 2..].trim();
            if lab.is_empty() {
                (src, None)
            } else if lab.chars().all(|c| c.is_alphanumeric() || c == '_') {
                (src, Some(lab.to_string()))
            } else {
                return Some(None);
            }
        }
        None => match left.strip_suffix('-') {
            Some(src) => (src.trim_end(), None),
            None => (left, None),
        },
    };
    if source.is_empty() {
        return Some(None);
    }
    Some(Some(Edge::new(source, label, right)))
}

// ============================================================================
// Tests
// ============================================================================
