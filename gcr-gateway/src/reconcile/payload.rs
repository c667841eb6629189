//! Bounded recursive-descent traversal over untyped JSON payloads
//!
//! Inbound callbacks and status bodies are `serde_json::Value` trees of
//! arbitrary shape. Every scan over them (identifier extraction, nested-field
//! matching, result-field lookup) goes through [`walk`], which enforces a
//! depth and node-count budget and hands each object field to a visitor.

use serde_json::Value;

/// Traversal budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Containers nested deeper than this are not descended into
    pub max_depth: usize,
    /// Traversal stops after visiting this many values
    pub max_nodes: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_nodes: 10_000,
        }
    }
}

/// Visitor decision after each field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Receives every `key: value` pair of every object in the payload
pub trait PayloadVisitor {
    fn visit_field(&mut self, key: &str, value: &Value) -> Flow;
}

/// What a traversal covered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub nodes_visited: usize,
    /// A depth or node limit cut the traversal short
    pub truncated: bool,
    /// The visitor asked to stop
    pub stopped: bool,
}

/// Depth-first walk; never fails, returns how far it got
pub fn walk<V: PayloadVisitor>(payload: &Value, limits: &PayloadLimits, visitor: &mut V) -> WalkStats {
    let mut stats = WalkStats::default();
    descend(payload, 0, limits, visitor, &mut stats);
    stats
}

fn descend<V: PayloadVisitor>(
    value: &Value,
    depth: usize,
    limits: &PayloadLimits,
    visitor: &mut V,
    stats: &mut WalkStats,
) {
    if stats.stopped || stats.nodes_visited >= limits.max_nodes {
        stats.truncated |= !stats.stopped;
        return;
    }
    stats.nodes_visited += 1;

    match value {
        Value::Object(map) => {
            if depth >= limits.max_depth {
                stats.truncated = true;
                return;
            }
            for (key, child) in map {
                if visitor.visit_field(key, child) == Flow::Stop {
                    stats.stopped = true;
                    return;
                }
                descend(child, depth + 1, limits, visitor, stats);
                if stats.stopped {
                    return;
                }
            }
        }
        Value::Array(items) => {
            if depth >= limits.max_depth {
                stats.truncated = true;
                return;
            }
            for child in items {
                descend(child, depth + 1, limits, visitor, stats);
                if stats.stopped {
                    return;
                }
            }
        }
        _ => {}
    }
}

/// Textual form of a scalar, or `None` for containers, null, and booleans
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First non-empty scalar stored under `key` anywhere in the payload
///
/// Top-level fields win over nested ones.
pub fn find_field(payload: &Value, key: &str, limits: &PayloadLimits) -> Option<String> {
    if let Some(text) = payload.get(key).and_then(scalar_text) {
        if !text.trim().is_empty() {
            return Some(text);
        }
    }

    struct FieldFinder<'a> {
        key: &'a str,
        found: Option<String>,
    }

    impl PayloadVisitor for FieldFinder<'_> {
        fn visit_field(&mut self, key: &str, value: &Value) -> Flow {
            if key == self.key {
                if let Some(text) = scalar_text(value).filter(|t| !t.trim().is_empty()) {
                    self.found = Some(text);
                    return Flow::Stop;
                }
            }
            Flow::Continue
        }
    }

    let mut finder = FieldFinder { key, found: None };
    walk(payload, limits, &mut finder);
    finder.found
}
