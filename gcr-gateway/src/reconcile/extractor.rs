//! Identifier extraction from inbound callback payloads
//!
//! Providers echo their identifiers in whatever field they like, at whatever
//! depth they like. The extractor walks the whole payload and collects every
//! string that plausibly names a task or request:
//!
//! - Scalars under a recognized identifier key (case-insensitive) are taken
//!   verbatim.
//! - Scalars under a title key are searched for [`TITLE_MARKER`]; the
//!   trimmed text after it is taken as a low-confidence derived identifier.
//!   The apibox provider puts the first characters of our correlation token
//!   in the title (`"Generated Music 3f2a9c1e"`) and some callbacks carry no
//!   dedicated identifier field at all.
//!
//! Extraction never fails. A payload with no candidates yields an empty set;
//! the receiver then stores it under a synthetic identifier.

use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use super::payload::{scalar_text, walk, Flow, PayloadLimits, PayloadVisitor};

/// Keys whose scalar value is a task/request identifier (compared lowercased)
pub const IDENTIFIER_KEYS: &[&str] = &[
    "taskid",
    "task_id",
    "requestid",
    "request_id",
    "generationid",
    "generation_id",
    "jobid",
    "job_id",
];

/// Keys whose value is a human-readable title (compared lowercased)
pub const TITLE_KEYS: &[&str] = &["title"];

/// Literal the provider-visible title is built from
pub const TITLE_MARKER: &str = "Generated Music";

/// Number of correlation-token characters appended to [`TITLE_MARKER`]
pub const TITLE_TOKEN_PREFIX_LEN: usize = 8;

/// Build the title that carries a correlation token prefix
pub fn marker_title(token: &str) -> String {
    let prefix: String = token.chars().take(TITLE_TOKEN_PREFIX_LEN).collect();
    format!("{} {}", TITLE_MARKER, prefix)
}

/// Collects candidate identifiers from nested payloads
#[derive(Debug, Clone, Default)]
pub struct IdentifierExtractor {
    limits: PayloadLimits,
}

struct CandidateCollector {
    candidates: BTreeSet<String>,
}

impl PayloadVisitor for CandidateCollector {
    fn visit_field(&mut self, key: &str, value: &Value) -> Flow {
        let Some(text) = scalar_text(value) else {
            return Flow::Continue;
        };
        let key = key.to_ascii_lowercase();

        if IDENTIFIER_KEYS.contains(&key.as_str()) {
            if !text.trim().is_empty() {
                self.candidates.insert(text);
            }
        } else if TITLE_KEYS.contains(&key.as_str()) {
            if let Some(derived) = title_suffix(&text) {
                self.candidates.insert(derived);
            }
        }
        Flow::Continue
    }
}

/// Trimmed remainder after [`TITLE_MARKER`], if any
fn title_suffix(title: &str) -> Option<String> {
    let start = title.find(TITLE_MARKER)? + TITLE_MARKER.len();
    let suffix = title[start..].trim();
    if suffix.is_empty() {
        None
    } else {
        Some(suffix.to_string())
    }
}

impl IdentifierExtractor {
    pub fn new(limits: PayloadLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> &PayloadLimits {
        &self.limits
    }

    /// Every candidate identifier found in `payload`
    pub fn extract(&self, payload: &Value) -> BTreeSet<String> {
        let mut collector = CandidateCollector {
            candidates: BTreeSet::new(),
        };
        let stats = walk(payload, &self.limits, &mut collector);

        if stats.truncated {
            warn!(
                nodes_visited = stats.nodes_visited,
                max_depth = self.limits.max_depth,
                max_nodes = self.limits.max_nodes,
                found = collector.candidates.len(),
                "Payload exceeded traversal limits; using identifiers found so far"
            );
        }
        debug!(candidates = ?collector.candidates, "Identifiers extracted");

        collector.candidates
    }
}
