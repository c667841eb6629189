//! Tiered token → callback matching
//!
//! Tiers, in strict precedence (first hit wins):
//! 1. Exact key lookup.
//! 2. Substring containment in either direction between the token and a
//!    stored key. When several keys qualify, the first in store iteration
//!    order (ascending lexicographic) wins.
//! 3. Deep scan of every stored payload for a field whose value equals the
//!    token, in the same key order.
//!
//! Title-derived identifiers need no tier of their own: the extractor stores
//! them as keys, and a stored token prefix is a substring of the full token,
//! so tier 2 finds them.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use super::payload::{scalar_text, walk, Flow, PayloadLimits, PayloadVisitor};
use super::store::{CallbackRecord, CorrelationStore, Entries};

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    ExactKey,
    Substring,
    NestedField,
}

/// A stored record that corresponds to the requested token
#[derive(Debug, Clone)]
pub struct MatchHit {
    /// Store key the record was found under
    pub key: String,
    pub record: Arc<CallbackRecord>,
    pub tier: MatchTier,
}

/// Match against a consistent view of the store entries
pub fn match_entries(token: &str, entries: &Entries, limits: &PayloadLimits) -> Option<MatchHit> {
    if token.is_empty() {
        return None;
    }

    if let Some(record) = entries.get(token) {
        return Some(hit(token, record, MatchTier::ExactKey));
    }

    if let Some((key, record)) = entries
        .iter()
        .find(|(key, _)| !key.is_empty() && (key.contains(token) || token.contains(key.as_str())))
    {
        return Some(hit(key, record, MatchTier::Substring));
    }

    entries
        .iter()
        .find(|(_, record)| payload_has_value(&record.payload, token, limits))
        .map(|(key, record)| hit(key, record, MatchTier::NestedField))
}

/// Match `token` against the shared store
///
/// All three tiers run under one read lock, so a concurrent write is either
/// fully visible or not at all.
pub async fn match_token(token: &str, store: &CorrelationStore, limits: &PayloadLimits) -> Option<MatchHit> {
    store.read(|entries| match_entries(token, entries, limits)).await
}

fn hit(key: &str, record: &Arc<CallbackRecord>, tier: MatchTier) -> MatchHit {
    MatchHit {
        key: key.to_string(),
        record: Arc::clone(record),
        tier,
    }
}

fn payload_has_value(payload: &Value, token: &str, limits: &PayloadLimits) -> bool {
    struct ValueFinder<'a> {
        token: &'a str,
        found: bool,
    }

    impl PayloadVisitor for ValueFinder<'_> {
        fn visit_field(&mut self, _key: &str, value: &Value) -> Flow {
            if scalar_text(value).is_some_and(|text| text == self.token) {
                self.found = true;
                return Flow::Stop;
            }
            Flow::Continue
        }
    }

    let mut finder = ValueFinder { token, found: false };
    walk(payload, limits, &mut finder);
    finder.found
}
