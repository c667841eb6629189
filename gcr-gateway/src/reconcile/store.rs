//! Correlation store
//!
//! Process-wide mapping from identifier string to the most recent callback
//! payload received under it. One instance is created at startup and shared
//! (via `Arc`) by the webhook receiver and every reconciliation waiter.
//!
//! Entries are kept in a `BTreeMap`, so iteration is in ascending
//! lexicographic key order. The matcher's substring tier relies on that
//! order for its "first key wins" tie-break.
//!
//! Entries live in memory only and never expire; they are lost on restart.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Raw callback payload plus receipt time
///
/// Shared by every identifier the payload was indexed under.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallbackRecord {
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

impl CallbackRecord {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            received_at: gcr_common::time::now(),
        }
    }
}

/// Introspection view of one entry
#[derive(Debug, Clone, Serialize)]
pub struct RecordSummary {
    pub received_at: DateTime<Utc>,
    /// Top-level keys of the payload (empty for non-object payloads)
    pub payload_keys: Vec<String>,
}

impl From<&CallbackRecord> for RecordSummary {
    fn from(record: &CallbackRecord) -> Self {
        let payload_keys = record
            .payload
            .as_object()
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            received_at: record.received_at,
            payload_keys,
        }
    }
}

/// Store contents as seen by a single read
pub type Entries = BTreeMap<String, Arc<CallbackRecord>>;

#[derive(Default)]
struct Inner {
    entries: Entries,
    latest: Option<(String, Arc<CallbackRecord>)>,
}

/// Concurrent identifier → record store
///
/// Writes replace whole `Arc<CallbackRecord>` values under a write lock, so a
/// reader always sees either the old or the new complete record. Locks are
/// held only for the map operation itself, never across I/O or sleeps.
#[derive(Default)]
pub struct CorrelationStore {
    inner: RwLock<Inner>,
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `payload` under `identifier`, replacing any previous record
    ///
    /// Re-delivering an identical payload under the same identifier is a
    /// no-op (the original receipt time is kept). Returns whether the store
    /// changed. Empty identifiers are ignored.
    pub async fn put(&self, identifier: &str, payload: Value) -> bool {
        self.put_all(&[identifier.to_string()], payload).await > 0
    }

    /// Record one payload under several identifiers, sharing one record
    ///
    /// Returns how many identifiers were (re)written.
    pub async fn put_all(&self, identifiers: &[String], payload: Value) -> usize {
        let record = Arc::new(CallbackRecord::new(payload));
        let mut inner = self.inner.write().await;
        let mut written = 0;

        for identifier in identifiers {
            if identifier.is_empty() {
                continue;
            }
            let unchanged = inner
                .entries
                .get(identifier)
                .is_some_and(|existing| existing.payload == record.payload);
            if unchanged {
                continue;
            }
            inner.entries.insert(identifier.clone(), Arc::clone(&record));
            inner.latest = Some((identifier.clone(), Arc::clone(&record)));
            written += 1;
        }

        debug!(
            identifiers = identifiers.len(),
            written,
            total = inner.entries.len(),
            "Callback stored"
        );
        written
    }

    pub async fn get(&self, identifier: &str) -> Option<Arc<CallbackRecord>> {
        self.inner.read().await.entries.get(identifier).cloned()
    }

    /// Run `f` against a consistent view of all entries
    ///
    /// `f` runs under the read lock; it must not block.
    pub async fn read<R>(&self, f: impl FnOnce(&Entries) -> R) -> R {
        let inner = self.inner.read().await;
        f(&inner.entries)
    }

    /// Most recently written entry
    pub async fn latest(&self) -> Option<(String, Arc<CallbackRecord>)> {
        self.inner.read().await.latest.clone()
    }

    /// Most recently received entry whose receipt time is after `since`
    pub async fn latest_since(&self, since: DateTime<Utc>) -> Option<(String, Arc<CallbackRecord>)> {
        self.read(|entries| {
            entries
                .iter()
                .filter(|(_, record)| record.received_at > since)
                .max_by_key(|(_, record)| record.received_at)
                .map(|(key, record)| (key.clone(), Arc::clone(record)))
        })
        .await
    }

    /// Summary of every entry, for status listings
    pub async fn snapshot(&self) -> BTreeMap<String, RecordSummary> {
        self.read(|entries| {
            entries
                .iter()
                .map(|(key, record)| (key.clone(), RecordSummary::from(record.as_ref())))
                .collect()
        })
        .await
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove everything (ops/test reset only)
    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
        inner.latest = None;
    }
}
