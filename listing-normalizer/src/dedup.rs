//! Dedup decisions over two keyed views: a feedback view of listings already emitted to the
//! success sink, and a recovery view of operator corrections that overrides it.
//!
//! The views are materialized by the caller from compacted streams. The policy only reads them.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::identity::IdentityKey;
use crate::metrics_consts::DEDUP_DECISIONS_COUNTER;

/// Read access to a materialized key to last-value view.
pub trait DedupView: Send + Sync {
    fn entry(&self, key: &IdentityKey) -> Option<String>;
}

/// In-memory view backed by a concurrent map, fed by a stream materializer.
#[derive(Debug, Default)]
pub struct MaterializedView {
    entries: DashMap<IdentityKey, String>,
}

impl MaterializedView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, key: IdentityKey, value: impl Into<String>) {
        self.entries.insert(key, value.into());
    }

    pub fn remove(&self, key: &IdentityKey) -> Option<String> {
        self.entries.remove(key).map(|(_, value)| value)
    }

    pub fn get(&self, key: &IdentityKey) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl DedupView for MaterializedView {
    fn entry(&self, key: &IdentityKey) -> Option<String> {
        self.get(key)
    }
}

/// Which view produced a duplicate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewSource {
    Recovery,
    Feedback,
}

impl ViewSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ViewSource::Recovery => "recovery",
            ViewSource::Feedback => "feedback",
        }
    }
}

impl fmt::Display for ViewSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DedupDecision {
    Accept,
    Duplicate(ViewSource),
}

#[derive(Clone)]
pub struct DeduplicationPolicy {
    feedback: Arc<dyn DedupView>,
    recovery: Arc<dyn DedupView>,
}

impl DeduplicationPolicy {
    pub fn new(feedback: Arc<dyn DedupView>, recovery: Arc<dyn DedupView>) -> Self {
        Self { feedback, recovery }
    }

    /// The recovery entry for `key` if there is one, otherwise the feedback entry.
    pub fn effective(&self, key: &IdentityKey) -> Option<(ViewSource, String)> {
        self.recovery
            .entry(key)
            .map(|value| (ViewSource::Recovery, value))
            .or_else(|| {
                self.feedback
                    .entry(key)
                    .map(|value| (ViewSource::Feedback, value))
            })
    }

    /// Accepts a key only when neither view holds an entry for it. The stored value is never
    /// inspected: an empty entry still marks a duplicate.
    pub fn dedupe(&self, key: &IdentityKey) -> DedupDecision {
        let decision = match self.effective(key) {
            None => DedupDecision::Accept,
            Some((source, _)) => DedupDecision::Duplicate(source),
        };

        let (label, view) = match &decision {
            DedupDecision::Accept => ("accept", "none"),
            DedupDecision::Duplicate(source) => ("duplicate", source.as_str()),
        };
        debug!(key = %key, decision = label, view, "dedup decision");
        metrics::counter!(DEDUP_DECISIONS_COUNTER, &[("decision", label), ("view", view)])
            .increment(1);

        decision
    }
}

impl fmt::Debug for DeduplicationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeduplicationPolicy").finish_non_exhaustive()
    }
}
