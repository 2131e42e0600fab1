//! Per-record orchestration.
//!
//! Work is split in two steps so a transport can re-partition in between: [`Pipeline::admit`]
//! validates a raw listing and computes the key it must be routed by, [`Pipeline::process`] runs
//! on the partition owning that key and decides the final outcome.

use std::fmt;

use tracing::{debug, warn};

use crate::dedup::{DedupDecision, DeduplicationPolicy, ViewSource};
use crate::identity::{identity_key, IdentityKey};
use crate::metrics_consts::PIPELINE_OUTCOMES_COUNTER;
use crate::record::{ExplodedRecord, Record};
use crate::transformer::TransformerRegistry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Parse,
    PreValidation,
    PostValidation,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Parse => "parse",
            RejectReason::PreValidation => "pre_validation",
            RejectReason::PostValidation => "post_validation",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the first step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Forward the raw payload keyed by `key`.
    Rekey { key: IdentityKey },
    Rejected(RejectReason),
    /// The record cannot be identified and goes nowhere.
    Dropped,
}

/// Result of the second step.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Accepted {
        key: IdentityKey,
        record: ExplodedRecord,
    },
    Rejected(RejectReason),
    Duplicate {
        key: IdentityKey,
        source: ViewSource,
    },
    Dropped,
}

impl Outcome {
    fn label(&self) -> (&'static str, &'static str) {
        match self {
            Outcome::Accepted { .. } => ("accepted", "none"),
            Outcome::Rejected(reason) => ("rejected", reason.as_str()),
            Outcome::Duplicate { source, .. } => ("duplicate", source.as_str()),
            Outcome::Dropped => ("dropped", "hashing"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    registry: TransformerRegistry,
    dedup: DeduplicationPolicy,
}

impl Pipeline {
    pub fn new(registry: TransformerRegistry, dedup: DeduplicationPolicy) -> Self {
        Self { registry, dedup }
    }

    pub fn admit(&self, payload: &[u8]) -> Admission {
        let record = match Record::from_slice(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "rejecting unparseable listing");
                return Admission::Rejected(RejectReason::Parse);
            }
        };

        if !self.registry.select(&record).pre_validate(&record) {
            return Admission::Rejected(RejectReason::PreValidation);
        }

        match identity_key(&record) {
            Ok(key) => Admission::Rekey { key },
            Err(e) => {
                warn!(error = %e, "dropping listing without identity");
                Admission::Dropped
            }
        }
    }

    /// Deduplicates, normalizes and reshapes an admitted payload.
    pub fn process(&self, payload: &[u8]) -> Outcome {
        let outcome = self.decide(payload);
        let (outcome_label, reason) = outcome.label();
        metrics::counter!(
            PIPELINE_OUTCOMES_COUNTER,
            &[("outcome", outcome_label), ("reason", reason)]
        )
        .increment(1);
        outcome
    }

    /// Both steps back to back, for callers that do not re-partition.
    pub fn run(&self, payload: &[u8]) -> Outcome {
        match self.admit(payload) {
            Admission::Rekey { .. } => self.process(payload),
            Admission::Rejected(reason) => Outcome::Rejected(reason),
            Admission::Dropped => Outcome::Dropped,
        }
    }

    fn decide(&self, payload: &[u8]) -> Outcome {
        let record = match Record::from_slice(payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "rejecting unparseable listing");
                return Outcome::Rejected(RejectReason::Parse);
            }
        };

        let key = match identity_key(&record) {
            Ok(key) => key,
            Err(e) => {
                warn!(error = %e, "dropping listing without identity");
                return Outcome::Dropped;
            }
        };

        if let DedupDecision::Duplicate(source) = self.dedup.dedupe(&key) {
            return Outcome::Duplicate { key, source };
        }

        let transformer = self.registry.select(&record);
        let normalized = transformer.normalize(&transformer.pre_process(&record));
        if !transformer.post_validate(&normalized) {
            debug!(key = %key, fields = normalized.len(), "normalized listing is incomplete");
            return Outcome::Rejected(RejectReason::PostValidation);
        }

        Outcome::Accepted {
            record: transformer.post_process(&normalized),
            key,
        }
    }
}
