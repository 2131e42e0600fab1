//! Normalization and deduplication of scraped product listings.
//!
//! A listing arrives as a flat JSON object of free-text attributes. It is validated, keyed by a
//! digest of its URL, checked against the dedup views, expanded, normalized against a per-field
//! vocabulary, validated again and finally regrouped into nested categories.
//!
//! Everything in this crate is synchronous and single-record scoped. Transport, partitioning and
//! the materialization of the dedup views belong to the caller (see `listing-processor`).

pub mod aggregates;
pub mod dedup;
pub mod display;
pub mod error;
pub mod exploder;
pub mod identity;
pub mod metrics_consts;
pub mod normalizer;
pub mod pipeline;
pub mod record;
pub mod transformer;
pub mod validation;
pub mod vocabulary;

pub use dedup::{DedupDecision, DedupView, DeduplicationPolicy, MaterializedView, ViewSource};
pub use identity::{identity_key, IdentityKey};
pub use pipeline::{Admission, Outcome, Pipeline, RejectReason};
pub use record::{fields, ExplodedRecord, Record};
pub use transformer::{ListingTransformer, TransformerRegistry};
pub use vocabulary::Vocabulary;
