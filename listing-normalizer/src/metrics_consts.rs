/// Counter for vocabulary patterns skipped because they failed to compile
pub const INVALID_PATTERNS_COUNTER: &str = "listing_vocabulary_invalid_patterns_total";

/// Counter for raw fields removed by normalization, labelled by field
pub const FIELDS_DROPPED_COUNTER: &str = "listing_normalizer_fields_dropped_total";

/// Counter for aggregate fields expanded into per-target fields
pub const AGGREGATES_EXPANDED_COUNTER: &str = "listing_aggregates_expanded_total";

/// Counter for dedup decisions, labelled by decision and view
pub const DEDUP_DECISIONS_COUNTER: &str = "listing_dedup_decisions_total";

/// Counter for pipeline outcomes, labelled by outcome and reason
pub const PIPELINE_OUTCOMES_COUNTER: &str = "listing_pipeline_outcomes_total";

/// Counter for records whose identity key could not be computed
pub const HASHING_FAILURES_COUNTER: &str = "listing_identity_hashing_failures_total";
