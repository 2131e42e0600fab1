/// Counter for Kafka consumer errors, labelled by level and error
pub const KAFKA_CONSUMER_ERROR: &str = "kafka_consumer_error";

/// Counter for Kafka producer errors, labelled by level and error
pub const KAFKA_PRODUCER_ERROR: &str = "kafka_producer_error";

/// Counter for messages received, labelled by stage
pub const KAFKA_MESSAGE_CONSUMED: &str = "kafka_message_consumed";

/// Counter for messages produced, labelled by sink
pub const KAFKA_MESSAGE_PRODUCED: &str = "kafka_message_produced";

/// Counter for messages that could not be routed and were skipped, labelled by stage
pub const STAGE_PROCESSING_ERROR: &str = "listing_stage_processing_error";

/// Counter for view updates, labelled by view and op (upsert/delete/skip)
pub const VIEW_UPDATES_COUNTER: &str = "listing_view_updates_total";

/// Gauge for the number of keys held by each view
pub const VIEW_SIZE_GAUGE: &str = "listing_view_size";
