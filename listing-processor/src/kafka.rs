use std::time::Duration;

use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::FutureProducer;
use rdkafka::ClientConfig;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::health::HealthHandle;
use crate::metrics_consts::KAFKA_CONSUMER_ERROR;

pub struct KafkaContext {
    liveness: HealthHandle,
}

impl From<HealthHandle> for KafkaContext {
    fn from(value: HealthHandle) -> Self {
        KafkaContext { liveness: value }
    }
}

impl rdkafka::ClientContext for KafkaContext {
    fn stats(&self, _: rdkafka::Statistics) {
        // the main rdkafka loop is running and calling us
        self.liveness.report_healthy_blocking();
    }
}

fn base_client_config(config: &Config) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.kafka_hosts)
        .set("statistics.interval.ms", "10000");

    if config.kafka_tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    }
    client_config
}

pub async fn create_kafka_producer(
    config: &Config,
    liveness: HealthHandle,
) -> Result<FutureProducer<KafkaContext>, KafkaError> {
    let mut client_config = base_client_config(config);
    client_config
        .set("linger.ms", config.kafka_producer_linger_ms.to_string())
        .set(
            "message.timeout.ms",
            config.kafka_message_timeout_ms.to_string(),
        )
        .set(
            "compression.codec",
            config.kafka_compression_codec.to_owned(),
        )
        .set(
            "queue.buffering.max.kbytes",
            (config.kafka_producer_queue_mib * 1024).to_string(),
        )
        .set(
            "queue.buffering.max.messages",
            config.kafka_producer_queue_messages.to_string(),
        );

    debug!("rdkafka producer configuration: {:?}", client_config);
    let api: FutureProducer<KafkaContext> = client_config.create_with_context(liveness.into())?;

    // "Ping" the Kafka brokers by requesting metadata
    match api.client().fetch_metadata(None, Duration::from_secs(15)) {
        Ok(metadata) => {
            info!(
                "Successfully connected to Kafka brokers. Found {} topics.",
                metadata.topics().len()
            );
        }
        Err(error) => {
            error!("Failed to fetch metadata from Kafka brokers: {:?}", error);
            return Err(error);
        }
    }

    Ok(api)
}

/// Consumer for a pipeline stage. Offsets are stored by the stage once a message is routed,
/// and committed in the background.
pub fn create_stage_consumer(config: &Config, topic: &str) -> Result<StreamConsumer, KafkaError> {
    let mut client_config = base_client_config(config);
    client_config
        .set("group.id", &config.kafka_consumer_group)
        .set("auto.offset.reset", &config.kafka_consumer_offset_reset)
        .set("enable.auto.offset.store", "false")
        .set("enable.auto.commit", "true")
        .set(
            "auto.commit.interval.ms",
            config.kafka_consumer_auto_commit_interval_ms.to_string(),
        );

    let consumer: StreamConsumer = client_config.create()?;
    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Consumer replaying a compacted topic from the start under a group nobody else uses.
pub fn create_view_consumer(config: &Config, topic: &str) -> Result<StreamConsumer, KafkaError> {
    let group = format!(
        "{}-{}-{}",
        config.view_group_prefix,
        topic,
        uuid::Uuid::now_v7()
    );

    let mut client_config = base_client_config(config);
    client_config
        .set("group.id", &group)
        .set("auto.offset.reset", "earliest")
        .set("enable.auto.commit", "false");

    let consumer: StreamConsumer = client_config.create()?;
    consumer.subscribe(&[topic])?;
    debug!(topic, group = %group, "created view consumer");
    Ok(consumer)
}

/// What a consume loop does after an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    Continue,
    Backoff(Duration),
    Stop,
}

/// Maps a consumer error to its metric labels and the action to take. `attempt` counts
/// consecutive errors and scales the backoff.
pub fn classify_kafka_error(
    e: &KafkaError,
    attempt: u64,
) -> (&'static str, &'static str, ErrorAction) {
    use ErrorAction::{Backoff, Continue, Stop};

    match e {
        KafkaError::MessageConsumption(code) => match code {
            RDKafkaErrorCode::PartitionEOF => ("info", "partition_eof", Continue),
            RDKafkaErrorCode::OperationTimedOut => ("info", "op_timed_out", Continue),
            // "auto.offset.reset" seeks to head or tail with the broker
            RDKafkaErrorCode::OffsetOutOfRange => (
                "info",
                "offset_out_of_range",
                Backoff(Duration::from_millis(500)),
            ),
            _ => (
                "warn",
                "consumer",
                Backoff(Duration::from_millis(100 * attempt.min(10))),
            ),
        },
        KafkaError::MessageConsumptionFatal(_) => ("fatal", "consumer", Stop),
        KafkaError::Global(code) => match code {
            RDKafkaErrorCode::AllBrokersDown => (
                "warn",
                "all_brokers_down",
                Backoff(Duration::from_secs(attempt.min(5))),
            ),
            RDKafkaErrorCode::BrokerTransportFailure => (
                "warn",
                "broker_transport",
                Backoff(Duration::from_secs(attempt.min(3))),
            ),
            RDKafkaErrorCode::Authentication => ("fatal", "authentication", Stop),
            _ => (
                "warn",
                "global",
                Backoff(Duration::from_millis(500 * attempt.min(6))),
            ),
        },
        KafkaError::Canceled => ("info", "canceled", Stop),
        _ => (
            "fatal",
            "unexpected",
            Backoff(Duration::from_millis(100 * attempt.min(10))),
        ),
    }
}

/// Records and backs off a consumer error. Returns the error when the loop must stop.
pub async fn handle_kafka_error(e: KafkaError, attempt: u64, source: &str) -> Option<KafkaError> {
    let (level, label, action) = classify_kafka_error(&e, attempt);
    metrics::counter!(KAFKA_CONSUMER_ERROR, &[("level", level), ("error", label)]).increment(1);

    match action {
        ErrorAction::Continue => None,
        ErrorAction::Backoff(delay) => {
            warn!(source, error = %e, ?delay, "kafka consumer error, backing off");
            sleep(delay).await;
            None
        }
        ErrorAction::Stop => {
            if e == KafkaError::Canceled {
                info!(source, "consumer canceled");
            } else {
                error!(source, error = %e, "fatal kafka consumer error");
            }
            Some(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_back_off_with_a_cap() {
        let e = KafkaError::MessageConsumption(RDKafkaErrorCode::BrokerNotAvailable);
        assert_eq!(
            classify_kafka_error(&e, 3),
            (
                "warn",
                "consumer",
                ErrorAction::Backoff(Duration::from_millis(300))
            )
        );
        assert_eq!(
            classify_kafka_error(&e, 50).2,
            ErrorAction::Backoff(Duration::from_millis(1000))
        );
    }

    #[test]
    fn end_of_partition_is_not_an_error() {
        let e = KafkaError::MessageConsumption(RDKafkaErrorCode::PartitionEOF);
        assert_eq!(classify_kafka_error(&e, 1).2, ErrorAction::Continue);
    }

    #[test]
    fn fatal_errors_stop_the_loop() {
        for e in [
            KafkaError::Canceled,
            KafkaError::Global(RDKafkaErrorCode::Authentication),
            KafkaError::MessageConsumptionFatal(RDKafkaErrorCode::Fatal),
        ] {
            assert_eq!(classify_kafka_error(&e, 1).2, ErrorAction::Stop, "{e:?}");
        }
    }
}
