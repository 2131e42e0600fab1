use async_trait::async_trait;
use rdkafka::error::KafkaError;
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use thiserror::Error;
use tracing::warn;

use crate::config::Config;
use crate::kafka::KafkaContext;
use crate::metrics_consts::{KAFKA_MESSAGE_PRODUCED, KAFKA_PRODUCER_ERROR};

/// Header naming why a listing was sent to the rejected topic.
pub const REJECT_REASON_HEADER: &str = "reject-reason";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    Rekeyed,
    Success,
    Rejected,
    Feedback,
}

impl Sink {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sink::Rekeyed => "rekeyed",
            Sink::Success => "success",
            Sink::Rejected => "rejected",
            Sink::Feedback => "feedback",
        }
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to queue message for {sink}: {error}")]
    Queue { sink: &'static str, error: KafkaError },
    #[error("failed to produce to {sink}: {error}")]
    Produce { sink: &'static str, error: KafkaError },
    #[error("delivery to {sink} was canceled")]
    Canceled { sink: &'static str },
}

#[derive(Debug, Clone)]
struct SinkTopics {
    rekeyed: String,
    success: String,
    rejected: String,
    feedback: String,
}

/// Destination for routed listings.
#[async_trait]
pub trait ListingSink: Send + Sync {
    async fn send(
        &self,
        sink: Sink,
        key: Option<&str>,
        payload: &[u8],
        headers: Option<OwnedHeaders>,
    ) -> Result<(), SinkError>;

    async fn reject(
        &self,
        key: Option<&str>,
        payload: &[u8],
        reason: &str,
    ) -> Result<(), SinkError> {
        let headers = OwnedHeaders::new().insert(Header {
            key: REJECT_REASON_HEADER,
            value: Some(reason),
        });
        self.send(Sink::Rejected, key, payload, Some(headers)).await
    }
}

/// Produces to the topic behind each sink and waits for the delivery report.
pub struct SinkRouter {
    producer: FutureProducer<KafkaContext>,
    topics: SinkTopics,
}

impl SinkRouter {
    pub fn new(config: &Config, producer: FutureProducer<KafkaContext>) -> Self {
        Self {
            producer,
            topics: SinkTopics {
                rekeyed: config.rekeyed_topic.clone(),
                success: config.success_topic.clone(),
                rejected: config.rejected_topic.clone(),
                feedback: config.feedback_topic.clone(),
            },
        }
    }

    pub fn topic(&self, sink: Sink) -> &str {
        match sink {
            Sink::Rekeyed => &self.topics.rekeyed,
            Sink::Success => &self.topics.success,
            Sink::Rejected => &self.topics.rejected,
            Sink::Feedback => &self.topics.feedback,
        }
    }

    pub fn flush(&self, timeout: std::time::Duration) {
        if let Err(e) = self.producer.flush(timeout) {
            warn!("Failed to flush producer on graceful shutdown: {e:?}");
            metrics::counter!(
                KAFKA_PRODUCER_ERROR,
                &[("level", "warn"), ("error", "flush_producer")]
            )
            .increment(1);
        }
    }
}

#[async_trait]
impl ListingSink for SinkRouter {
    async fn send(
        &self,
        sink: Sink,
        key: Option<&str>,
        payload: &[u8],
        headers: Option<OwnedHeaders>,
    ) -> Result<(), SinkError> {
        let record = FutureRecord {
            topic: self.topic(sink),
            partition: None, // the producer hashes the key to pick a partition
            key,
            payload: Some(payload),
            timestamp: None,
            headers,
        };

        let future = self.producer.send_result(record).map_err(|(error, _)| {
            metrics::counter!(
                KAFKA_PRODUCER_ERROR,
                &[("level", "error"), ("error", "queue_full")]
            )
            .increment(1);
            SinkError::Queue {
                sink: sink.as_str(),
                error,
            }
        })?;

        match future.await {
            Ok(Ok(_)) => {
                metrics::counter!(KAFKA_MESSAGE_PRODUCED, "sink" => sink.as_str()).increment(1);
                Ok(())
            }
            Ok(Err((error, _))) => {
                metrics::counter!(
                    KAFKA_PRODUCER_ERROR,
                    &[("level", "error"), ("error", "send_failed")]
                )
                .increment(1);
                Err(SinkError::Produce {
                    sink: sink.as_str(),
                    error,
                })
            }
            Err(_) => {
                metrics::counter!(
                    KAFKA_PRODUCER_ERROR,
                    &[("level", "warn"), ("error", "send_future_canceled")]
                )
                .increment(1);
                Err(SinkError::Canceled {
                    sink: sink.as_str(),
                })
            }
        }
    }
}
