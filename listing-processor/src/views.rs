use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use listing_normalizer::{IdentityKey, MaterializedView, ViewSource};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::BorrowedMessage;
use rdkafka::Message;
use thiserror::Error;
use tracing::{info, warn};

use crate::health::{ComponentStatus, HealthHandle};
use crate::kafka::handle_kafka_error;
use crate::metrics_consts::{VIEW_SIZE_GAUGE, VIEW_UPDATES_COUNTER};

const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Value kept for every seen key. Dedup only asks whether a key is present.
pub const SEEN: &str = "";

#[derive(Error, Debug)]
pub enum ViewError {
    #[error(transparent)]
    Kafka(#[from] KafkaError),
    #[error("{view} view did not reach the end of {topic} within {timeout:?}")]
    CatchUpTimeout {
        view: ViewSource,
        topic: String,
        timeout: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewUpdate {
    Upsert(IdentityKey),
    Delete(IdentityKey),
    /// Message without a usable identity key
    Skipped,
}

impl ViewUpdate {
    fn op(&self) -> &'static str {
        match self {
            ViewUpdate::Upsert(_) => "upsert",
            ViewUpdate::Delete(_) => "delete",
            ViewUpdate::Skipped => "skip",
        }
    }
}

/// Applies one message of a compacted topic: a payload marks the key as seen, a tombstone
/// removes it.
pub fn apply(view: &MaterializedView, key: Option<&[u8]>, payload: Option<&[u8]>) -> ViewUpdate {
    let Some(key) = key
        .and_then(|k| std::str::from_utf8(k).ok())
        .and_then(|k| IdentityKey::parse(k).ok())
    else {
        return ViewUpdate::Skipped;
    };

    match payload {
        Some(_) => {
            view.upsert(key.clone(), SEEN);
            ViewUpdate::Upsert(key)
        }
        None => {
            view.remove(&key);
            ViewUpdate::Delete(key)
        }
    }
}

/// Partitions still short of the end offsets captured when a replay started.
#[derive(Debug, Default)]
pub struct ReplayProgress {
    pending: HashMap<i32, i64>,
}

impl ReplayProgress {
    /// Takes `(partition, (low, high))` watermarks. Empty partitions are done from the start.
    pub fn new(watermarks: impl IntoIterator<Item = (i32, (i64, i64))>) -> Self {
        Self {
            pending: watermarks
                .into_iter()
                .filter(|(_, (low, high))| high > low)
                .map(|(partition, (_, high))| (partition, high))
                .collect(),
        }
    }

    pub fn observe(&mut self, partition: i32, offset: i64) {
        if self
            .pending
            .get(&partition)
            .is_some_and(|end| offset + 1 >= *end)
        {
            self.pending.remove(&partition);
        }
    }

    pub fn is_done(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Keeps one in-memory view in sync with its topic for the life of the process.
pub struct ViewMaterializer {
    source: ViewSource,
    topic: String,
    consumer: StreamConsumer,
    view: Arc<MaterializedView>,
}

impl ViewMaterializer {
    pub fn new(
        source: ViewSource,
        topic: impl Into<String>,
        consumer: StreamConsumer,
        view: Arc<MaterializedView>,
    ) -> Self {
        Self {
            source,
            topic: topic.into(),
            consumer,
            view,
        }
    }

    pub fn source(&self) -> ViewSource {
        self.source
    }

    fn end_offsets(&self, timeout: Duration) -> Result<ReplayProgress, KafkaError> {
        let metadata = self.consumer.fetch_metadata(Some(self.topic.as_str()), timeout)?;
        let mut watermarks = Vec::new();
        for topic in metadata.topics() {
            for partition in topic.partitions() {
                let bounds = self
                    .consumer
                    .fetch_watermarks(&self.topic, partition.id(), timeout)?;
                watermarks.push((partition.id(), bounds));
            }
        }
        Ok(ReplayProgress::new(watermarks))
    }

    /// Replays the topic up to the end offsets it had when called and returns the number of
    /// messages applied. Fails when `timeout` passes first.
    pub async fn catch_up(&self, timeout: Duration) -> Result<u64, ViewError> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut progress = self.end_offsets(timeout)?;
        let mut applied = 0_u64;
        let mut error_count = 0_u64;

        while !progress.is_done() {
            let Ok(received) = tokio::time::timeout_at(deadline, self.consumer.recv()).await
            else {
                return Err(ViewError::CatchUpTimeout {
                    view: self.source,
                    topic: self.topic.clone(),
                    timeout,
                });
            };

            match received {
                Ok(message) => {
                    error_count = 0;
                    self.record(&message);
                    progress.observe(message.partition(), message.offset());
                    applied += 1;
                }
                Err(e) => {
                    error_count += 1;
                    if let Some(e) = handle_kafka_error(e, error_count, self.source.as_str()).await
                    {
                        return Err(e.into());
                    }
                }
            }
        }

        metrics::gauge!(VIEW_SIZE_GAUGE, "view" => self.source.as_str())
            .set(self.view.len() as f64);
        info!(view = %self.source, topic = %self.topic, applied, "view caught up");
        Ok(applied)
    }

    pub async fn run(&self, health: HealthHandle) -> Result<(), KafkaError> {
        info!(view = %self.source, "starting view materializer");
        let mut error_count = 0_u64;
        let mut last_report = Instant::now();
        health.report_healthy().await;

        loop {
            if last_report.elapsed() >= HEALTH_REPORT_INTERVAL {
                last_report = Instant::now();
                health.report_healthy().await;
                metrics::gauge!(VIEW_SIZE_GAUGE, "view" => self.source.as_str())
                    .set(self.view.len() as f64);
            }

            match self.consumer.recv().await {
                Ok(message) => {
                    error_count = 0;
                    self.record(&message);
                }
                Err(e) => {
                    error_count += 1;
                    if let Some(e) = handle_kafka_error(e, error_count, self.source.as_str()).await
                    {
                        health.report_status(ComponentStatus::Unhealthy).await;
                        return match e {
                            KafkaError::Canceled => Ok(()),
                            e => Err(e),
                        };
                    }
                }
            }
        }
    }

    fn record(&self, message: &BorrowedMessage<'_>) {
        let update = apply(&self.view, message.key(), message.payload());
        if update == ViewUpdate::Skipped {
            warn!(
                view = %self.source,
                partition = message.partition(),
                offset = message.offset(),
                "skipping view message without a valid identity key"
            );
        }
        metrics::counter!(
            VIEW_UPDATES_COUNTER,
            &[("view", self.source.as_str()), ("op", update.op())]
        )
        .increment(1);
    }
}
