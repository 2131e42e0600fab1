use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use listing_normalizer::display::display_registry;
use listing_normalizer::{
    Admission, DeduplicationPolicy, ExplodedRecord, IdentityKey, MaterializedView, Outcome,
    Pipeline, ViewSource, Vocabulary,
};
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::BorrowedMessage;
use rdkafka::Message;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::health::{ComponentStatus, HealthHandle, HealthRegistry};
use crate::kafka::{
    create_kafka_producer, create_stage_consumer, create_view_consumer, handle_kafka_error,
};
use crate::metrics_consts::{KAFKA_MESSAGE_CONSUMED, STAGE_PROCESSING_ERROR};
use crate::sink::{ListingSink, Sink, SinkError, SinkRouter};
use crate::views::{ViewMaterializer, SEEN};

const HEALTH_REPORT_INTERVAL: Duration = Duration::from_secs(5);
const HEALTH_DEADLINE: Duration = Duration::from_secs(30);

const ROUTE_ATTEMPTS: u32 = 5;
const ROUTE_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error("failed to serialize listing: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Validates raw listings and re-keys them by identity
    Ingest,
    /// Dedups, normalizes and routes re-keyed listings
    Process,
}

impl Stage {
    fn as_str(&self) -> &'static str {
        match self {
            Stage::Ingest => "ingest",
            Stage::Process => "process",
        }
    }
}

pub struct ListingService {
    config: Config,
    pipeline: Pipeline,
    feedback: Arc<MaterializedView>,
    sinks: SinkRouter,
    ingest: StreamConsumer,
    process: StreamConsumer,
    views: Vec<ViewMaterializer>,
    health: HealthRegistry,
}

impl ListingService {
    pub async fn new(config: Config, health: HealthRegistry) -> Result<Self> {
        let vocabulary = match &config.vocabulary_path {
            Some(path) => Vocabulary::from_path(path)
                .with_context(|| format!("Failed to load vocabulary from {path}"))?,
            None => Vocabulary::display_default().context("Failed to load bundled vocabulary")?,
        };
        if vocabulary.skipped_patterns() > 0 {
            warn!(
                skipped = vocabulary.skipped_patterns(),
                "vocabulary loaded with invalid patterns"
            );
        }

        let registry = display_registry(&vocabulary);

        let feedback = Arc::new(MaterializedView::new());
        let recovery = Arc::new(MaterializedView::new());
        let dedup = DeduplicationPolicy::new(feedback.clone(), recovery.clone());
        let pipeline = Pipeline::new(registry, dedup);

        let views = vec![
            ViewMaterializer::new(
                ViewSource::Feedback,
                &config.feedback_topic,
                create_view_consumer(&config, &config.feedback_topic)
                    .context("Failed to create feedback view consumer")?,
                feedback.clone(),
            ),
            ViewMaterializer::new(
                ViewSource::Recovery,
                &config.recovery_topic,
                create_view_consumer(&config, &config.recovery_topic)
                    .context("Failed to create recovery view consumer")?,
                recovery,
            ),
        ];

        let producer_health = health.register("kafka_producer", HEALTH_DEADLINE).await;
        let producer = create_kafka_producer(&config, producer_health)
            .await
            .context("Failed to create Kafka producer")?;

        let ingest = create_stage_consumer(&config, &config.source_topic)
            .context("Failed to create ingest consumer")?;
        let process = create_stage_consumer(&config, &config.rekeyed_topic)
            .context("Failed to create process consumer")?;

        info!(
            "Listing service initialized: consuming from '{}', producing to '{}' and '{}'",
            config.source_topic, config.success_topic, config.rejected_topic
        );

        Ok(Self {
            sinks: SinkRouter::new(&config, producer),
            config,
            pipeline,
            feedback,
            ingest,
            process,
            views,
            health,
        })
    }

    /// Replays both views, then runs until a stage stops or `shutdown` resolves, then flushes
    /// the producer.
    pub async fn run_with_shutdown(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        let replayed = tokio::select! {
            r = self.catch_up_views() => Some(r),
            _ = &mut shutdown => None,
        };
        match replayed {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                self.shutdown();
                return Err(e);
            }
            None => {
                info!("Received shutdown signal while replaying views");
                self.shutdown();
                return Ok(());
            }
        }

        let ingest_health = self.health.register("ingest", HEALTH_DEADLINE).await;
        let process_health = self.health.register("process", HEALTH_DEADLINE).await;
        let feedback_health = self.health.register("feedback_view", HEALTH_DEADLINE).await;
        let recovery_health = self.health.register("recovery_view", HEALTH_DEADLINE).await;

        let (feedback_view, recovery_view) = (&self.views[0], &self.views[1]);

        let result = tokio::select! {
            r = self.run_stage(Stage::Ingest, ingest_health) => r,
            r = self.run_stage(Stage::Process, process_health) => r,
            r = feedback_view.run(feedback_health) => r.context("feedback view stopped"),
            r = recovery_view.run(recovery_health) => r.context("recovery view stopped"),
            _ = &mut shutdown => {
                info!("Received shutdown signal, shutting down gracefully...");
                Ok(())
            }
        };

        self.shutdown();
        result
    }

    /// Brings every view up to its topic's end offsets so the process stage never dedups
    /// against a partial view.
    async fn catch_up_views(&self) -> Result<()> {
        let timeout = self.config.view_catch_up_timeout();
        futures::future::try_join_all(self.views.iter().map(|view| async move {
            view.catch_up(timeout)
                .await
                .with_context(|| format!("failed to replay {} view", view.source()))
        }))
        .await?;
        Ok(())
    }

    fn shutdown(&self) {
        info!("Graceful shutdown: unsubscribing stage consumers...");
        self.ingest.unsubscribe();
        self.process.unsubscribe();
        info!("Graceful shutdown: flushing producer...");
        self.sinks.flush(self.config.producer_shutdown_timeout());
        info!("Graceful shutdown: completed");
    }

    async fn run_stage(&self, stage: Stage, health: HealthHandle) -> Result<()> {
        let consumer = match stage {
            Stage::Ingest => &self.ingest,
            Stage::Process => &self.process,
        };
        info!(stage = stage.as_str(), "starting stage");

        let mut kafka_error_count = 0_u64;
        let mut last_report = Instant::now();
        health.report_healthy().await;

        loop {
            if last_report.elapsed() >= HEALTH_REPORT_INTERVAL {
                last_report = Instant::now();
                health.report_healthy().await;
            }

            match consumer.recv().await {
                Ok(message) => {
                    kafka_error_count = 0;
                    metrics::counter!(KAFKA_MESSAGE_CONSUMED, "stage" => stage.as_str())
                        .increment(1);

                    let (service, message) = (self, &message);
                    let routed = route_with_retry(
                        stage,
                        ROUTE_ATTEMPTS,
                        ROUTE_BACKOFF,
                        move || async move {
                            match stage {
                                Stage::Ingest => service.ingest_message(message).await,
                                Stage::Process => service.process_message(message).await,
                            }
                        },
                    )
                    .await;
                    if let Err(e) = routed {
                        // storing a later offset would skip this message, stop the stage instead
                        health.report_status(ComponentStatus::Unhealthy).await;
                        return Err(anyhow::Error::new(e).context(format!(
                            "failed to route {}:{} offset {}, stopping {} stage",
                            message.topic(),
                            message.partition(),
                            message.offset(),
                            stage.as_str()
                        )));
                    }

                    if let Err(e) = consumer.store_offset(
                        message.topic(),
                        message.partition(),
                        message.offset() + 1,
                    ) {
                        warn!(stage = stage.as_str(), error = %e, "failed to store offset");
                    }
                }
                Err(e) => {
                    kafka_error_count += 1;
                    if let Some(e) = handle_kafka_error(e, kafka_error_count, stage.as_str()).await
                    {
                        health.report_status(ComponentStatus::Unhealthy).await;
                        if e == KafkaError::Canceled {
                            return Ok(());
                        }
                        return Err(anyhow::anyhow!(
                            "FATAL Kafka error - shutting down {} stage: {}",
                            stage.as_str(),
                            e
                        ));
                    }
                }
            }
        }
    }

    async fn ingest_message(&self, message: &BorrowedMessage<'_>) -> Result<(), ServiceError> {
        let Some(payload) = message.payload() else {
            debug!(offset = message.offset(), "skipping empty raw message");
            return Ok(());
        };

        match self.pipeline.admit(payload) {
            Admission::Rekey { key } => {
                self.sinks
                    .send(Sink::Rekeyed, Some(key.as_str()), payload, None)
                    .await?
            }
            Admission::Rejected(reason) => {
                self.sinks.reject(None, payload, reason.as_str()).await?
            }
            Admission::Dropped => {}
        }
        Ok(())
    }

    async fn process_message(&self, message: &BorrowedMessage<'_>) -> Result<(), ServiceError> {
        let Some(payload) = message.payload() else {
            debug!(offset = message.offset(), "skipping empty rekeyed message");
            return Ok(());
        };

        match self.pipeline.process(payload) {
            Outcome::Accepted { key, record } => {
                publish_accepted(&self.sinks, &self.feedback, &key, &record).await?
            }
            Outcome::Rejected(reason) => {
                let key = message.key().and_then(|k| std::str::from_utf8(k).ok());
                self.sinks.reject(key, payload, reason.as_str()).await?;
            }
            Outcome::Duplicate { key, source } => {
                debug!(key = %key, view = %source, "dropping duplicate listing");
            }
            Outcome::Dropped => {}
        }
        Ok(())
    }
}

/// Sends an accepted listing to the success topic, then the feedback topic, and only then marks
/// its key as seen locally. A failure leaves the key unseen so a retry or redelivery publishes
/// the listing again rather than losing its feedback entry.
async fn publish_accepted(
    sinks: &dyn ListingSink,
    seen: &MaterializedView,
    key: &IdentityKey,
    record: &ExplodedRecord,
) -> Result<(), ServiceError> {
    let body = serde_json::to_vec(record)?;
    sinks
        .send(Sink::Success, Some(key.as_str()), &body, None)
        .await?;
    sinks
        .send(Sink::Feedback, Some(key.as_str()), &body, None)
        .await?;

    // later listings on this partition must see the accept before the feedback topic
    // delivers it back
    seen.upsert(key.clone(), SEEN);
    Ok(())
}

/// Runs `route` until it succeeds, backing off linearly. After `attempts` failures the last
/// error is returned.
async fn route_with_retry<F, Fut>(
    stage: Stage,
    attempts: u32,
    backoff: Duration,
    mut route: F,
) -> Result<(), ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), ServiceError>>,
{
    let mut attempt = 1;
    loop {
        let Err(e) = route().await else {
            return Ok(());
        };
        metrics::counter!(STAGE_PROCESSING_ERROR, "stage" => stage.as_str()).increment(1);
        if attempt >= attempts {
            return Err(e);
        }
        warn!(stage = stage.as_str(), attempt, error = %e, "failed to route listing, retrying");
        sleep(backoff * attempt).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use listing_normalizer::{DedupDecision, DeduplicationPolicy};
    use rdkafka::message::OwnedHeaders;
    use serde_json::json;

    use super::*;

    /// Records successful sends and fails every send to `failing`.
    #[derive(Default)]
    struct RecordingSink {
        failing: Option<Sink>,
        sent: Mutex<Vec<(Sink, Option<String>)>>,
    }

    impl RecordingSink {
        fn failing(sink: Sink) -> Self {
            Self {
                failing: Some(sink),
                ..Default::default()
            }
        }

        fn sent(&self) -> Vec<(Sink, Option<String>)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ListingSink for RecordingSink {
        async fn send(
            &self,
            sink: Sink,
            key: Option<&str>,
            _payload: &[u8],
            _headers: Option<OwnedHeaders>,
        ) -> Result<(), SinkError> {
            if self.failing == Some(sink) {
                return Err(SinkError::Canceled {
                    sink: sink.as_str(),
                });
            }
            self.sent
                .lock()
                .unwrap()
                .push((sink, key.map(str::to_owned)));
            Ok(())
        }
    }

    fn accepted() -> (IdentityKey, ExplodedRecord) {
        let key = IdentityKey::from_url("https://example.com/monitor");
        let serde_json::Value::Object(record) = json!({"Brand": "Acer", "ScreenSize": "22"})
        else {
            unreachable!()
        };
        (key, record)
    }

    #[tokio::test]
    async fn accepted_listing_goes_to_success_then_feedback_then_local_view() {
        let sinks = RecordingSink::default();
        let seen = MaterializedView::new();
        let (key, record) = accepted();

        publish_accepted(&sinks, &seen, &key, &record).await.unwrap();

        let keyed = Some(key.as_str().to_owned());
        assert_eq!(
            sinks.sent(),
            vec![(Sink::Success, keyed.clone()), (Sink::Feedback, keyed)]
        );
        assert_eq!(seen.get(&key).as_deref(), Some(SEEN));
    }

    #[tokio::test]
    async fn failed_feedback_send_leaves_the_key_unseen() {
        let sinks = RecordingSink::failing(Sink::Feedback);
        let seen = Arc::new(MaterializedView::new());
        let recovery = Arc::new(MaterializedView::new());
        let policy = DeduplicationPolicy::new(seen.clone(), recovery);
        let (key, record) = accepted();

        let result = publish_accepted(&sinks, &seen, &key, &record).await;

        assert!(matches!(
            result,
            Err(ServiceError::Sink(SinkError::Canceled { sink: "feedback" }))
        ));
        assert!(seen.is_empty());
        // a redelivered copy is accepted again instead of being dropped as a duplicate
        assert_eq!(policy.dedupe(&key), DedupDecision::Accept);
    }

    #[tokio::test]
    async fn routing_retries_until_it_succeeds() {
        let calls = &AtomicU32::new(0);

        let result = route_with_retry(
            Stage::Process,
            5,
            Duration::from_millis(1),
            move || async move {
                match calls.fetch_add(1, Ordering::SeqCst) {
                    0 | 1 => Err(ServiceError::Sink(SinkError::Canceled { sink: "success" })),
                    _ => Ok(()),
                }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn routing_gives_up_after_the_last_attempt() {
        let calls = &AtomicU32::new(0);

        let result = route_with_retry(
            Stage::Ingest,
            3,
            Duration::from_millis(1),
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::Sink(SinkError::Canceled { sink: "rekeyed" }))
            },
        )
        .await;

        assert!(matches!(
            result,
            Err(ServiceError::Sink(SinkError::Canceled { sink: "rekeyed" }))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
