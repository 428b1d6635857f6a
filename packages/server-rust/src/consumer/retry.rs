//! Retry consumer: the per-partition processing state machine.
//!
//! ```text
//! Received -> Processing -> Succeeded
//!                        -> RetryScheduled -> (delay) -> Processing
//!                        -> DeadLettered
//! ```
//!
//! Retries are scheduled on timer tasks, not slept on, so a partition keeps
//! consuming new records while earlier orders wait for their next attempt.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use orderflow_core::{
    DeadLetter, DeadLetterReason, FailureRecord, Order, OrderId, ProcessingError, RetryEnvelope,
};
use tokio::sync::mpsc;
use tokio_util::task::TaskTracker;
use tower::{Service, ServiceExt};
use tracing::{debug, info, warn};

use super::backoff::{BackoffScheduler, ExponentialBackoff};
use super::classify::{DefaultClassifier, FailureClassifier, FailureKind};
use super::middleware::ProcessingPipeline;
use super::stats::ConsumerStats;
use crate::aggregator::{Aggregator, AveragePublisher};
use crate::broker::BrokerRecord;
use crate::config::{RetryPolicy, SinkRetryPolicy};
use crate::dead_letter::{deliver_dead_letter, DeliveryOutcome};
use crate::network::ShutdownController;
use crate::observability::{ORDERS_DEAD_LETTERED, ORDERS_PROCESSED, ORDERS_RETRIED};
use crate::traits::DeadLetterSink;

// ---------------------------------------------------------------------------
// States and transitions
// ---------------------------------------------------------------------------

/// Lifecycle state of one order inside a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Received,
    Processing,
    Succeeded,
    RetryScheduled,
    DeadLettered,
}

impl ConsumerState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::RetryScheduled => "retry_scheduled",
            Self::DeadLettered => "dead_lettered",
        }
    }
}

/// Result of one processing attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// The price entered the aggregate.
    Succeeded { price: f64 },
    /// The envelope, already advanced to its next attempt, is due after `delay`.
    RetryScheduled {
        envelope: RetryEnvelope,
        delay: Duration,
    },
    /// Processing gave up; `outcome` says whether the sink acknowledged.
    DeadLettered {
        letter: DeadLetter,
        outcome: DeliveryOutcome,
    },
}

impl Transition {
    #[must_use]
    pub fn state(&self) -> ConsumerState {
        match self {
            Self::Succeeded { .. } => ConsumerState::Succeeded,
            Self::RetryScheduled { .. } => ConsumerState::RetryScheduled,
            Self::DeadLettered { .. } => ConsumerState::DeadLettered,
        }
    }
}

/// Why an order leaves the retry loop without succeeding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConsumerError {
    #[error("order {order_id} failed permanently ({class})")]
    Permanent { order_id: OrderId, class: String },
    #[error("order {order_id} exhausted {attempts} attempts")]
    RetriesExhausted { order_id: OrderId, attempts: u32 },
}

impl ConsumerError {
    #[must_use]
    pub fn reason(&self) -> DeadLetterReason {
        match self {
            Self::Permanent { .. } => DeadLetterReason::Permanent,
            Self::RetriesExhausted { .. } => DeadLetterReason::RetriesExhausted,
        }
    }
}

/// Per-partition totals returned when a consumer stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerSummary {
    pub partition: u32,
    pub succeeded: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    /// Scheduled retries dropped because shutdown arrived first.
    pub abandoned: u64,
}

/// A failed attempt and how its kind was decided.
struct Failure {
    error: ProcessingError,
    kind: FailureKind,
    /// `"classifier"`, or `"price_validation"` when the classifier was skipped.
    classified_by: &'static str,
}

// ---------------------------------------------------------------------------
// ConsumerContext
// ---------------------------------------------------------------------------

/// Collaborators shared by every partition consumer.
#[derive(Clone)]
pub struct ConsumerContext {
    pub classifier: Arc<dyn FailureClassifier>,
    pub backoff: Arc<dyn BackoffScheduler>,
    pub aggregator: Arc<Aggregator>,
    pub sink: Arc<dyn DeadLetterSink>,
    pub retry_policy: RetryPolicy,
    pub sink_policy: SinkRetryPolicy,
    pub stats: Arc<ConsumerStats>,
    /// Receives the running average after each successful order, if set.
    pub averages: Option<AveragePublisher>,
}

impl ConsumerContext {
    /// Context with the default classifier and exponential backoff from
    /// `retry_policy`.
    #[must_use]
    pub fn new(
        aggregator: Arc<Aggregator>,
        sink: Arc<dyn DeadLetterSink>,
        retry_policy: RetryPolicy,
        sink_policy: SinkRetryPolicy,
    ) -> Self {
        Self {
            classifier: Arc::new(DefaultClassifier),
            backoff: Arc::new(ExponentialBackoff::from_policy(&retry_policy)),
            aggregator,
            sink,
            retry_policy,
            sink_policy,
            stats: Arc::new(ConsumerStats::new()),
            averages: None,
        }
    }

    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn FailureClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffScheduler>) -> Self {
        self.backoff = backoff;
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: Arc<ConsumerStats>) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_average_publisher(mut self, averages: AveragePublisher) -> Self {
        self.averages = Some(averages);
        self
    }
}

// ---------------------------------------------------------------------------
// RetryConsumer
// ---------------------------------------------------------------------------

/// Processes the records of one partition, in order, with bounded retries.
pub struct RetryConsumer {
    partition: u32,
    pipeline: ProcessingPipeline,
    ctx: ConsumerContext,
}

impl RetryConsumer {
    #[must_use]
    pub fn new(partition: u32, pipeline: ProcessingPipeline, ctx: ConsumerContext) -> Self {
        Self {
            partition,
            pipeline,
            ctx,
        }
    }

    #[must_use]
    pub fn partition(&self) -> u32 {
        self.partition
    }

    /// Runs one processing attempt for `envelope` and applies its outcome.
    ///
    /// Prices that are not finite or are negative fail permanently without
    /// consulting the classifier. Processing failures never escape: every
    /// attempt ends in one of the three [`Transition`]s.
    pub async fn handle(&mut self, envelope: RetryEnvelope) -> Transition {
        let attempt = envelope.attempt();
        debug!(
            partition = self.partition,
            order_id = %envelope.order().order_id,
            attempt,
            state = ConsumerState::Processing.as_str(),
            "processing order"
        );

        let failure = match envelope.order().validated_price() {
            Err(invalid) => Failure {
                error: invalid,
                kind: FailureKind::Permanent,
                classified_by: "price_validation",
            },
            Ok(_) => match self.process(envelope.order()).await {
                Ok(price) => return self.succeed(&envelope, price).await,
                Err(error) => Failure {
                    kind: self.ctx.classifier.classify(&error),
                    error,
                    classified_by: "classifier",
                },
            },
        };

        match self.next_delay(&envelope, &failure.error, failure.kind) {
            Ok(delay) => self.schedule(envelope, &failure, delay),
            Err(signal) => self.dead_letter(envelope, &failure, &signal).await,
        }
    }

    async fn process(&mut self, order: &Order) -> Result<f64, ProcessingError> {
        self.pipeline.ready().await?.call(order.clone()).await
    }

    /// Delay before the next attempt, or the reason there is none.
    fn next_delay(
        &self,
        envelope: &RetryEnvelope,
        error: &ProcessingError,
        kind: FailureKind,
    ) -> Result<Duration, ConsumerError> {
        let order_id = envelope.order().order_id.clone();
        match kind {
            FailureKind::Permanent => Err(ConsumerError::Permanent {
                order_id,
                class: error.class().to_string(),
            }),
            FailureKind::Retryable if envelope.attempt() >= self.ctx.retry_policy.max_attempts => {
                Err(ConsumerError::RetriesExhausted {
                    order_id,
                    attempts: envelope.attempt(),
                })
            }
            FailureKind::Retryable => Ok(self.ctx.backoff.delay(envelope.attempt())),
        }
    }

    // `&mut self` for the same reason as `dead_letter`.
    async fn succeed(&mut self, envelope: &RetryEnvelope, price: f64) -> Transition {
        let snapshot = self.ctx.aggregator.update(price);
        if let Some(averages) = &self.ctx.averages {
            averages.publish(snapshot).await;
        }
        self.ctx.stats.record_processed();
        metrics::counter!(ORDERS_PROCESSED).increment(1);
        info!(
            partition = self.partition,
            order_id = %envelope.order().order_id,
            attempt = envelope.attempt(),
            price,
            state = ConsumerState::Succeeded.as_str(),
            "order processed"
        );
        Transition::Succeeded { price }
    }

    fn schedule(&self, envelope: RetryEnvelope, failure: &Failure, delay: Duration) -> Transition {
        let error = &failure.error;
        self.ctx.stats.record_retried();
        metrics::counter!(ORDERS_RETRIED).increment(1);
        warn!(
            partition = self.partition,
            order_id = %envelope.order().order_id,
            attempt = envelope.attempt(),
            kind = failure.kind.as_str(),
            classified_by = failure.classified_by,
            error_class = error.class(),
            error = %error,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            state = ConsumerState::RetryScheduled.as_str(),
            "attempt failed; retry scheduled"
        );
        Transition::RetryScheduled {
            envelope: envelope.retry(FailureRecord::from(error)),
            delay,
        }
    }

    // Takes `&mut self` so the future stays `Send`: the pipeline is not `Sync`.
    async fn dead_letter(
        &mut self,
        envelope: RetryEnvelope,
        failure: &Failure,
        signal: &ConsumerError,
    ) -> Transition {
        let error = &failure.error;
        let reason = signal.reason();
        let letter = envelope.into_dead_letter(FailureRecord::from(error), reason, now_ms());

        let outcome =
            deliver_dead_letter(self.ctx.sink.as_ref(), &letter, &self.ctx.sink_policy).await;
        warn!(
            partition = self.partition,
            order_id = %letter.order.order_id,
            attempt = letter.attempts,
            kind = failure.kind.as_str(),
            classified_by = failure.classified_by,
            error_class = error.class(),
            error = %error,
            reason = reason.as_str(),
            outcome = outcome.as_str(),
            state = ConsumerState::DeadLettered.as_str(),
            "{signal}; routed to dead-letter channel"
        );
        self.ctx.stats.record_dead_lettered();
        if outcome == DeliveryOutcome::Reported {
            self.ctx.stats.record_reported();
        }
        metrics::counter!(ORDERS_DEAD_LETTERED, "reason" => reason.as_str()).increment(1);

        Transition::DeadLettered { letter, outcome }
    }

    /// Consumes `records` until intake closes with no retry pending, or until
    /// shutdown is triggered.
    ///
    /// On shutdown, intake stops at once and every scheduled retry is
    /// abandoned and logged. The order being processed when shutdown arrives
    /// finishes first; it holds an in-flight guard meanwhile.
    pub async fn run(
        mut self,
        mut records: mpsc::Receiver<BrokerRecord>,
        shutdown: Arc<ShutdownController>,
    ) -> ConsumerSummary {
        let partition = self.partition;
        let (retry_tx, mut retry_rx) = mpsc::unbounded_channel::<RetryEnvelope>();
        let timers = TaskTracker::new();
        let abandoned = Arc::new(AtomicU64::new(0));
        let mut stop = shutdown.shutdown_receiver();
        let mut summary = ConsumerSummary {
            partition,
            ..ConsumerSummary::default()
        };
        let mut pending: usize = 0;
        let mut intake_open = true;

        info!(partition, "consumer started");

        loop {
            if !intake_open && pending == 0 {
                break;
            }

            let envelope = tokio::select! {
                biased;
                _ = stop.wait_for(|stopping| *stopping) => break,
                Some(envelope) = retry_rx.recv() => {
                    pending -= 1;
                    envelope
                }
                record = records.recv(), if intake_open => match record {
                    Some(record) => {
                        debug!(
                            partition,
                            offset = record.origin.offset,
                            order_id = %record.payload.order_id,
                            state = ConsumerState::Received.as_str(),
                            "record received"
                        );
                        RetryEnvelope::new(record.payload, record.origin)
                    }
                    None => {
                        debug!(partition, pending, "intake closed");
                        intake_open = false;
                        continue;
                    }
                },
            };

            let _in_flight = shutdown.in_flight_guard();
            match self.handle(envelope).await {
                Transition::Succeeded { .. } => summary.succeeded += 1,
                Transition::RetryScheduled { envelope, delay } => {
                    summary.retried += 1;
                    pending += 1;
                    spawn_retry_timer(&timers, &retry_tx, &shutdown, &abandoned, envelope, delay);
                }
                Transition::DeadLettered { .. } => summary.dead_lettered += 1,
            }
        }

        timers.close();
        timers.wait().await;

        // Retries whose timer fired but that were never picked up.
        while let Ok(envelope) = retry_rx.try_recv() {
            log_abandoned(partition, &envelope);
            abandoned.fetch_add(1, Ordering::Relaxed);
        }

        summary.abandoned = abandoned.load(Ordering::Relaxed);
        info!(
            partition,
            succeeded = summary.succeeded,
            retried = summary.retried,
            dead_lettered = summary.dead_lettered,
            abandoned = summary.abandoned,
            "consumer stopped"
        );
        summary
    }
}

/// Feeds `envelope` back to the consumer after `delay`, unless shutdown
/// comes first.
fn spawn_retry_timer(
    timers: &TaskTracker,
    retry_tx: &mpsc::UnboundedSender<RetryEnvelope>,
    shutdown: &ShutdownController,
    abandoned: &Arc<AtomicU64>,
    envelope: RetryEnvelope,
    delay: Duration,
) {
    let retry_tx = retry_tx.clone();
    let mut stop = shutdown.shutdown_receiver();
    let abandoned = Arc::clone(abandoned);
    let partition = envelope.origin().partition;

    timers.spawn(async move {
        tokio::select! {
            () = tokio::time::sleep(delay) => {
                if let Err(mpsc::error::SendError(envelope)) = retry_tx.send(envelope) {
                    log_abandoned(partition, &envelope);
                    abandoned.fetch_add(1, Ordering::Relaxed);
                }
            }
            _ = stop.wait_for(|stopping| *stopping) => {
                log_abandoned(partition, &envelope);
                abandoned.fetch_add(1, Ordering::Relaxed);
            }
        }
    });
}

fn log_abandoned(partition: u32, envelope: &RetryEnvelope) {
    warn!(
        partition,
        order_id = %envelope.order().order_id,
        attempt = envelope.attempt(),
        offset = envelope.origin().offset,
        last_error = ?envelope.last_error(),
        "scheduled retry abandoned on shutdown"
    );
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
