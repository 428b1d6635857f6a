//! Application wiring.
//!
//! [`OrderflowApp::build`] creates the broker topics, the shared aggregate,
//! the dead-letter sink and the processing pipeline. [`OrderflowApp::start_consumers`]
//! spawns one retry consumer per partition plus the dead-letter inspector and
//! returns a [`ConsumerGroup`] to join on shutdown.
//!
//! Running averages go to their own broker, which carries [`AveragePrice`]
//! records. A caller that subscribes to that topic before the consumers start
//! owns it; otherwise the app tails it into the log.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use orderflow_core::{AveragePrice, Order, RecordOrigin};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::aggregator::{Aggregator, AveragePublisher};
use crate::broker::{
    replay_json_lines, BrokerError, BrokerRecord, InMemoryBroker, OutboundRecord, ReplayReport,
};
use crate::config::ServerConfig;
use crate::consumer::{
    build_processing_pipeline, ConsumerContext, ConsumerStats, ConsumerSummary, OrderProcessor,
    ProcessingPipeline, RetryConsumer,
};
use crate::dead_letter::{DeadLetterInspector, DeadLetterLog, TopicDeadLetterSink};
use crate::network::{AppState, NetworkModule, ShutdownController};
use crate::traits::EventBroker;
use crate::worker::BackgroundWorker;

/// Every long-lived component of one orderflow process.
#[derive(Clone)]
pub struct OrderflowApp {
    config: ServerConfig,
    broker: Arc<InMemoryBroker>,
    averages: Arc<InMemoryBroker<AveragePrice>>,
    aggregator: Arc<Aggregator>,
    consumer_stats: Arc<ConsumerStats>,
    dead_letters: Arc<DeadLetterLog>,
    shutdown: Arc<ShutdownController>,
    context: ConsumerContext,
    pipeline: ProcessingPipeline,
    start_time: Instant,
}

impl OrderflowApp {
    /// Validates `config` and wires all components. Nothing runs yet.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid configuration or if the topics cannot be
    /// created.
    pub fn build(config: ServerConfig) -> anyhow::Result<Self> {
        config.validate()?;

        let broker = Arc::new(InMemoryBroker::new(config.partition_capacity));
        broker.create_topic(&config.orders_topic, config.partitions)?;
        broker.create_topic(&config.dead_letter_topic, config.partitions)?;

        // Every average shares one key, so one partition is enough.
        let averages = Arc::new(InMemoryBroker::<AveragePrice>::with_capacity(
            config.partition_capacity,
        ));
        averages.create_topic(&config.avg_prices_topic, 1)?;

        let aggregator = Arc::new(Aggregator::new());
        let consumer_stats = Arc::new(ConsumerStats::new());
        let sink = Arc::new(TopicDeadLetterSink::new(
            broker.clone(),
            config.dead_letter_topic.clone(),
        ));

        let retry_policy = config.retry_policy();
        let pipeline = build_processing_pipeline(OrderProcessor, &retry_policy);
        let context = ConsumerContext::new(
            aggregator.clone(),
            sink,
            retry_policy,
            config.sink_retry_policy(),
        )
        .with_stats(consumer_stats.clone())
        .with_average_publisher(AveragePublisher::new(
            averages.clone(),
            config.avg_prices_topic.clone(),
        ));

        Ok(Self {
            dead_letters: Arc::new(DeadLetterLog::new(config.dead_letter_log_capacity)),
            shutdown: Arc::new(ShutdownController::new()),
            start_time: Instant::now(),
            config,
            broker,
            averages,
            aggregator,
            consumer_stats,
            context,
            pipeline,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    #[must_use]
    pub fn broker(&self) -> Arc<InMemoryBroker> {
        Arc::clone(&self.broker)
    }

    /// Broker holding the average-price topic.
    #[must_use]
    pub fn average_prices(&self) -> Arc<InMemoryBroker<AveragePrice>> {
        Arc::clone(&self.averages)
    }

    #[must_use]
    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::clone(&self.aggregator)
    }

    #[must_use]
    pub fn consumer_stats(&self) -> Arc<ConsumerStats> {
        Arc::clone(&self.consumer_stats)
    }

    #[must_use]
    pub fn dead_letters(&self) -> Arc<DeadLetterLog> {
        Arc::clone(&self.dead_letters)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Shared state for the HTTP handlers.
    #[must_use]
    pub fn app_state(&self) -> AppState {
        AppState {
            stats: self.aggregator.clone(),
            dead_letters: self.dead_letters.clone(),
            consumer_stats: self.consumer_stats.clone(),
            shutdown: self.shutdown.clone(),
            start_time: self.start_time,
        }
    }

    #[must_use]
    pub fn network_module(&self) -> NetworkModule {
        NetworkModule::new(self.config.network_config(), self.app_state())
    }

    /// Publishes one order to the orders topic.
    ///
    /// # Errors
    ///
    /// Returns the broker error if the record cannot be published.
    pub async fn publish(&self, order: Order) -> Result<RecordOrigin, BrokerError> {
        self.broker
            .publish(&self.config.orders_topic, OutboundRecord::for_order(order))
            .await
    }

    /// Publishes every order of a JSON-lines file to the orders topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or a publish fails.
    pub async fn replay(&self, path: &Path) -> anyhow::Result<ReplayReport> {
        replay_json_lines(self.broker.as_ref(), &self.config.orders_topic, path).await
    }

    /// Spawns one consumer per orders partition and the dead-letter inspector.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown was already triggered or the topics were
    /// already subscribed.
    pub fn start_consumers(&self) -> anyhow::Result<ConsumerGroup> {
        if self.shutdown.is_shutting_down() {
            bail!("shutdown already triggered; consumers not started");
        }
        let partitions = self.broker.subscribe(&self.config.orders_topic)?;
        let dead_letter_partitions = self.broker.subscribe(&self.config.dead_letter_topic)?;

        let consumers = partitions
            .into_iter()
            .zip(0u32..)
            .map(|(records, partition)| {
                let consumer =
                    RetryConsumer::new(partition, self.pipeline.clone(), self.context.clone());
                tokio::spawn(consumer.run(records, self.shutdown.clone()))
            })
            .collect::<Vec<_>>();

        let inspector = BackgroundWorker::start(
            DeadLetterInspector::new(self.dead_letters.clone()),
            Duration::from_millis(self.config.inspector_tick_ms.max(1)),
        );
        let inspector_tx = inspector
            .sender()
            .context("dead-letter inspector stopped before start")?;

        let forwarders = TaskTracker::new();
        let stop_forwarding = CancellationToken::new();
        for records in dead_letter_partitions {
            forwarders.spawn(forward_dead_letters(
                records,
                inspector_tx.clone(),
                stop_forwarding.clone(),
            ));
        }
        match self.averages.subscribe(&self.config.avg_prices_topic) {
            Ok(receivers) => {
                for records in receivers {
                    forwarders.spawn(tail_average_prices(records, stop_forwarding.clone()));
                }
            }
            Err(BrokerError::AlreadySubscribed { .. }) => {
                debug!(topic = %self.config.avg_prices_topic, "average prices consumed externally");
            }
            Err(e) => return Err(e.into()),
        }
        forwarders.close();

        info!(
            partitions = consumers.len(),
            orders_topic = %self.config.orders_topic,
            dead_letter_topic = %self.config.dead_letter_topic,
            "consumers started"
        );

        Ok(ConsumerGroup {
            consumers,
            forwarders,
            stop_forwarding,
            inspector,
        })
    }
}

/// Moves dead-letter topic records to the inspector until cancelled, then
/// hands over whatever is still buffered.
async fn forward_dead_letters(
    mut records: mpsc::Receiver<BrokerRecord>,
    inspector: mpsc::Sender<BrokerRecord>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            record = records.recv() => match record {
                Some(record) => {
                    if inspector.send(record).await.is_err() {
                        return;
                    }
                }
                None => return,
            },
            () = cancel.cancelled() => {
                while let Ok(record) = records.try_recv() {
                    if inspector.send(record).await.is_err() {
                        return;
                    }
                }
                return;
            }
        }
    }
}

/// Logs average-price records until cancelled, then whatever is buffered.
async fn tail_average_prices(
    mut records: mpsc::Receiver<BrokerRecord<AveragePrice>>,
    cancel: CancellationToken,
) {
    let log = |record: &BrokerRecord<AveragePrice>| {
        debug!(
            offset = record.origin.offset,
            count = record.payload.count,
            average = record.payload.average,
            "average price published"
        );
    };
    loop {
        tokio::select! {
            biased;
            record = records.recv() => match record {
                Some(record) => log(&record),
                None => return,
            },
            () = cancel.cancelled() => {
                while let Ok(record) = records.try_recv() {
                    log(&record);
                }
                return;
            }
        }
    }
}

/// Running consumers and the dead-letter inspector.
pub struct ConsumerGroup {
    consumers: Vec<JoinHandle<ConsumerSummary>>,
    forwarders: TaskTracker,
    stop_forwarding: CancellationToken,
    inspector: BackgroundWorker<DeadLetterInspector>,
}

impl ConsumerGroup {
    /// Waits for every consumer to stop, then flushes pending dead letters
    /// into the inspector and stops it.
    ///
    /// Consumers stop when shutdown is triggered on the app's controller.
    ///
    /// # Errors
    ///
    /// Returns an error if a consumer task panicked.
    pub async fn join(mut self) -> anyhow::Result<Vec<ConsumerSummary>> {
        let mut summaries = Vec::with_capacity(self.consumers.len());
        for handle in self.consumers.drain(..) {
            summaries.push(handle.await.context("consumer task failed")?);
        }

        self.stop_forwarding.cancel();
        self.forwarders.wait().await;
        self.inspector.stop().await;

        summaries.sort_by_key(|s| s.partition);
        Ok(summaries)
    }
}
