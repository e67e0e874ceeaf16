//! JetStream change consumer
//!
//! Durable pull consumer feeding the indexing projector. Every message is
//! acked once handled, including ones that could not be applied, so a poison
//! message is logged once instead of being redelivered forever.

use async_nats::jetstream::{self, consumer::PullConsumer, stream::Stream};
use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::engine::{IndexingProjector, ProjectionOutcome};
use crate::config::NatsArgs;
use crate::nats::client::NatsClient;
use crate::nats::messages::ChangeEvent;
use crate::types::{PlanError, Result};

/// Consumer tuning
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Messages fetched per pull
    pub batch_size: usize,
    /// How long a pull waits for messages
    pub fetch_expiry: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            fetch_expiry: Duration::from_secs(5),
        }
    }
}

/// Pulls change events from the stream and hands them to the projector
pub struct ChangeConsumer {
    client: NatsClient,
    args: NatsArgs,
    projector: Arc<IndexingProjector>,
    config: ConsumerConfig,
    running: Arc<RwLock<bool>>,
}

impl ChangeConsumer {
    pub fn new(client: NatsClient, args: NatsArgs, projector: Arc<IndexingProjector>) -> Self {
        Self {
            client,
            args,
            projector,
            config: ConsumerConfig::default(),
            running: Arc::new(RwLock::new(false)),
        }
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// Run the consumption loop until `stop` is called
    pub async fn run(&self) -> Result<()> {
        *self.running.write().await = true;

        let stream = self.client.ensure_change_stream(&self.args).await?;
        let consumer = self.ensure_consumer(&stream).await?;

        info!(
            consumer = %self.args.consumer_name,
            subject = %self.args.change_subject,
            "Change consumer started"
        );

        while *self.running.read().await {
            match self.process_batch(&consumer).await {
                Ok(count) => {
                    if count > 0 {
                        debug!("Processed {} change events", count);
                    }
                }
                Err(e) => {
                    error!("Error processing batch: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }

        info!("Change consumer stopped");
        Ok(())
    }

    /// Stop after the current batch
    pub async fn stop(&self) {
        *self.running.write().await = false;
    }

    async fn ensure_consumer(&self, stream: &Stream) -> Result<PullConsumer> {
        let name = &self.args.consumer_name;
        let consumer = stream
            .get_or_create_consumer(
                name,
                jetstream::consumer::pull::Config {
                    durable_name: Some(name.clone()),
                    ack_policy: jetstream::consumer::AckPolicy::Explicit,
                    filter_subject: self.args.change_subject.clone(),
                    max_ack_pending: self.config.batch_size as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| PlanError::Nats(format!("Failed to create consumer: {e}")))?;

        info!("Using consumer {}", name);
        Ok(consumer)
    }

    async fn process_batch(&self, consumer: &PullConsumer) -> Result<usize> {
        let mut messages = consumer
            .fetch()
            .max_messages(self.config.batch_size)
            .expires(self.config.fetch_expiry)
            .messages()
            .await
            .map_err(|e| PlanError::Nats(format!("Failed to fetch messages: {e}")))?;

        let mut count = 0;
        while let Some(message) = messages.next().await {
            match message {
                Ok(message) => {
                    count += 1;
                    self.process_message(message).await;
                }
                Err(e) => warn!("Error receiving message: {}", e),
            }
        }

        Ok(count)
    }

    async fn process_message(&self, message: jetstream::Message) {
        match apply_payload(&self.projector, &message.payload).await {
            Ok(outcome) => debug!(?outcome, "Change event applied"),
            Err(e) => error!("Dropping change event: {}", e),
        }

        if let Err(e) = message.ack().await {
            warn!("Failed to ack message: {}", e);
        }
    }
}

/// Decode a raw change event and apply it
pub async fn apply_payload(
    projector: &IndexingProjector,
    payload: &[u8],
) -> Result<ProjectionOutcome> {
    let event = ChangeEvent::from_bytes(payload)?;
    projector.process_event(&event).await
}
