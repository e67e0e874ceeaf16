//! Change notifier
//!
//! Delivers change events to the indexing side. The JetStream notifier opens its
//! connection on first use and keeps it; the channel notifier feeds an in-process
//! projector for dev mode and tests.

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};
use tracing::{debug, info};

use super::client::NatsClient;
use super::messages::ChangeEvent;
use crate::config::NatsArgs;
use crate::types::{PlanError, Result};

/// Publishes change events to an asynchronous topic
#[async_trait]
pub trait ChangeNotifier: Send + Sync {
    /// Deliver one event; any failure is reported as `PublishFailure`
    async fn publish(&self, event: &ChangeEvent) -> Result<()>;

    /// Topic description for logs and health output
    fn name(&self) -> &'static str;
}

/// JetStream-backed notifier with a lazily established connection
pub struct JetStreamNotifier {
    args: NatsArgs,
    client: OnceCell<NatsClient>,
}

impl JetStreamNotifier {
    pub fn new(args: NatsArgs) -> Self {
        Self {
            args,
            client: OnceCell::new(),
        }
    }

    /// Get the connection, establishing it (and the stream) on first call.
    /// A failed attempt leaves the cell empty so the next publish retries.
    pub async fn connect(&self) -> Result<&NatsClient> {
        self.client
            .get_or_try_init(|| async {
                let client = NatsClient::new(&self.args, "plan-registry-notifier").await?;
                client.ensure_change_stream(&self.args).await?;
                info!(subject = %self.args.change_subject, "Change notifier connected");
                Ok::<_, PlanError>(client)
            })
            .await
    }

    pub fn is_connected(&self) -> bool {
        self.client.initialized()
    }
}

#[async_trait]
impl ChangeNotifier for JetStreamNotifier {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        let payload = event.to_bytes()?;
        let client = self
            .connect()
            .await
            .map_err(|e| PlanError::PublishFailure(e.to_string()))?;

        client
            .publish_acked(&self.args.change_subject, payload)
            .await
            .map_err(|e| PlanError::PublishFailure(e.to_string()))?;

        debug!(
            subject = %self.args.change_subject,
            operation = ?event.operation,
            "Change event published"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "nats-jetstream"
    }
}

/// In-process notifier backed by a bounded channel
#[derive(Clone)]
pub struct ChannelNotifier {
    sender: mpsc::Sender<ChangeEvent>,
}

impl ChannelNotifier {
    pub fn new(sender: mpsc::Sender<ChangeEvent>) -> Self {
        Self { sender }
    }
}

/// Create a channel notifier and the receiver the projector drains
pub fn channel_topic(buffer: usize) -> (ChannelNotifier, mpsc::Receiver<ChangeEvent>) {
    let (tx, rx) = mpsc::channel(buffer);
    (ChannelNotifier::new(tx), rx)
}

#[async_trait]
impl ChangeNotifier for ChannelNotifier {
    async fn publish(&self, event: &ChangeEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|_| PlanError::PublishFailure("change channel closed".into()))
    }

    fn name(&self) -> &'static str {
        "in-process"
    }
}
