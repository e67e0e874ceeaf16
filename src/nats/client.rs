//! NATS JetStream client wrapper
//!
//! Connection management plus provisioning of the change stream.

use async_nats::jetstream::{self, stream::Stream};
use async_nats::{Client, ConnectOptions};
use bytes::Bytes;
use std::time::Duration;
use tracing::info;

use crate::config::NatsArgs;
use crate::types::PlanError;

/// Default ping interval for keep-alive
const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(120);

/// How long change events are retained if nobody consumes them
const STREAM_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 3600);

/// NATS client wrapper with JetStream support
#[derive(Clone)]
pub struct NatsClient {
    /// Underlying NATS client
    client: Client,
    /// JetStream context on the same connection
    jetstream: jetstream::Context,
    /// Client name for logging
    name: String,
}

impl NatsClient {
    /// Create a new NATS client
    pub async fn new(args: &NatsArgs, name: &str) -> Result<Self, PlanError> {
        info!("Connecting to NATS at {}", args.nats_url);

        // No retry_on_initial_connect: fail fast when NATS is down, reconnect after
        let mut options = ConnectOptions::new()
            .name(name)
            .ping_interval(DEFAULT_PING_INTERVAL)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = options
            .connect(&args.nats_url)
            .await
            .map_err(|e| PlanError::Nats(format!("Failed to connect: {}", e)))?;

        info!("Connected to NATS at {}", args.nats_url);

        let jetstream = jetstream::new(client.clone());
        Ok(Self {
            client,
            jetstream,
            name: name.to_string(),
        })
    }

    /// Get the underlying NATS client
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Get the JetStream context
    pub fn jetstream(&self) -> &jetstream::Context {
        &self.jetstream
    }

    /// Create the change stream if it does not exist yet
    pub async fn ensure_change_stream(&self, args: &NatsArgs) -> Result<Stream, PlanError> {
        let subjects = args.stream_subjects();
        let stream = self
            .jetstream
            .get_or_create_stream(jetstream::stream::Config {
                name: args.stream_name.clone(),
                subjects: vec![subjects.clone()],
                max_age: STREAM_MAX_AGE,
                storage: jetstream::stream::StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| PlanError::Nats(format!("Failed to create stream: {e}")))?;

        info!("Using stream {} with subjects {}", args.stream_name, subjects);
        Ok(stream)
    }

    /// Publish to JetStream and wait for the server ack
    pub async fn publish_acked(&self, subject: &str, payload: Bytes) -> Result<(), PlanError> {
        self.jetstream
            .publish(subject.to_string(), payload)
            .await
            .map_err(|e| PlanError::Nats(format!("Failed to publish: {}", e)))?
            .await
            .map_err(|e| PlanError::Nats(format!("Failed to confirm publish: {}", e)))?;
        Ok(())
    }

    /// Flush pending messages
    pub async fn flush(&self) -> Result<(), PlanError> {
        self.client
            .flush()
            .await
            .map_err(|e| PlanError::Nats(format!("Flush failed: {}", e)))
    }

    /// Get the client name
    pub fn name(&self) -> &str {
        &self.name
    }
}
