//! Configuration for the plan registry
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;
use uuid::Uuid;

/// Minimum accepted JWT secret length
pub const MIN_JWT_SECRET_LEN: usize = 32;

/// Plan registry - plan records with fingerprint-guarded writes
#[derive(Parser, Debug, Clone)]
#[command(name = "plan-registry")]
#[command(about = "Plan record service with an asynchronous search projection")]
#[command(version)]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:3000")]
    pub listen: SocketAddr,

    /// Enable development mode (auth optional, in-memory fallbacks)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "plans")]
    pub mongodb_db: String,

    /// MongoDB collection holding plan records
    #[arg(long, env = "MONGODB_COLLECTION", default_value = "plans")]
    pub mongodb_collection: String,

    /// NATS configuration
    #[command(flatten)]
    pub nats: NatsArgs,

    /// Search index configuration
    #[command(flatten)]
    pub elastic: ElasticArgs,

    /// HS256 secret for bearer tokens (required in production)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Run the indexing projector inside this process
    /// When false, a separate plan-indexer consumes the change stream
    #[arg(
        long,
        env = "INDEXER_ENABLED",
        default_value_t = true,
        action = clap::ArgAction::Set
    )]
    pub indexer_enabled: bool,
}

/// NATS connection and change stream configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,

    /// JetStream stream holding change events
    #[arg(long, env = "STREAM_NAME", default_value = "PLAN_CHANGES")]
    pub stream_name: String,

    /// Subject change events are published on
    #[arg(long = "subject", env = "CHANGE_SUBJECT", default_value = "plan.changes.index")]
    pub change_subject: String,

    /// Durable consumer name used by the indexer
    #[arg(long, env = "CONSUMER_NAME", default_value = "plan_indexer")]
    pub consumer_name: String,
}

impl NatsArgs {
    /// Subject prefix the stream captures (`plan.changes` for `plan.changes.index`)
    pub fn subject_prefix(&self) -> &str {
        self.change_subject
            .rsplit_once('.')
            .map(|(prefix, _)| prefix)
            .unwrap_or(&self.change_subject)
    }

    /// Wildcard subject the stream is created with
    pub fn stream_subjects(&self) -> String {
        format!("{}.>", self.subject_prefix())
    }
}

/// Elasticsearch configuration
#[derive(Parser, Debug, Clone)]
pub struct ElasticArgs {
    /// Elasticsearch base URL
    #[arg(long = "elastic-url", env = "ELASTIC_SEARCH_URL", default_value = "http://localhost:9200")]
    pub elastic_url: String,

    /// Index receiving decomposed plan documents
    #[arg(long, env = "ELASTIC_INDEX_NAME", default_value = "plan-index")]
    pub index_name: String,
}

impl Args {
    /// Effective JWT secret; `None` means requests are not authenticated
    pub fn jwt_secret(&self) -> Option<&str> {
        self.jwt_secret.as_deref().filter(|s| !s.is_empty())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        match self.jwt_secret() {
            None if !self.dev_mode => {
                return Err("JWT_SECRET is required in production mode".to_string());
            }
            Some(secret) if secret.len() < MIN_JWT_SECRET_LEN => {
                return Err(format!(
                    "JWT_SECRET must be at least {} characters",
                    MIN_JWT_SECRET_LEN
                ));
            }
            _ => {}
        }

        if !self.nats.change_subject.contains('.') {
            return Err(format!(
                "CHANGE_SUBJECT '{}' must have a prefix covered by the stream",
                self.nats.change_subject
            ));
        }

        if self.elastic.index_name.trim().is_empty() {
            return Err("ELASTIC_INDEX_NAME must not be empty".to_string());
        }

        Ok(())
    }
}
