//! Plan indexer - standalone change stream consumer
//!
//! Run this binary when the registry is started with `--indexer-enabled false`
//! (or `INDEXER_ENABLED=false`).
//! It consumes the durable change stream and mirrors plans into Elasticsearch.
//!
//! Usage:
//!   plan-indexer --nats-url nats://localhost:4222 --elastic-url http://localhost:9200
//!
//! Environment variables:
//!   NATS_URL - NATS server URL (default: nats://127.0.0.1:4222)
//!   CHANGE_SUBJECT - Subject change events arrive on (default: plan.changes.index)
//!   CONSUMER_NAME - Durable consumer name (default: plan_indexer)
//!   ELASTIC_SEARCH_URL - Elasticsearch base URL (default: http://localhost:9200)
//!   ELASTIC_INDEX_NAME - Target index (default: plan-index)

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

use plan_registry::{
    config::{ElasticArgs, NatsArgs},
    logging::init_tracing,
    nats::NatsClient,
    projection::{ChangeConsumer, ElasticsearchIndex, IndexingProjector},
};

#[derive(Parser, Debug)]
#[command(name = "plan-indexer")]
#[command(about = "Projects plan change events into the search index")]
#[command(version)]
struct Args {
    #[command(flatten)]
    nats: NatsArgs,

    #[command(flatten)]
    elastic: ElasticArgs,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    info!(
        "Starting plan indexer (NATS: {}, subject: {}, Elasticsearch: {}/{})",
        args.nats.nats_url, args.nats.change_subject, args.elastic.elastic_url, args.elastic.index_name
    );

    let index = ElasticsearchIndex::new(&args.elastic)?;
    match index.health().await {
        Ok(status) => info!("Elasticsearch reachable (cluster status: {})", status),
        Err(e) => warn!("Elasticsearch unreachable, indexing will retry per event: {}", e),
    }

    let client = match NatsClient::new(&args.nats, "plan-indexer").await {
        Ok(client) => client,
        Err(e) => {
            error!("NATS connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let projector = Arc::new(IndexingProjector::new(Arc::new(index)));
    let consumer = Arc::new(ChangeConsumer::new(client, args.nats.clone(), projector));

    let runner = Arc::clone(&consumer);
    let consumer_handle = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            consumer.stop().await;
        }
        result = consumer_handle => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Change consumer error: {}", e);
                    std::process::exit(1);
                }
                Err(e) => error!("Consumer task error: {}", e),
            }
        }
    }

    info!("Plan indexer shutting down");
    Ok(())
}
