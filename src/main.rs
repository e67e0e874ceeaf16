//! Plan registry - CRUD service for plan documents
//!
//! Writes go to the record store, every change is published on the change
//! topic, and the indexing projector mirrors plans into the search index.

use clap::Parser;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use plan_registry::{
    auth::BearerAuth,
    config::Args,
    db::{MemoryRecordStore, MongoClient, MongoRecordStore, RecordStore},
    logging::init_tracing,
    nats::{channel_topic, ChangeEvent, ChangeNotifier, JetStreamNotifier, NatsClient},
    projection::{
        spawn_engine_task, ChangeConsumer, ElasticsearchIndex, EngineConfig, IndexingProjector,
        MemoryIndex, SearchIndex,
    },
    server::{self, AppState},
    services::PlanService,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Plan Registry");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} ({}.{})", args.mongodb_uri, args.mongodb_db, args.mongodb_collection);
    info!("NATS: {} (stream {}, subject {})", args.nats.nats_url, args.nats.stream_name, args.nats.change_subject);
    info!("Elasticsearch: {} (index {})", args.elastic.elastic_url, args.elastic.index_name);
    info!("In-process indexer: {}", args.indexer_enabled);
    info!("======================================");

    // Record store (in-memory fallback in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) if args.dev_mode => {
            warn!("MongoDB connection failed (dev mode, using in-memory store): {}", e);
            None
        }
        Err(e) => {
            error!("MongoDB connection failed: {}", e);
            std::process::exit(1);
        }
    };

    let store: Arc<dyn RecordStore> = match &mongo {
        Some(client) => Arc::new(MongoRecordStore::new(client, &args.mongodb_collection)),
        None => Arc::new(MemoryRecordStore::new()),
    };

    // Change topic (in-process channel fallback in dev mode)
    let jetstream = JetStreamNotifier::new(args.nats.clone());
    let connected = jetstream.connect().await.map(|_| ());
    let (notifier, local_events): (Arc<dyn ChangeNotifier>, Option<mpsc::Receiver<ChangeEvent>>) =
        match connected {
            Ok(()) => (Arc::new(jetstream), None),
            Err(e) if args.dev_mode => {
                warn!("NATS connection failed (dev mode, using in-process topic): {}", e);
                let (notifier, events) = channel_topic(EngineConfig::default().buffer_size);
                (Arc::new(notifier), Some(events))
            }
            Err(e) => {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        };

    // Search index; outside dev mode an unreachable cluster is retried per event
    let elastic = ElasticsearchIndex::new(&args.elastic)?;
    let index: Arc<dyn SearchIndex> = match elastic.health().await {
        Ok(status) => {
            info!("Elasticsearch reachable (cluster status: {})", status);
            Arc::new(elastic)
        }
        Err(e) if args.dev_mode => {
            warn!("Elasticsearch unreachable (dev mode, using in-memory index): {}", e);
            Arc::new(MemoryIndex::new())
        }
        Err(e) => {
            warn!("Elasticsearch unreachable, indexing will retry per event: {}", e);
            Arc::new(elastic)
        }
    };

    let projector = Arc::new(IndexingProjector::new(Arc::clone(&index)));
    let mut consumer: Option<Arc<ChangeConsumer>> = None;

    if args.indexer_enabled {
        match local_events {
            Some(events) => {
                spawn_engine_task(Arc::clone(&projector), events);
            }
            None => {
                let client = NatsClient::new(&args.nats, "plan-registry-indexer").await?;
                let change_consumer = Arc::new(ChangeConsumer::new(
                    client,
                    args.nats.clone(),
                    Arc::clone(&projector),
                ));
                let runner = Arc::clone(&change_consumer);
                tokio::spawn(async move {
                    if let Err(e) = runner.run().await {
                        error!("Change consumer error: {}", e);
                    }
                });
                consumer = Some(change_consumer);
            }
        }
    } else if local_events.is_some() {
        warn!("In-process topic without an indexer: change events will be dropped");
    }

    let auth = BearerAuth::from_secret(args.jwt_secret())?;
    let plans = PlanService::new(store, notifier);
    let indexer_in_process = args.indexer_enabled;
    let state = Arc::new(AppState::new(args, plans, auth, index, indexer_in_process));

    let result = server::run(state).await;

    projector.shutdown();
    if let Some(consumer) = consumer {
        consumer.stop().await;
    }
    if let Some(mongo) = mongo {
        mongo.shutdown().await;
    }

    if let Err(e) = result {
        error!("Server error: {}", e);
        std::process::exit(1);
    }

    info!("Plan registry stopped");
    Ok(())
}
