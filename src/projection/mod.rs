//! Search projection of stored plans
//!
//! Committed plans reach the search index asynchronously:
//!
//! ```text
//! ┌────────────┐   ChangeEvent   ┌───────────────────┐   IndexDocument   ┌─────────────┐
//! │ PlanService│────────────────▶│ IndexingProjector │──────────────────▶│ SearchIndex │
//! └────────────┘  (JetStream or  └───────────────────┘  (one per node,   └─────────────┘
//!                  channel)                              routed to root)
//! ```
//!
//! The index may lag the record store; it is never read back by the service.

pub mod consumer;
pub mod document;
pub mod elastic;
pub mod engine;
pub mod index;
pub mod mapping;

pub use consumer::{ChangeConsumer, ConsumerConfig};
pub use document::{decompose, IndexDocument, JOIN_FIELD, ROOT_RELATION};
pub use elastic::ElasticsearchIndex;
pub use engine::{spawn_engine_task, EngineConfig, IndexingProjector, ProjectionOutcome};
pub use index::{MemoryIndex, SearchIndex};
pub use mapping::plan_index_mapping;
