//! NATS messaging for change events
//!
//! - `client`: connection and JetStream stream provisioning
//! - `messages`: the change event wire type
//! - `notifier`: publishing side used by the plan service

pub mod client;
pub mod messages;
pub mod notifier;

pub use client::NatsClient;
pub use messages::{ChangeEvent, Operation};
pub use notifier::{channel_topic, ChangeNotifier, ChannelNotifier, JetStreamNotifier};
