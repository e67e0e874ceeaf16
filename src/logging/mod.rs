//! Logging setup shared by both binaries
//!
//! `RUST_LOG` wins when set; otherwise the crate logs at the configured level
//! and everything else at `info`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter directive for a crate log level
pub fn default_directive(level: &str) -> String {
    format!("plan_registry={},info", level)
}

/// Install the global subscriber. Plain text unless `json` is set.
pub fn init_tracing(level: &str, json: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer())
            .init();
    }
}
