//! Tracing setup for the `statledger` binary.
//!
//! Log output goes to stderr so the command summaries on stdout stay
//! parseable for scripts.

use tracing_subscriber::{fmt::SubscriberBuilder, EnvFilter};

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `default_filter` when set.
pub fn init_tracing(default_filter: &str) -> anyhow::Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {}", e))
}
