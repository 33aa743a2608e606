//! Handoff relay binary.
//!
//! Run with:
//! ```bash
//! RELAY_ALLOWED_DOMAINS=api.example.com RUST_LOG=handoff_relay=debug handoff-relay
//! ```

use clap::Parser;
use handoff_relay::{RelayConfig, RelayServer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let config = RelayConfig::parse();
    RelayServer::start(config).await
}

/// Initialize logging from `RUST_LOG`, defaulting to `info`
fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
