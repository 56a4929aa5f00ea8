//! # relay-watch
//!
//! Connects to a broker and logs every topic change.
//!
//! ## Usage
//!
//! ```bash
//! # Run with default settings
//! relay-watch
//!
//! # Run with a config file
//! relay-watch /path/to/relay.toml
//!
//! # Override the broker endpoint
//! RELAY_URL=ws://10.0.0.2:5000/ws relay-watch
//! ```

use anyhow::{Context, Result};
use relay_client::{metrics, Config, TopicClient};
use relay_core::TopicSnapshot;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "relay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = match std::env::args().nth(1) {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };

    if config.metrics.enabled {
        metrics::init_metrics();
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            warn!("Failed to start metrics server: {}", e);
        }
    }

    let options = config.options().context("Invalid feature configuration")?;
    let client = TopicClient::connect_websocket(options, config.websocket_config())
        .context("Invalid entity configuration")?;

    info!("Watching {}", config.url);

    let mut snapshots = client.watch_snapshot();
    let mut previous = snapshots.current();
    log_changes(&TopicSnapshot::default(), &previous);

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = snapshots.current();
                log_changes(&previous, &current);
                previous = current;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

fn log_changes(previous: &TopicSnapshot, current: &TopicSnapshot) {
    if previous.connected != current.connected {
        info!(connected = current.connected, "Connectivity changed");
    }

    for (topic, value) in &current.topics {
        if previous.get(topic) != Some(value) {
            info!(
                topic = %topic,
                payload = %value.payload,
                retain = value.retain,
                last_update = value.last_update,
                "Topic changed"
            );
        }
    }
}
