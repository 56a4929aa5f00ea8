//! # relay-client
//!
//! Mirrors a broker's topic space over one shared connection.
//!
//! - **TopicClient** - owns the connection task and the topic store
//! - **Subscription** - one consumer's view of one topic, plus publishing
//! - **FeatureSwitch** - `ON`/`OFF` control of an entity feature
//! - **Config** - TOML configuration for the `relay-watch` binary
//!
//! ## Example
//!
//! ```rust,no_run
//! use relay_client::{ClientOptions, TopicClient};
//! use relay_core::{EntityConfig, SystemClock};
//! use relay_transport::WebSocketTransport;
//! use std::sync::Arc;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let options = ClientOptions::new("ws://127.0.0.1:5000/ws")
//!     .with_entities(EntityConfig::new().with_entity(
//!         "front",
//!         [("detect", true), ("record", false), ("snapshots", true)],
//!     ));
//! let client = TopicClient::start(
//!     options,
//!     Arc::new(WebSocketTransport::default()),
//!     Arc::new(SystemClock),
//! )?;
//!
//! let mut detect = client.feature("front", "detect")?;
//! assert_eq!(detect.is_on(), Some(true));
//!
//! detect.changed().await?;
//! detect.set(false)?;
//!
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod metrics;
pub mod session;
pub mod subscription;

pub use client::{ClientOptions, TopicClient};
pub use config::Config;
pub use session::ConnectionState;
pub use subscription::{
    FeatureSwitch, PublishError, PublishOptions, Publisher, SnapshotWatch, SubscribeError,
    Subscription, SubscriptionClosed,
};
