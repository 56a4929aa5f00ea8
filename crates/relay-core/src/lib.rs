//! # relay-core
//!
//! Core state for the relay topic mirror.
//!
//! - **TopicStore** - last-known value per topic, plus the connectivity flag
//! - **Bootstrap** - synthetic `<entity>/<feature>/state` topics derived from configuration
//! - **TopicWatch** - per-topic change notification
//! - **Clock** - injectable millisecond clock
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ EntityConfig │────▶│  bootstrap   │────▶│  TopicStore  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//!                                                  │
//!                                                  ▼
//!                                           ┌──────────────┐
//!                                           │  TopicWatch  │
//!                                           └──────────────┘
//! ```

pub mod bootstrap;
pub mod clock;
pub mod store;
pub mod value;
pub mod watch;

pub use bootstrap::{derive, ConstructionError, EntityConfig, FeatureBinding, FeatureMap};
pub use clock::{Clock, ManualClock, SystemClock};
pub use store::{Applied, DecodeError, StoreStats, TopicStore};
pub use value::{TopicSnapshot, TopicValue};
pub use watch::{TopicWatch, WatchClosed};
