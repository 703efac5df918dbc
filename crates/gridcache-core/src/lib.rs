//! gridcache-core - a throttled, cached fetch layer for public football data.
//!
//! The pieces, bottom-up:
//!
//! - [`store`]: persistent key/value storage with per-entry expiry and an
//!   in-memory fallback when the disk is unusable.
//! - [`throttle`]: a fixed-window request limiter with growing backoff.
//! - [`api`]: the cached client with retries, plus endpoint helpers.
//! - [`validate`]: lax shape checks for players, teams, games and odds.
//! - [`batch`]: concurrent fetches and cache writes with per-item results.
//! - [`hub`] and [`live`]: publish-subscribe delivery of live updates and a
//!   periodic tracker that feeds it.

pub mod api;
pub mod batch;
pub mod config;
pub mod hub;
pub mod live;
pub mod store;
pub mod throttle;
pub mod validate;

pub use api::{CachedClient, FetchError, SportsApi};
pub use batch::{BatchCoordinator, CacheOp, FetchResult, OpResult};
pub use config::Config;
pub use hub::{EventKind, LiveEvent, NotificationHub, Subscription};
pub use live::{LiveTarget, LiveTracker, LiveTrackerHandle};
pub use store::{Partition, Store};
pub use throttle::Throttler;
