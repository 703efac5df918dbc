//! Local persistent store for API responses and bulk entities.
//!
//! This module provides the [`Store`] for caching JSON values with a TTL.
//! Entries live in a primary file-backed backend; when that backend cannot
//! be opened or rejects a write, the store degrades to an in-memory
//! fallback instead of failing the caller.
//!
//! Stored data is split into partitions:
//! - `cache`: URL-keyed responses from the remote API
//! - `players`, `teams`, `lineups`: synthetic keys such as
//!   `player_fantasy_stats_<id>`, `roster_<teamId>` or `current_lineup`

pub mod backend;
pub mod entry;
pub mod file;
pub mod manager;
pub mod memory;

pub use backend::{StoreBackend, StoreError, StoreResult};
pub use entry::{CacheEntry, Partition};
pub use file::FileBackend;
pub use manager::{PartitionStats, Store, StoreStats};
pub use memory::MemoryBackend;
