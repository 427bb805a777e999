//! Deferred expiry: a write-sharded date index plus the poller that drains it.
//!
//! ## Design
//!
//! - Records are keyed by resource and indexed by `YYYY-MM-DD#<shard>`
//! - Writers pick a shard per record; readers query all `N` shards of a date
//! - The poller deletes due records in batches, retrying unprocessed keys
//! - Anything not deleted is simply found again by the next run
//!
//! ## Components
//!
//! - `ShardedExpiryIndex`: insert / query / delete over an `IndexedStore`
//! - `ExpiryBatchProcessor`: scheduled sweep with bounded concurrency
//! - `ExpiryNotifier`: optional follow-on events for deleted records
//! - `InMemoryIndexedStore`: scripted store for tests/dev

pub mod error;
pub mod index;
pub mod processor;
pub mod record;
pub mod store;
pub mod sweep;

pub use error::{ExpiryError, StoreError};
pub use index::{RandomShardPicker, ShardPicker, ShardedExpiryIndex};
pub use processor::{
    ExpiryBatchProcessor, ExpiryNotifier, ExpiryProcessorConfig, ExpiryStats, KeyState,
    MAX_DELETE_BATCH_SIZE,
};
pub use record::{ExpiryRecord, ShardKey};
pub use store::{DeleteReport, DeleteScript, InMemoryIndexedStore, IndexedStore};
pub use sweep::{ExpirySweep, SweepOverride};
