//! Write-sharded date index over an [`IndexedStore`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rand::Rng;
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use courier_core::ResourceKey;

use super::error::ExpiryError;
use super::record::{ExpiryRecord, ShardKey};
use super::store::{DeleteReport, IndexedStore};

/// Chooses the shard for a new record.
pub trait ShardPicker: Send + Sync {
    /// A shard in `0..shard_count`.
    fn pick(&self, shard_count: u32) -> u32;
}

impl<F> ShardPicker for F
where
    F: Fn(u32) -> u32 + Send + Sync,
{
    fn pick(&self, shard_count: u32) -> u32 {
        self(shard_count)
    }
}

/// Uniform random shard choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomShardPicker;

impl ShardPicker for RandomShardPicker {
    fn pick(&self, shard_count: u32) -> u32 {
        rand::thread_rng().gen_range(0..shard_count.max(1))
    }
}

/// Expiry index: records keyed by resource, findable by `(date, shard)` without a scan.
///
/// A reader must query all `N` shard keys of a date to see every record of that date.
#[derive(Clone)]
pub struct ShardedExpiryIndex {
    store: Arc<dyn IndexedStore>,
    shard_count: u32,
    picker: Arc<dyn ShardPicker>,
}

impl ShardedExpiryIndex {
    /// Create an index over `shard_count` shards. Zero shards is a configuration error.
    pub fn new(store: Arc<dyn IndexedStore>, shard_count: u32) -> Result<Self, ExpiryError> {
        if shard_count == 0 {
            return Err(ExpiryError::Configuration(
                "shard count must be at least 1".into(),
            ));
        }
        Ok(Self {
            store,
            shard_count,
            picker: Arc::new(RandomShardPicker),
        })
    }

    pub fn with_picker(mut self, picker: impl ShardPicker + 'static) -> Self {
        self.picker = Arc::new(picker);
        self
    }

    pub fn shard_count(&self) -> u32 {
        self.shard_count
    }

    /// Register `resource_key` to expire at `expiry_epoch_seconds`.
    pub async fn insert(
        &self,
        resource_key: ResourceKey,
        expiry_epoch_seconds: i64,
        payload: JsonValue,
    ) -> Result<ExpiryRecord, ExpiryError> {
        let shard = self.picker.pick(self.shard_count) % self.shard_count;
        let record = ExpiryRecord::new(resource_key, expiry_epoch_seconds, shard, payload)?;

        info!(
            resource_key = %record.resource_key,
            expiry_epoch_seconds,
            shard_key = %record.shard_key,
            "inserting expiry record"
        );

        self.store.put(&record).await.map_err(|err| {
            warn!(resource_key = %record.resource_key, error = %err, "failed to insert expiry record");
            ExpiryError::from(err)
        })?;
        Ok(record)
    }

    /// Register `resource_key` to expire `wait` after `now` (whole seconds).
    pub async fn insert_after(
        &self,
        resource_key: ResourceKey,
        wait: Duration,
        now: DateTime<Utc>,
        payload: JsonValue,
    ) -> Result<ExpiryRecord, ExpiryError> {
        let now_seconds = (now.timestamp_millis() + 500).div_euclid(1000);
        let wait_seconds = i64::try_from(wait.as_secs())
            .map_err(|_| ExpiryError::InvalidTimestamp(format!("wait of {wait:?} is too long")))?;
        let expiry = now_seconds.checked_add(wait_seconds).ok_or_else(|| {
            ExpiryError::InvalidTimestamp(format!("{now} + {wait:?} overflows"))
        })?;
        self.insert(resource_key, expiry, payload).await
    }

    /// The `N` shard keys of `date`.
    pub fn shard_keys(&self, date: NaiveDate) -> Vec<ShardKey> {
        (0..self.shard_count)
            .map(|shard| ShardKey::new(date, shard))
            .collect()
    }

    /// Records under `shard_key` strictly before `before_epoch_seconds`.
    ///
    /// Anything the store returns at or after the cutoff is dropped and logged.
    pub async fn query_due(
        &self,
        shard_key: &ShardKey,
        before_epoch_seconds: i64,
    ) -> Result<Vec<ExpiryRecord>, ExpiryError> {
        let records = self.store.query(shard_key, before_epoch_seconds).await?;
        let found = records.len();

        let due: Vec<ExpiryRecord> = records
            .into_iter()
            .filter(|record| {
                if record.is_due(before_epoch_seconds) {
                    true
                } else {
                    warn!(
                        resource_key = %record.resource_key,
                        expiry_epoch_seconds = record.expiry_epoch_seconds,
                        before_epoch_seconds,
                        "record expiry is after target expiry time"
                    );
                    false
                }
            })
            .collect();

        debug!(
            shard_key = %shard_key,
            found,
            due = due.len(),
            "queried shard for due records"
        );
        Ok(due)
    }

    pub async fn delete(&self, keys: &[ResourceKey]) -> Result<DeleteReport, ExpiryError> {
        Ok(self.store.batch_delete(keys).await?)
    }
}

impl core::fmt::Debug for ShardedExpiryIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ShardedExpiryIndex")
            .field("shard_count", &self.shard_count)
            .finish_non_exhaustive()
    }
}
