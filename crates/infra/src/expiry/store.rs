//! Indexed store seam for expiry records.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use courier_core::ResourceKey;

use super::error::StoreError;
use super::record::{ExpiryRecord, ShardKey};

/// Result of a batch delete that reached the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteReport {
    AllProcessed,
    /// These keys were not processed (throttling, capacity); retry them later.
    Unprocessed(Vec<ResourceKey>),
}

impl DeleteReport {
    pub fn from_unprocessed(keys: Vec<ResourceKey>) -> Self {
        if keys.is_empty() {
            Self::AllProcessed
        } else {
            Self::Unprocessed(keys)
        }
    }

    pub fn unprocessed(&self) -> &[ResourceKey] {
        match self {
            Self::AllProcessed => &[],
            Self::Unprocessed(keys) => keys,
        }
    }
}

/// Key-value store with a secondary index on the shard key.
///
/// Deleting an absent key is not an error.
#[async_trait]
pub trait IndexedStore: Send + Sync {
    /// Insert or replace the record for `record.resource_key`.
    async fn put(&self, record: &ExpiryRecord) -> Result<(), StoreError>;

    /// Records under `shard_key` with `expiry_epoch_seconds < before_epoch_seconds`.
    async fn query(
        &self,
        shard_key: &ShardKey,
        before_epoch_seconds: i64,
    ) -> Result<Vec<ExpiryRecord>, StoreError>;

    async fn batch_delete(&self, keys: &[ResourceKey]) -> Result<DeleteReport, StoreError>;
}

/// How the next `batch_delete` call should behave.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScript {
    ProcessAll,
    /// Leave the first `n` keys of the batch unprocessed.
    LeaveUnprocessed(usize),
    Fail(StoreError),
}

/// In-memory indexed store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryIndexedStore {
    records: RwLock<BTreeMap<ResourceKey, ExpiryRecord>>,
    delete_script: RwLock<VecDeque<DeleteScript>>,
    failing_shards: RwLock<HashSet<ShardKey>>,
    ignore_query_condition: RwLock<bool>,
    delete_batches: RwLock<Vec<Vec<ResourceKey>>>,
    query_count: RwLock<usize>,
}

fn poisoned() -> StoreError {
    StoreError::Unavailable("in-memory store lock poisoned".into())
}

impl InMemoryIndexedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Queue a behaviour for the next `batch_delete` call; unscripted calls process everything.
    pub fn script_delete(&self, step: DeleteScript) -> &Self {
        if let Ok(mut script) = self.delete_script.write() {
            script.push_back(step);
        }
        self
    }

    /// Make every query against `shard_key` fail.
    pub fn fail_queries_for(&self, shard_key: ShardKey) -> &Self {
        if let Ok(mut failing) = self.failing_shards.write() {
            failing.insert(shard_key);
        }
        self
    }

    /// Return every record of a shard from `query`, due or not.
    pub fn ignore_query_condition(&self) -> &Self {
        if let Ok(mut flag) = self.ignore_query_condition.write() {
            *flag = true;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.records
            .read()
            .map(|r| r.contains_key(key))
            .unwrap_or(false)
    }

    pub fn records(&self) -> Vec<ExpiryRecord> {
        self.records
            .read()
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Keys of every `batch_delete` call, in order.
    pub fn delete_batches(&self) -> Vec<Vec<ResourceKey>> {
        self.delete_batches
            .read()
            .map(|b| b.clone())
            .unwrap_or_default()
    }

    pub fn query_count(&self) -> usize {
        self.query_count.read().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl IndexedStore for InMemoryIndexedStore {
    async fn put(&self, record: &ExpiryRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        records.insert(record.resource_key.clone(), record.clone());
        Ok(())
    }

    async fn query(
        &self,
        shard_key: &ShardKey,
        before_epoch_seconds: i64,
    ) -> Result<Vec<ExpiryRecord>, StoreError> {
        *self.query_count.write().map_err(|_| poisoned())? += 1;

        if self.failing_shards.read().map_err(|_| poisoned())?.contains(shard_key) {
            return Err(StoreError::Unavailable(format!("query on {shard_key} failed")));
        }

        let ignore_condition = *self.ignore_query_condition.read().map_err(|_| poisoned())?;
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .values()
            .filter(|r| &r.shard_key == shard_key)
            .filter(|r| ignore_condition || r.is_due(before_epoch_seconds))
            .cloned()
            .collect())
    }

    async fn batch_delete(&self, keys: &[ResourceKey]) -> Result<DeleteReport, StoreError> {
        self.delete_batches
            .write()
            .map_err(|_| poisoned())?
            .push(keys.to_vec());

        let step = self
            .delete_script
            .write()
            .map_err(|_| poisoned())?
            .pop_front()
            .unwrap_or(DeleteScript::ProcessAll);

        let left = match step {
            DeleteScript::ProcessAll => 0,
            DeleteScript::LeaveUnprocessed(n) => n.min(keys.len()),
            DeleteScript::Fail(err) => return Err(err),
        };

        let (unprocessed, processed) = keys.split_at(left);
        let mut records = self.records.write().map_err(|_| poisoned())?;
        for key in processed {
            records.remove(key);
        }
        Ok(DeleteReport::from_unprocessed(unprocessed.to_vec()))
    }
}
