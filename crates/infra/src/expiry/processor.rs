//! Scheduled sweep that deletes due expiry records.
//!
//! One run drains a single [`ExpirySweep`]. Each pass reads the sweep date and
//! `lookback_days` dates before it, so keys left unprocessed (or behind a failed
//! shard query) just before midnight are found again by the next run:
//!
//! ```text
//! pass:  query N shards × dates (bounded concurrency) ─► dedupe keys ─► delete in chunks
//!                                                               (bounded concurrency)
//!        each chunk: round 1 ─► unprocessed? ─► wait ─► round 2 ─► ... ─► max rounds
//! ```
//!
//! Passes repeat while the previous pass deleted something and the run's time
//! budget is not spent. Keys still unprocessed at the end are logged and left
//! for the next run; nothing here raises for store trouble.

use std::collections::{BTreeMap, HashSet};
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::{StreamExt, stream};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use courier_core::ResourceKey;
use courier_events::{DomainEvent, EventValidator, ReliablePublisher};

use super::error::ExpiryError;
use super::index::ShardedExpiryIndex;
use super::record::ExpiryRecord;
use super::store::DeleteReport;
use super::sweep::ExpirySweep;

/// Largest batch a single store delete call accepts.
pub const MAX_DELETE_BATCH_SIZE: usize = 25;

/// Processor configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryProcessorConfig {
    /// Keys per store delete call (at most 25)
    pub delete_batch_size: usize,
    /// Delete rounds per chunk, counting the first
    pub max_delete_rounds: u32,
    /// Pause between delete rounds
    pub round_interval: Duration,
    /// In-flight shard queries / delete chunks
    pub concurrency: usize,
    /// Time budget for one run
    pub max_process_time: Duration,
    /// Earlier shard dates re-read on every pass
    pub lookback_days: u32,
}

impl Default for ExpiryProcessorConfig {
    fn default() -> Self {
        Self {
            delete_batch_size: MAX_DELETE_BATCH_SIZE,
            max_delete_rounds: 3,
            round_interval: Duration::from_millis(250),
            concurrency: 8,
            max_process_time: Duration::from_secs(300),
            lookback_days: 1,
        }
    }
}

impl ExpiryProcessorConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_max_delete_rounds(mut self, rounds: u32) -> Self {
        self.max_delete_rounds = rounds;
        self
    }

    pub fn with_round_interval(mut self, interval: Duration) -> Self {
        self.round_interval = interval;
        self
    }

    pub fn with_max_process_time(mut self, budget: Duration) -> Self {
        self.max_process_time = budget;
        self
    }

    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    fn validate(&self) -> Result<(), ExpiryError> {
        if self.delete_batch_size == 0 || self.delete_batch_size > MAX_DELETE_BATCH_SIZE {
            return Err(ExpiryError::Configuration(format!(
                "delete batch size must be within 1..={MAX_DELETE_BATCH_SIZE}, got {}",
                self.delete_batch_size
            )));
        }
        if self.max_delete_rounds == 0 {
            return Err(ExpiryError::Configuration(
                "max delete rounds must be at least 1".into(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ExpiryError::Configuration(
                "concurrency must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Where a key is within one run.
///
/// `Pending → Queried → DeleteAttempted → {Deleted | Unprocessed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyState {
    Pending,
    Queried,
    DeleteAttempted,
    Deleted,
    Unprocessed,
}

impl KeyState {
    /// Advance along the happy path; terminal and out-of-order states stay put.
    pub fn advance(self) -> Self {
        match self {
            Self::Pending => Self::Queried,
            Self::Queried => Self::DeleteAttempted,
            other => other,
        }
    }

    /// Resolve a delete attempt.
    pub fn resolve(self, deleted: bool) -> Self {
        match (self, deleted) {
            (Self::DeleteAttempted, true) => Self::Deleted,
            (Self::DeleteAttempted, false) => Self::Unprocessed,
            (other, _) => other,
        }
    }

    /// State at the start of the next run. Unprocessed keys are simply found again.
    pub fn next_run(self) -> Self {
        match self {
            Self::Unprocessed => Self::Pending,
            other => other,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Deleted | Self::Unprocessed)
    }
}

/// Counters for one run.
///
/// Everything but `unprocessed` adds up across passes; `unprocessed` is what the
/// last pass left behind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ExpiryStats {
    /// Due keys found, per pass
    pub processed: usize,
    pub deleted: usize,
    /// Keys left for the next run
    pub unprocessed: usize,
    /// Shard queries that failed and were skipped
    pub failed_queries: usize,
    /// Follow-on events with no placement anywhere
    pub undelivered_events: usize,
}

impl AddAssign for ExpiryStats {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.deleted += rhs.deleted;
        self.unprocessed += rhs.unprocessed;
        self.failed_queries += rhs.failed_queries;
        self.undelivered_events += rhs.undelivered_events;
    }
}

/// Publishes one event per deleted record through the reliable publisher.
pub struct ExpiryNotifier {
    publisher: Arc<ReliablePublisher>,
    validator: Arc<dyn EventValidator>,
    event_type: String,
    source: String,
}

impl ExpiryNotifier {
    pub fn new(
        publisher: Arc<ReliablePublisher>,
        validator: Arc<dyn EventValidator>,
        event_type: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            publisher,
            validator,
            event_type: event_type.into(),
            source: source.into(),
        }
    }

    pub fn event_for(&self, record: &ExpiryRecord) -> DomainEvent {
        DomainEvent::new(
            self.event_type.clone(),
            self.source.clone(),
            json!({
                "resourceKey": record.resource_key,
                "expiryEpochSeconds": record.expiry_epoch_seconds,
                "payload": record.payload,
            }),
        )
    }

    /// Publish one aggregated batch; returns how many events were undeliverable.
    pub async fn notify(&self, records: &[ExpiryRecord]) -> usize {
        if records.is_empty() {
            return 0;
        }
        let events = records.iter().map(|r| self.event_for(r)).collect();
        let undelivered = self.publisher.publish(events, self.validator.as_ref()).await;
        if !undelivered.is_empty() {
            warn!(
                undelivered_count = undelivered.len(),
                event_type = %self.event_type,
                "expiry events could not be placed"
            );
        }
        undelivered.len()
    }
}

impl core::fmt::Debug for ExpiryNotifier {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExpiryNotifier")
            .field("event_type", &self.event_type)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

struct ChunkOutcome {
    attempted: Vec<ResourceKey>,
    unprocessed: Vec<ResourceKey>,
}

/// Drains due records from a [`ShardedExpiryIndex`].
#[derive(Debug)]
pub struct ExpiryBatchProcessor {
    index: ShardedExpiryIndex,
    config: ExpiryProcessorConfig,
    notifier: Option<ExpiryNotifier>,
}

impl ExpiryBatchProcessor {
    pub fn new(
        index: ShardedExpiryIndex,
        config: ExpiryProcessorConfig,
    ) -> Result<Self, ExpiryError> {
        config.validate()?;
        Ok(Self {
            index,
            config,
            notifier: None,
        })
    }

    pub fn with_notifier(mut self, notifier: ExpiryNotifier) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn config(&self) -> &ExpiryProcessorConfig {
        &self.config
    }

    /// Sweep everything due as of now.
    pub async fn run_once(&self) -> ExpiryStats {
        self.run_sweep(ExpirySweep::at(Utc::now())).await
    }

    /// Drain `sweep`, pass after pass, within the time budget.
    pub async fn run_sweep(&self, sweep: ExpirySweep) -> ExpiryStats {
        let started = tokio::time::Instant::now();
        let mut stats = ExpiryStats::default();
        let mut passes = 0u32;

        loop {
            passes += 1;
            let pass = self.run_pass(&sweep).await;
            stats += pass;
            stats.unprocessed = pass.unprocessed;

            if pass.deleted == 0 {
                break;
            }
            if started.elapsed() >= self.config.max_process_time {
                warn!(
                    max_process_secs = self.config.max_process_time.as_secs(),
                    passes,
                    "exceeded allowed runtime"
                );
                break;
            }
        }

        info!(
            date = %sweep.date,
            before_epoch_seconds = sweep.before_epoch_seconds,
            passes,
            processed = stats.processed,
            deleted = stats.deleted,
            unprocessed = stats.unprocessed,
            failed_queries = stats.failed_queries,
            undelivered_events = stats.undelivered_events,
            "expiry sweep finished"
        );
        stats
    }

    async fn run_pass(&self, sweep: &ExpirySweep) -> ExpiryStats {
        let mut stats = ExpiryStats::default();
        let before = sweep.before_epoch_seconds;
        let dates = sweep.dates(self.config.lookback_days);
        let shard_keys: Vec<_> = dates
            .iter()
            .flat_map(|date| self.index.shard_keys(*date))
            .collect();

        info!(
            shard_count = shard_keys.len(),
            date = %sweep.date,
            lookback_days = dates.len() - 1,
            before_epoch_seconds = before,
            "querying shards for expired records"
        );

        let results: Vec<_> = stream::iter(shard_keys)
            .map(|shard_key| async move {
                let result = self.index.query_due(&shard_key, before).await;
                (shard_key, result)
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        let mut candidates: BTreeMap<ResourceKey, ExpiryRecord> = BTreeMap::new();
        let mut states: BTreeMap<ResourceKey, KeyState> = BTreeMap::new();
        for (shard_key, result) in results {
            match result {
                Ok(records) => {
                    for record in records {
                        states
                            .entry(record.resource_key.clone())
                            .or_insert(KeyState::Pending.advance());
                        candidates.entry(record.resource_key.clone()).or_insert(record);
                    }
                }
                Err(err) => {
                    warn!(shard_key = %shard_key, error = %err, "shard query failed, skipping");
                    stats.failed_queries += 1;
                }
            }
        }

        info!(found = candidates.len(), "found expired records");
        if candidates.is_empty() {
            return stats;
        }

        let keys: Vec<ResourceKey> = candidates.keys().cloned().collect();
        let chunks: Vec<Vec<ResourceKey>> = keys
            .chunks(self.config.delete_batch_size)
            .map(<[ResourceKey]>::to_vec)
            .collect();

        let outcomes: Vec<ChunkOutcome> = stream::iter(chunks)
            .map(|chunk| self.delete_chunk(chunk))
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        for outcome in outcomes {
            let left: HashSet<&ResourceKey> = outcome.unprocessed.iter().collect();
            for key in &outcome.attempted {
                if let Some(state) = states.get_mut(key) {
                    *state = state.advance().resolve(!left.contains(key));
                }
            }
        }

        let mut deleted_records = Vec::new();
        for (key, state) in states.iter().filter(|(_, state)| state.is_terminal()) {
            if *state == KeyState::Deleted {
                stats.deleted += 1;
                if let Some(record) = candidates.remove(key) {
                    deleted_records.push(record);
                }
            } else {
                stats.unprocessed += 1;
                warn!(
                    resource_key = %key,
                    next_state = ?state.next_run(),
                    "record left unprocessed for the next run"
                );
            }
        }
        stats.processed = states.len();

        info!(
            processed = stats.processed,
            deleted = stats.deleted,
            unprocessed = stats.unprocessed,
            "deleted expired records"
        );

        if let Some(notifier) = &self.notifier {
            stats.undelivered_events = notifier.notify(&deleted_records).await;
        }

        stats
    }

    /// Delete one chunk, retrying only its unprocessed keys.
    async fn delete_chunk(&self, keys: Vec<ResourceKey>) -> ChunkOutcome {
        let mut pending = keys.clone();

        for round in 1..=self.config.max_delete_rounds {
            if round > 1 {
                tokio::time::sleep(self.config.round_interval).await;
            }

            match self.index.delete(&pending).await {
                Ok(DeleteReport::AllProcessed) => pending.clear(),
                Ok(DeleteReport::Unprocessed(left)) => {
                    let left: HashSet<ResourceKey> = left.into_iter().collect();
                    pending.retain(|key| left.contains(key));
                }
                Err(err) => {
                    warn!(round, batch_size = pending.len(), error = %err, "delete round failed");
                }
            }

            debug!(round, remaining = pending.len(), "delete round finished");
            if pending.is_empty() {
                break;
            }
        }

        ChunkOutcome {
            attempted: keys,
            unprocessed: pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expiry::record::ShardKey;
    use crate::expiry::store::{DeleteScript, InMemoryIndexedStore};
    use crate::expiry::error::StoreError;
    use chrono::{DateTime, NaiveDate};
    use courier_events::{InMemoryBus, InMemoryQueue, PublisherConfig, Scripted, TransportError};

    const EXPIRY: i64 = 1_577_880_000; // 2020-01-01T12:00:00Z

    fn sweep() -> ExpirySweep {
        ExpirySweep {
            date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap(),
            before_epoch_seconds: EXPIRY + 60,
        }
    }

    fn utc(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    fn key(n: usize) -> ResourceKey {
        ResourceKey::parse(format!("letter-{n}")).unwrap()
    }

    async fn seeded(
        count: usize,
        shards: u32,
    ) -> (Arc<InMemoryIndexedStore>, ShardedExpiryIndex) {
        let store = InMemoryIndexedStore::arc();
        let index = ShardedExpiryIndex::new(store.clone(), shards).unwrap();
        for n in 0..count {
            index.insert(key(n), EXPIRY, json!({"n": n})).await.unwrap();
        }
        (store, index)
    }

    #[test]
    fn key_state_machine() {
        let attempted = KeyState::Pending.advance().advance();
        assert_eq!(attempted, KeyState::DeleteAttempted);
        assert_eq!(attempted.resolve(true), KeyState::Deleted);
        assert_eq!(attempted.resolve(false), KeyState::Unprocessed);
        assert_eq!(KeyState::Unprocessed.next_run(), KeyState::Pending);
        assert_eq!(KeyState::Deleted.advance(), KeyState::Deleted);
        assert!(!KeyState::Queried.is_terminal());
    }

    #[test]
    fn invalid_configuration_is_rejected() {
        let index = ShardedExpiryIndex::new(InMemoryIndexedStore::arc(), 1).unwrap();
        let config = ExpiryProcessorConfig {
            delete_batch_size: 26,
            ..Default::default()
        };
        assert!(matches!(
            ExpiryBatchProcessor::new(index.clone(), config),
            Err(ExpiryError::Configuration(_))
        ));
        assert!(ExpiryBatchProcessor::new(
            index,
            ExpiryProcessorConfig::default().with_concurrency(0)
        )
        .is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn unprocessed_keys_are_retried_in_later_rounds() {
        let (store, index) = seeded(10, 1).await;
        store
            .script_delete(DeleteScript::LeaveUnprocessed(2))
            .script_delete(DeleteScript::ProcessAll);
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.processed, 10);
        assert_eq!(stats.deleted, 10);
        assert_eq!(stats.unprocessed, 0);
        assert!(store.is_empty());

        let batches = store.delete_batches();
        assert_eq!(batches[0].len(), 10);
        assert_eq!(batches[1].len(), 2, "only the unprocessed subset is retried");
    }

    #[tokio::test(start_paused = true)]
    async fn run_once_sweeps_records_due_now() {
        let store = InMemoryIndexedStore::arc();
        let index = ShardedExpiryIndex::new(store.clone(), 4).unwrap();
        let expiry = Utc::now().timestamp() - 3_600;
        for n in 0..10 {
            index.insert(key(n), expiry, json!({})).await.unwrap();
        }
        store
            .script_delete(DeleteScript::LeaveUnprocessed(2))
            .script_delete(DeleteScript::ProcessAll);
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let stats = processor.run_once().await;

        assert_eq!((stats.deleted, stats.unprocessed), (10, 0));
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_still_unprocessed_after_max_rounds_are_left_for_next_run() {
        let (store, index) = seeded(5, 1).await;
        for _ in 0..6 {
            store.script_delete(DeleteScript::LeaveUnprocessed(1));
        }
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();
        let start = tokio::time::Instant::now();

        let first = processor.run_sweep(sweep()).await;

        // pass 1 deletes four keys, pass 2 finds the fifth and still cannot delete it
        assert_eq!(first.deleted, 4);
        assert_eq!(first.unprocessed, 1);
        assert_eq!(first.processed, 6);
        assert_eq!(store.len(), 1);
        assert_eq!(store.delete_batches().len(), 6);
        assert!(start.elapsed() >= Duration::from_millis(1_000), "rounds are spaced out");

        let second = processor.run_sweep(sweep()).await;
        assert_eq!(second.deleted, 1);
        assert_eq!(second.unprocessed, 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn keys_left_before_midnight_are_found_by_the_next_day_run() {
        let store = InMemoryIndexedStore::arc();
        let index = ShardedExpiryIndex::new(store.clone(), 3).unwrap();
        let late_evening = DateTime::parse_from_rfc3339("2020-01-01T23:50:00Z").unwrap();
        index.insert(key(1), late_evening.timestamp(), json!({})).await.unwrap();
        for _ in 0..3 {
            store.script_delete(DeleteScript::LeaveUnprocessed(1));
        }
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let first = processor.run_sweep(ExpirySweep::at(utc("2020-01-02T00:10:00Z"))).await;
        assert_eq!((first.deleted, first.unprocessed), (0, 1));

        // sweep date has moved on to 2020-01-02
        let second = processor.run_sweep(ExpirySweep::at(utc("2020-01-02T01:10:00Z"))).await;
        assert_eq!(second.processed, 1);
        assert_eq!(second.deleted, 1);
        assert_eq!(second.unprocessed, 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn without_lookback_only_the_sweep_date_is_read() {
        let store = InMemoryIndexedStore::arc();
        let index = ShardedExpiryIndex::new(store.clone(), 3).unwrap();
        index.insert(key(1), EXPIRY, json!({})).await.unwrap();
        let processor = ExpiryBatchProcessor::new(
            index,
            ExpiryProcessorConfig::default().with_lookback_days(0),
        )
        .unwrap();

        let stats = processor.run_sweep(ExpirySweep::at(utc("2020-01-02T12:00:00Z"))).await;

        assert_eq!(stats.processed, 0);
        assert_eq!(store.query_count(), 3);
        assert!(store.contains(&key(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delete_round_leaves_keys_unprocessed() {
        let (store, index) = seeded(3, 1).await;
        for _ in 0..3 {
            store.script_delete(DeleteScript::Fail(StoreError::Throttled("busy".into())));
        }
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.deleted, 0);
        assert_eq!(stats.unprocessed, 3);
        assert_eq!(store.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_shard_query_is_skipped_and_counted() {
        let (store, index) = seeded(60, 4).await;
        let broken = ShardKey::new(sweep().date, 2);
        let on_broken = store
            .records()
            .iter()
            .filter(|r| r.shard_key == broken)
            .count();
        store.fail_queries_for(broken);
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.deleted, 60 - on_broken);
        assert_eq!(store.len(), on_broken);
        // one failure per pass: the draining pass and the empty confirming pass
        assert_eq!(stats.failed_queries, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn deletes_are_chunked_by_batch_size() {
        let (store, index) = seeded(60, 3).await;
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.deleted, 60);
        let mut sizes: Vec<usize> = store.delete_batches().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![10, 25, 25]);
    }

    #[tokio::test(start_paused = true)]
    async fn records_not_yet_due_are_untouched() {
        let (store, index) = seeded(3, 2).await;
        index.insert(key(99), EXPIRY + 3_600, json!({})).await.unwrap();
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default()).unwrap();

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.deleted, 3);
        assert!(store.contains(&key(99)));
    }

    #[tokio::test(start_paused = true)]
    async fn deleted_records_are_announced_in_one_batch() {
        let (_store, index) = seeded(4, 2).await;
        let bus = Arc::new(InMemoryBus::new());
        let dlq = Arc::new(InMemoryQueue::new());
        let publisher = ReliablePublisher::new(
            PublisherConfig::new("expiry-bus", "expiry-dlq"),
            bus.clone(),
            dlq.clone(),
        )
        .unwrap();
        let notifier = ExpiryNotifier::new(
            Arc::new(publisher),
            Arc::new(|_: &DomainEvent| true),
            "record.expired.v1",
            "/stages/expiry",
        );
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default())
            .unwrap()
            .with_notifier(notifier);

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.undelivered_events, 0);
        assert_eq!(bus.batch_sizes(), vec![4]);
        let event = &bus.delivered_events()[0];
        assert_eq!(event.event_type(), "record.expired.v1");
        assert_eq!(event.data()["expiryEpochSeconds"], json!(EXPIRY));
    }

    #[tokio::test(start_paused = true)]
    async fn undeliverable_announcements_are_counted_not_raised() {
        let (store, index) = seeded(2, 1).await;
        let bus = Arc::new(InMemoryBus::new());
        let dlq = Arc::new(InMemoryQueue::new());
        bus.otherwise(Scripted::Fail(TransportError::Unavailable("down".into())));
        dlq.otherwise(Scripted::Fail(TransportError::Unavailable("down".into())));
        let publisher =
            ReliablePublisher::new(PublisherConfig::new("bus", "dlq"), bus, dlq).unwrap();
        let processor = ExpiryBatchProcessor::new(index, ExpiryProcessorConfig::default())
            .unwrap()
            .with_notifier(ExpiryNotifier::new(
                Arc::new(publisher),
                Arc::new(|_: &DomainEvent| true),
                "record.expired.v1",
                "/stages/expiry",
            ));

        let stats = processor.run_sweep(sweep()).await;

        assert_eq!(stats.deleted, 2);
        assert_eq!(stats.undelivered_events, 2);
        assert!(store.is_empty());
    }
}
