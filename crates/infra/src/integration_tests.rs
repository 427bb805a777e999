//! Integration tests for whole stage flows.
//!
//! Tests:
//! - Outbound call (retried on 429) → ReliablePublisher → bus / DLQ
//! - Config → ShardedExpiryIndex insert → ExpiryBatchProcessor sweep → follow-on events
//!
//! Verifies:
//! - Every produced event ends on the bus, in the DLQ, or in the caller's hands
//! - Throttled outbound calls are retried, other failures are not
//! - Expired records are deleted and announced; pending ones survive

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use anyhow::Context;
    use chrono::{DateTime, Utc};
    use serde_json::json;

    use courier_core::ResourceKey;
    use courier_events::{
        DomainEvent, DlqReason, InMemoryBus, InMemoryQueue, ReliablePublisher, Scripted,
        TransportError, ValidatorRegistry,
    };

    use crate::config::PipelineConfig;
    use crate::expiry::{
        ExpiryBatchProcessor, ExpiryNotifier, ExpirySweep, InMemoryIndexedStore,
        ShardedExpiryIndex, SweepOverride,
    };
    use crate::external::ApiError;
    use crate::retry::{BackoffPolicy, RetryExecutor};

    fn pipeline_config() -> PipelineConfig {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("EVENT_PUBLISHER_EVENT_BUS_ARN", "arn:aws:events:eu-west-2:000000000000:event-bus/main"),
            ("EVENT_PUBLISHER_DLQ_URL", "https://sqs.eu-west-2.amazonaws.com/000000000000/dlq"),
            ("TTL_SHARD_COUNT", "5"),
            ("RETRY_INITIAL_INTERVAL_MS", "100"),
            ("RETRY_MAX_ATTEMPTS", "3"),
        ]);
        PipelineConfig::from_lookup(|name: &str| vars.get(name).map(|v| v.to_string())).unwrap()
    }

    fn registry() -> ValidatorRegistry {
        ValidatorRegistry::new()
            .register("letter.sent.v1", |e: &DomainEvent| {
                e.data().get("messageReference").is_some()
            })
            .register("record.expired.v1", |e: &DomainEvent| {
                e.data().get("resourceKey").is_some()
            })
    }

    fn at(rfc3339: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc)
    }

    /// Simulated outbound API: throttles `throttled_calls` times, then answers.
    async fn send_letter(calls: Arc<AtomicU32>, throttled_calls: u32, reference: String) -> Result<String, ApiError> {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        if n < throttled_calls {
            Err(ApiError::status(429, "Too Many Requests"))
        } else {
            Ok(reference)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_send_is_retried_then_results_are_published() {
        let config = pipeline_config();
        let bus = Arc::new(InMemoryBus::new());
        let dlq = Arc::new(InMemoryQueue::new());
        let publisher =
            ReliablePublisher::new(config.publisher.clone(), bus.clone(), dlq.clone()).unwrap();
        let executor = RetryExecutor::new(config.backoff.clone());
        let calls = Arc::new(AtomicU32::new(0));

        let mut produced = Vec::new();
        for n in 0..3 {
            let reference = executor
                .execute(
                    |_| send_letter(calls.clone(), 2, format!("ref-{n}")),
                    ApiError::is_rate_limited,
                )
                .await
                .unwrap();
            produced.push(DomainEvent::new(
                "letter.sent.v1",
                "/stages/send",
                json!({ "messageReference": reference }),
            ));
        }
        // one malformed event from the same stage
        produced.push(DomainEvent::new("letter.sent.v1", "/stages/send", json!({})));

        let undelivered = publisher.publish(produced, &registry()).await;

        assert_eq!(calls.load(Ordering::SeqCst), 5, "two throttles, then three successes");
        assert!(undelivered.is_empty());
        assert_eq!(bus.delivered_events().len(), 3);
        let parked = dlq.messages();
        assert_eq!(parked.len(), 1);
        assert_eq!(
            parked[0].attributes.get(DlqReason::ATTRIBUTE).map(String::as_str),
            Some("INVALID_EVENT")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn non_throttling_failure_is_not_retried() {
        let executor = RetryExecutor::new(BackoffPolicy::default());
        let calls = Arc::new(AtomicU32::new(0));

        let err = executor
            .execute(
                |_| {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err::<(), _>(ApiError::Timeout)
                    }
                },
                ApiError::is_rate_limited,
            )
            .await
            .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn insert_sweep_and_announce() -> anyhow::Result<()> {
        let config = pipeline_config();
        let store = InMemoryIndexedStore::arc();
        let expiry = config.expiry()?;
        let index = ShardedExpiryIndex::new(store.clone(), expiry.shard_count)
            .context("building expiry index")?;

        let created = at("2020-01-01T09:00:00Z");
        for n in 0..40 {
            index
                .insert_after(
                    ResourceKey::parse(format!("letter-{n}"))?,
                    Duration::from_secs(2 * 3600),
                    created,
                    json!({ "n": n }),
                )
                .await?;
        }
        // still waiting at sweep time
        index
            .insert_after(
                ResourceKey::parse("letter-late")?,
                Duration::from_secs(6 * 3600),
                created,
                json!({}),
            )
            .await?;

        let bus = Arc::new(InMemoryBus::new());
        let dlq = Arc::new(InMemoryQueue::new());
        // first bus chunk fails outright; those events must land in the DLQ
        bus.script(Scripted::Fail(TransportError::Throttled("slow down".into())));
        let publisher =
            ReliablePublisher::new(config.publisher.clone(), bus.clone(), dlq.clone())?;
        let notifier = ExpiryNotifier::new(
            Arc::new(publisher),
            Arc::new(registry()),
            "record.expired.v1",
            "/stages/expiry",
        );
        let processor =
            ExpiryBatchProcessor::new(index, expiry.processor.clone())?.with_notifier(notifier);

        let sweep = ExpirySweep::resolve(&SweepOverride::default(), at("2020-01-01T12:00:00Z"))
            .context("resolving sweep")?;
        let stats = processor.run_sweep(sweep).await;

        assert_eq!(stats.deleted, 40);
        assert_eq!(stats.unprocessed, 0);
        assert_eq!(stats.failed_queries, 0);
        assert_eq!(stats.undelivered_events, 0);
        assert_eq!(store.len(), 1);
        assert!(store.contains(&ResourceKey::parse("letter-late")?));

        assert_eq!(bus.batch_sizes(), vec![10, 10, 10, 10]);
        assert_eq!(bus.delivered_events().len(), 30);
        assert_eq!(dlq.received_events().len(), 10);
        assert!(dlq
            .messages()
            .iter()
            .all(|m| m.attributes.get(DlqReason::ATTRIBUTE).map(String::as_str) == Some("BUS_FAILURE")));

        Ok(())
    }
}
