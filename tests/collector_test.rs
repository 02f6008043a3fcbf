//! Integration tests for the batching pipeline.
//!
//! Drives a `BatchCollector` against an in-memory mock store to exercise
//! the flush triggers, backpressure policy, write fallback, and lifecycle
//! guarantees without a database.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use squall::collector::BatchCollector;
use squall::config::CollectorConfig;
use squall::error::{StorageError, WriteTimeoutSnafu};
use squall::event::{EnrichedEvent, RawEvent, ServiceMetric};
use squall::storage::EventStore;

/// In-memory store with per-path failure injection.
#[derive(Default)]
struct MockStore {
    bulk_calls: AtomicUsize,
    rows_calls: AtomicUsize,
    bulk_sizes: Mutex<Vec<usize>>,
    rows_sizes: Mutex<Vec<usize>>,
    fail_bulk: AtomicBool,
    fail_rows: AtomicBool,
}

impl MockStore {
    fn injected_error() -> StorageError {
        WriteTimeoutSnafu { millis: 1u64 }.build()
    }

    fn set_fail_bulk(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    fn set_fail_rows(&self, fail: bool) {
        self.fail_rows.store(fail, Ordering::SeqCst);
    }

    fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    fn rows_calls(&self) -> usize {
        self.rows_calls.load(Ordering::SeqCst)
    }

    fn bulk_sizes(&self) -> Vec<usize> {
        self.bulk_sizes.lock().unwrap().clone()
    }

    /// Total events that landed through either successful path.
    fn events_written(&self) -> usize {
        self.bulk_sizes.lock().unwrap().iter().sum::<usize>()
            + self.rows_sizes.lock().unwrap().iter().sum::<usize>()
    }
}

#[async_trait]
impl EventStore for MockStore {
    async fn write_bulk(&self, events: &[EnrichedEvent]) -> Result<(), StorageError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(Self::injected_error());
        }
        self.bulk_sizes.lock().unwrap().push(events.len());
        Ok(())
    }

    async fn write_rows(&self, events: &[EnrichedEvent]) -> Result<(), StorageError> {
        self.rows_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_rows.load(Ordering::SeqCst) {
            return Err(Self::injected_error());
        }
        self.rows_sizes.lock().unwrap().push(events.len());
        Ok(())
    }

    async fn write_service_metrics(&self, _metrics: &[ServiceMetric]) -> Result<(), StorageError> {
        Ok(())
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

fn event(session: &str) -> EnrichedEvent {
    EnrichedEvent {
        event: RawEvent {
            session_id: session.to_string(),
            event_type: "page_view".to_string(),
            ..Default::default()
        },
        origin_country: String::new(),
        user_agent: "test".to_string(),
        ip: "192.0.2.1".to_string(),
    }
}

fn config(batch_size: usize, flush_interval_ms: u64, workers: usize) -> CollectorConfig {
    CollectorConfig {
        batch_size,
        flush_interval_ms,
        workers,
        write_timeout_ms: 1000,
    }
}

/// Poll until `predicate` holds or the deadline passes.
async fn wait_for(what: &str, predicate: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !predicate() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

mod trigger_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_batch_flushes_once_at_batch_size() {
        let store = Arc::new(MockStore::default());
        // Long flush interval keeps the timer out of the picture.
        let collector = BatchCollector::new(config(5, 60_000, 1), store.clone());
        collector.start(CancellationToken::new());

        for i in 0..5 {
            collector.push(event(&format!("s-{i}")));
        }

        wait_for("size-triggered flush", || store.bulk_calls() == 1).await;
        assert_eq!(store.bulk_sizes(), vec![5]);

        // No second flush sneaks in behind the first.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.bulk_calls(), 1);

        let stats = collector.stats();
        assert_eq!(stats.events_processed, 5);
        assert_eq!(stats.batches_processed, 1);
        assert_eq!(stats.avg_batch_size, 5.0);

        collector.shutdown().await;
    }

    #[tokio::test]
    async fn test_timer_flushes_partial_batch() {
        let store = Arc::new(MockStore::default());
        let collector = BatchCollector::new(config(10, 100, 1), store.clone());
        collector.start(CancellationToken::new());

        for i in 0..9 {
            collector.push(event(&format!("s-{i}")));
        }

        wait_for("timer-triggered flush", || store.bulk_calls() == 1).await;
        assert_eq!(store.bulk_sizes(), vec![9]);
        assert_eq!(collector.stats().events_processed, 9);

        collector.shutdown().await;
    }
}

mod backpressure_tests {
    use super::*;

    #[tokio::test]
    async fn test_full_queue_drops_and_counts() {
        let store = Arc::new(MockStore::default());
        // Workers never started: the queue fills and stays full.
        let collector = BatchCollector::new(config(2, 60_000, 1), store.clone());
        let capacity = 2 * squall::config::QUEUE_CAPACITY_MULTIPLIER;

        for i in 0..capacity + 1 {
            collector.push(event(&format!("s-{i}")));
        }

        let stats = collector.stats();
        assert_eq!(stats.events_received, (capacity + 1) as u64);
        assert!(stats.events_failed >= 1);
        assert_eq!(stats.queue_depth, capacity);
        assert_eq!(store.bulk_calls(), 0);
    }
}

mod failure_tests {
    use super::*;

    #[tokio::test]
    async fn test_bulk_failure_falls_back_to_rows() {
        let store = Arc::new(MockStore::default());
        store.set_fail_bulk(true);

        let collector = BatchCollector::new(config(3, 60_000, 1), store.clone());
        collector.start(CancellationToken::new());

        for i in 0..3 {
            collector.push(event(&format!("s-{i}")));
        }

        wait_for("fallback flush", || store.rows_calls() == 1).await;
        let stats = collector.stats();
        assert_eq!(stats.events_processed, 3);
        assert_eq!(stats.events_failed, 0);
        assert_eq!(stats.batches_processed, 1);

        collector.shutdown().await;
    }

    #[tokio::test]
    async fn test_both_paths_failing_loses_batch_but_not_worker() {
        let store = Arc::new(MockStore::default());
        store.set_fail_bulk(true);
        store.set_fail_rows(true);

        let collector = BatchCollector::new(config(3, 60_000, 1), store.clone());
        collector.start(CancellationToken::new());

        for i in 0..3 {
            collector.push(event(&format!("s-{i}")));
        }

        wait_for("failed flush", || {
            collector.stats().events_failed == 3
        })
        .await;
        assert_eq!(collector.stats().events_processed, 0);

        // The worker keeps going: once the store recovers, the next batch
        // lands normally.
        store.set_fail_bulk(false);
        store.set_fail_rows(false);
        for i in 0..3 {
            collector.push(event(&format!("r-{i}")));
        }

        wait_for("recovery flush", || {
            collector.stats().events_processed == 3
        })
        .await;
        assert_eq!(collector.stats().events_failed, 3);

        collector.shutdown().await;
    }
}

mod lifecycle_tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_drains_queued_events() {
        let store = Arc::new(MockStore::default());
        // Large batch size and long interval: nothing flushes until drain.
        let collector = BatchCollector::new(config(100, 60_000, 2), store.clone());
        collector.start(CancellationToken::new());

        for i in 0..25 {
            collector.push(event(&format!("s-{i}")));
        }
        collector.shutdown().await;

        let stats = collector.stats();
        assert_eq!(stats.events_processed + stats.events_failed, 25);
        assert_eq!(stats.queue_depth, 0);
        assert_eq!(store.events_written(), 25);
    }

    #[tokio::test]
    async fn test_cancellation_flushes_best_effort() {
        let store = Arc::new(MockStore::default());
        let collector = BatchCollector::new(config(10, 60_000, 1), store.clone());
        let cancel = CancellationToken::new();
        collector.start(cancel.clone());

        for i in 0..3 {
            collector.push(event(&format!("s-{i}")));
        }
        // Give the worker a moment to pull the events into its batch.
        wait_for("events picked up", || collector.queue_depth() == 0).await;

        cancel.cancel();
        wait_for("best-effort flush", || store.bulk_calls() == 1).await;
        assert_eq!(store.bulk_sizes(), vec![3]);
    }
}

mod stats_tests {
    use super::*;

    #[tokio::test]
    async fn test_counters_are_monotone_under_load() {
        let store = Arc::new(MockStore::default());
        let collector = Arc::new(BatchCollector::new(config(10, 50, 4), store.clone()));
        collector.start(CancellationToken::new());

        let producer = {
            let collector = collector.clone();
            tokio::spawn(async move {
                for i in 0..500 {
                    collector.push(event(&format!("s-{i}")));
                    if i % 50 == 0 {
                        tokio::time::sleep(Duration::from_millis(1)).await;
                    }
                }
            })
        };

        let mut previous = collector.stats();
        for _ in 0..100 {
            let current = collector.stats();
            assert!(current.events_received >= previous.events_received);
            assert!(current.events_processed >= previous.events_processed);
            assert!(current.events_failed >= previous.events_failed);
            assert!(current.batches_processed >= previous.batches_processed);
            previous = current;
            tokio::time::sleep(Duration::from_millis(1)).await;
        }

        producer.await.unwrap();
        collector.shutdown().await;

        let stats = collector.stats();
        assert_eq!(stats.events_received, 500);
        assert_eq!(stats.events_processed + stats.events_failed, 500);
    }
}
