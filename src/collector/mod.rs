//! Event batching and dispatch pipeline.
//!
//! Producers hand enriched events to [`BatchCollector::push`], which
//! enqueues onto a single bounded MPMC channel, the one point of
//! backpressure in the service. A pool of workers drains the channel, each
//! accumulating a private batch and flushing it to the storage sink on a
//! size or time trigger.
//!
//! # Architecture
//!
//! - **Producers never block**: `push` is a non-blocking send; when the
//!   queue is full the event is dropped and counted, never queued
//!   elsewhere. Sustained overload costs data, not memory or liveness.
//! - **Workers own their batches**: a batch belongs to one worker from
//!   first append through flush; the only cross-worker shared state is the
//!   atomic statistics block.

mod stats;
mod worker;

pub use stats::CollectorStats;

use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::CollectorConfig;
use crate::emit;
use crate::event::EnrichedEvent;
use crate::metrics::events::{EventDropped, EventsReceived};
use crate::storage::EventStore;

use stats::Stats;
use worker::WorkerContext;

/// The batching pipeline: bounded intake queue, worker pool, statistics.
///
/// Lifecycle is Stopped → Running → Draining → Stopped: [`start`] spawns
/// the workers, [`shutdown`] signals a drain and blocks until every worker
/// has exited. Calling `start` twice is a programming error and is not
/// defended against; the embedding process owns shutdown ordering and must
/// stop producers before draining.
///
/// [`start`]: BatchCollector::start
/// [`shutdown`]: BatchCollector::shutdown
pub struct BatchCollector {
    config: CollectorConfig,
    store: Arc<dyn EventStore>,
    tx: flume::Sender<EnrichedEvent>,
    rx: flume::Receiver<EnrichedEvent>,
    stats: Arc<Stats>,
    shutdown: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BatchCollector {
    /// Create a collector with an intake queue sized from the batch size.
    pub fn new(config: CollectorConfig, store: Arc<dyn EventStore>) -> Self {
        let (tx, rx) = flume::bounded(config.queue_capacity());
        Self {
            config,
            store,
            tx,
            rx,
            stats: Arc::new(Stats::default()),
            shutdown: CancellationToken::new(),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the worker pool, bound to `cancel` for hard cancellation.
    ///
    /// Graceful draining is triggered separately through [`shutdown`];
    /// cancelling `cancel` makes workers flush best-effort and exit
    /// without draining the queue.
    ///
    /// [`shutdown`]: BatchCollector::shutdown
    pub fn start(&self, cancel: CancellationToken) {
        let mut workers = self.workers.lock().expect("worker handle lock poisoned");
        for id in 0..self.config.workers {
            let ctx = WorkerContext {
                id,
                config: self.config.clone(),
                queue: self.rx.clone(),
                store: self.store.clone(),
                stats: self.stats.clone(),
                shutdown: self.shutdown.clone(),
                cancel: cancel.clone(),
            };
            workers.push(tokio::spawn(worker::run(ctx)));
        }

        info!(
            workers = self.config.workers,
            batch_size = self.config.batch_size,
            flush_interval_ms = self.config.flush_interval_ms,
            "batch collector started"
        );
    }

    /// Enqueue one event without blocking.
    ///
    /// On a full queue the event is dropped: `events_received` still
    /// increments, `events_failed` records the loss, and a warning makes
    /// the drop auditable. Producers are never penalized for backend
    /// saturation.
    pub fn push(&self, event: EnrichedEvent) {
        self.stats.record_received(1);
        emit!(EventsReceived { count: 1 });

        if self.tx.try_send(event).is_err() {
            self.stats.record_failed(1);
            emit!(EventDropped);
            warn!("event dropped, queue full");
        }
    }

    /// Enqueue a batch of events, each independently; no atomicity across
    /// the batch.
    pub fn push_batch(&self, events: Vec<EnrichedEvent>) {
        for event in events {
            self.push(event);
        }
    }

    /// Signal a graceful drain and block until every worker has exited.
    ///
    /// Each worker drains the queue, flushes once, and stops; no event
    /// that reached the queue before this call is lost. The overall
    /// deadline is owned by the caller: a hung store can stall the drain
    /// up to the configured write timeouts.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut workers = self.workers.lock().expect("worker handle lock poisoned");
            workers.drain(..).collect()
        };

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("worker task failed during shutdown: {}", e);
            }
        }

        info!("batch collector shutdown complete");
    }

    /// Point-in-time statistics snapshot for external pollers.
    pub fn stats(&self) -> CollectorStats {
        self.stats.snapshot(self.rx.len())
    }

    /// Current intake queue depth.
    pub fn queue_depth(&self) -> usize {
        self.rx.len()
    }
}
