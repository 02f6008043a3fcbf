//! Batching worker loop.
//!
//! Each worker independently drains the shared intake queue into a private
//! batch buffer and flushes on one of four triggers: batch full, flush
//! timer, graceful shutdown (drain first), or hard cancellation
//! (best-effort flush, no drain). Write failures fall back from the bulk
//! COPY path to row inserts; a batch is only counted failed when both
//! paths have failed. Worker-level failures are never fatal; the loop
//! continues to the next batch regardless of the previous outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::CollectorConfig;
use crate::emit;
use crate::error::{StorageError, WriteTimeoutSnafu};
use crate::event::EnrichedEvent;
use crate::metrics::events::{BatchFlushed, FlushCompleted, FlushOutcome, QueueDepth};
use crate::storage::EventStore;

use super::stats::Stats;

/// Everything one worker owns or shares, bundled for the spawned task.
pub(super) struct WorkerContext {
    pub id: usize,
    pub config: CollectorConfig,
    pub queue: flume::Receiver<EnrichedEvent>,
    pub store: Arc<dyn EventStore>,
    pub stats: Arc<Stats>,
    pub shutdown: CancellationToken,
    pub cancel: CancellationToken,
}

/// Worker loop: select over the next queue item, the flush timer, and the
/// two stop signals.
pub(super) async fn run(ctx: WorkerContext) {
    let mut batch: Vec<EnrichedEvent> = Vec::with_capacity(ctx.config.batch_size);
    let mut ticker = tokio::time::interval(ctx.config.flush_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            result = ctx.queue.recv_async() => {
                match result {
                    Ok(event) => {
                        batch.push(event);
                        if batch.len() >= ctx.config.batch_size {
                            flush(&ctx, &mut batch).await;
                        }
                    }
                    // Channel closed: every sender is gone, nothing more
                    // can arrive. Flush what we hold and stop.
                    Err(_) => {
                        flush(&ctx, &mut batch).await;
                        return;
                    }
                }
            }

            _ = ticker.tick() => {
                flush(&ctx, &mut batch).await;
            }

            _ = ctx.shutdown.cancelled() => {
                // Drain everything already queued, then flush once.
                while let Ok(event) = ctx.queue.try_recv() {
                    batch.push(event);
                }
                flush(&ctx, &mut batch).await;
                info!(worker = ctx.id, "worker shutdown");
                return;
            }

            _ = ctx.cancel.cancelled() => {
                // Hard cancellation: best-effort flush, no draining.
                flush(&ctx, &mut batch).await;
                return;
            }
        }
    }
}

/// Snapshot the batch, reset the buffer, and hand the snapshot to the
/// sink. Flush duration and batch size are accumulated regardless of the
/// write outcome; success/failure accounting is separate.
async fn flush(ctx: &WorkerContext, batch: &mut Vec<EnrichedEvent>) {
    if batch.is_empty() {
        return;
    }

    let to_flush = std::mem::replace(batch, Vec::with_capacity(ctx.config.batch_size));
    let size = to_flush.len();
    let start = Instant::now();

    let outcome = write_with_fallback(ctx, &to_flush).await;
    let elapsed = start.elapsed();

    match outcome {
        FlushOutcome::Bulk | FlushOutcome::Fallback => {
            ctx.stats.record_processed(size as u64);
        }
        FlushOutcome::Failed => {
            ctx.stats.record_failed(size as u64);
        }
    }
    ctx.stats.record_flush(size, elapsed);

    emit!(BatchFlushed { outcome, size });
    emit!(FlushCompleted { duration: elapsed });
    emit!(QueueDepth {
        depth: ctx.queue.len()
    });

    debug!(
        worker = ctx.id,
        size,
        duration_ms = elapsed.as_millis() as u64,
        outcome = outcome.as_str(),
        "batch flushed"
    );
}

/// Try the bulk COPY path, then the row-insert fallback. The batch is only
/// lost when both paths fail; the loss is observable through stats and the
/// error log, and the batch is not requeued; retry storms during an
/// outage cost more than the data they might save.
async fn write_with_fallback(ctx: &WorkerContext, events: &[EnrichedEvent]) -> FlushOutcome {
    match with_timeout(ctx.config.write_timeout(), ctx.store.write_bulk(events)).await {
        Ok(()) => FlushOutcome::Bulk,
        Err(bulk_err) => {
            warn!(
                worker = ctx.id,
                batch_size = events.len(),
                error = %bulk_err,
                "bulk write failed, falling back to row inserts"
            );

            match with_timeout(ctx.config.write_timeout(), ctx.store.write_rows(events)).await {
                Ok(()) => FlushOutcome::Fallback,
                Err(insert_err) => {
                    error!(
                        worker = ctx.id,
                        batch_size = events.len(),
                        error = %insert_err,
                        "row insert fallback failed, batch lost"
                    );
                    FlushOutcome::Failed
                }
            }
        }
    }
}

/// Bound a single write-path attempt so a hung store cannot stall the
/// worker indefinitely.
async fn with_timeout(
    limit: Duration,
    write: impl Future<Output = Result<(), StorageError>>,
) -> Result<(), StorageError> {
    match tokio::time::timeout(limit, write).await {
        Ok(result) => result,
        Err(_) => Err(WriteTimeoutSnafu {
            millis: limit.as_millis() as u64,
        }
        .build()),
    }
}
