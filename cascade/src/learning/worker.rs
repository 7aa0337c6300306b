//! Background hand-off from the routing path to the learning pipeline.
//!
//! The router never awaits learning. It pushes extracted patterns onto a
//! bounded channel; a single task drains it in order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::error::{PatternError, PatternResult};
use super::pipeline::PatternLearningPipeline;
use crate::escalation::provider::ExtractedPattern;
use crate::types::TenantId;

pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

enum LearningCommand {
    Ingest {
        tenant: TenantId,
        patterns: Vec<ExtractedPattern>,
    },
    /// Reply once everything queued before it has been processed
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
pub struct LearningWorkerMetrics {
    pub submitted: AtomicU64,
    pub dropped: AtomicU64,
    pub processed: AtomicU64,
}

/// Cheap cloneable handle to the learning worker.
#[derive(Clone)]
pub struct LearningHandle {
    tx: mpsc::Sender<LearningCommand>,
    metrics: Arc<LearningWorkerMetrics>,
}

impl LearningHandle {
    /// Spawn the worker task. Must be called inside a tokio runtime.
    pub fn spawn(pipeline: Arc<PatternLearningPipeline>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<LearningCommand>(capacity.max(1));
        let metrics = Arc::new(LearningWorkerMetrics::default());
        let worker_metrics = Arc::clone(&metrics);

        let join = tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    LearningCommand::Ingest { tenant, patterns } => {
                        let reports = pipeline.ingest(&tenant, &patterns).await;
                        worker_metrics
                            .processed
                            .fetch_add(patterns.len() as u64, Ordering::Relaxed);
                        debug!(tenant = %tenant, count = reports.len(), "Learning batch processed");
                    }
                    LearningCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
            info!("Learning worker stopped");
        });

        (Self { tx, metrics }, join)
    }

    /// Queue patterns without waiting. Drops the batch when the queue is full.
    pub fn submit(&self, tenant: TenantId, patterns: Vec<ExtractedPattern>) -> bool {
        if patterns.is_empty() {
            return true;
        }
        let count = patterns.len();
        match self.tx.try_send(LearningCommand::Ingest {
            tenant: tenant.clone(),
            patterns,
        }) {
            Ok(()) => {
                self.metrics.submitted.fetch_add(count as u64, Ordering::Relaxed);
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.metrics.dropped.fetch_add(count as u64, Ordering::Relaxed);
                warn!(tenant = %tenant, count, "Learning queue full; dropping patterns");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.dropped.fetch_add(count as u64, Ordering::Relaxed);
                warn!(tenant = %tenant, count, "Learning worker closed; dropping patterns");
                false
            }
        }
    }

    /// Wait until every batch submitted so far has been processed.
    pub async fn flush(&self) -> PatternResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(LearningCommand::Flush(done_tx))
            .await
            .map_err(|_| PatternError::WorkerClosed)?;
        done_rx.await.map_err(|_| PatternError::WorkerClosed)
    }

    pub fn metrics(&self) -> &LearningWorkerMetrics {
        &self.metrics
    }
}
