//! Fan-out / fan-in pipeline for bulk soft deletes.
//!
//! ```text
//! producer ──► distribution channel ──► worker × N ──► fan-in ──► collector
//! ```
//!
//! The producer emits every requested code into a single distribution channel
//! that all workers pull from. Each worker soft-deletes one code at a time
//! through the shared [`SoftDeleter`] and reports the outcome on its own
//! channel. The fan-in stage merges those channels and the collector counts
//! the outcomes until every worker has finished.
//!
//! A failed row is logged and skipped: it is neither retried nor reported to
//! the caller beyond the [`DeletionReport`] counters. All stages watch a
//! shared done signal and select against it on every send, so an early exit
//! of any stage never leaves another one blocked.

use async_trait::async_trait;
use snip_core::{Result, ShortCode, UserId};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinSet;
use tracing::{debug, trace, warn};

/// Number of workers used by the database backend.
pub const DEFAULT_WORKERS: usize = 10;

/// A unit of work executed by the pipeline workers.
#[async_trait]
pub trait SoftDeleter: Send + Sync + 'static {
    /// Marks `code` as deleted when it is owned by `user_id`.
    ///
    /// Returns the number of affected rows; zero when the code does not
    /// exist or belongs to someone else.
    async fn soft_delete(&self, user_id: UserId, code: &ShortCode) -> Result<u64>;
}

/// Summary of a pipeline run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeletionReport {
    /// Number of codes handed to the pipeline.
    pub requested: usize,
    /// Rows actually marked deleted.
    pub deleted: u64,
    /// Codes whose statement failed and were skipped.
    pub failed: usize,
    /// Whether the run was stopped by the cancellation signal.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Copy)]
enum Outcome {
    Deleted(u64),
    Failed,
}

/// A bounded worker pool applying soft deletes concurrently.
#[derive(Debug, Clone, Copy)]
pub struct DeletionPipeline {
    workers: usize,
}

impl Default for DeletionPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl DeletionPipeline {
    /// Creates a pipeline with `workers` workers (at least one).
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Runs the pipeline over `codes` and waits until every stage has exited.
    ///
    /// Setting `cancel` to `true` stops all stages promptly; outcomes that
    /// were already collected stay in the report. When this future returns,
    /// no stage holds a clone of `deleter` anymore.
    pub async fn run<D: SoftDeleter>(
        &self,
        deleter: Arc<D>,
        user_id: UserId,
        codes: Vec<ShortCode>,
        mut cancel: watch::Receiver<bool>,
    ) -> DeletionReport {
        let mut report = DeletionReport {
            requested: codes.len(),
            ..DeletionReport::default()
        };
        if codes.is_empty() {
            return report;
        }

        let (done_tx, done_rx) = watch::channel(false);
        let mut stages = JoinSet::new();

        let input = Arc::new(Mutex::new(produce(codes, done_rx.clone(), &mut stages)));
        let outputs: Vec<_> = (0..self.workers)
            .map(|worker| {
                spawn_worker(
                    worker,
                    Arc::clone(&deleter),
                    user_id,
                    Arc::clone(&input),
                    done_rx.clone(),
                    &mut stages,
                )
            })
            .collect();
        let mut merged = fan_in(outputs, done_rx, &mut stages);

        loop {
            tokio::select! {
                outcome = merged.recv() => match outcome {
                    Some(Outcome::Deleted(rows)) => report.deleted += rows,
                    Some(Outcome::Failed) => report.failed += 1,
                    None => break,
                },
                _ = cancelled(&mut cancel) => {
                    debug!(user_id = %user_id, "deletion pipeline cancelled");
                    report.cancelled = true;
                    break;
                }
            }
        }

        // Release every stage still running, then wait for all of them.
        let _ = done_tx.send(true);
        drop(merged);
        while let Some(joined) = stages.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "deletion pipeline stage panicked");
            }
        }

        debug!(
            user_id = %user_id,
            requested = report.requested,
            deleted = report.deleted,
            failed = report.failed,
            cancelled = report.cancelled,
            "deletion pipeline finished"
        );
        report
    }
}

/// Resolves once the done signal is raised or its sender is gone.
async fn done(signal: &mut watch::Receiver<bool>) {
    let _ = signal.wait_for(|done| *done).await;
}

/// Resolves once cancellation is requested. A dropped sender never cancels.
async fn cancelled(signal: &mut watch::Receiver<bool>) {
    let sender_gone = signal.wait_for(|cancel| *cancel).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

fn produce(
    codes: Vec<ShortCode>,
    mut done_rx: watch::Receiver<bool>,
    stages: &mut JoinSet<()>,
) -> mpsc::Receiver<ShortCode> {
    let (tx, rx) = mpsc::channel(1);

    stages.spawn(async move {
        for code in codes {
            tokio::select! {
                _ = done(&mut done_rx) => return,
                sent = tx.send(code) => if sent.is_err() { return },
            }
        }
    });

    rx
}

async fn next_code(input: &Mutex<mpsc::Receiver<ShortCode>>) -> Option<ShortCode> {
    input.lock().await.recv().await
}

fn spawn_worker<D: SoftDeleter>(
    worker: usize,
    deleter: Arc<D>,
    user_id: UserId,
    input: Arc<Mutex<mpsc::Receiver<ShortCode>>>,
    mut done_rx: watch::Receiver<bool>,
    stages: &mut JoinSet<()>,
) -> mpsc::Receiver<Outcome> {
    let (tx, rx) = mpsc::channel(1);

    stages.spawn(async move {
        loop {
            let code = tokio::select! {
                _ = done(&mut done_rx) => return,
                code = next_code(&input) => match code {
                    Some(code) => code,
                    None => return,
                },
            };

            let outcome = tokio::select! {
                _ = done(&mut done_rx) => return,
                result = deleter.soft_delete(user_id, &code) => match result {
                    Ok(rows) => {
                        trace!(worker, code = %code, rows, "soft deleted");
                        Outcome::Deleted(rows)
                    }
                    Err(e) => {
                        warn!(worker, code = %code, error = %e, "soft delete failed, skipping");
                        Outcome::Failed
                    }
                },
            };

            tokio::select! {
                _ = done(&mut done_rx) => return,
                sent = tx.send(outcome) => if sent.is_err() { return },
            }
        }
    });

    rx
}

fn fan_in(
    inputs: Vec<mpsc::Receiver<Outcome>>,
    done_rx: watch::Receiver<bool>,
    stages: &mut JoinSet<()>,
) -> mpsc::Receiver<Outcome> {
    let (tx, rx) = mpsc::channel(inputs.len().max(1));

    for mut input in inputs {
        let tx = tx.clone();
        let mut done_rx = done_rx.clone();
        stages.spawn(async move {
            while let Some(outcome) = input.recv().await {
                tokio::select! {
                    _ = done(&mut done_rx) => return,
                    sent = tx.send(outcome) => if sent.is_err() { return },
                }
            }
        });
    }

    rx
}
