//! In-process worker pool.
//!
//! Submissions are delivered over an unbounded mpsc channel: the
//! [`ChannelScheduler`] end is given to the [`Analyzer`], the [`TaskQueue`]
//! end to a [`WorkerPool`]. The pool runs at most `concurrency` executions
//! at once and wraps each in a wall-clock timeout; when it elapses the
//! execution is dropped and the task is failed.

use std::sync::Arc;
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cv_analyzer_core::models::TaskStatus;

use crate::analysis::{Analyzer, Scheduler};
use crate::config::WorkerConfig;
use crate::error::AnalysisError;

/// Sending half of the task channel.
#[derive(Clone)]
pub struct ChannelScheduler {
    tx: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Scheduler for ChannelScheduler {
    async fn schedule(&self, task_id: &str) -> anyhow::Result<()> {
        self.tx
            .send(task_id.to_string())
            .map_err(|_| anyhow!("worker pool is not running"))
    }
}

/// Leaves tasks `pending` for a later `cva work` or server start.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeferredScheduler;

#[async_trait]
impl Scheduler for DeferredScheduler {
    async fn schedule(&self, task_id: &str) -> anyhow::Result<()> {
        debug!(task = %task_id, "task left pending for the next worker run");
        Ok(())
    }
}

/// Receiving half of the task channel.
pub struct TaskQueue {
    rx: mpsc::UnboundedReceiver<String>,
}

/// Create a connected scheduler/queue pair.
pub fn channel() -> (ChannelScheduler, TaskQueue) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelScheduler { tx }, TaskQueue { rx })
}

pub struct WorkerPool {
    analyzer: Arc<Analyzer>,
    concurrency: usize,
    timeout: Duration,
}

impl WorkerPool {
    pub fn new(analyzer: Arc<Analyzer>, config: &WorkerConfig) -> Self {
        Self {
            analyzer,
            concurrency: config.concurrency.max(1),
            timeout: config.timeout(),
        }
    }

    /// Consume `queue` until the channel closes.
    pub fn spawn(self, mut queue: TaskQueue) -> JoinHandle<()> {
        tokio::spawn(async move {
            let permits = Arc::new(Semaphore::new(self.concurrency));
            info!(
                concurrency = self.concurrency,
                timeout_secs = self.timeout.as_secs(),
                "worker pool started"
            );

            while let Some(task_id) = queue.rx.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(_) => break,
                };
                let analyzer = self.analyzer.clone();
                let timeout = self.timeout;
                tokio::spawn(async move {
                    run_with_timeout(&analyzer, &task_id, timeout).await;
                    drop(permit);
                });
            }

            // Wait for in-flight executions before reporting shutdown.
            let _ = permits.acquire_many(self.concurrency as u32).await;
            info!("worker pool stopped");
        })
    }
}

/// Execute one task under `timeout`, failing it if the limit is reached.
pub async fn run_with_timeout(
    analyzer: &Analyzer,
    task_id: &str,
    timeout: Duration,
) -> Option<TaskStatus> {
    match tokio::time::timeout(timeout, analyzer.execute(task_id)).await {
        Ok(Ok(status)) => Some(status),
        Ok(Err(AnalysisError::InvalidState { .. })) => None,
        Ok(Err(e)) => {
            error!(task = %task_id, error = %e, "analysis execution error");
            None
        }
        Err(_) => {
            let reason = format!("timed out after {}s", timeout.as_secs_f64());
            match analyzer.fail_stalled(task_id, &reason).await {
                Ok(true) => Some(TaskStatus::Failed),
                Ok(false) => {
                    warn!(task = %task_id, "timed out task was no longer processing");
                    None
                }
                Err(e) => {
                    error!(task = %task_id, error = %e, "could not mark timed out task failed");
                    None
                }
            }
        }
    }
}

/// Counts from [`drain_pending`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Execute every currently pending task sequentially.
pub async fn drain_pending(
    analyzer: &Analyzer,
    timeout: Duration,
) -> Result<DrainSummary, AnalysisError> {
    let mut summary = DrainSummary::default();
    for task_id in analyzer.pending().await? {
        match run_with_timeout(analyzer, &task_id, timeout).await {
            Some(TaskStatus::Completed) => summary.completed += 1,
            Some(TaskStatus::Failed) => summary.failed += 1,
            _ => summary.skipped += 1,
        }
    }
    Ok(summary)
}
