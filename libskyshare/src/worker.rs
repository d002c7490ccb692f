//! Task worker
//!
//! Drains due tasks from the queue and runs them one after another. Each
//! task is claimed first; a task another worker already claimed is skipped.
//! One-shot tasks end up done or failed (with the error kept for
//! inspection); recurring tasks are re-armed one interval after the run
//! regardless of the outcome. Nothing is retried automatically.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use crate::dispatcher::{DispatchOutcome, Dispatcher};
use crate::error::Result;
use crate::session::SessionManager;
use crate::tasks::{next_run, QueuedTask, Task, TaskQueue};

/// Counts from one pass over the queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

pub struct Worker {
    queue: Arc<dyn TaskQueue>,
    dispatcher: Arc<Dispatcher>,
    session: Arc<SessionManager>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn TaskQueue>,
        dispatcher: Arc<Dispatcher>,
        session: Arc<SessionManager>,
    ) -> Self {
        Self {
            queue,
            dispatcher,
            session,
        }
    }

    /// Run every task due at `now`, oldest first
    ///
    /// # Errors
    ///
    /// Only a failure to read the due tasks. Task failures are recorded on
    /// the task, and a failure to record an outcome is logged per task.
    pub async fn run_pending(&self, now: DateTime<Utc>) -> Result<RunSummary> {
        let due = self.queue.due(now).await?;
        let mut summary = RunSummary::default();

        if due.is_empty() {
            return Ok(summary);
        }

        tracing::info!(count = due.len(), "running due tasks");

        for queued in due {
            match self.queue.claim(&queued, now).await {
                Ok(true) => {}
                Ok(false) => {
                    tracing::debug!(task_id = %queued.id, "task claimed elsewhere, skipping");
                    continue;
                }
                Err(e) => {
                    tracing::warn!(task_id = %queued.id, error = %e, "could not claim task, leaving it queued");
                    continue;
                }
            }

            let outcome = self.execute(&queued.task).await;
            summary.processed += 1;

            match &outcome {
                Ok(()) => summary.succeeded += 1,
                Err(message) => {
                    summary.failed += 1;
                    tracing::warn!(
                        task_id = %queued.id,
                        kind = queued.task.kind(),
                        error = %message,
                        "task failed"
                    );
                }
            }

            if let Err(e) = self.record(&queued, now, outcome.err().as_deref()).await {
                tracing::error!(
                    task_id = %queued.id,
                    kind = queued.task.kind(),
                    error = %e,
                    "failed to record task outcome"
                );
            }
        }

        Ok(summary)
    }

    async fn record(&self, queued: &QueuedTask, now: DateTime<Utc>, error: Option<&str>) -> Result<()> {
        match (&queued.recurrence, error) {
            (Some(recurrence), error) => {
                let run_at = next_run(now, recurrence.interval);
                tracing::debug!(name = %recurrence.name, next_run = %run_at, "re-armed recurring task");
                self.queue.reschedule(&queued.id, run_at, error).await
            }
            (None, None) => self.queue.complete(&queued.id).await,
            (None, Some(error)) => self.queue.fail(&queued.id, error).await,
        }
    }

    async fn execute(&self, task: &Task) -> std::result::Result<(), String> {
        match task {
            Task::SendPost { content_id } => match self.dispatcher.send(content_id).await {
                Ok(DispatchOutcome::Posted { .. }) => Ok(()),
                Ok(DispatchOutcome::NotConfigured) => {
                    tracing::debug!(content_id = %content_id, "send skipped: not configured");
                    Ok(())
                }
                Ok(DispatchOutcome::ContentMissing) => {
                    tracing::debug!(content_id = %content_id, "send skipped: content missing");
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            },
            Task::RefreshSession => match self.session.refresh().await {
                Ok(outcome) => {
                    tracing::debug!(?outcome, "scheduled refresh finished");
                    Ok(())
                }
                Err(e) if e.is_not_configured() => {
                    tracing::debug!("scheduled refresh skipped: not configured");
                    Ok(())
                }
                Err(e) => Err(e.to_string()),
            },
        }
    }

    /// Poll the queue until `shutdown` is set
    ///
    /// The shutdown flag is checked every second while sleeping, so a signal
    /// stops the loop promptly once the current pass completes.
    pub async fn run(&self, poll_interval: Duration, shutdown: Arc<AtomicBool>) -> Result<()> {
        let poll_secs = poll_interval.as_secs().max(1);

        loop {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("shutdown requested, stopping worker loop");
                break;
            }

            if let Err(e) = self.run_pending(Utc::now()).await {
                tracing::error!(error = %e, "error processing task queue");
            }

            for _ in 0..poll_secs {
                if shutdown.load(Ordering::Relaxed) {
                    break;
                }
                sleep(Duration::from_secs(1)).await;
            }
        }

        Ok(())
    }
}
