//! Deferred task queue
//!
//! Publishing never talks to the network directly. It enqueues a task and a
//! worker (see `worker`) picks it up out of band. Two kinds of task exist:
//! sending a post and refreshing the session. One-shot tasks run once and
//! are kept with their outcome; recurring tasks are identified by name and
//! re-armed after every run.
//!
//! A worker claims a task before running it. Claiming a one-shot task moves
//! it from pending to running, so a second worker or a later pass never
//! picks it up again, even when recording the outcome fails.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{Result, SkyshareError};

/// Name of the recurring session refresh
pub const REFRESH_TASK_NAME: &str = "refresh-session";

/// Work the worker knows how to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    SendPost { content_id: String },
    RefreshSession,
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::SendPost { .. } => "send_post",
            Task::RefreshSession => "refresh_session",
        }
    }

    pub fn to_payload(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| SkyshareError::InvalidInput(format!("Cannot serialize task: {}", e)))
    }

    pub fn from_payload(payload: &str) -> Result<Self> {
        serde_json::from_str(payload).map_err(|e| {
            SkyshareError::InvalidInput(format!("Cannot decode task payload '{}': {}", payload, e))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Done => "done",
            TaskStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "done" => Some(TaskStatus::Done),
            "failed" => Some(TaskStatus::Failed),
            _ => None,
        }
    }
}

/// Recurring schedule attached to a named task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recurrence {
    pub name: String,
    pub interval: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    pub id: String,
    pub task: Task,
    pub run_at: DateTime<Utc>,
    pub recurrence: Option<Recurrence>,
    pub status: TaskStatus,
    pub last_error: Option<String>,
}

/// `run_at + interval`, saturating on overflow
pub fn next_run(from: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|d| from.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a one-shot task; returns its id
    async fn schedule_once(&self, task: Task, run_at: DateTime<Utc>) -> Result<String>;

    /// Register a recurring task starting at `first_run`
    ///
    /// Returns `false` and leaves the existing entry alone when a recurring
    /// task with this name is already scheduled.
    async fn schedule_recurring(
        &self,
        name: &str,
        task: Task,
        interval: Duration,
        first_run: DateTime<Utc>,
    ) -> Result<bool>;

    /// Remove a recurring task; returns whether one existed
    async fn cancel_recurring(&self, name: &str) -> Result<bool>;

    /// Pending tasks due at `now`, oldest first
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<QueuedTask>>;

    /// Take a task returned by `due` for a run starting at `now`
    ///
    /// A one-shot task moves to running. A recurring task is re-armed one
    /// interval after `now`. Returns `false` when the task is no longer in
    /// the state `due` saw, i.e. another worker claimed it first.
    async fn claim(&self, task: &QueuedTask, now: DateTime<Utc>) -> Result<bool>;

    /// Mark a one-shot task done
    async fn complete(&self, id: &str) -> Result<()>;

    /// Mark a one-shot task failed, keeping the error
    async fn fail(&self, id: &str, error: &str) -> Result<()>;

    /// Move a recurring task to its next run, recording the last error if any
    async fn reschedule(&self, id: &str, run_at: DateTime<Utc>, error: Option<&str>)
        -> Result<()>;

    /// Every task with its current status
    async fn list(&self) -> Result<Vec<QueuedTask>>;
}

/// In-memory task queue
#[derive(Debug, Default)]
pub struct MemoryQueue {
    tasks: Mutex<Vec<QueuedTask>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn update<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut QueuedTask),
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let task = tasks
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| SkyshareError::InvalidInput(format!("Unknown task: {}", id)))?;
        f(task);
        Ok(())
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn schedule_once(&self, task: Task, run_at: DateTime<Utc>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        tasks.push(QueuedTask {
            id: id.clone(),
            task,
            run_at,
            recurrence: None,
            status: TaskStatus::Pending,
            last_error: None,
        });
        Ok(id)
    }

    async fn schedule_recurring(
        &self,
        name: &str,
        task: Task,
        interval: Duration,
        first_run: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let exists = tasks
            .iter()
            .any(|t| t.recurrence.as_ref().is_some_and(|r| r.name == name));
        if exists {
            return Ok(false);
        }

        tasks.push(QueuedTask {
            id: uuid::Uuid::new_v4().to_string(),
            task,
            run_at: first_run,
            recurrence: Some(Recurrence {
                name: name.to_string(),
                interval,
            }),
            status: TaskStatus::Pending,
            last_error: None,
        });
        Ok(true)
    }

    async fn cancel_recurring(&self, name: &str) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let before = tasks.len();
        tasks.retain(|t| !t.recurrence.as_ref().is_some_and(|r| r.name == name));
        Ok(tasks.len() != before)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<QueuedTask>> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let mut due: Vec<QueuedTask> = tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending && t.run_at <= now)
            .cloned()
            .collect();
        // stable sort keeps insertion order for equal run_at
        due.sort_by_key(|t| t.run_at);
        Ok(due)
    }

    async fn claim(&self, queued: &QueuedTask, now: DateTime<Utc>) -> Result<bool> {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        let Some(task) = tasks.iter_mut().find(|t| t.id == queued.id) else {
            return Ok(false);
        };
        if task.status != TaskStatus::Pending || task.run_at != queued.run_at {
            return Ok(false);
        }

        match &task.recurrence {
            Some(recurrence) => task.run_at = next_run(now, recurrence.interval),
            None => task.status = TaskStatus::Running,
        }
        Ok(true)
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.update(id, |t| t.status = TaskStatus::Done)
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        self.update(id, |t| {
            t.status = TaskStatus::Failed;
            t.last_error = Some(error.to_string());
        })
    }

    async fn reschedule(
        &self,
        id: &str,
        run_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<()> {
        self.update(id, |t| {
            t.run_at = run_at;
            t.last_error = error.map(str::to_string);
        })
    }

    async fn list(&self) -> Result<Vec<QueuedTask>> {
        let tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        Ok(tasks.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_task_payload_format() {
        let task = Task::SendPost {
            content_id: "42".to_string(),
        };
        assert_eq!(
            task.to_payload().unwrap(),
            r#"{"type":"send_post","content_id":"42"}"#
        );
        assert_eq!(
            Task::RefreshSession.to_payload().unwrap(),
            r#"{"type":"refresh_session"}"#
        );
        assert_eq!(Task::from_payload(r#"{"type":"refresh_session"}"#).unwrap(), Task::RefreshSession);
        assert!(Task::from_payload(r#"{"type":"unknown"}"#).is_err());
    }

    #[test]
    fn test_next_run() {
        assert_eq!(next_run(at(0), Duration::from_secs(60)), at(60));
        assert_eq!(
            next_run(at(0), Duration::from_secs(u64::MAX)),
            DateTime::<Utc>::MAX_UTC
        );
    }

    #[tokio::test]
    async fn test_due_filters_and_orders() {
        let queue = MemoryQueue::new();
        let later = queue
            .schedule_once(Task::SendPost { content_id: "b".into() }, at(20))
            .await
            .unwrap();
        let first = queue
            .schedule_once(Task::SendPost { content_id: "a".into() }, at(10))
            .await
            .unwrap();
        queue
            .schedule_once(Task::SendPost { content_id: "future".into() }, at(100))
            .await
            .unwrap();

        let due = queue.due(at(30)).await.unwrap();
        let ids: Vec<&str> = due.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), later.as_str()]);
    }

    #[tokio::test]
    async fn test_completed_tasks_are_not_due() {
        let queue = MemoryQueue::new();
        let id = queue.schedule_once(Task::RefreshSession, at(0)).await.unwrap();
        queue.complete(&id).await.unwrap();
        assert!(queue.due(at(10)).await.unwrap().is_empty());

        let id = queue.schedule_once(Task::RefreshSession, at(0)).await.unwrap();
        queue.fail(&id, "boom").await.unwrap();
        assert!(queue.due(at(10)).await.unwrap().is_empty());

        let failed = queue.list().await.unwrap().into_iter().find(|t| t.id == id).unwrap();
        assert_eq!(failed.status, TaskStatus::Failed);
        assert_eq!(failed.last_error.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_recurring_is_idempotent_and_cancellable() {
        let queue = MemoryQueue::new();
        let week = Duration::from_secs(7 * 24 * 3600);

        assert!(queue
            .schedule_recurring(REFRESH_TASK_NAME, Task::RefreshSession, week, at(0))
            .await
            .unwrap());
        assert!(!queue
            .schedule_recurring(REFRESH_TASK_NAME, Task::RefreshSession, week, at(5))
            .await
            .unwrap());
        assert_eq!(queue.list().await.unwrap().len(), 1);

        assert!(queue.cancel_recurring(REFRESH_TASK_NAME).await.unwrap());
        assert!(!queue.cancel_recurring(REFRESH_TASK_NAME).await.unwrap());
        assert!(queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_claim_once_only() {
        let queue = MemoryQueue::new();
        queue
            .schedule_once(Task::SendPost { content_id: "1".into() }, at(0))
            .await
            .unwrap();

        let due = queue.due(at(10)).await.unwrap();
        assert!(queue.claim(&due[0], at(10)).await.unwrap());
        assert!(!queue.claim(&due[0], at(10)).await.unwrap());

        assert!(queue.due(at(10)).await.unwrap().is_empty());
        assert_eq!(queue.list().await.unwrap()[0].status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn test_claim_rearms_recurring() {
        let queue = MemoryQueue::new();
        queue
            .schedule_recurring(REFRESH_TASK_NAME, Task::RefreshSession, Duration::from_secs(60), at(0))
            .await
            .unwrap();

        let due = queue.due(at(5)).await.unwrap();
        assert!(queue.claim(&due[0], at(5)).await.unwrap());
        // A stale copy from the same poll loses
        assert!(!queue.claim(&due[0], at(5)).await.unwrap());

        let task = &queue.list().await.unwrap()[0];
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.run_at, at(65));
    }

    #[tokio::test]
    async fn test_unknown_task_id() {
        let queue = MemoryQueue::new();
        assert!(queue.complete("missing").await.is_err());
    }
}
