//! Database operations for Skyshare
//!
//! A single SQLite file backs the three host collaborators: the settings
//! store, the content source and the deferred task queue.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::{Row, Sqlite, Transaction};
use std::path::Path;
use std::time::Duration;

use crate::content::ContentSource;
use crate::error::{DbError, Result};
use crate::settings::{non_empty, SettingChange, SettingKey, SettingsStore};
use crate::tasks::{next_run, QueuedTask, Recurrence, Task, TaskQueue, TaskStatus};
use crate::types::Content;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes work on both Windows and Unix; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    /// Private in-memory database; a single connection so every query sees
    /// the same data
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(DbError::SqlxError)?;

        Self::migrate(pool).await
    }

    async fn migrate(pool: SqlitePool) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    async fn apply_changes(
        tx: &mut Transaction<'_, Sqlite>,
        changes: &[SettingChange<'_>],
    ) -> Result<()> {
        let now = Utc::now().timestamp();
        for change in changes {
            match *change {
                SettingChange::Set(key, value) => {
                    sqlx::query(
                        r#"
                        INSERT INTO settings (key, value, updated_at) VALUES (?, ?, ?)
                        ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                        "#,
                    )
                    .bind(key.as_str())
                    .bind(value)
                    .bind(now)
                    .execute(&mut **tx)
                    .await
                    .map_err(DbError::SqlxError)?;
                }
                SettingChange::Clear(key) => {
                    sqlx::query("DELETE FROM settings WHERE key = ?")
                        .bind(key.as_str())
                        .execute(&mut **tx)
                        .await
                        .map_err(DbError::SqlxError)?;
                }
            }
        }
        Ok(())
    }

    async fn set_task_status(&self, id: &str, status: TaskStatus, error: Option<&str>) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET status = ?, last_error = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(DbError::CorruptRow(format!("task {} not found", id)).into());
        }
        Ok(())
    }
}

fn timestamp_to_datetime(secs: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DbError::CorruptRow(format!("{} out of range: {}", column, secs)).into())
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> Result<QueuedTask> {
    let payload: String = row.get("payload");
    let name: Option<String> = row.get("name");
    let interval_secs: Option<i64> = row.get("interval_secs");
    let status: String = row.get("status");

    let recurrence = match (name, interval_secs) {
        (Some(name), Some(secs)) => Some(Recurrence {
            name,
            interval: Duration::from_secs(secs.max(0) as u64),
        }),
        _ => None,
    };

    Ok(QueuedTask {
        id: row.get("id"),
        task: Task::from_payload(&payload)?,
        run_at: timestamp_to_datetime(row.get("run_at"), "run_at")?,
        recurrence,
        status: TaskStatus::parse(&status)
            .ok_or_else(|| DbError::CorruptRow(format!("unknown task status: {}", status)))?,
        last_error: row.get("last_error"),
    })
}

#[async_trait]
impl SettingsStore for Database {
    async fn get(&self, key: SettingKey) -> Result<Option<String>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(non_empty(value))
    }

    async fn write(&self, changes: &[SettingChange<'_>]) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;
        Self::apply_changes(&mut tx, changes).await?;
        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn write_if(
        &self,
        key: SettingKey,
        expected: Option<&str>,
        changes: &[SettingChange<'_>],
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
                .bind(key.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(DbError::SqlxError)?;

        if non_empty(current).as_deref() != expected {
            tx.rollback().await.map_err(DbError::SqlxError)?;
            return Ok(false);
        }

        Self::apply_changes(&mut tx, changes).await?;
        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(true)
    }
}

#[async_trait]
impl ContentSource for Database {
    async fn get_content(&self, id: &str) -> Result<Option<Content>> {
        let row = sqlx::query(
            r#"
            SELECT id, title, excerpt, body, permalink, shortlink, published_at
            FROM content WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(|r| -> Result<Content> {
            Ok(Content {
                id: r.get("id"),
                title: r.get("title"),
                excerpt: r.get("excerpt"),
                body: r.get("body"),
                permalink: r.get("permalink"),
                shortlink: r.get("shortlink"),
                published_at: timestamp_to_datetime(r.get("published_at"), "published_at")?,
            })
        })
        .transpose()
    }

    async fn put_content(&self, content: &Content) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO content (id, title, excerpt, body, permalink, shortlink, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                excerpt = excluded.excerpt,
                body = excluded.body,
                permalink = excluded.permalink,
                shortlink = excluded.shortlink,
                published_at = excluded.published_at
            "#,
        )
        .bind(&content.id)
        .bind(&content.title)
        .bind(&content.excerpt)
        .bind(&content.body)
        .bind(&content.permalink)
        .bind(&content.shortlink)
        .bind(content.published_at.timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

#[async_trait]
impl TaskQueue for Database {
    async fn schedule_once(&self, task: Task, run_at: DateTime<Utc>) -> Result<String> {
        let id = uuid::Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO tasks (id, name, payload, run_at, interval_secs, status, created_at)
            VALUES (?, NULL, ?, ?, NULL, 'pending', ?)
            "#,
        )
        .bind(&id)
        .bind(task.to_payload()?)
        .bind(run_at.timestamp())
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(id)
    }

    async fn schedule_recurring(
        &self,
        name: &str,
        task: Task,
        interval: Duration,
        first_run: DateTime<Utc>,
    ) -> Result<bool> {
        let interval_secs = i64::try_from(interval.as_secs()).unwrap_or(i64::MAX);

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (id, name, payload, run_at, interval_secs, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'pending', ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(name)
        .bind(task.to_payload()?)
        .bind(first_run.timestamp())
        .bind(interval_secs)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cancel_recurring(&self, name: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<QueuedTask>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, payload, run_at, interval_secs, status, last_error
            FROM tasks
            WHERE status = 'pending' AND run_at <= ?
            ORDER BY run_at ASC, rowid ASC
            "#,
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut due = Vec::with_capacity(rows.len());
        for row in &rows {
            match row_to_task(row) {
                Ok(task) => due.push(task),
                Err(e) => {
                    // Fail the row so it stops coming back on every poll
                    let id: String = row.get("id");
                    tracing::warn!(task_id = %id, error = %e, "undecodable task marked failed");
                    let reason = e.to_string();
                    if let Err(e) = self.set_task_status(&id, TaskStatus::Failed, Some(&reason)).await {
                        tracing::error!(task_id = %id, error = %e, "failed to mark undecodable task");
                    }
                }
            }
        }
        Ok(due)
    }

    async fn claim(&self, task: &QueuedTask, now: DateTime<Utc>) -> Result<bool> {
        let result = match &task.recurrence {
            Some(recurrence) => sqlx::query(
                "UPDATE tasks SET run_at = ? WHERE id = ? AND status = 'pending' AND run_at = ?",
            )
            .bind(next_run(now, recurrence.interval).timestamp())
            .bind(&task.id)
            .bind(task.run_at.timestamp()),
            None => sqlx::query("UPDATE tasks SET status = 'running' WHERE id = ? AND status = 'pending'")
                .bind(&task.id),
        }
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() == 1)
    }

    async fn complete(&self, id: &str) -> Result<()> {
        self.set_task_status(id, TaskStatus::Done, None).await
    }

    async fn fail(&self, id: &str, error: &str) -> Result<()> {
        self.set_task_status(id, TaskStatus::Failed, Some(error)).await
    }

    async fn reschedule(
        &self,
        id: &str,
        run_at: DateTime<Utc>,
        error: Option<&str>,
    ) -> Result<()> {
        sqlx::query("UPDATE tasks SET run_at = ?, last_error = ? WHERE id = ?")
            .bind(run_at.timestamp())
            .bind(error)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn list(&self) -> Result<Vec<QueuedTask>> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, payload, run_at, interval_secs, status, last_error
            FROM tasks
            ORDER BY run_at ASC, rowid ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .filter_map(|row| match row_to_task(row) {
                Ok(task) => Some(task),
                Err(e) => {
                    tracing::warn!(error = %e, "skipping undecodable task");
                    None
                }
            })
            .collect())
    }
}
