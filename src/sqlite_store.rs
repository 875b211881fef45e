//! SQLite-backed [`TaskStore`] implementation.
//!
//! One row per task in the `analyses` table. The subject and job contexts
//! are stored as JSON text; timestamps as Unix milliseconds.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use cv_analyzer_core::models::{AnalysisTask, TaskOutcome, TaskStatus};
use cv_analyzer_core::store::{check_transition, TaskStore};

/// SQLite implementation of the [`TaskStore`] trait.
pub struct SqliteTaskStore {
    pool: SqlitePool,
}

impl SqliteTaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).with_context(|| format!("invalid timestamp {}", ms))
}

fn row_to_task(row: &SqliteRow) -> Result<AnalysisTask> {
    let status: String = row.get("status");
    let user_details: String = row.get("user_details");
    let job_details: String = row.get("job_details");

    Ok(AnalysisTask {
        id: row.get("uuid"),
        status: status.parse()?,
        document_ref: row.get("cv_path"),
        subject: serde_json::from_str(&user_details).context("corrupt user_details column")?,
        job: serde_json::from_str(&job_details).context("corrupt job_details column")?,
        report: row.get("report"),
        failure_reason: row.get("failure_reason"),
        created_at: from_millis(row.get("created_at"))?,
        updated_at: from_millis(row.get("updated_at"))?,
    })
}

#[async_trait]
impl TaskStore for SqliteTaskStore {
    async fn insert(&self, task: &AnalysisTask) -> Result<()> {
        if task.status != TaskStatus::Pending {
            bail!("new task {} must be pending, got {}", task.id, task.status);
        }

        sqlx::query(
            r#"
            INSERT INTO analyses (uuid, status, report, user_details, job_details,
                                  cv_path, failure_reason, created_at, updated_at)
            VALUES (?, ?, NULL, ?, ?, ?, NULL, ?, ?)
            "#,
        )
        .bind(&task.id)
        .bind(task.status.as_str())
        .bind(serde_json::to_string(&task.subject)?)
        .bind(serde_json::to_string(&task.job)?)
        .bind(&task.document_ref)
        .bind(to_millis(&task.created_at))
        .bind(to_millis(&task.updated_at))
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert task {}", task.id))?;

        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<AnalysisTask>> {
        let row = sqlx::query(
            r#"
            SELECT uuid, status, report, user_details, job_details, cv_path,
                   failure_reason, created_at, updated_at
            FROM analyses
            WHERE uuid = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_task).transpose()
    }

    async fn transition(
        &self,
        id: &str,
        from: TaskStatus,
        to: TaskStatus,
        outcome: Option<&TaskOutcome>,
    ) -> Result<bool> {
        check_transition(from, to, outcome)?;

        let (report, reason) = match outcome {
            Some(TaskOutcome::Completed { report }) => (Some(report.as_str()), None),
            Some(TaskOutcome::Failed { reason }) => (None, Some(reason.as_str())),
            None => (None, None),
        };

        // The `status = ?` guard makes this a compare-and-set.
        let result = sqlx::query(
            r#"
            UPDATE analyses
            SET status = ?, report = ?, failure_reason = COALESCE(?, failure_reason),
                updated_at = ?
            WHERE uuid = ? AND status = ?
            "#,
        )
        .bind(to.as_str())
        .bind(report)
        .bind(reason)
        .bind(to_millis(&Utc::now()))
        .bind(id)
        .bind(from.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT uuid FROM analyses WHERE status = ? ORDER BY created_at, id")
            .bind(status.as_str())
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.iter().map(|r| r.get("uuid")).collect())
    }
}
