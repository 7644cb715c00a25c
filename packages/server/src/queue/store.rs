//! Transactional persistence for applications, api keys and tasks.
//!
//! All task mutations run in explicit transactions. Concurrent claims of the
//! same attempt are serialised by the retry-count predicate in the UPDATE's
//! WHERE clause: exactly one claim per (id, retry_count) pair can succeed.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use sqlx::PgPool;

use crate::common::generate_api_key;
use crate::config::DueConfig;
use crate::queue::application::{ApiKey, Application};
use crate::queue::due::{DuePolicy, StatusPolicy};
use crate::queue::task::{NewTask, Task, TaskStatus};

const APP_COLUMNS: &str = "id, created, modified, version, is_active, is_deleted, \
     activated, deactivated, deleted, undeleted, name";

const KEY_COLUMNS: &str = "id, created, modified, version, is_active, is_deleted, \
     activated, deactivated, deleted, undeleted, app_id, value";

const TASK_COLUMNS: &str = "id, created, modified, version, app_id, retry_count, timeout, \
     due, status, url, charset, enctype, headers, body, method";

/// Store for the task lifecycle engine.
///
/// Holds the connection pool together with the due/status policies so that
/// every write path recomputes `due` and `status` the same way.
#[derive(Clone)]
pub struct TaskStore {
    pool: PgPool,
    due: DuePolicy,
    status: StatusPolicy,
}

impl TaskStore {
    pub fn new(pool: PgPool, config: DueConfig) -> Self {
        Self {
            pool,
            due: DuePolicy::new(config.clone()),
            status: StatusPolicy::new(config),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn due_policy(&self) -> &DuePolicy {
        &self.due
    }

    /// Create a named application with one auto-generated active api key.
    pub async fn create_application(&self, name: &str) -> Result<(Application, ApiKey)> {
        let mut tx = self.pool.begin().await?;

        let app = sqlx::query_as::<_, Application>(&format!(
            "INSERT INTO torque_applications (name, activated)
             VALUES ($1, NOW())
             RETURNING {APP_COLUMNS}"
        ))
        .bind(name)
        .fetch_one(&mut *tx)
        .await?;

        let key = sqlx::query_as::<_, ApiKey>(&format!(
            "INSERT INTO torque_api_keys (app_id, value, activated)
             VALUES ($1, $2, NOW())
             RETURNING {KEY_COLUMNS}"
        ))
        .bind(app.id)
        .bind(generate_api_key())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok((app, key))
    }

    /// Create a task with retry_count 0 and a freshly computed due/status.
    ///
    /// The row is durable once this returns; notification happens afterwards.
    pub async fn create_task(&self, new: NewTask) -> Result<Task> {
        let due = self.due.due(new.timeout, 0);
        let status = self.status.status(0);

        let task = sqlx::query_as::<_, Task>(&format!(
            "INSERT INTO torque_tasks
                 (app_id, retry_count, timeout, due, status, url, charset, enctype, headers, body, method)
             VALUES ($1, 0, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(new.app_id)
        .bind(new.timeout)
        .bind(due)
        .bind(status)
        .bind(&new.url)
        .bind(&new.charset)
        .bind(&new.enctype)
        .bind(&new.headers)
        .bind(&new.body)
        .bind(new.method)
        .fetch_one(&self.pool)
        .await?;

        Ok(task)
    }

    /// Resolve an api-key token to its active owning application.
    pub async fn lookup_application_by_key(&self, token: &str) -> Result<Option<Application>> {
        let app = sqlx::query_as::<_, Application>(
            "SELECT a.id, a.created, a.modified, a.version, a.is_active, a.is_deleted,
                    a.activated, a.deactivated, a.deleted, a.undeleted, a.name
             FROM torque_applications a
             JOIN torque_api_keys k ON k.app_id = a.id
             WHERE a.is_active AND NOT a.is_deleted
               AND k.is_active AND NOT k.is_deleted
               AND k.value = $1
             LIMIT 1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(app)
    }

    pub async fn lookup_task(&self, id: i64) -> Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM torque_tasks WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// All active api-key token values for an application.
    pub async fn lookup_active_key_values(&self, app_id: i64) -> Result<Vec<String>> {
        let values = sqlx::query_scalar::<_, String>(
            "SELECT value FROM torque_api_keys
             WHERE is_active AND NOT is_deleted AND app_id = $1",
        )
        .bind(app_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(values)
    }

    /// Pending tasks whose due instant has passed.
    pub async fn get_due_tasks(&self, limit: i64, offset: i64) -> Result<Vec<Task>> {
        let tasks = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM torque_tasks
             WHERE status = 'PENDING' AND due < NOW()
             ORDER BY id
             LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    /// Bulk-delete tasks last modified more than `delta` ago.
    pub async fn delete_tasks_older_than(&self, delta: Duration) -> Result<u64> {
        let cutoff: DateTime<Utc> = Utc::now() - delta;
        let result = sqlx::query("DELETE FROM torque_tasks WHERE modified < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    /// Transactionally claim the task with matching id AND retry count,
    /// advancing its retry count and recomputing due/status.
    ///
    /// Returns a snapshot of the row after the update, or None when the
    /// attempt has already been claimed (or the id is unknown). A duplicate
    /// instruction therefore finds nothing to do.
    pub async fn claim(&self, id: i64, retry_count: i32) -> Result<Option<Task>> {
        let mut tx = self.pool.begin().await?;

        let timeout = sqlx::query_scalar::<_, i32>(
            "SELECT timeout FROM torque_tasks
             WHERE id = $1 AND retry_count = $2
             FOR UPDATE",
        )
        .bind(id)
        .bind(retry_count)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(timeout) = timeout else {
            tx.rollback().await?;
            return Ok(None);
        };

        let next_retry_count = retry_count + 1;
        let due = self.due.due(timeout, next_retry_count);
        let status = self.status.status(next_retry_count);

        let task = sqlx::query_as::<_, Task>(&format!(
            "UPDATE torque_tasks
             SET retry_count = $3, due = $4, status = $5, modified = NOW(), version = version + 1
             WHERE id = $1 AND retry_count = $2
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(id)
        .bind(retry_count)
        .bind(next_retry_count)
        .bind(due)
        .bind(status)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(task))
    }

    /// Reschedule a claimed task: recompute due with timeout 0 so the next
    /// attempt is accelerated past the natural retry window.
    pub async fn reschedule(&self, task: &Task) -> Result<bool> {
        let due = self.due.due(0, task.retry_count);
        let status = self.status.status(task.retry_count);
        self.conditional_update(task.id, task.retry_count, due, status)
            .await
    }

    /// Mark a claimed task completed.
    pub async fn complete(&self, task: &Task) -> Result<bool> {
        let due = self.due.due(task.timeout, task.retry_count);
        self.conditional_update(task.id, task.retry_count, due, TaskStatus::Completed)
            .await
    }

    /// Mark a claimed task failed.
    pub async fn fail(&self, task: &Task) -> Result<bool> {
        let due = self.due.due(task.timeout, task.retry_count);
        self.conditional_update(task.id, task.retry_count, due, TaskStatus::Failed)
            .await
    }

    /// Update the row only while its retry count still matches and it has
    /// not reached a terminal status. A false return means another worker
    /// advanced the task, or an earlier transition already landed.
    async fn conditional_update(
        &self,
        id: i64,
        expected_retry_count: i32,
        due: DateTime<Utc>,
        status: TaskStatus,
    ) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "UPDATE torque_tasks
             SET due = $3, status = $4, modified = NOW(), version = version + 1
             WHERE id = $1 AND retry_count = $2 AND status = 'PENDING'",
        )
        .bind(id)
        .bind(expected_retry_count)
        .bind(due)
        .bind(status)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }
}
