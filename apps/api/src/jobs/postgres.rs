use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, JobStatusView, QueueError};
use crate::jobs::store::JobStore;

/// Durable, crash-safe job store backed by the `async_jobs` table.
///
/// Claim exclusivity comes from `FOR UPDATE SKIP LOCKED`: a row locked by
/// one claimant's transaction is invisible to every other concurrent
/// claimant, so no two workers can return the same pending job.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguishes "not found" from "already terminal" after a guarded
    /// UPDATE matched zero rows.
    async fn terminal_write_error(&self, id: Uuid) -> QueueError {
        let status: Result<Option<String>, sqlx::Error> =
            sqlx::query_scalar("SELECT status FROM async_jobs WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;

        match status {
            Ok(Some(s)) => match s.parse::<JobStatus>() {
                Ok(status) if status.is_terminal() => QueueError::AlreadyTerminal { id, status },
                _ => QueueError::NotFound(id),
            },
            Ok(None) => QueueError::NotFound(id),
            Err(e) => QueueError::Storage(e),
        }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn enqueue(
        &self,
        job_type: &str,
        user_id: &str,
        input_data: Value,
        max_attempts: i32,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO async_jobs
                (id, user_id, job_type, status, progress, message, input_data,
                 attempts, max_attempts, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', 0, 'Queued', $4, 0, $5, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(job_type)
        .bind(input_data)
        .bind(max_attempts)
        .execute(&self.pool)
        .await?;

        info!(job_id = %id, job_type, user_id, "job enqueued");
        Ok(id)
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<JobStatusView>, QueueError> {
        let job: Option<Job> = sqlx::query_as("SELECT * FROM async_jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job.as_ref().map(JobStatusView::from_job))
    }

    async fn claim_next(&self, job_type: Option<&str>) -> Result<Option<Job>, QueueError> {
        // Lock one eligible row, skipping rows locked by other claimants,
        // then flip it to processing in the same statement.
        let job: Option<Job> = sqlx::query_as(
            r#"
            WITH next_job AS (
                SELECT id FROM async_jobs
                WHERE status = 'pending'
                  AND attempts < max_attempts
                  AND ($1::text IS NULL OR job_type = $1)
                ORDER BY created_at
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE async_jobs
            SET status = 'processing',
                attempts = async_jobs.attempts + 1,
                updated_at = NOW()
            FROM next_job
            WHERE async_jobs.id = next_job.id
            RETURNING async_jobs.*
            "#,
        )
        .bind(job_type)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(job) = &job {
            info!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts, "job claimed");
        }
        Ok(job)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        progress: i32,
        message: &str,
    ) -> Result<(), QueueError> {
        // Last-write-wins and a no-op on terminal rows: a late progress
        // report must never resurrect a finished job.
        sqlx::query(
            r#"
            UPDATE async_jobs
            SET progress = $2, message = $3, status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(progress.clamp(0, 100))
        .bind(message)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result_data: Value) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE async_jobs
            SET status = 'completed', progress = 100, message = 'Completed',
                result_data = $2, completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(result_data)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.terminal_write_error(id).await);
        }
        info!(job_id = %id, "job completed");
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        let result = sqlx::query(
            r#"
            UPDATE async_jobs
            SET status = 'failed', message = 'Failed', error_message = $2,
                completed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status NOT IN ('completed', 'failed')
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.terminal_write_error(id).await);
        }
        tracing::error!(job_id = %id, error, "job failed");
        Ok(())
    }

    async fn cleanup_old(&self, max_age: chrono::Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - max_age;
        let result = sqlx::query(
            r#"
            DELETE FROM async_jobs
            WHERE status IN ('completed', 'failed')
              AND COALESCE(completed_at, created_at) < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            info!(deleted, "old jobs cleaned up");
        }
        Ok(deleted)
    }
}
