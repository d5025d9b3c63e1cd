use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatusView, QueueError};

/// Persistence surface of the job queue (the "Job Manager").
///
/// The store is the single source of truth for job state and the only
/// shared mutable resource between worker processes; all cross-worker
/// coordination goes through its locking primitive, never through
/// in-process memory.
///
/// Implementations must guarantee:
/// - `claim_next` exclusivity: two concurrent claimants never receive the
///   same job (Postgres: `SELECT ... FOR UPDATE SKIP LOCKED`).
/// - Oldest-first claim order within a job type.
/// - Terminal rows are immutable except for deletion by `cleanup_old`.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job and return its id.
    async fn enqueue(
        &self,
        job_type: &str,
        user_id: &str,
        input_data: Value,
        max_attempts: i32,
    ) -> Result<Uuid, QueueError>;

    /// Read-only status poll. `result` is populated only when completed,
    /// `error` only when failed.
    async fn get_status(&self, id: Uuid) -> Result<Option<JobStatusView>, QueueError>;

    /// Atomically claim the next eligible pending job (oldest first,
    /// optionally filtered by type): flips it to `processing`, increments
    /// `attempts`, and returns it. `None` when nothing is eligible.
    async fn claim_next(&self, job_type: Option<&str>) -> Result<Option<Job>, QueueError>;

    /// Set progress (clamped to 0–100) and message. Idempotent,
    /// last-write-wins; a terminal job is never resurrected.
    async fn update_progress(
        &self,
        id: Uuid,
        progress: i32,
        message: &str,
    ) -> Result<(), QueueError>;

    /// Mark completed with result data. Rejects with
    /// [`QueueError::AlreadyTerminal`] if the job already finished.
    async fn complete_job(&self, id: Uuid, result_data: Value) -> Result<(), QueueError>;

    /// Mark failed with an error message. Same terminal-overwrite rule as
    /// `complete_job`.
    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), QueueError>;

    /// Delete terminal jobs older than `max_age`; returns the count
    /// deleted. Safe to run concurrently with claims.
    async fn cleanup_old(&self, max_age: chrono::Duration) -> Result<u64, QueueError>;
}
