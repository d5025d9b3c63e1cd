//! In-memory [`JobStore`] used by tests. Mirrors the semantics of
//! `PgJobStore` exactly: FIFO claims, attempt bookkeeping, terminal-write
//! rejection, and retention-based cleanup. Exclusivity comes from holding
//! the store mutex for the whole claim.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use crate::jobs::model::{Job, JobStatus, JobStatusView, QueueError};
use crate::jobs::store::JobStore;

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    /// Insertion order, so claims are FIFO even when timestamps collide.
    order: Vec<Uuid>,
}

#[derive(Default)]
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: mutate a stored job in place (e.g. to age a row or
    /// requeue a stranded one).
    pub fn with_job_mut<F: FnOnce(&mut Job)>(&self, id: Uuid, f: F) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            f(job);
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn enqueue(
        &self,
        job_type: &str,
        user_id: &str,
        input_data: Value,
        max_attempts: i32,
    ) -> Result<Uuid, QueueError> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let job = Job {
            id,
            user_id: user_id.to_string(),
            job_type: job_type.to_string(),
            status: JobStatus::Pending,
            progress: 0,
            message: Some("Queued".to_string()),
            input_data: Some(input_data),
            result_data: None,
            error_message: None,
            attempts: 0,
            max_attempts,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut inner = self.inner.lock().unwrap();
        inner.jobs.insert(id, job);
        inner.order.push(id);
        Ok(id)
    }

    async fn get_status(&self, id: Uuid) -> Result<Option<JobStatusView>, QueueError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.jobs.get(&id).map(JobStatusView::from_job))
    }

    async fn claim_next(&self, job_type: Option<&str>) -> Result<Option<Job>, QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let candidate = inner.order.iter().copied().find(|id| {
            inner.jobs.get(id).is_some_and(|job| {
                job.status == JobStatus::Pending
                    && job.attempts < job.max_attempts
                    && job_type.map_or(true, |t| job.job_type == t)
            })
        });

        let Some(id) = candidate else {
            return Ok(None);
        };

        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        job.status = JobStatus::Processing;
        job.attempts += 1;
        job.updated_at = Utc::now();
        Ok(Some(job.clone()))
    }

    async fn update_progress(
        &self,
        id: Uuid,
        progress: i32,
        message: &str,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(job) = inner.jobs.get_mut(&id) {
            if !job.status.is_terminal() {
                job.progress = progress.clamp(0, 100);
                job.message = Some(message.to_string());
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn complete_job(&self, id: Uuid, result_data: Value) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal {
                id,
                status: job.status,
            });
        }
        let now = Utc::now();
        job.status = JobStatus::Completed;
        job.progress = 100;
        job.message = Some("Completed".to_string());
        job.result_data = Some(result_data);
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(())
    }

    async fn fail_job(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().unwrap();
        let job = inner.jobs.get_mut(&id).ok_or(QueueError::NotFound(id))?;
        if job.status.is_terminal() {
            return Err(QueueError::AlreadyTerminal {
                id,
                status: job.status,
            });
        }
        let now = Utc::now();
        job.status = JobStatus::Failed;
        job.message = Some("Failed".to_string());
        job.error_message = Some(error.to_string());
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(())
    }

    async fn cleanup_old(&self, max_age: chrono::Duration) -> Result<u64, QueueError> {
        let cutoff = Utc::now() - max_age;
        let mut inner = self.inner.lock().unwrap();
        let doomed: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|job| {
                job.status.is_terminal() && job.completed_at.unwrap_or(job.created_at) < cutoff
            })
            .map(|job| job.id)
            .collect();

        for id in &doomed {
            inner.jobs.remove(id);
        }
        inner.order.retain(|id| !doomed.contains(id));
        Ok(doomed.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn happy_path_enqueue_claim_complete() {
        let store = MemoryJobStore::new();
        let id = store.enqueue("demo", "u1", json!({"x": 1}), 3).await.unwrap();

        let job = store.claim_next(None).await.unwrap().expect("one job");
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.attempts, 1);

        store.complete_job(id, json!({"y": 2})).await.unwrap();

        let view = store.get_status(id).await.unwrap().expect("exists");
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.progress, 100);
        assert_eq!(view.result, Some(json!({"y": 2})));
        assert!(view.error.is_none());
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_writes() {
        let store = MemoryJobStore::new();
        let id = store.enqueue("demo", "u1", json!({}), 3).await.unwrap();
        store.claim_next(None).await.unwrap();
        store.complete_job(id, json!({"ok": true})).await.unwrap();

        assert!(matches!(
            store.complete_job(id, json!({"ok": false})).await,
            Err(QueueError::AlreadyTerminal { .. })
        ));
        assert!(matches!(
            store.fail_job(id, "late failure").await,
            Err(QueueError::AlreadyTerminal { .. })
        ));

        // State untouched by the rejected writes.
        let view = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Completed);
        assert_eq!(view.result, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn attempts_track_claims_and_gate_eligibility() {
        let store = MemoryJobStore::new();
        let id = store.enqueue("demo", "u1", json!({}), 2).await.unwrap();

        for expected in 1..=2 {
            let job = store.claim_next(None).await.unwrap().expect("claimable");
            assert_eq!(job.attempts, expected);
            // Simulate a stranded job being requeued by an operator.
            store.with_job_mut(id, |j| j.status = JobStatus::Pending);
        }

        // Still pending but attempts == max_attempts: no longer claimable.
        assert!(store.claim_next(None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_are_fifo_and_filter_by_type() {
        let store = MemoryJobStore::new();
        let a = store.enqueue("alpha", "u1", json!({}), 3).await.unwrap();
        let b = store.enqueue("beta", "u1", json!({}), 3).await.unwrap();
        let c = store.enqueue("alpha", "u1", json!({}), 3).await.unwrap();

        let first = store.claim_next(Some("beta")).await.unwrap().unwrap();
        assert_eq!(first.id, b);

        let second = store.claim_next(None).await.unwrap().unwrap();
        assert_eq!(second.id, a);
        let third = store.claim_next(None).await.unwrap().unwrap();
        assert_eq!(third.id, c);
    }

    #[tokio::test]
    async fn concurrent_claimants_each_get_a_distinct_job() {
        let store = Arc::new(MemoryJobStore::new());
        for _ in 0..3 {
            store.enqueue("demo", "u1", json!({}), 3).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                store.claim_next(None).await.unwrap()
            }));
        }

        let mut claimed = Vec::new();
        let mut empty = 0;
        for task in tasks {
            match task.await.unwrap() {
                Some(job) => claimed.push(job.id),
                None => empty += 1,
            }
        }

        claimed.sort();
        claimed.dedup();
        assert_eq!(claimed.len(), 3);
        assert_eq!(empty, 7);
    }

    #[tokio::test]
    async fn progress_is_last_write_wins_and_never_resurrects() {
        let store = MemoryJobStore::new();
        let id = store.enqueue("demo", "u1", json!({}), 3).await.unwrap();
        store.claim_next(None).await.unwrap();

        store.update_progress(id, 50, "halfway").await.unwrap();
        store.update_progress(id, 30, "recount").await.unwrap();
        let view = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(view.progress, 30);

        store.fail_job(id, "boom").await.unwrap();
        store.update_progress(id, 10, "too late").await.unwrap();
        let view = store.get_status(id).await.unwrap().unwrap();
        assert_eq!(view.status, JobStatus::Failed);
        assert_eq!(view.error, Some("boom".to_string()));
    }

    #[tokio::test]
    async fn progress_is_clamped() {
        let store = MemoryJobStore::new();
        let id = store.enqueue("demo", "u1", json!({}), 3).await.unwrap();
        store.claim_next(None).await.unwrap();

        store.update_progress(id, 150, "over").await.unwrap();
        assert_eq!(store.get_status(id).await.unwrap().unwrap().progress, 100);
        store.update_progress(id, -5, "under").await.unwrap();
        assert_eq!(store.get_status(id).await.unwrap().unwrap().progress, 0);
    }

    #[tokio::test]
    async fn cleanup_deletes_only_old_terminal_jobs() {
        let store = MemoryJobStore::new();
        let old = store.enqueue("demo", "u1", json!({}), 3).await.unwrap();
        let fresh = store.enqueue("demo", "u1", json!({}), 3).await.unwrap();
        let running = store.enqueue("demo", "u1", json!({}), 3).await.unwrap();

        store.claim_next(None).await.unwrap();
        store.complete_job(old, json!({})).await.unwrap();
        store.claim_next(None).await.unwrap();
        store.complete_job(fresh, json!({})).await.unwrap();
        store.claim_next(None).await.unwrap();

        store.with_job_mut(old, |j| {
            j.completed_at = Some(Utc::now() - chrono::Duration::hours(100));
        });

        let deleted = store.cleanup_old(chrono::Duration::hours(72)).await.unwrap();
        assert_eq!(deleted, 1);
        assert!(store.get_status(old).await.unwrap().is_none());
        assert!(store.get_status(fresh).await.unwrap().is_some());
        assert!(store.get_status(running).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn get_status_returns_none_for_unknown_id() {
        let store = MemoryJobStore::new();
        assert!(store.get_status(Uuid::new_v4()).await.unwrap().is_none());
    }
}
