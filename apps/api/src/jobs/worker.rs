//! Background worker: polls the job store and dispatches claimed jobs to
//! registered handlers, with adaptive idle backoff. A separate task runs
//! the periodic cleanup sweep.
//!
//! Known limitation (kept from the original design): there is no
//! heartbeat or lease expiry, so a worker that crashes mid-job leaves
//! that job in `processing` with no automatic requeue.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::jobs::registry::HandlerRegistry;
use crate::jobs::store::JobStore;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Poll cadence while jobs are flowing.
    pub poll_interval: Duration,
    /// Ceiling for the idle backoff.
    pub max_idle_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_idle_interval: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tick {
    /// A job was claimed and dispatched.
    Worked,
    /// Nothing eligible in the queue.
    Idle,
    /// The store was unreachable; back off rather than crash-loop.
    StoreUnavailable,
}

pub struct Worker {
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        store: Arc<dyn JobStore>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            registry,
            config,
        }
    }

    /// Runs forever. Interval resets to `poll_interval` after a claim and
    /// grows by 1.5x up to `max_idle_interval` while idle; this bounds
    /// both job latency and storage polling load.
    pub async fn run(&self) {
        let mut interval = self.config.poll_interval;
        info!(poll_interval_ms = interval.as_millis() as u64, "worker started");

        loop {
            let tick = self.tick().await;
            interval = self.next_interval(interval, tick);
            tokio::time::sleep(interval).await;
        }
    }

    fn next_interval(&self, current: Duration, tick: Tick) -> Duration {
        match tick {
            Tick::Worked => self.config.poll_interval,
            Tick::Idle => current.mul_f64(1.5).min(self.config.max_idle_interval),
            Tick::StoreUnavailable => self.config.max_idle_interval,
        }
    }

    async fn tick(&self) -> Tick {
        let job = match self.store.claim_next(None).await {
            Ok(Some(job)) => job,
            Ok(None) => return Tick::Idle,
            Err(err) => {
                error!(error = %err, "failed to claim next job");
                return Tick::StoreUnavailable;
            }
        };

        let job_id = job.id;
        let job_type = job.job_type.clone();
        info!(
            job_id = %job_id,
            job_type = %job_type,
            user_id = %job.user_id,
            attempt = job.attempts,
            max_attempts = job.max_attempts,
            "dispatching job"
        );

        match self.registry.lookup(&job_type) {
            Some(handler) => {
                if let Err(err) = handler.run(self.store.clone(), job).await {
                    error!(job_id = %job_id, job_type, error = %err, "handler failed");
                    // Durably record the failure so a polling client can
                    // observe it; a fail_job error here usually means the
                    // handler already reported terminally itself.
                    if let Err(record_err) = self.store.fail_job(job_id, &err.to_string()).await {
                        warn!(job_id = %job_id, error = %record_err, "could not record job failure");
                    }
                }
            }
            None => {
                warn!(job_id = %job_id, job_type, "no handler registered");
                let message = format!("no handler registered for job type '{job_type}'");
                if let Err(record_err) = self.store.fail_job(job_id, &message).await {
                    warn!(job_id = %job_id, error = %record_err, "could not record job failure");
                }
            }
        }

        Tick::Worked
    }
}

/// Periodically deletes terminal jobs older than `retention`. Runs on a
/// long fixed cadence, independent of the worker's poll interval.
pub async fn cleanup_loop(store: Arc<dyn JobStore>, every: Duration, retention: chrono::Duration) {
    loop {
        tokio::time::sleep(every).await;
        match store.cleanup_old(retention).await {
            Ok(0) => {}
            Ok(deleted) => info!(deleted, "cleanup sweep removed old jobs"),
            Err(err) => error!(error = %err, "cleanup sweep failed"),
        }
    }
}
