use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use thiserror::Error;
use uuid::Uuid;

/// Job lifecycle: pending → processing → completed | failed.
/// Terminal rows (`completed`, `failed`) are never mutated again, only
/// deleted by the cleanup sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("unknown job status: {0}")]
pub struct ParseStatusError(String);

impl std::str::FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

impl TryFrom<String> for JobStatus {
    type Error = ParseStatusError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

/// One row of the `async_jobs` table — the unit of asynchronous work.
///
/// Lifecycle fields are owned exclusively by the [`JobStore`]; handlers own
/// only the contents of `input_data` / `result_data`.
///
/// [`JobStore`]: crate::jobs::store::JobStore
#[derive(Debug, Clone, FromRow)]
pub struct Job {
    pub id: Uuid,
    pub user_id: String,
    pub job_type: String,
    #[sqlx(try_from = "String")]
    pub status: JobStatus,
    pub progress: i32,
    pub message: Option<String>,
    pub input_data: Option<Value>,
    pub result_data: Option<Value>,
    pub error_message: Option<String>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// The caller-facing view of a job returned by status polls.
/// `result` is present only once completed; `error` only once failed.
#[derive(Debug, Serialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: i32,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatusView {
    pub fn from_job(job: &Job) -> Self {
        JobStatusView {
            job_id: job.id,
            status: job.status,
            progress: job.progress,
            message: job.message.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
            result: match job.status {
                JobStatus::Completed => job.result_data.clone(),
                _ => None,
            },
            error: match job.status {
                JobStatus::Failed => job.error_message.clone(),
                _ => None,
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// Terminal jobs reject further complete/fail calls rather than
    /// silently rewriting history.
    #[error("job {id} is already {status}")]
    AlreadyTerminal { id: Uuid, status: JobStatus },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<JobStatus>().ok(), Some(status));
        }
        assert!("cancelled".parse::<JobStatus>().is_err());
    }

    #[test]
    fn view_hides_result_until_completed() {
        let mut job = Job {
            id: Uuid::new_v4(),
            user_id: "u1".into(),
            job_type: "demo".into(),
            status: JobStatus::Processing,
            progress: 40,
            message: Some("working".into()),
            input_data: None,
            result_data: Some(serde_json::json!({"y": 2})),
            error_message: None,
            attempts: 1,
            max_attempts: 3,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
        };

        assert!(JobStatusView::from_job(&job).result.is_none());

        job.status = JobStatus::Completed;
        let view = JobStatusView::from_job(&job);
        assert_eq!(view.result, Some(serde_json::json!({"y": 2})));
        assert!(view.error.is_none());
    }
}
