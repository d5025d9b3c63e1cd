use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::errors::AppError;
use crate::jobs::model::JobStatusView;
use crate::state::AppState;

fn default_max_attempts() -> i32 {
    3
}

#[derive(Deserialize)]
pub struct EnqueueRequest {
    pub user_id: String,
    pub job_type: String,
    #[serde(default)]
    pub input: Value,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: i32,
}

#[derive(Serialize)]
pub struct EnqueueResponse {
    pub job_id: Uuid,
    pub status: &'static str,
}

/// POST /api/v1/jobs
/// Creates a pending job and returns its id immediately; the worker picks
/// it up out of band.
pub async fn handle_enqueue(
    State(state): State<AppState>,
    Json(req): Json<EnqueueRequest>,
) -> Result<(StatusCode, Json<EnqueueResponse>), AppError> {
    if req.max_attempts < 1 {
        return Err(AppError::Validation(
            "max_attempts must be at least 1".to_string(),
        ));
    }
    // Reject job types nothing can process instead of letting them fail
    // at dispatch time.
    if state.registry.lookup(&req.job_type).is_none() {
        return Err(AppError::Validation(format!(
            "unknown job type '{}'",
            req.job_type
        )));
    }

    let job_id = state
        .jobs
        .enqueue(&req.job_type, &req.user_id, req.input, req.max_attempts)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EnqueueResponse {
            job_id,
            status: "pending",
        }),
    ))
}

/// GET /api/v1/jobs/:id
/// Status poll. A failed job is reported here with its error message,
/// never as an unhandled 500.
pub async fn handle_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusView>, AppError> {
    let view = state
        .jobs
        .get_status(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Job {id} not found")))?;
    Ok(Json(view))
}
