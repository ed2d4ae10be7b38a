//! Batch submission and status handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use mailscout_common::{
    batch::RawContact,
    db::models::{BatchJob, SearchRecord},
    errors::{AppError, Result},
};

fn default_file_name() -> String {
    "batch".to_string()
}

/// Request to start a batch job
#[derive(Debug, Deserialize, Validate)]
pub struct BatchRequest {
    #[validate(length(min = 1, max = 255))]
    #[serde(default = "default_file_name", alias = "fileName")]
    pub file_name: String,

    /// Empty lists are rejected by the runner, not here
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub contacts: Vec<RawContact>,
}

/// Response after accepting a batch
#[derive(Serialize)]
pub struct BatchAcceptedResponse {
    pub batch_id: Uuid,
    pub status: String,
    pub total_records: i32,
    pub poll_url: String,
}

/// Batch job status
#[derive(Serialize)]
pub struct BatchResponse {
    pub batch_id: Uuid,
    pub file_name: String,
    pub status: String,
    pub total_records: i32,
    pub processed_records: i32,
    pub successful_records: i32,
    pub progress_percent: f64,
    pub is_terminal: bool,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

impl From<BatchJob> for BatchResponse {
    fn from(job: BatchJob) -> Self {
        Self {
            batch_id: job.id,
            progress_percent: job.progress_percent(),
            is_terminal: job.is_terminal(),
            file_name: job.file_name,
            status: job.status,
            total_records: job.total_records,
            processed_records: job.processed_records,
            successful_records: job.successful_records,
            created_at: job.created_at.to_rfc3339(),
            completed_at: job.completed_at.map(|dt| dt.to_rfc3339()),
        }
    }
}

#[derive(Serialize)]
pub struct BatchResultsResponse {
    pub batch_id: Uuid,
    pub records: Vec<SearchRecord>,
}

/// Accept a batch and process it in the background
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<(StatusCode, Json<BatchAcceptedResponse>)> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let submitted = state.runner.submit(request.file_name, request.contacts).await?;
    let job = submitted.job;

    tracing::info!(
        batch_id = %job.id,
        file_name = %job.file_name,
        total_records = job.total_records,
        "Batch submitted"
    );

    Ok((StatusCode::ACCEPTED, Json(BatchAcceptedResponse {
        batch_id: job.id,
        status: job.status,
        total_records: job.total_records,
        poll_url: format!("/api/batch/{}", job.id),
    })))
}

/// Get batch job status
pub async fn get_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchResponse>> {
    let job = state
        .store
        .get_batch_job(batch_id)
        .await?
        .ok_or_else(|| AppError::BatchNotFound {
            id: batch_id.to_string(),
        })?;

    Ok(Json(job.into()))
}

/// Records produced so far by a batch, most recent first
pub async fn get_batch_results(
    State(state): State<AppState>,
    Path(batch_id): Path<Uuid>,
) -> Result<Json<BatchResultsResponse>> {
    if state.store.get_batch_job(batch_id).await?.is_none() {
        return Err(AppError::BatchNotFound {
            id: batch_id.to_string(),
        });
    }

    let records = state.store.list_search_records_by_batch(batch_id).await?;

    Ok(Json(BatchResultsResponse { batch_id, records }))
}
