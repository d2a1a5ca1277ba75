use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::api::AppState;
use crate::db::models::ProfileData;
use crate::error::PlannerError;
use crate::services::jobs::{JobKind, JobPayload};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GenerateWorkoutRequest {
    pub job_id: Option<String>,
    pub custom_feedback: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegenerateWorkoutRequest {
    pub job_id: Option<String>,
    pub custom_feedback: Option<String>,
    pub profile_data: Option<ProfileData>,
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RegeneratePlanDayRequest {
    pub job_id: Option<String>,
    pub regeneration_reason: Option<String>,
    pub styles: Option<Vec<String>>,
    pub thread_id: Option<String>,
}

impl IntoResponse for PlannerError {
    fn into_response(self) -> Response {
        let status = match &self {
            PlannerError::ProfileNotFound(_) | PlannerError::PlanDayNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PlannerError::ProfileIncomplete(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PlannerError::InvalidParameter(_) => StatusCode::BAD_REQUEST,
            PlannerError::ActiveWorkoutConflict(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "request.failed");
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

pub async fn update_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(data): Json<ProfileData>,
) -> Result<impl IntoResponse, PlannerError> {
    let profile = state
        .jobs
        .service()
        .create_or_update_profile(user_id, &data)
        .await?;
    tracing::info!(user_id, "profile.saved");
    Ok(Json(profile))
}

pub async fn generate_workout(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<GenerateWorkoutRequest>,
) -> Result<impl IntoResponse, PlannerError> {
    let payload = JobPayload {
        user_id,
        job_id: request.job_id,
        custom_feedback: request.custom_feedback,
        timezone: request.timezone,
        ..JobPayload::default()
    };
    let record = state.jobs.enqueue(JobKind::GeneratePlan, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn regenerate_workout(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(request): Json<RegenerateWorkoutRequest>,
) -> Result<impl IntoResponse, PlannerError> {
    let payload = JobPayload {
        user_id,
        job_id: request.job_id,
        custom_feedback: request.custom_feedback,
        profile_data: request.profile_data,
        timezone: request.timezone,
        ..JobPayload::default()
    };
    let record = state.jobs.enqueue(JobKind::RegeneratePlan, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn regenerate_plan_day(
    State(state): State<AppState>,
    Path((user_id, plan_day_id)): Path<(i64, i64)>,
    Json(request): Json<RegeneratePlanDayRequest>,
) -> Result<impl IntoResponse, PlannerError> {
    let payload = JobPayload {
        user_id,
        job_id: request.job_id,
        plan_day_id: Some(plan_day_id),
        regeneration_reason: request.regeneration_reason,
        styles: request.styles,
        thread_id: request.thread_id,
        ..JobPayload::default()
    };
    let record = state.jobs.enqueue(JobKind::RegenerateDay, payload).await?;
    Ok((StatusCode::ACCEPTED, Json(record)))
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.jobs.status(&job_id).await {
        Some(record) => Json(record).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Job {} not found", job_id) })),
        )
            .into_response(),
    }
}
