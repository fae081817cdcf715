use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::store::types::GeneratePathInput;
use crate::core::submit::{SubmitError, submit_extend_path, submit_generate_path};
use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthUser;

#[derive(serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendPathRequest {
    #[serde(default)]
    pub path_id: String,
}

pub async fn generate_path_endpoint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<GeneratePathInput>,
) -> Response {
    match submit_generate_path(&state.store, &user.user_id, payload).await {
        Ok(job) => accepted(
            &job.id,
            "Learning path generation started. Poll the job for progress.",
        ),
        Err(e) => submit_error_response(e),
    }
}

pub async fn extend_path_endpoint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(payload): Json<ExtendPathRequest>,
) -> Response {
    match submit_extend_path(&state.store, &user.user_id, &payload.path_id).await {
        Ok(job) => accepted(
            &job.id,
            "Path extension started. Poll the job for progress.",
        ),
        Err(e) => submit_error_response(e),
    }
}

fn accepted(job_id: &str, message: &str) -> Response {
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({
            "success": true,
            "jobId": job_id,
            "status": "pending",
            "message": message,
        })),
    )
        .into_response()
}

fn submit_error_response(err: SubmitError) -> Response {
    match err {
        SubmitError::Validation(msg) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "success": false, "error": msg })),
        )
            .into_response(),
        SubmitError::NotFound => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "success": false,
                "error": "Learning path not found or access denied",
            })),
        )
            .into_response(),
        SubmitError::AlreadyComplete { current, total } => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "success": false,
                "error": "Learning path is already complete",
                "currentLessons": current,
                "totalLessons": total,
            })),
        )
            .into_response(),
        SubmitError::Conflict { job_id } => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "success": false,
                "error": "Extension already in progress for this path",
                "jobId": job_id,
            })),
        )
            .into_response(),
        SubmitError::RateLimited(msg) => (
            StatusCode::TOO_MANY_REQUESTS,
            Json(serde_json::json!({ "success": false, "error": msg })),
        )
            .into_response(),
        SubmitError::Store(e) => {
            tracing::error!("Job submission failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": "Internal error" })),
            )
                .into_response()
        }
    }
}
