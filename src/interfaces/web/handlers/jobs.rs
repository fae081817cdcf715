use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::interfaces::web::AppState;
use crate::interfaces::web::auth::AuthUser;

/// Job status lookup, scoped to the caller. Other users' jobs are
/// indistinguishable from missing ones.
pub async fn get_job_endpoint(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(job_id): Path<String>,
) -> Response {
    match state.store.get_job_for_user(&job_id, &user.user_id).await {
        Ok(Some(job)) => Json(serde_json::json!({
            "success": true,
            "job": {
                "id": job.id,
                "jobType": job.job_type.as_str(),
                "status": job.status.as_str(),
                "attempts": job.attempts,
                "maxAttempts": job.max_attempts,
                "inputData": job.input_data,
                "resultData": job.result_data,
                "errorMessage": job.error_message,
                "createdAt": job.created_at,
                "startedAt": job.started_at,
                "completedAt": job.completed_at,
            },
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "success": false, "error": "Job not found" })),
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Job lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": "Internal error" })),
            )
                .into_response()
        }
    }
}
