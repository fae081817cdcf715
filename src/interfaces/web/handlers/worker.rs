use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::core::worker::run_worker_cycle;
use crate::interfaces::web::AppState;

/// Internal trigger for one worker cycle, for cron services and operators.
/// The scheduled in-process cycle calls the same function directly.
pub async fn run_worker_endpoint(State(state): State<AppState>) -> Response {
    match run_worker_cycle(&state.store, state.generator.as_ref()).await {
        Ok(report) => Json(serde_json::json!({
            "success": true,
            "processed": report.processed,
            "results": report.results,
        }))
        .into_response(),
        Err(e) => {
            tracing::error!("Worker cycle failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}
