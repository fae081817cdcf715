use axum::{
    Router,
    http::Method,
    middleware,
    routing::{get, post},
};
use tower_http::cors::CorsLayer;

use super::AppState;
use super::auth;
use super::handlers::{jobs, paths, worker};

fn build_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(tower_http::cors::Any)
}

pub fn build_api_router(state: AppState) -> Router {
    let user_routes = Router::new()
        .route("/api/paths/generate", post(paths::generate_path_endpoint))
        .route("/api/paths/extend", post(paths::extend_path_endpoint))
        .route("/api/jobs/{job_id}", get(jobs::get_job_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_user,
        ));

    let internal_routes = Router::new()
        .route("/api/worker/run", post(worker::run_worker_endpoint))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_internal,
        ));

    user_routes
        .merge(internal_routes)
        .layer(build_cors())
        .with_state(state)
}
