use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;

/// The authenticated caller, inserted as a request extension by
/// `require_user` and read back in handlers.
#[derive(Clone)]
pub(crate) struct AuthUser {
    pub(crate) user_id: String,
}

fn bearer_token(req: &Request<Body>) -> Option<String> {
    req.headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.to_string())
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "success": false, "error": message })),
    )
        .into_response()
}

/// Guard for user-facing routes. Resolves the bearer token to a user and
/// tags the request with `AuthUser`; anything else is a 401.
pub async fn require_user(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let raw = match bearer_token(&req) {
        Some(t) => t,
        None => {
            return unauthorized("Missing or invalid Authorization header. Use: Bearer <token>");
        }
    };
    match state.store.resolve_api_token(&raw).await {
        Ok(Some(user_id)) => {
            req.extensions_mut().insert(AuthUser { user_id });
            next.run(req).await
        }
        Ok(None) => unauthorized("Invalid or unauthorized API token"),
        Err(e) => {
            tracing::error!("Token lookup failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "success": false, "error": "Internal error" })),
            )
                .into_response()
        }
    }
}

/// Guard for the worker trigger route. Accepts the shared internal token in
/// either the dedicated header or as a bearer token.
pub async fn require_internal(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if let Some(header) = req.headers().get("x-pathforge-internal-token")
        && let Ok(val) = header.to_str()
        && val == state.internal_token
    {
        return next.run(req).await;
    }
    if let Some(raw) = bearer_token(&req)
        && raw == state.internal_token
    {
        return next.run(req).await;
    }
    unauthorized("Invalid internal token")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generator::testing::ScriptedGenerator;
    use crate::core::store::test_store;
    use axum::{Extension, Router, middleware, routing::get};
    use serde_json::json;
    use std::sync::Arc;
    use tower::util::ServiceExt;

    async fn test_state() -> (AppState, String) {
        let store = test_store().await;
        let (raw, _) = store
            .create_api_token("user-1", "test-token")
            .await
            .expect("api token should be created");
        let state = AppState {
            store,
            generator: Arc::new(ScriptedGenerator::new(vec![])),
            internal_token: "internal-123".to_string(),
        };
        (state, raw)
    }

    fn user_app(state: AppState) -> Router {
        Router::new()
            .route(
                "/api/whoami",
                get(|Extension(user): Extension<AuthUser>| async move {
                    axum::Json(json!({ "userId": user.user_id }))
                }),
            )
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::require_user,
            ))
            .with_state(state)
    }

    fn internal_app(state: AppState) -> Router {
        Router::new()
            .route("/api/worker/run", get(|| async { axum::Json(json!({ "ok": true })) }))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                super::require_internal,
            ))
            .with_state(state)
    }

    async fn request_status(app: Router, uri: &str, headers: Vec<(&str, String)>) -> StatusCode {
        let mut builder = Request::builder().uri(uri);
        for (k, v) in headers {
            builder = builder.header(k, v);
        }
        let req = builder.body(Body::empty()).expect("request should build");
        app.oneshot(req)
            .await
            .expect("oneshot should succeed")
            .status()
    }

    #[tokio::test]
    async fn missing_bearer_is_rejected() {
        let (state, _) = test_state().await;
        let status = request_status(user_app(state), "/api/whoami", vec![]).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unknown_token_is_rejected() {
        let (state, _) = test_state().await;
        let status = request_status(
            user_app(state),
            "/api/whoami",
            vec![("authorization", "Bearer pfk_bogus".to_string())],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn valid_token_resolves_to_its_user() {
        let (state, token) = test_state().await;
        let app = user_app(state);
        let req = Request::builder()
            .uri("/api/whoami")
            .header("authorization", format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        let res = app.oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["userId"], "user-1");
    }

    #[tokio::test]
    async fn internal_header_is_accepted() {
        let (state, _) = test_state().await;
        let status = request_status(
            internal_app(state),
            "/api/worker/run",
            vec![("x-pathforge-internal-token", "internal-123".to_string())],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn internal_bearer_is_accepted() {
        let (state, _) = test_state().await;
        let status = request_status(
            internal_app(state),
            "/api/worker/run",
            vec![("authorization", "Bearer internal-123".to_string())],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn user_token_does_not_open_the_worker_route() {
        let (state, token) = test_state().await;
        let status = request_status(
            internal_app(state),
            "/api/worker/run",
            vec![("authorization", format!("Bearer {token}"))],
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
