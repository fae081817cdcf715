pub(crate) mod auth;
mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::core::generator::ContentGenerator;
use crate::core::store::JobStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: JobStore,
    pub(crate) generator: Arc<dyn ContentGenerator>,
    pub(crate) internal_token: String,
}

/// Bind the API server and run it until the process exits.
pub async fn serve(
    addr: &str,
    store: JobStore,
    generator: Arc<dyn ContentGenerator>,
    internal_token: String,
) -> Result<()> {
    let state = AppState {
        store,
        generator,
        internal_token,
    };
    let app = router::build_api_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("API server running at http://{addr}");
    axum::serve(listener, app).await?;
    Ok(())
}
