pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use swarmcd_core::ledger::RevisionLedger;
use swarmcd_core::status::StatusRegistry;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the axum Router serving the status registry and the ledger.
/// Used by `serve()` and available for integration testing.
pub fn build_router(status: StatusRegistry, ledger: Arc<RevisionLedger>) -> Router {
    let app_state = state::AppState::new(status, ledger);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/stacks", get(routes::stacks::list_stacks))
        .route("/stacks/{name}", get(routes::stacks::get_stack))
        .route("/stacks/{name}/revision", get(routes::stacks::get_revision))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Serve the status API on `address` until the future is dropped.
pub async fn serve(
    address: &str,
    status: StatusRegistry,
    ledger: Arc<RevisionLedger>,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(address).await?;
    serve_on(listener, status, ledger).await
}

/// Serve on a pre-bound listener, so callers binding port 0 can read the
/// actual port first.
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    status: StatusRegistry,
    ledger: Arc<RevisionLedger>,
) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app = build_router(status, ledger);

    tracing::info!("status server listening on http://{addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
