use std::collections::BTreeMap;

use axum::extract::{Path, State};
use axum::Json;
use swarmcd_core::ledger::StackMetadata;
use swarmcd_core::status::StackStatus;

use crate::error::AppError;
use crate::state::AppState;

/// GET /stacks: every tracked stack's last-known status, keyed by name.
pub async fn list_stacks(State(app): State<AppState>) -> Json<BTreeMap<String, StackStatus>> {
    Json(app.status.snapshot().into_iter().collect())
}

/// GET /stacks/{name}
pub async fn get_stack(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StackStatus>, AppError> {
    app.status
        .get(&name)
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("stack '{name}' not found")))
}

/// GET /stacks/{name}/revision: the deployment the ledger recorded for a
/// tracked stack. A tracked stack that never deployed returns the empty
/// record.
pub async fn get_revision(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<StackMetadata>, AppError> {
    if app.status.get(&name).is_none() {
        return Err(AppError::not_found(format!("stack '{name}' not found")));
    }

    let ledger = app.ledger.clone();
    let metadata = tokio::task::spawn_blocking(move || ledger.load(&name)).await??;
    Ok(Json(metadata))
}
