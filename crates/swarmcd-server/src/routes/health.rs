use axum::extract::State;
use axum::Json;

use crate::state::AppState;

/// GET /health: liveness plus the number of tracked stacks.
pub async fn health(State(app): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "stacks": app.status.len(),
    }))
}
