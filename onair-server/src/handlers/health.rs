use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::infra::app_state::AppState;

/// `GET /health`. Unauthenticated and not rate limited.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let circuit = state.feed.breaker_state();
    let status = if circuit.open { "degraded" } else { "ok" };

    Json(json!({
        "status": status,
        "circuit": circuit,
        "lastGoodVersion": state.feed.last_good_version(),
        "startedAt": state.started_at,
    }))
}
