use axum::Json;
use serde_json::{Value, json};

/// GET / - Plain liveness.
pub async fn root() -> &'static str {
    "ok"
}

/// GET /health - Liveness probe. Touches no dependency.
pub async fn health() -> Json<Value> {
    Json(json!({ "ok": true }))
}
