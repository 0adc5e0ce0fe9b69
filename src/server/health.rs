//! Liveness probe. Also says which automations are loaded and whether a
//! token is present, so a misconfigured deploy is visible without a webhook.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use super::AppState;

pub async fn health_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "token_configured": state.runner().is_ok(),
        "automations": state.automation_names(),
    }))
}
