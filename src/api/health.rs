use axum::extract::State;
use axum::Json;

use crate::api::AppState;
use crate::error::AppError;

pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok"}))
}

/// Ready once the reference store answers.
pub async fn ready(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let accounts = state
        .reconciler
        .known_accounts()
        .await
        .map_err(AppError::from)?;

    Ok(Json(serde_json::json!({
        "status": "ready",
        "accounts": accounts.len(),
    })))
}
