use axum::extract::State;
use axum::Json;

use crate::api::accounts::AccountStateResponse;
use crate::api::AppState;
use crate::domain::{RawEvent, Timestamp};
use crate::error::AppError;
use crate::orchestration::PublishMode;

/// Event trigger: reconcile the event's account with the event merged into
/// its fetched history.
pub async fn post_event(
    State(state): State<AppState>,
    Json(event): Json<RawEvent>,
) -> Result<Json<AccountStateResponse>, AppError> {
    let account = event
        .account()
        .map_err(|e| AppError::BadRequest(format!("Invalid event: {}", e)))?;
    let order_key = event
        .order_key()
        .map_err(|e| AppError::BadRequest(format!("Invalid event: {}", e)))?;

    tracing::debug!("Event {} received for {}", order_key, account);

    let outcome = state
        .reconciler
        .reconcile_account(&account, Some(&event), Timestamp::now(), PublishMode::Publish)
        .await?;

    Ok(Json(outcome.into()))
}
