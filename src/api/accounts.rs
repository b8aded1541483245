use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::api::AppState;
use crate::domain::{amount_string, AccountLimits, Address, Amount, Timestamp, Token};
use crate::engine::{AcquiredEntry, DepositRecord, PublishUpdate};
use crate::error::AppError;
use crate::orchestration::{PublishMode, ReconcileOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateQuery {
    /// Evaluate as of this time (seconds); defaults to now.
    pub at: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountStateResponse {
    pub account: Address,
    pub as_of: Timestamp,
    #[serde(with = "amount_string")]
    pub portfolio_value: Amount,
    #[serde(with = "amount_string")]
    pub spending_in_window: Amount,
    #[serde(with = "amount_string")]
    pub allowance: Amount,
    pub acquired: Vec<AcquiredDto>,
    pub deposit_records: Vec<DepositRecord>,
    pub pending_update: Option<PublishUpdate>,
    pub published: bool,
    pub events_replayed: usize,
    pub events_skipped: usize,
    pub fingerprint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquiredDto {
    pub token: Token,
    #[serde(with = "amount_string")]
    pub balance: Amount,
    pub entries: Vec<AcquiredEntry>,
}

impl From<ReconcileOutcome> for AccountStateResponse {
    fn from(outcome: ReconcileOutcome) -> Self {
        let fingerprint = outcome.state.fingerprint();
        let state = outcome.state;
        let acquired = state
            .acquired_balances
            .iter()
            .map(|(token, balance)| AcquiredDto {
                token: *token,
                balance: *balance,
                entries: state
                    .acquired_queues
                    .get(token)
                    .map(|q| q.entries().copied().collect())
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            account: outcome.account,
            as_of: outcome.now,
            portfolio_value: outcome.portfolio_value,
            spending_in_window: state.spending_in_window,
            allowance: outcome.allowance,
            acquired,
            deposit_records: state.deposit_records,
            pending_update: outcome.update,
            published: outcome.published,
            events_replayed: outcome.events_replayed,
            events_skipped: outcome.events_skipped,
            fingerprint,
        }
    }
}

pub(crate) fn parse_account(raw: &str) -> Result<Address, AppError> {
    Address::from_str(raw).map_err(|_| AppError::BadRequest("Invalid account address".into()))
}

/// Dry-run reconciliation: computes everything, publishes nothing.
pub async fn get_state(
    Path(account): Path<String>,
    Query(params): Query<StateQuery>,
    State(state): State<AppState>,
) -> Result<Json<AccountStateResponse>, AppError> {
    let account = parse_account(&account)?;
    let now = params.at.map(Timestamp::new).unwrap_or_else(Timestamp::now);

    let outcome = state
        .reconciler
        .reconcile_account(&account, None, now, PublishMode::DryRun)
        .await?;

    Ok(Json(outcome.into()))
}

pub async fn post_reconcile(
    Path(account): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<AccountStateResponse>, AppError> {
    let account = parse_account(&account)?;

    let outcome = state
        .reconciler
        .reconcile_account(&account, None, Timestamp::now(), PublishMode::Publish)
        .await?;

    Ok(Json(outcome.into()))
}

/// Register an account or change its limits.
pub async fn put_limits(
    Path(account): Path<String>,
    State(state): State<AppState>,
    Json(limits): Json<AccountLimits>,
) -> Result<Json<AccountLimits>, AppError> {
    let account = parse_account(&account)?;
    if limits.window_secs < 0 {
        return Err(AppError::BadRequest("windowSecs must not be negative".into()));
    }

    state.repo.register_account(&account, limits).await?;
    tracing::info!(
        "Registered {} with max_spending_bps={} window_secs={}",
        account,
        limits.max_spending_bps,
        limits.window_secs
    );

    Ok(Json(limits))
}
