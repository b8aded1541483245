//! Periodic reconciliation of every registered account.

use super::reconcile::{PublishMode, ReconcileError, Reconciler};
use crate::domain::{Address, Timestamp};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Tally of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub accounts: usize,
    pub published: usize,
    pub unchanged: usize,
    pub failed: Vec<Address>,
}

/// Reconcile every known account once, at most `concurrency` at a time.
///
/// Accounts are independent; a failure on one is logged and recorded in the
/// report without stopping the others. Only listing the accounts can fail the
/// whole sweep.
pub async fn sweep_all(
    reconciler: &Reconciler,
    now: Timestamp,
    concurrency: usize,
) -> Result<SweepReport, ReconcileError> {
    let accounts = reconciler.known_accounts().await?;

    let results: Vec<(Address, Result<bool, ReconcileError>)> = stream::iter(accounts)
        .map(|account| async move {
            let result = reconciler
                .reconcile_account(&account, None, now, PublishMode::Publish)
                .await
                .map(|outcome| outcome.published);
            (account, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut report = SweepReport {
        accounts: results.len(),
        ..Default::default()
    };
    for (account, result) in results {
        match result {
            Ok(true) => report.published += 1,
            Ok(false) => report.unchanged += 1,
            Err(e) => {
                warn!("Reconciliation of {} failed: {}", account, e);
                report.failed.push(account);
            }
        }
    }
    report.failed.sort();

    info!(
        "Sweep complete: {} accounts, {} published, {} unchanged, {} failed",
        report.accounts,
        report.published,
        report.unchanged,
        report.failed.len()
    );
    Ok(report)
}

/// Run `sweep_all` every `interval` until the task is dropped.
pub async fn run_periodic(reconciler: Arc<Reconciler>, interval: Duration, concurrency: usize) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = sweep_all(&reconciler, Timestamp::now(), concurrency).await {
            error!("Sweep aborted: {}", e);
        }
    }
}
