//! Minimal update between freshly computed state and what is published.

use crate::domain::{amount_string, Address, Amount, ReferenceSnapshot, Token};
use serde::Serialize;
use std::collections::BTreeMap;

/// New value for one asset's published acquired balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceChange {
    pub token: Token,
    #[serde(with = "amount_string")]
    pub balance: Amount,
}

/// One batched write for one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishUpdate {
    pub account: Address,
    #[serde(with = "amount_string")]
    pub allowance: Amount,
    /// Changed and zeroed assets, ordered by token.
    pub balances: Vec<BalanceChange>,
}

/// Compare computed `(allowance, balances)` with the published snapshot.
///
/// Returns `None` when nothing changed. An allowance move counts only when it
/// exceeds `threshold`; any balance difference counts. Assets published as
/// non-zero but absent from `balances` are zeroed explicitly.
pub fn compute_update(
    account: Address,
    allowance: Amount,
    balances: &BTreeMap<Token, Amount>,
    reference: &ReferenceSnapshot,
    threshold: Amount,
) -> Option<PublishUpdate> {
    let allowance_delta = if allowance >= reference.allowance {
        allowance - reference.allowance
    } else {
        reference.allowance - allowance
    };
    let allowance_changed = allowance_delta > threshold;

    let mut changes: BTreeMap<Token, Amount> = balances
        .iter()
        .filter(|(token, balance)| reference.balance(token) != **balance)
        .map(|(token, balance)| (*token, *balance))
        .collect();

    for (token, published) in &reference.balances {
        if !published.is_zero() && !balances.contains_key(token) {
            changes.insert(*token, Amount::ZERO);
        }
    }

    if !allowance_changed && changes.is_empty() {
        return None;
    }

    Some(PublishUpdate {
        account,
        allowance,
        balances: changes
            .into_iter()
            .map(|(token, balance)| BalanceChange { token, balance })
            .collect(),
    })
}
