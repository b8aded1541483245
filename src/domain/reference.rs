//! Externally published per-account state and limits.

use crate::domain::{Amount, Timestamp, Token};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Spending limits configured for a sub-account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountLimits {
    /// Cap on spending within one window, in basis points of portfolio value.
    pub max_spending_bps: u32,
    /// Trailing window length in seconds.
    pub window_secs: i64,
}

/// What the authoritative store currently holds for one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceSnapshot {
    pub limits: AccountLimits,
    /// Allowance as last published.
    pub allowance: Amount,
    /// Acquired balances as last published. Missing tokens read as zero.
    pub balances: BTreeMap<Token, Amount>,
    /// Freshness marker of this view.
    pub last_updated: Timestamp,
}

impl ReferenceSnapshot {
    /// Snapshot for an account with nothing published yet.
    pub fn empty(limits: AccountLimits, last_updated: Timestamp) -> Self {
        Self {
            limits,
            allowance: Amount::ZERO,
            balances: BTreeMap::new(),
            last_updated,
        }
    }

    /// Published balance for a token, zero when absent.
    pub fn balance(&self, token: &Token) -> Amount {
        self.balances.get(token).copied().unwrap_or(Amount::ZERO)
    }

    /// Age of this view relative to `now`, in seconds.
    pub fn age_secs(&self, now: Timestamp) -> i64 {
        now.as_secs().saturating_sub(self.last_updated.as_secs())
    }
}
