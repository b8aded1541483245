//! Pure computation engine(s) for deterministic allowance reconstruction.

use crate::domain::{Address, Amount, Timestamp, Token};
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod allowance;
pub mod builder;
pub mod deposits;
pub mod diff;
pub mod fifo;

pub use allowance::{compute_allowance, BPS_DENOMINATOR};
pub use builder::StateBuilder;
pub use deposits::{DepositLedger, DepositMatch};
pub use diff::{compute_update, BalanceChange, PublishUpdate};
pub use fifo::{AcquiredQueue, Consumption};

/// A slice of acquired balance and the time it was acquired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcquiredEntry {
    #[serde(with = "crate::domain::amount_string")]
    pub amount: Amount,
    pub acquired_at: Timestamp,
}

/// An outstanding deposit into an external target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositRecord {
    pub account: Address,
    pub target: Address,
    pub token: Token,
    #[serde(with = "crate::domain::amount_string")]
    pub deposited_amount: Amount,
    #[serde(with = "crate::domain::amount_string")]
    pub remaining_amount: Amount,
    pub deposited_at: Timestamp,
    /// Inherited from the acquired entries that funded the deposit, or
    /// `deposited_at` when it was funded entirely from ordinary balance.
    pub original_acquisition_timestamp: Timestamp,
}

/// Reconstructed state of one sub-account. Rebuilt from empty on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAccountState {
    pub account: Address,
    pub spending_in_window: Amount,
    pub deposit_records: Vec<DepositRecord>,
    pub acquired_queues: BTreeMap<Token, AcquiredQueue>,
    pub acquired_balances: BTreeMap<Token, Amount>,
}

impl SubAccountState {
    /// Hex SHA-256 over the canonical byte layout of the derived state.
    ///
    /// Two runs over the same history must produce the same fingerprint.
    pub fn fingerprint(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.account.as_slice());
        hasher.update(self.spending_in_window.to_be_bytes::<32>());

        hasher.update((self.acquired_balances.len() as u32).to_le_bytes());
        for (token, balance) in &self.acquired_balances {
            hasher.update(token.as_slice());
            hasher.update(balance.to_be_bytes::<32>());
        }

        hasher.update((self.deposit_records.len() as u32).to_le_bytes());
        for record in &self.deposit_records {
            hasher.update(record.target.as_slice());
            hasher.update(record.token.as_slice());
            hasher.update(record.deposited_amount.to_be_bytes::<32>());
            hasher.update(record.remaining_amount.to_be_bytes::<32>());
            hasher.update(record.deposited_at.as_secs().to_le_bytes());
            hasher.update(record.original_acquisition_timestamp.as_secs().to_le_bytes());
        }

        hex::encode(hasher.finalize())
    }
}

/// A computed state that can only come from a bug or an unexpected event
/// sequence. Never clamped; the run is aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("arithmetic overflow while {0}")]
    Overflow(&'static str),
    #[error("arithmetic underflow while {0}")]
    Underflow(&'static str),
    #[error("deposit to {target} of {token} has remaining {remaining} above deposited {deposited}")]
    DepositOverdrawn {
        target: Address,
        token: Token,
        remaining: Amount,
        deposited: Amount,
    },
    #[error("withdrawal of {requested} from {target} matched {matched}")]
    WithdrawalOverMatched {
        target: Address,
        requested: Amount,
        matched: Amount,
    },
}
