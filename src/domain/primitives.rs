//! Domain primitives: Timestamp, Amount, Address, Token.

use serde::{Deserialize, Serialize};

pub use alloy_primitives::{Address, U256};

/// Token amounts, spending costs and valuations are unsigned 256-bit integers.
pub type Amount = U256;

/// Assets are identified by their token contract address.
pub type Token = Address;

/// Time in whole seconds since Unix epoch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Create a Timestamp from seconds.
    pub fn new(secs: i64) -> Self {
        Timestamp(secs)
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        Timestamp(chrono::Utc::now().timestamp())
    }

    /// Get the underlying seconds value.
    pub fn as_secs(&self) -> i64 {
        self.0
    }

    /// Start of the trailing window of `window_secs` ending at `self`.
    pub fn window_start(&self, window_secs: i64) -> Timestamp {
        Timestamp(self.0.saturating_sub(window_secs))
    }

    /// True once something acquired at `self` has aged out as of `now`.
    ///
    /// Acquired value stays live while its age is strictly below the window.
    pub fn has_expired(&self, now: Timestamp, window_secs: i64) -> bool {
        *self <= now.window_start(window_secs)
    }

    /// True if `self` falls inside `[now - window_secs, now]`.
    pub fn is_within_window(&self, now: Timestamp, window_secs: i64) -> bool {
        *self >= now.window_start(window_secs) && *self <= now
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serde helpers for carrying a U256 as a base-10 string in JSON.
pub mod amount_string {
    use super::Amount;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::str::FromStr;

    pub fn serialize<S: Serializer>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}
