//! Domain types and determinism layer for sub-account reconciliation.
//!
//! This module provides:
//! - Domain primitives: Timestamp, Amount, Address, Token
//! - Raw and normalized event types with validation
//! - Stable event ordering and deduplication for deterministic replay
//! - Snapshot of externally published state per account

pub mod event;
pub mod ordering;
pub mod primitives;
pub mod reference;

pub use event::{Event, MalformedEvent, Operation, OperationKind, RawEvent, TokenAmount, Transfer};
pub use ordering::{merge_events, sort_events_deterministic, EventOrderingKey, OrderKey};
pub use primitives::{amount_string, Address, Amount, Timestamp, Token, U256};
pub use reference::{AccountLimits, ReferenceSnapshot};
