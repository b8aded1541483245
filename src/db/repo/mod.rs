//! Repository layer for database operations.
//!
//! This module provides the `Repository` struct for all database operations.
//! Methods are organized across submodules by concern:
//! - `limits.rs` - Account registration and reference snapshot reads
//! - `publish.rs` - Atomic publication of updates and the publish log

mod limits;
mod publish;

use crate::domain::{Address, Amount};
use sqlx::sqlite::SqlitePool;
use std::str::FromStr;

pub use publish::PublishLogEntry;

/// Repository for database operations.
#[derive(Debug)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Repository { pool }
    }
}

/// Lowercase `0x`-prefixed hex used as the address column encoding.
pub(crate) fn address_key(address: &Address) -> String {
    format!("0x{}", hex::encode(address))
}

pub(crate) fn parse_address_column(column: &str, value: &str) -> Result<Address, sqlx::Error> {
    Address::from_str(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.to_string().into(),
    })
}

pub(crate) fn parse_amount_column(column: &str, value: &str) -> Result<Amount, sqlx::Error> {
    Amount::from_str(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: e.to_string().into(),
    })
}
