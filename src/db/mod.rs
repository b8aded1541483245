//! SQLite-backed reference store.
//!
//! This module provides:
//! - Database initialization and schema setup
//! - `Repository`, the local authoritative store for limits and published state

pub mod migrations;
pub mod repo;

pub use migrations::init_db;
pub use repo::{PublishLogEntry, Repository};
