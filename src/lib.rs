pub mod api;
pub mod config;
pub mod datasource;
pub mod db;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;

pub use config::Config;
pub use datasource::{
    BlockClock, DataSourceError, EventSource, IndexerDataSource, MockDataSource, PublishSink,
    ReferenceStore, ValuationSource,
};
pub use db::{init_db, Repository};
pub use domain::{AccountLimits, Address, Amount, Event, RawEvent, ReferenceSnapshot, Timestamp, Token};
pub use engine::{PublishUpdate, SubAccountState};
pub use error::AppError;
pub use orchestration::{PublishMode, ReconcileError, ReconcileSettings, Reconciler};
