//! Per-account reconciliation and the periodic sweep over all accounts.

pub mod reconcile;
pub mod sweep;

pub use reconcile::{
    PublishMode, ReconcileError, ReconcileOutcome, ReconcileSettings, Reconciler,
};
pub use sweep::{run_periodic, sweep_all, SweepReport};
