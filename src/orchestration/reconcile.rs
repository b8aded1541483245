use crate::config::Config;
use crate::datasource::{
    BlockClock, DataSourceError, EventSource, PublishSink, ReferenceStore, ValuationSource,
};
use crate::domain::{merge_events, Address, Amount, Event, RawEvent, Timestamp};
use crate::engine::{
    compute_allowance, compute_update, InvariantViolation, PublishUpdate, StateBuilder,
    SubAccountState,
};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Tunables applied to every reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// History fetched before the window start.
    pub lookback_secs: i64,
    /// Allowance moves at or below this are not republished on their own.
    pub allowance_threshold: Amount,
    /// Refuse to act on a reference snapshot older than this.
    pub max_reference_age_secs: Option<i64>,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            lookback_secs: 0,
            allowance_threshold: Amount::ZERO,
            max_reference_age_secs: None,
        }
    }
}

impl From<&Config> for ReconcileSettings {
    fn from(config: &Config) -> Self {
        Self {
            lookback_secs: config.lookback_secs,
            allowance_threshold: config.allowance_threshold,
            max_reference_age_secs: config.max_reference_age_secs,
        }
    }
}

/// Whether a run may write to the publish sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishMode {
    Publish,
    DryRun,
}

/// Result of one reconciliation of one account.
#[derive(Debug, Clone)]
pub struct ReconcileOutcome {
    pub account: Address,
    /// Time the state was evaluated at; later than requested when an event's
    /// block time is ahead of the caller's clock.
    pub now: Timestamp,
    pub state: SubAccountState,
    pub portfolio_value: Amount,
    pub allowance: Amount,
    /// Pending diff against the published state, `None` when nothing changed.
    pub update: Option<PublishUpdate>,
    /// True if `update` was written to the sink during this run.
    pub published: bool,
    pub events_replayed: usize,
    pub events_skipped: usize,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("upstream unavailable: {0}")]
    Upstream(#[source] DataSourceError),
    #[error("publish failed: {0}")]
    Publish(#[source] DataSourceError),
    #[error("invariant violation: {0}")]
    Invariant(#[from] InvariantViolation),
    #[error("account {0} is not registered")]
    UnknownAccount(Address),
    #[error("reference for {account} is {age_secs}s old (max {max_age_secs}s)")]
    StaleReference {
        account: Address,
        age_secs: i64,
        max_age_secs: i64,
    },
    #[error("invalid limits for {account}: {reason}")]
    InvalidLimits { account: Address, reason: String },
}

/// Rebuilds one account's allowance and acquired balances from its full
/// history and publishes the difference.
///
/// Stateless between runs: every call fetches, replays from empty, and
/// publishes only what differs from the store.
#[derive(Clone)]
pub struct Reconciler {
    events: Arc<dyn EventSource>,
    clock: Arc<dyn BlockClock>,
    store: Arc<dyn ReferenceStore>,
    sink: Arc<dyn PublishSink>,
    valuation: Arc<dyn ValuationSource>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(
        events: Arc<dyn EventSource>,
        clock: Arc<dyn BlockClock>,
        store: Arc<dyn ReferenceStore>,
        sink: Arc<dyn PublishSink>,
        valuation: Arc<dyn ValuationSource>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            events,
            clock,
            store,
            sink,
            valuation,
            settings,
        }
    }

    /// Build a reconciler whose collaborators are all served by one source.
    pub fn with_single_source<S>(source: Arc<S>, settings: ReconcileSettings) -> Self
    where
        S: EventSource + BlockClock + ReferenceStore + PublishSink + ValuationSource + 'static,
    {
        Self::new(
            source.clone(),
            source.clone(),
            source.clone(),
            source.clone(),
            source,
            settings,
        )
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// Every account the store knows about.
    pub async fn known_accounts(&self) -> Result<Vec<Address>, ReconcileError> {
        self.store
            .list_accounts()
            .await
            .map_err(ReconcileError::Upstream)
    }

    /// Reconcile one account.
    ///
    /// `pending` is a just-observed event the event source may not report
    /// yet; it is merged with history and deduplicated by its order key.
    pub async fn reconcile_account(
        &self,
        account: &Address,
        pending: Option<&RawEvent>,
        now: Timestamp,
        mode: PublishMode,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        // Fetch
        let reference = self
            .store
            .fetch_reference(account)
            .await
            .map_err(ReconcileError::Upstream)?
            .ok_or(ReconcileError::UnknownAccount(*account))?;

        if let Some(max_age_secs) = self.settings.max_reference_age_secs {
            let age_secs = reference.age_secs(now);
            if age_secs > max_age_secs {
                return Err(ReconcileError::StaleReference {
                    account: *account,
                    age_secs,
                    max_age_secs,
                });
            }
        }

        let window_secs = reference.limits.window_secs;
        if window_secs < 0 {
            return Err(ReconcileError::InvalidLimits {
                account: *account,
                reason: format!("negative window {}s", window_secs),
            });
        }

        let fetch_from = now.window_start(window_secs.saturating_add(self.settings.lookback_secs));
        let raw_history = self
            .events
            .fetch_events(account, fetch_from, now)
            .await
            .map_err(ReconcileError::Upstream)?;
        debug!(
            "Fetched {} raw events for {} from {} to {}",
            raw_history.len(),
            account,
            fetch_from,
            now
        );

        let portfolio_value = self
            .valuation
            .portfolio_value(account)
            .await
            .map_err(ReconcileError::Upstream)?;

        // Merge + dedup
        let mut block_times = HashMap::new();
        let mut skipped = 0usize;
        let historical = self
            .normalize_all(account, &raw_history, &mut block_times, &mut skipped)
            .await?;
        let pending = self
            .normalize_all(account, pending.into_iter(), &mut block_times, &mut skipped)
            .await?;
        let events = merge_events(historical, pending);

        // A block clock running ahead of `now` must not leave an event half applied.
        let replay_at = events
            .iter()
            .map(Event::timestamp)
            .max()
            .map_or(now, |latest| latest.max(now));
        if replay_at > now {
            debug!(
                "Replaying {} at {} (latest event is {}s ahead of {})",
                account,
                replay_at,
                replay_at.as_secs() - now.as_secs(),
                now
            );
        }

        // Replay + finalize
        let state = StateBuilder::build(*account, &events, window_secs, replay_at).map_err(|e| {
            error!("Invariant violated while replaying {}: {}", account, e);
            e
        })?;

        let allowance = compute_allowance(
            portfolio_value,
            reference.limits.max_spending_bps,
            state.spending_in_window,
        )?;

        // Diff
        let update = compute_update(
            *account,
            allowance,
            &state.acquired_balances,
            &reference,
            self.settings.allowance_threshold,
        );

        let fingerprint = state.fingerprint();
        let mut published = false;
        match (&update, mode) {
            (Some(update), PublishMode::Publish) => {
                self.sink
                    .publish(update)
                    .await
                    .map_err(ReconcileError::Publish)?;
                published = true;
                info!(
                    "Published {}: allowance={} balances_changed={} fingerprint={}",
                    account,
                    update.allowance,
                    update.balances.len(),
                    fingerprint
                );
            }
            (Some(update), PublishMode::DryRun) => {
                debug!(
                    "Dry run for {}: would publish allowance={} balances_changed={} fingerprint={}",
                    account,
                    update.allowance,
                    update.balances.len(),
                    fingerprint
                );
            }
            (None, _) => {
                debug!("No change for {} (fingerprint={})", account, fingerprint);
            }
        }

        Ok(ReconcileOutcome {
            account: *account,
            now: replay_at,
            portfolio_value,
            allowance,
            update,
            published,
            events_replayed: events.len(),
            events_skipped: skipped,
            state,
        })
    }

    /// Normalize raw records, skipping malformed ones and records that belong
    /// to another account. Block time lookups are memoised in `block_times`.
    async fn normalize_all<'a, I>(
        &self,
        account: &Address,
        raws: I,
        block_times: &mut HashMap<u64, Timestamp>,
        skipped: &mut usize,
    ) -> Result<Vec<Event>, ReconcileError>
    where
        I: IntoIterator<Item = &'a RawEvent>,
    {
        let mut events = Vec::new();
        for raw in raws {
            let order_key = match raw.order_key() {
                Ok(key) => key,
                Err(e) => {
                    warn!("Skipping malformed event for {}: {}", account, e);
                    *skipped += 1;
                    continue;
                }
            };

            let timestamp = match block_times.get(&order_key.block_height) {
                Some(ts) => *ts,
                None => {
                    let ts = self
                        .clock
                        .block_timestamp(order_key.block_height)
                        .await
                        .map_err(ReconcileError::Upstream)?;
                    block_times.insert(order_key.block_height, ts);
                    ts
                }
            };

            match raw.normalize(timestamp) {
                Ok(event) if event.account() == *account => events.push(event),
                Ok(event) => {
                    warn!(
                        "Skipping event {} of account {} delivered for {}",
                        order_key,
                        event.account(),
                        account
                    );
                    *skipped += 1;
                }
                Err(e) => {
                    warn!("Skipping malformed event {} for {}: {}", order_key, account, e);
                    *skipped += 1;
                }
            }
        }
        Ok(events)
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
