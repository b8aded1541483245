use super::{
    AcquiredQueue, DepositLedger, DepositRecord, InvariantViolation, SubAccountState,
};
use crate::domain::{Address, Amount, Event, Operation, OperationKind, Timestamp, Token, Transfer};
use std::collections::BTreeMap;

/// Replays one account's events from empty state.
///
/// Events must be fed in replay order (see `domain::merge_events`); the
/// builder itself never reorders.
pub struct StateBuilder {
    account: Address,
    window_secs: i64,
    now: Timestamp,

    spending_in_window: Amount,
    deposits: DepositLedger,
    queues: BTreeMap<Token, AcquiredQueue>,
}

impl StateBuilder {
    pub fn new(account: Address, window_secs: i64, now: Timestamp) -> Self {
        Self {
            account,
            window_secs,
            now,
            spending_in_window: Amount::ZERO,
            deposits: DepositLedger::new(),
            queues: BTreeMap::new(),
        }
    }

    /// Replay an ordered event list and finalize.
    pub fn build(
        account: Address,
        events: &[Event],
        window_secs: i64,
        now: Timestamp,
    ) -> Result<SubAccountState, InvariantViolation> {
        let mut builder = Self::new(account, window_secs, now);
        for event in events {
            builder.apply(event)?;
        }
        builder.finish()
    }

    /// Apply a single event.
    pub fn apply(&mut self, event: &Event) -> Result<(), InvariantViolation> {
        match event {
            Event::Operation(op) => match op.kind {
                OperationKind::Swap | OperationKind::Deposit => self.apply_spend(op),
                OperationKind::Withdraw | OperationKind::Claim => self.apply_return(op),
                OperationKind::Approve => Ok(()),
            },
            Event::Transfer(tr) => self.apply_transfer(tr),
        }
    }

    /// Prune expired entries and total every touched token.
    pub fn finish(mut self) -> Result<SubAccountState, InvariantViolation> {
        let mut acquired_balances = BTreeMap::new();
        for (token, queue) in self.queues.iter_mut() {
            let balance = queue.prune_and_sum(self.now, self.window_secs)?;
            acquired_balances.insert(*token, balance);
        }

        Ok(SubAccountState {
            account: self.account,
            spending_in_window: self.spending_in_window,
            deposit_records: self.deposits.into_records(),
            acquired_queues: self.queues,
            acquired_balances,
        })
    }

    /// Swap and Deposit: consume inputs, charge the budget, credit outputs in
    /// proportion to how much of the input was itself acquired.
    fn apply_spend(&mut self, op: &Operation) -> Result<(), InvariantViolation> {
        let mut total_input = Amount::ZERO;
        let mut total_consumed = Amount::ZERO;
        let mut oldest_consumed: Option<Timestamp> = None;

        let window_secs = self.window_secs;
        for input in &op.inputs {
            let consumption =
                self.queue(input.token)
                    .consume(input.amount, op.timestamp, window_secs);
            let consumed = consumption.total();
            let input_oldest = consumption.oldest_acquired_at();

            total_input = total_input
                .checked_add(input.amount)
                .ok_or(InvariantViolation::Overflow("summing operation inputs"))?;
            total_consumed = total_consumed
                .checked_add(consumed)
                .ok_or(InvariantViolation::Overflow("summing consumed inputs"))?;
            if let Some(ts) = input_oldest {
                oldest_consumed = Some(oldest_consumed.map_or(ts, |cur| cur.min(ts)));
            }

            if op.kind == OperationKind::Deposit {
                self.deposits.record(DepositRecord {
                    account: op.account,
                    target: op.target,
                    token: input.token,
                    deposited_amount: input.amount,
                    remaining_amount: input.amount,
                    deposited_at: op.timestamp,
                    original_acquisition_timestamp: input_oldest.unwrap_or(op.timestamp),
                });
            }
        }

        self.charge(op.timestamp, op.spending_cost)?;

        let inherited_at = oldest_consumed.unwrap_or(op.timestamp);
        for output in &op.outputs {
            let (from_acquired, fresh) =
                split_output(output.amount, total_consumed, total_input)?;
            let queue = self.queue(output.token);
            queue.append(from_acquired, inherited_at);
            queue.append(fresh, op.timestamp);
        }

        Ok(())
    }

    /// Withdraw and Claim: only value matched against earlier deposits into
    /// the same target comes back as acquired.
    fn apply_return(&mut self, op: &Operation) -> Result<(), InvariantViolation> {
        for output in &op.outputs {
            let matched = self
                .deposits
                .match_withdrawal(&op.target, &output.token, output.amount)?;
            let queue = self.queue(output.token);
            if let Some(provenance) = matched.original_acquisition_timestamp {
                queue.append(matched.matched, provenance);
            }
        }
        Ok(())
    }

    /// Transfers spend budget and deplete acquired status; they never grant it.
    fn apply_transfer(&mut self, tr: &Transfer) -> Result<(), InvariantViolation> {
        self.charge(tr.timestamp, tr.spending_cost)?;
        let window_secs = self.window_secs;
        self.queue(tr.token)
            .consume(tr.amount, tr.timestamp, window_secs);
        Ok(())
    }

    fn charge(&mut self, at: Timestamp, cost: Amount) -> Result<(), InvariantViolation> {
        if at.is_within_window(self.now, self.window_secs) {
            self.spending_in_window = self
                .spending_in_window
                .checked_add(cost)
                .ok_or(InvariantViolation::Overflow("accumulating spending"))?;
        }
        Ok(())
    }

    fn queue(&mut self, token: Token) -> &mut AcquiredQueue {
        self.queues.entry(token).or_default()
    }
}

/// Split an output into its acquired part `floor(amount * consumed / input)`
/// and the fresh remainder. The two parts always sum to `amount`.
pub fn split_output(
    amount: Amount,
    consumed: Amount,
    input: Amount,
) -> Result<(Amount, Amount), InvariantViolation> {
    if input.is_zero() || consumed.is_zero() {
        return Ok((Amount::ZERO, amount));
    }
    if consumed > input {
        return Err(InvariantViolation::Underflow("consumed more than operation input"));
    }

    let from_acquired = amount
        .checked_mul(consumed)
        .ok_or(InvariantViolation::Overflow("splitting operation output"))?
        / input;
    Ok((from_acquired, amount - from_acquired))
}
