//! Outstanding deposits into external targets, matched FIFO by withdrawals.

use super::{DepositRecord, InvariantViolation};
use crate::domain::{Address, Amount, Timestamp, Token};

/// Portion of a withdrawal or claim covered by earlier deposits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepositMatch {
    pub matched: Amount,
    /// Oldest provenance among the records touched. `None` when nothing matched.
    pub original_acquisition_timestamp: Option<Timestamp>,
}

/// Deposit records of one account in the order they were made.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepositLedger {
    records: Vec<DepositRecord>,
}

impl DepositLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[DepositRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<DepositRecord> {
        self.records
    }

    /// Track a new deposit. Zero-amount deposits leave nothing to withdraw.
    pub fn record(&mut self, record: DepositRecord) {
        if record.deposited_amount.is_zero() {
            return;
        }
        self.records.push(record);
    }

    /// Outstanding amount for a `(target, token)` pair.
    pub fn outstanding(&self, target: &Address, token: &Token) -> Amount {
        self.records
            .iter()
            .filter(|r| &r.target == target && &r.token == token)
            .fold(Amount::ZERO, |acc, r| acc.saturating_add(r.remaining_amount))
    }

    /// Match `amount` of `token` coming back from `target` against outstanding
    /// deposits, oldest first, reducing their remaining amounts.
    pub fn match_withdrawal(
        &mut self,
        target: &Address,
        token: &Token,
        amount: Amount,
    ) -> Result<DepositMatch, InvariantViolation> {
        let mut remaining = amount;
        let mut matched = Amount::ZERO;
        let mut oldest: Option<Timestamp> = None;

        for record in self
            .records
            .iter_mut()
            .filter(|r| &r.target == target && &r.token == token)
        {
            if remaining.is_zero() {
                break;
            }
            if record.remaining_amount.is_zero() {
                continue;
            }
            if record.remaining_amount > record.deposited_amount {
                return Err(InvariantViolation::DepositOverdrawn {
                    target: record.target,
                    token: record.token,
                    remaining: record.remaining_amount,
                    deposited: record.deposited_amount,
                });
            }

            let take = record.remaining_amount.min(remaining);
            record.remaining_amount = record
                .remaining_amount
                .checked_sub(take)
                .ok_or(InvariantViolation::Underflow("reducing deposit remainder"))?;
            remaining -= take;
            matched = matched
                .checked_add(take)
                .ok_or(InvariantViolation::Overflow("matching withdrawal"))?;

            let provenance = record.original_acquisition_timestamp;
            oldest = Some(oldest.map_or(provenance, |ts| ts.min(provenance)));
        }

        if matched > amount {
            return Err(InvariantViolation::WithdrawalOverMatched {
                target: *target,
                requested: amount,
                matched,
            });
        }

        Ok(DepositMatch {
            matched,
            original_acquisition_timestamp: oldest,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Address {
        Address::repeat_byte(0x22)
    }

    fn usdc() -> Token {
        Address::repeat_byte(0xaa)
    }

    fn record(deposited: u64, remaining: u64, at: i64, orig: i64) -> DepositRecord {
        DepositRecord {
            account: Address::repeat_byte(0x11),
            target: target(),
            token: usdc(),
            deposited_amount: Amount::from(deposited),
            remaining_amount: Amount::from(remaining),
            deposited_at: Timestamp::new(at),
            original_acquisition_timestamp: Timestamp::new(orig),
        }
    }

    #[test]
    fn test_withdrawal_consumes_oldest_deposits_first() {
        let mut ledger = DepositLedger::new();
        ledger.record(record(200, 200, 600, 500));
        ledger.record(record(300, 300, 900, 800));

        let m = ledger
            .match_withdrawal(&target(), &usdc(), Amount::from(250u64))
            .unwrap();

        assert_eq!(m.matched, Amount::from(250u64));
        assert_eq!(m.original_acquisition_timestamp, Some(Timestamp::new(500)));
        let remaining: Vec<_> = ledger.records().iter().map(|r| r.remaining_amount).collect();
        assert_eq!(remaining, vec![Amount::ZERO, Amount::from(250u64)]);
    }

    #[test]
    fn test_unmatched_excess_is_reported_as_partial_match() {
        let mut ledger = DepositLedger::new();
        ledger.record(record(100, 100, 10, 10));

        let m = ledger
            .match_withdrawal(&target(), &usdc(), Amount::from(150u64))
            .unwrap();

        assert_eq!(m.matched, Amount::from(100u64));
        assert_eq!(ledger.outstanding(&target(), &usdc()), Amount::ZERO);

        // exhausted records are never revived
        let again = ledger
            .match_withdrawal(&target(), &usdc(), Amount::from(1u64))
            .unwrap();
        assert_eq!(again.matched, Amount::ZERO);
        assert_eq!(again.original_acquisition_timestamp, None);
    }

    #[test]
    fn test_other_target_or_token_does_not_match() {
        let mut ledger = DepositLedger::new();
        ledger.record(record(100, 100, 10, 10));

        let other_target = ledger
            .match_withdrawal(&Address::repeat_byte(0x33), &usdc(), Amount::from(50u64))
            .unwrap();
        let other_token = ledger
            .match_withdrawal(&target(), &Address::repeat_byte(0xbb), Amount::from(50u64))
            .unwrap();

        assert_eq!(other_target.matched, Amount::ZERO);
        assert_eq!(other_token.matched, Amount::ZERO);
        assert_eq!(ledger.outstanding(&target(), &usdc()), Amount::from(100u64));
    }

    #[test]
    fn test_corrupt_record_is_an_invariant_violation() {
        let mut ledger = DepositLedger::new();
        ledger.record(record(100, 150, 10, 10));

        let err = ledger
            .match_withdrawal(&target(), &usdc(), Amount::from(50u64))
            .unwrap_err();
        assert!(matches!(err, InvariantViolation::DepositOverdrawn { .. }));
    }

    #[test]
    fn test_zero_deposit_is_not_recorded() {
        let mut ledger = DepositLedger::new();
        ledger.record(record(0, 0, 10, 10));
        assert!(ledger.records().is_empty());
    }
}
