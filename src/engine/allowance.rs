use super::InvariantViolation;
use crate::domain::Amount;

/// Basis points in 100%.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Remaining allowance for the current window, floored at zero.
///
/// `max(0, floor(portfolio_value * max_spending_bps / 10000) - spending_in_window)`
pub fn compute_allowance(
    portfolio_value: Amount,
    max_spending_bps: u32,
    spending_in_window: Amount,
) -> Result<Amount, InvariantViolation> {
    let cap = portfolio_value
        .checked_mul(Amount::from(max_spending_bps))
        .ok_or(InvariantViolation::Overflow("applying spending cap"))?
        / Amount::from(BPS_DENOMINATOR);
    Ok(cap.saturating_sub(spending_in_window))
}
