#![allow(dead_code)]

use spendwarden::domain::{AccountLimits, Address, RawEvent};

pub const DAY: i64 = 86_400;

pub fn account() -> Address {
    Address::repeat_byte(0x11)
}

pub fn token(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

pub fn target() -> Address {
    Address::repeat_byte(0x77)
}

pub fn limits(bps: u32, window_secs: i64) -> AccountLimits {
    AccountLimits {
        max_spending_bps: bps,
        window_secs,
    }
}

fn base(block: u64, log: u64, cost: u64) -> RawEvent {
    RawEvent {
        account: Some(account().to_string()),
        block_number: Some(block),
        log_index: Some(log),
        spending_cost: Some(cost.to_string()),
        ..Default::default()
    }
}

/// A single-input, single-output operation.
pub fn operation(
    block: u64,
    log: u64,
    op_type: &str,
    input: Option<(u8, u64)>,
    output: Option<(u8, u64)>,
    cost: u64,
) -> RawEvent {
    let mut raw = base(block, log, cost);
    raw.event_type = Some("operation".to_string());
    raw.op_type = Some(op_type.to_string());
    raw.target = Some(target().to_string());
    if let Some((t, a)) = input {
        raw.tokens_in = vec![token(t).to_string()];
        raw.amounts_in = vec![a.to_string()];
    }
    if let Some((t, a)) = output {
        raw.tokens_out = vec![token(t).to_string()];
        raw.amounts_out = vec![a.to_string()];
    }
    raw
}

pub fn swap(block: u64, log: u64, input: (u8, u64), output: (u8, u64), cost: u64) -> RawEvent {
    operation(block, log, "swap", Some(input), Some(output), cost)
}

pub fn transfer(block: u64, log: u64, token_byte: u8, amount: u64, cost: u64) -> RawEvent {
    let mut raw = base(block, log, cost);
    raw.event_type = Some("transfer".to_string());
    raw.token = Some(token(token_byte).to_string());
    raw.recipient = Some(Address::repeat_byte(0xee).to_string());
    raw.amount = Some(amount.to_string());
    raw
}
