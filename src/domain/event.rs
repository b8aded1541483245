//! Sub-account activity events: the raw wire record and its normalized form.

use crate::domain::{Address, Amount, OrderKey, Timestamp, Token};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Kind of vault operation performed by a sub-account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Swap,
    Deposit,
    Withdraw,
    Claim,
    Approve,
}

impl FromStr for OperationKind {
    type Err = MalformedEvent;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "swap" => Ok(OperationKind::Swap),
            "deposit" => Ok(OperationKind::Deposit),
            "withdraw" => Ok(OperationKind::Withdraw),
            "claim" => Ok(OperationKind::Claim),
            "approve" => Ok(OperationKind::Approve),
            other => Err(MalformedEvent::InvalidField {
                field: "opType",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OperationKind::Swap => "swap",
            OperationKind::Deposit => "deposit",
            OperationKind::Withdraw => "withdraw",
            OperationKind::Claim => "claim",
            OperationKind::Approve => "approve",
        };
        f.write_str(s)
    }
}

/// A token paired with an amount moved by an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TokenAmount {
    pub token: Token,
    pub amount: Amount,
}

impl TokenAmount {
    pub fn new(token: Token, amount: Amount) -> Self {
        Self { token, amount }
    }
}

/// A vault operation executed on behalf of a sub-account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub account: Address,
    pub target: Address,
    pub kind: OperationKind,
    pub inputs: Vec<TokenAmount>,
    pub outputs: Vec<TokenAmount>,
    pub spending_cost: Amount,
    pub timestamp: Timestamp,
    pub order_key: OrderKey,
}

/// A token transfer out of the vault initiated by a sub-account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub account: Address,
    pub token: Token,
    pub recipient: Address,
    pub amount: Amount,
    pub spending_cost: Amount,
    pub timestamp: Timestamp,
    pub order_key: OrderKey,
}

/// A normalized sub-account event with a resolved timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Operation(Operation),
    Transfer(Transfer),
}

impl Event {
    pub fn account(&self) -> Address {
        match self {
            Event::Operation(op) => op.account,
            Event::Transfer(tr) => tr.account,
        }
    }

    pub fn timestamp(&self) -> Timestamp {
        match self {
            Event::Operation(op) => op.timestamp,
            Event::Transfer(tr) => tr.timestamp,
        }
    }

    pub fn order_key(&self) -> OrderKey {
        match self {
            Event::Operation(op) => op.order_key,
            Event::Transfer(tr) => tr.order_key,
        }
    }

    pub fn spending_cost(&self) -> Amount {
        match self {
            Event::Operation(op) => op.spending_cost,
            Event::Transfer(tr) => tr.spending_cost,
        }
    }
}

/// Reason a raw event could not be normalized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEvent {
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },
    #[error("{side} lists {tokens} tokens but {amounts} amounts")]
    LengthMismatch {
        side: &'static str,
        tokens: usize,
        amounts: usize,
    },
    #[error("unknown event type {0}")]
    UnknownType(String),
}

/// Event record as delivered by the event source.
///
/// Carries a block reference instead of a timestamp; the caller resolves the
/// block to a time before calling [`RawEvent::normalize`]. Every field is
/// optional on the wire so that a single bad record can be rejected without
/// failing the whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// "operation" or "transfer".
    pub event_type: Option<String>,
    pub account: Option<String>,
    pub block_number: Option<u64>,
    pub log_index: Option<u64>,
    pub spending_cost: Option<String>,

    // Operation fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub op_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts_in: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens_out: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub amounts_out: Vec<String>,

    // Transfer fields.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
}

impl RawEvent {
    /// The deduplication / tie-break identity of this record.
    pub fn order_key(&self) -> Result<OrderKey, MalformedEvent> {
        let block_height = self
            .block_number
            .ok_or(MalformedEvent::MissingField("blockNumber"))?;
        let log_index = self
            .log_index
            .ok_or(MalformedEvent::MissingField("logIndex"))?;
        Ok(OrderKey::new(block_height, log_index))
    }

    /// Account this record belongs to.
    pub fn account(&self) -> Result<Address, MalformedEvent> {
        parse_address("account", self.account.as_deref())
    }

    /// Normalize into an [`Event`] using the already-resolved block timestamp.
    pub fn normalize(&self, timestamp: Timestamp) -> Result<Event, MalformedEvent> {
        let order_key = self.order_key()?;
        let account = self.account()?;
        let spending_cost = match self.spending_cost.as_deref() {
            Some(s) => parse_amount("spendingCost", s)?,
            None => Amount::ZERO,
        };

        let event_type = self
            .event_type
            .as_deref()
            .ok_or(MalformedEvent::MissingField("eventType"))?;

        match event_type.trim().to_ascii_lowercase().as_str() {
            "operation" => {
                let target = parse_address("target", self.target.as_deref())?;
                let kind: OperationKind = self
                    .op_type
                    .as_deref()
                    .ok_or(MalformedEvent::MissingField("opType"))?
                    .parse()?;
                let inputs = zip_token_amounts("inputs", &self.tokens_in, &self.amounts_in)?;
                let outputs = zip_token_amounts("outputs", &self.tokens_out, &self.amounts_out)?;
                Ok(Event::Operation(Operation {
                    account,
                    target,
                    kind,
                    inputs,
                    outputs,
                    spending_cost,
                    timestamp,
                    order_key,
                }))
            }
            "transfer" => {
                let token = parse_address("token", self.token.as_deref())?;
                let recipient = parse_address("recipient", self.recipient.as_deref())?;
                let amount = parse_amount(
                    "amount",
                    self.amount
                        .as_deref()
                        .ok_or(MalformedEvent::MissingField("amount"))?,
                )?;
                Ok(Event::Transfer(Transfer {
                    account,
                    token,
                    recipient,
                    amount,
                    spending_cost,
                    timestamp,
                    order_key,
                }))
            }
            other => Err(MalformedEvent::UnknownType(other.to_string())),
        }
    }
}

fn parse_address(field: &'static str, value: Option<&str>) -> Result<Address, MalformedEvent> {
    let value = value.ok_or(MalformedEvent::MissingField(field))?;
    Address::from_str(value.trim()).map_err(|_| MalformedEvent::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn parse_amount(field: &'static str, value: &str) -> Result<Amount, MalformedEvent> {
    Amount::from_str(value.trim()).map_err(|_| MalformedEvent::InvalidField {
        field,
        value: value.to_string(),
    })
}

fn zip_token_amounts(
    side: &'static str,
    tokens: &[String],
    amounts: &[String],
) -> Result<Vec<TokenAmount>, MalformedEvent> {
    if tokens.len() != amounts.len() {
        return Err(MalformedEvent::LengthMismatch {
            side,
            tokens: tokens.len(),
            amounts: amounts.len(),
        });
    }

    tokens
        .iter()
        .zip(amounts)
        .map(|(token, amount)| {
            Ok(TokenAmount::new(
                parse_address("token", Some(token))?,
                parse_amount("amount", amount)?,
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "0x1111111111111111111111111111111111111111";
    const TARGET: &str = "0x2222222222222222222222222222222222222222";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";
    const WETH: &str = "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2";

    fn raw_swap() -> RawEvent {
        RawEvent {
            event_type: Some("operation".to_string()),
            account: Some(ACCOUNT.to_string()),
            block_number: Some(100),
            log_index: Some(3),
            spending_cost: Some("2500".to_string()),
            target: Some(TARGET.to_string()),
            op_type: Some("swap".to_string()),
            tokens_in: vec![USDC.to_string()],
            amounts_in: vec!["1000".to_string()],
            tokens_out: vec![WETH.to_string()],
            amounts_out: vec!["5".to_string()],
            ..Default::default()
        }
    }

    #[test]
    fn test_normalize_operation() {
        let event = raw_swap().normalize(Timestamp::new(1_700_000_000)).unwrap();
        match event {
            Event::Operation(op) => {
                assert_eq!(op.kind, OperationKind::Swap);
                assert_eq!(op.inputs.len(), 1);
                assert_eq!(op.inputs[0].amount, Amount::from(1000u64));
                assert_eq!(op.outputs[0].token, Address::from_str(WETH).unwrap());
                assert_eq!(op.spending_cost, Amount::from(2500u64));
                assert_eq!(op.order_key, OrderKey::new(100, 3));
                assert_eq!(op.timestamp, Timestamp::new(1_700_000_000));
            }
            other => panic!("expected operation, got {:?}", other),
        }
    }

    #[test]
    fn test_normalize_transfer() {
        let raw = RawEvent {
            event_type: Some("transfer".to_string()),
            account: Some(ACCOUNT.to_string()),
            block_number: Some(7),
            log_index: Some(0),
            token: Some(USDC.to_string()),
            recipient: Some(TARGET.to_string()),
            amount: Some("42".to_string()),
            ..Default::default()
        };

        let event = raw.normalize(Timestamp::new(10)).unwrap();
        assert_eq!(event.spending_cost(), Amount::ZERO);
        match event {
            Event::Transfer(tr) => assert_eq!(tr.amount, Amount::from(42u64)),
            other => panic!("expected transfer, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_block_number_is_malformed() {
        let mut raw = raw_swap();
        raw.block_number = None;
        assert_eq!(
            raw.normalize(Timestamp::new(0)),
            Err(MalformedEvent::MissingField("blockNumber"))
        );
    }

    #[test]
    fn test_mismatched_arrays_are_malformed() {
        let mut raw = raw_swap();
        raw.amounts_in.push("1".to_string());
        assert!(matches!(
            raw.normalize(Timestamp::new(0)),
            Err(MalformedEvent::LengthMismatch { side: "inputs", .. })
        ));
    }

    #[test]
    fn test_unknown_op_type_is_malformed() {
        let mut raw = raw_swap();
        raw.op_type = Some("bridge".to_string());
        assert!(matches!(
            raw.normalize(Timestamp::new(0)),
            Err(MalformedEvent::InvalidField { field: "opType", .. })
        ));
    }

    #[test]
    fn test_bad_amount_is_malformed() {
        let mut raw = raw_swap();
        raw.amounts_out = vec!["-5".to_string()];
        assert!(matches!(
            raw.normalize(Timestamp::new(0)),
            Err(MalformedEvent::InvalidField { field: "amount", .. })
        ));
    }

    #[test]
    fn test_raw_event_json_roundtrip_uses_camel_case() {
        let json = serde_json::to_value(raw_swap()).unwrap();
        assert_eq!(json["eventType"], "operation");
        assert_eq!(json["blockNumber"], 100);
        assert_eq!(json["tokensIn"][0], USDC);
        assert!(json.get("recipient").is_none());
    }
}
