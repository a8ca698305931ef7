use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::utils::{decimal_from_value, exact_mul, is_blank};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Copy, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TradeAction {
    Buy,
    Sell,
}

/// Trade request as received from a client, before any validation.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub coin_id: Option<Value>,
    pub action: Option<Value>,
    pub amount: Option<Value>,
    pub price: Option<Value>,
}

/// A validated trade, ready to be applied to a portfolio.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub coin_id: String,
    pub action: TradeAction,
    pub amount: Decimal,
    pub price: Decimal,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeError {
    #[error("Missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid amount or price")]
    InvalidAmount,

    #[error("Invalid action '{0}', expected buy or sell")]
    InvalidAction(String),

    #[error("Not enough cash: {required} required, {available} available")]
    InsufficientCash {
        required: Decimal,
        available: Decimal,
    },

    #[error("Not enough holdings of {coin_id}: {requested} requested, {held} held")]
    InsufficientHoldings {
        coin_id: String,
        requested: Decimal,
        held: Decimal,
    },
}

impl TradeRequest {
    pub fn new(
        coin_id: impl Into<Value>,
        action: impl Into<Value>,
        amount: impl Into<Value>,
        price: impl Into<Value>,
    ) -> Self {
        Self {
            coin_id: Some(coin_id.into()),
            action: Some(action.into()),
            amount: Some(amount.into()),
            price: Some(price.into()),
        }
    }

    /// Checks presence, then amount/price, then action. The first failure wins.
    pub fn validate(&self) -> Result<Trade, TradeError> {
        let coin_id = required(&self.coin_id, "coinId")?;
        let action = required(&self.action, "action")?;
        let amount = required(&self.amount, "amount")?;
        let price = required(&self.price, "price")?;

        let amount = positive_decimal(amount).ok_or(TradeError::InvalidAmount)?;
        let price = positive_decimal(price).ok_or(TradeError::InvalidAmount)?;

        let action = action
            .as_str()
            .and_then(|action| TradeAction::from_str(action).ok())
            .ok_or_else(|| TradeError::InvalidAction(display_value(action)))?;

        Ok(Trade {
            coin_id: display_value(coin_id),
            action,
            amount,
            price,
        })
    }
}

impl Trade {
    /// `amount * price`, `None` when it cannot be represented exactly.
    pub fn total(&self) -> Option<Decimal> {
        exact_mul(self.amount, self.price)
    }
}

fn required<'a>(value: &'a Option<Value>, name: &'static str) -> Result<&'a Value, TradeError> {
    match value {
        Some(value) if !is_blank(value) => Ok(value),
        _ => Err(TradeError::MissingField(name)),
    }
}

fn positive_decimal(value: &Value) -> Option<Decimal> {
    decimal_from_value(value)
        .filter(|d| *d > Decimal::ZERO)
        .map(|d| d.normalize())
}

fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_owned(),
        other => other.to_string(),
    }
}
