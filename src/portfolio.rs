use std::{collections::BTreeMap, fmt::Display};

use colored::Colorize;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    trade::{Trade, TradeAction, TradeError},
    utils::{exact_add, exact_sub},
};

/// Virtual cash plus the quantity held per coin.
///
/// `cash` is never negative and every holding is strictly positive; both are
/// checked when a snapshot is deserialized and kept by [`Portfolio::apply`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(try_from = "PortfolioSnapshot")]
pub struct Portfolio {
    cash: Decimal,
    holdings: BTreeMap<String, Decimal>,
}

#[derive(Deserialize)]
struct PortfolioSnapshot {
    cash: Decimal,
    #[serde(default)]
    holdings: BTreeMap<String, Decimal>,
}

impl TryFrom<PortfolioSnapshot> for Portfolio {
    type Error = String;

    fn try_from(snapshot: PortfolioSnapshot) -> Result<Self, Self::Error> {
        Portfolio::from_parts(snapshot.cash, snapshot.holdings)
    }
}

impl Portfolio {
    /// Empty portfolio. Negative cash is clamped to zero, user input is checked
    /// before it gets here.
    pub fn new(cash: Decimal) -> Self {
        Self {
            cash: cash.max(Decimal::ZERO).normalize(),
            holdings: BTreeMap::new(),
        }
    }

    pub fn from_parts(cash: Decimal, holdings: BTreeMap<String, Decimal>) -> Result<Self, String> {
        if cash < Decimal::ZERO {
            return Err(format!("Negative cash balance {}", cash));
        }
        if let Some((coin_id, amount)) = holdings.iter().find(|(_, amount)| **amount <= Decimal::ZERO) {
            return Err(format!("Non-positive holding {} for {}", amount, coin_id));
        }
        if holdings.keys().any(|coin_id| coin_id.is_empty()) {
            return Err(String::from("Empty coin id in holdings"));
        }
        Ok(Self { cash, holdings })
    }

    pub fn cash(&self) -> Decimal {
        self.cash
    }

    pub fn holdings(&self) -> &BTreeMap<String, Decimal> {
        &self.holdings
    }

    /// Held quantity for `coin_id`, zero when not held.
    pub fn holding(&self, coin_id: &str) -> Decimal {
        self.holdings.get(coin_id).copied().unwrap_or(Decimal::ZERO)
    }

    /// Returns the portfolio resulting from `trade`, leaving `self` untouched.
    pub fn apply(&self, trade: &Trade) -> Result<Portfolio, TradeError> {
        let mut next = self.clone();

        match trade.action {
            TradeAction::Buy => {
                let cost = match trade.total() {
                    Some(cost) => cost,
                    // too large to represent, more than any cash balance
                    None if trade.amount.checked_mul(trade.price).is_none() => {
                        return Err(TradeError::InsufficientCash {
                            required: Decimal::MAX,
                            available: self.cash,
                        })
                    }
                    None => return Err(TradeError::InvalidAmount),
                };
                if cost > self.cash {
                    return Err(TradeError::InsufficientCash {
                        required: cost,
                        available: self.cash,
                    });
                }
                let cash = exact_sub(self.cash, cost).ok_or(TradeError::InvalidAmount)?;
                let held = exact_add(self.holding(&trade.coin_id), trade.amount)
                    .ok_or(TradeError::InvalidAmount)?;

                next.cash = cash.normalize();
                next.holdings.insert(trade.coin_id.clone(), held.normalize());
            }
            TradeAction::Sell => {
                let held = self.holding(&trade.coin_id);
                if held < trade.amount {
                    return Err(TradeError::InsufficientHoldings {
                        coin_id: trade.coin_id.clone(),
                        requested: trade.amount,
                        held,
                    });
                }
                let proceeds = trade.total().ok_or(TradeError::InvalidAmount)?;
                let cash = exact_add(self.cash, proceeds).ok_or(TradeError::InvalidAmount)?;
                let remaining = exact_sub(held, trade.amount).ok_or(TradeError::InvalidAmount)?;

                if remaining.is_zero() {
                    next.holdings.remove(&trade.coin_id);
                } else {
                    next.holdings.insert(trade.coin_id.clone(), remaining.normalize());
                }
                next.cash = cash.normalize();
            }
        }

        Ok(next)
    }
}

impl Display for Portfolio {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s: Vec<String> = self
            .holdings
            .iter()
            .map(|(coin_id, amount)| format!("{}: {}", coin_id, amount.to_string().purple()))
            .collect();
        let holdings = if s.is_empty() {
            String::from("no holdings")
        } else {
            s.join(" / ")
        };
        write!(f, "cash {} : {}", self.cash.round_dp(2).to_string().yellow(), holdings)
    }
}
