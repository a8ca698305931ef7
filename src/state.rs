use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    ledger::Ledger,
    portfolio::Portfolio,
    trade::{TradeAction, TradeError, TradeRequest},
    valuation::{valuate, Valuation, ValuationHistory, ValuationPoint},
};

pub const TRADE_LOG_CAPACITY: usize = 1000;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TradeRecord {
    pub id: Uuid,
    pub time: DateTime<Utc>,
    pub coin_id: String,
    pub action: TradeAction,
    pub amount: Decimal,
    pub price: Decimal,
    pub total: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum StateEvent {
    Portfolio(Portfolio),
    Trade(TradeRecord),
    Valuation(ValuationPoint),
}

/// Authoritative simulation state: the ledger plus what is derived from its trades.
#[derive(Clone, Debug)]
pub struct State {
    ledger: Ledger,
    trades: VecDeque<TradeRecord>,
    trade_capacity: usize,
    prices: HashMap<String, Decimal>,
    history: ValuationHistory,
}

impl Default for State {
    fn default() -> Self {
        Self::new(Ledger::default())
    }
}

impl State {
    pub fn new(ledger: Ledger) -> Self {
        let mut state = Self {
            ledger,
            trades: VecDeque::new(),
            trade_capacity: TRADE_LOG_CAPACITY,
            prices: HashMap::new(),
            history: ValuationHistory::default(),
        };
        let value = state.valuation().value;
        state.history.record(Utc::now(), value);
        state
    }

    /// Keeps at most `capacity` trades, dropping the oldest first.
    pub fn with_trade_capacity(mut self, capacity: usize) -> Self {
        self.trade_capacity = capacity.max(1);
        while self.trades.len() > self.trade_capacity {
            self.trades.pop_front();
        }
        self
    }

    pub fn portfolio(&self) -> &Portfolio {
        self.ledger.portfolio()
    }

    /// Most recent trades, oldest first.
    pub fn trades(&self) -> &VecDeque<TradeRecord> {
        &self.trades
    }

    pub fn history(&self) -> &ValuationHistory {
        &self.history
    }

    /// Validates and applies a trade. Returns the events describing the change,
    /// nothing is recorded when the ledger rejects the trade.
    pub fn execute(&mut self, request: &TradeRequest) -> Result<Vec<StateEvent>, TradeError> {
        let trade = request.validate()?;
        let portfolio = self.ledger.execute(&trade)?.clone();
        // a successful trade always has a representable total
        let total = trade.total().unwrap_or_default().normalize();

        let record = TradeRecord {
            id: Uuid::new_v4(),
            time: Utc::now(),
            coin_id: trade.coin_id.clone(),
            action: trade.action,
            amount: trade.amount,
            price: trade.price,
            total,
        };
        if self.trades.len() >= self.trade_capacity {
            self.trades.pop_front();
        }
        self.trades.push_back(record.clone());
        self.prices.insert(trade.coin_id, trade.price);

        let value = self.valuation().value;
        let point = self.history.record(record.time, value);

        Ok(vec![
            StateEvent::Trade(record),
            StateEvent::Portfolio(portfolio),
            StateEvent::Valuation(point),
        ])
    }

    pub fn last_trade(&self, coin_id: &str, action: Option<TradeAction>) -> Option<&TradeRecord> {
        self.trades
            .iter()
            .rev()
            .find(|trade| trade.coin_id == coin_id && action.is_none_or(|a| a == trade.action))
    }

    /// Last price each coin traded at.
    pub fn prices(&self) -> &HashMap<String, Decimal> {
        &self.prices
    }

    pub fn valuation(&self) -> Valuation {
        valuate(self.portfolio(), &self.prices)
    }

    /// Valuation at the given prices, falling back to the last traded price.
    pub fn valuation_at(&self, prices: &HashMap<String, Decimal>) -> Valuation {
        let mut merged = self.prices.clone();
        merged.extend(prices.iter().map(|(k, v)| (k.clone(), *v)));
        valuate(self.portfolio(), &merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_new_state_records_start_value() {
        let state = State::new(Ledger::new(dec!(10000)));
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.history().latest().map(|p| p.value), Some(dec!(10000)));
        assert!(state.trades().is_empty());
    }

    #[test]
    fn test_execute_records_trade() {
        let mut state = State::default();
        let events = state.execute(&TradeRequest::new("btc", "buy", 2, 100)).unwrap();
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[1], StateEvent::Portfolio(p) if p.cash() == dec!(9800)));

        let trade = state.last_trade("btc", None).unwrap();
        assert_eq!(trade.action, TradeAction::Buy);
        assert_eq!(trade.total, dec!(200));
        assert_eq!(state.prices().get("btc"), Some(&dec!(100)));
        assert_eq!(state.history().len(), 2);
        assert_eq!(state.history().latest().map(|p| p.value), Some(dec!(10000)));
    }

    #[test]
    fn test_valuation_follows_last_price() {
        let mut state = State::default();
        state.execute(&TradeRequest::new("btc", "buy", 2, 100)).unwrap();
        state.execute(&TradeRequest::new("btc", "sell", 1, 300)).unwrap();

        // 10000 - 200 + 300 = 10100 cash, 1 btc at 300
        assert_eq!(state.valuation().value, dec!(10400));
        assert_eq!(state.history().latest().map(|p| p.value), Some(dec!(10400)));

        let prices = HashMap::from([(String::from("btc"), dec!(50))]);
        assert_eq!(state.valuation_at(&prices).value, dec!(10150));
        assert_eq!(state.valuation_at(&HashMap::new()).value, dec!(10400));

        let last_buy = state.last_trade("btc", Some(TradeAction::Buy)).unwrap();
        assert_eq!(last_buy.price, dec!(100));
        let last = state.last_trade("btc", None).unwrap();
        assert_eq!(last.action, TradeAction::Sell);
    }

    #[test]
    fn test_trade_log_is_bounded() {
        let mut state = State::default().with_trade_capacity(3);
        for price in 1..=5 {
            state.execute(&TradeRequest::new("ada", "buy", 1, price)).unwrap();
        }
        let prices: Vec<Decimal> = state.trades().iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![dec!(3), dec!(4), dec!(5)]);
        // evicted trades still count in the ledger
        assert_eq!(state.portfolio().holding("ada"), dec!(5));
        assert_eq!(state.portfolio().cash(), dec!(9985));
    }

    #[test]
    fn test_rejected_trade_records_nothing() {
        let mut state = State::default();
        let res = state.execute(&TradeRequest::new("eth", "sell", 1, 10));
        assert!(matches!(res, Err(TradeError::InsufficientHoldings { .. })));
        assert!(state.trades().is_empty());
        assert!(state.prices().is_empty());
        assert_eq!(state.history().len(), 1);
        assert_eq!(state.portfolio(), &Portfolio::new(dec!(10000)));
    }
}
