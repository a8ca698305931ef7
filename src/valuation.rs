use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::portfolio::Portfolio;

pub const HISTORY_CAPACITY: usize = 500;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HoldingValue {
    pub coin_id: String,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub value: Decimal,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Valuation {
    pub value: Decimal,
    pub distribution: Vec<HoldingValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ValuationPoint {
    pub time: DateTime<Utc>,
    pub value: Decimal,
}

/// Value of each holding at `prices`. Coins without a known price are worth zero.
pub fn distribution(portfolio: &Portfolio, prices: &HashMap<String, Decimal>) -> Vec<HoldingValue> {
    portfolio
        .holdings()
        .iter()
        .map(|(coin_id, quantity)| {
            let price = prices.get(coin_id).copied();
            HoldingValue {
                coin_id: coin_id.clone(),
                quantity: *quantity,
                price,
                value: price
                    .and_then(|p| p.checked_mul(*quantity))
                    .unwrap_or(Decimal::ZERO)
                    .normalize(),
            }
        })
        .collect()
}

/// Cash plus the value of every holding at `prices`.
pub fn portfolio_value(portfolio: &Portfolio, prices: &HashMap<String, Decimal>) -> Decimal {
    valuate(portfolio, prices).value
}

pub fn valuate(portfolio: &Portfolio, prices: &HashMap<String, Decimal>) -> Valuation {
    let distribution = distribution(portfolio, prices);
    let value = distribution
        .iter()
        .fold(portfolio.cash(), |acc, holding| acc.saturating_add(holding.value));
    Valuation {
        value: value.normalize(),
        distribution,
    }
}

/// Bounded record of portfolio values, oldest first.
#[derive(Clone, Debug)]
pub struct ValuationHistory {
    points: VecDeque<ValuationPoint>,
    capacity: usize,
}

impl Default for ValuationHistory {
    fn default() -> Self {
        Self::with_capacity(HISTORY_CAPACITY)
    }
}

impl ValuationHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&mut self, time: DateTime<Utc>, value: Decimal) -> ValuationPoint {
        if self.points.len() >= self.capacity {
            self.points.pop_front();
        }
        let point = ValuationPoint { time, value };
        self.points.push_back(point.clone());
        point
    }

    pub fn points(&self) -> Vec<ValuationPoint> {
        self.points.iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<&ValuationPoint> {
        self.points.back()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn portfolio() -> Portfolio {
        Portfolio::from_parts(
            dec!(500),
            BTreeMap::from([(String::from("btc"), dec!(0.5)), (String::from("eth"), dec!(2))]),
        )
        .unwrap()
    }

    #[test]
    fn test_portfolio_value() {
        let prices = HashMap::from([(String::from("btc"), dec!(30000)), (String::from("eth"), dec!(2000))]);
        assert_eq!(portfolio_value(&portfolio(), &prices), dec!(19500));
    }

    #[test]
    fn test_unknown_price_is_worth_nothing() {
        let prices = HashMap::from([(String::from("eth"), dec!(2000))]);
        let valuation = valuate(&portfolio(), &prices);
        assert_eq!(valuation.value, dec!(4500));
        assert_eq!(
            valuation.distribution,
            vec![
                HoldingValue {
                    coin_id: String::from("btc"),
                    quantity: dec!(0.5),
                    price: None,
                    value: dec!(0),
                },
                HoldingValue {
                    coin_id: String::from("eth"),
                    quantity: dec!(2),
                    price: Some(dec!(2000)),
                    value: dec!(4000),
                },
            ]
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let start = Utc::now();
        let mut history = ValuationHistory::with_capacity(3);
        assert!(history.is_empty());
        for i in 0..5 {
            history.record(start + Duration::seconds(i), Decimal::from(i));
        }
        assert_eq!(history.len(), 3);
        let values: Vec<Decimal> = history.points().iter().map(|p| p.value).collect();
        assert_eq!(values, vec![dec!(2), dec!(3), dec!(4)]);
        assert_eq!(history.latest().map(|p| p.value), Some(dec!(4)));
    }
}
