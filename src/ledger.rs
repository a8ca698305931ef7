use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::{
    portfolio::Portfolio,
    trade::{Trade, TradeError, TradeRequest},
};

pub const DEFAULT_INITIAL_CASH: Decimal = dec!(10000);

/// Validates `request` and applies it to `portfolio` without mutating it.
pub fn apply_trade(portfolio: &Portfolio, request: &TradeRequest) -> Result<Portfolio, TradeError> {
    let trade = request.validate()?;
    portfolio.apply(&trade)
}

/// Sole owner of the simulated portfolio. All changes go through [`Ledger::trade`]
/// or [`Ledger::execute`].
#[derive(Clone, Debug)]
pub struct Ledger {
    portfolio: Portfolio,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new(DEFAULT_INITIAL_CASH)
    }
}

impl Ledger {
    pub fn new(initial_cash: Decimal) -> Self {
        Self::from_portfolio(Portfolio::new(initial_cash))
    }

    pub fn from_portfolio(portfolio: Portfolio) -> Self {
        Self { portfolio }
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    pub fn trade(&mut self, request: &TradeRequest) -> Result<Portfolio, TradeError> {
        let trade = request.validate()?;
        self.execute(&trade).cloned()
    }

    /// Applies an already validated trade. The portfolio is only replaced on success.
    pub fn execute(&mut self, trade: &Trade) -> Result<&Portfolio, TradeError> {
        self.portfolio = self.portfolio.apply(trade)?;
        Ok(&self.portfolio)
    }
}
