use serde::{Deserialize, Serialize};
use state::StateEvent;

pub mod config;
pub mod ledger;
pub mod market;
pub mod portfolio;
pub mod server;
pub mod state;
pub mod store;
pub mod trade;
pub mod utils;
pub mod valuation;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum AppEvent {
    State(StateEvent),
}
