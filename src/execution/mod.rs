//! Order execution capability consumed by the fitness evaluator.
//!
//! The evaluator only sees [`TradeExecutor`]; a simulated backtest executor
//! and a live-exchange adapter are interchangeable behind it. Sessions are
//! handed out through an [`ExecutorPool`] so rate-limited or serialized
//! exchange access is respected across concurrent evaluations.

pub mod pool;
pub mod simulated;

pub use pool::{ExecutorLease, ExecutorPool};
pub use simulated::{Fault, SimulatedExecutor};

use thiserror::Error;

use crate::types::{FillResult, MarketWindow, PositionState, Side, Tick};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    #[error("Market data failure: {0}")]
    Data(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("No executor session available: {0}")]
    Unavailable(String),
}

impl ExecutorError {
    /// Rejections leave the session usable; everything else ends the episode.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ExecutorError::Rejected(_))
    }
}

pub trait TradeExecutor: Send {
    /// Places a market (`price == None`) or priced order.
    fn place_order(&mut self, side: Side, size: f64, price: Option<f64>) -> Result<FillResult, ExecutorError>;

    fn get_position(&mut self) -> Result<PositionState, ExecutorError>;

    fn get_market_data(&mut self, window: &MarketWindow) -> Result<Vec<Tick>, ExecutorError>;
}
