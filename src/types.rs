use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Signed direction: +1 for buys, -1 for sells.
    pub fn sign(&self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

/// One market observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub volume: f64,
}

/// A bounded, reproducible slice of a tick series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarketWindow {
    pub symbol: String,
    pub start: usize,
    pub len: usize,
}

impl MarketWindow {
    pub fn new(symbol: impl Into<String>, start: usize, len: usize) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            len,
        }
    }

    /// Stable identifier recorded with every fitness record
    pub fn id(&self) -> String {
        format!("{}:{}+{}", self.symbol, self.start, self.len)
    }
}

/// Executed (possibly partial) fill reported by a TradeExecutor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FillResult {
    pub side: Side,
    pub requested: f64,
    pub filled: f64,
    pub price: f64,
    pub fee: f64,
}

/// Net position held on an executor session. `quantity` is signed
/// (positive long, negative short).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PositionState {
    pub quantity: f64,
    pub avg_price: f64,
}

impl PositionState {
    pub fn is_flat(&self) -> bool {
        self.quantity.abs() < 1e-12
    }
}
