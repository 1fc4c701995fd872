use std::sync::Arc;
use std::time::Duration;

use super::{ExecutorError, TradeExecutor};
use crate::types::{FillResult, MarketWindow, PositionState, Side, Tick};

/// One-shot fault injected into a simulated session
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fault {
    /// The next market data request fails
    MarketData,
    /// Order number `n + 1` (counted from injection) fails with a connectivity error
    ConnectivityAfterOrders(usize),
}

/// Backtest executor filling orders against a shared tick series.
pub struct SimulatedExecutor {
    symbol: String,
    ticks: Arc<Vec<Tick>>,
    position: PositionState,
    commission_rate: f64,
    slippage: f64,
    last_price: Option<f64>,
    latency: Option<Duration>,
    fault: Option<Fault>,
    orders_since_fault: usize,
}

impl SimulatedExecutor {
    pub fn new(symbol: impl Into<String>, ticks: Arc<Vec<Tick>>) -> Self {
        Self {
            symbol: symbol.into(),
            ticks,
            position: PositionState::default(),
            commission_rate: 0.0,
            slippage: 0.0,
            last_price: None,
            latency: None,
            fault: None,
            orders_since_fault: 0,
        }
    }

    pub fn with_costs(mut self, commission_rate: f64, slippage: f64) -> Self {
        self.commission_rate = commission_rate;
        self.slippage = slippage;
        self
    }

    /// Sleeps on every call, for exercising evaluation timeouts
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_fault(mut self, fault: Fault) -> Self {
        self.inject(fault);
        self
    }

    pub fn inject(&mut self, fault: Fault) {
        self.fault = Some(fault);
        self.orders_since_fault = 0;
    }

    fn pause(&self) {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
    }

    fn apply_fill(&mut self, signed_qty: f64, price: f64) {
        let old = self.position.quantity;
        let new = old + signed_qty;
        if old == 0.0 || old.signum() == signed_qty.signum() {
            // opening or adding
            let notional = old.abs() * self.position.avg_price + signed_qty.abs() * price;
            self.position.avg_price = notional / new.abs();
        } else if new.abs() < 1e-12 {
            self.position.avg_price = 0.0;
        } else if new.signum() != old.signum() {
            // flipped through zero
            self.position.avg_price = price;
        }
        self.position.quantity = if new.abs() < 1e-12 { 0.0 } else { new };
    }
}

impl TradeExecutor for SimulatedExecutor {
    fn place_order(&mut self, side: Side, size: f64, price: Option<f64>) -> Result<FillResult, ExecutorError> {
        self.pause();
        if let Some(Fault::ConnectivityAfterOrders(n)) = self.fault {
            if self.orders_since_fault >= n {
                self.fault = None;
                return Err(ExecutorError::Connectivity("simulated session dropped".to_string()));
            }
            self.orders_since_fault += 1;
        }
        if !size.is_finite() || size <= 0.0 {
            return Err(ExecutorError::Rejected(format!("invalid order size {}", size)));
        }
        let reference = price
            .or(self.last_price)
            .ok_or_else(|| ExecutorError::Rejected("no reference price".to_string()))?;
        if !reference.is_finite() || reference <= 0.0 {
            return Err(ExecutorError::Rejected(format!("invalid price {}", reference)));
        }

        let fill_price = reference * (1.0 + side.sign() * self.slippage);
        let fee = size * fill_price * self.commission_rate;
        self.apply_fill(side.sign() * size, fill_price);
        self.last_price = Some(reference);

        Ok(FillResult {
            side,
            requested: size,
            filled: size,
            price: fill_price,
            fee,
        })
    }

    fn get_position(&mut self) -> Result<PositionState, ExecutorError> {
        self.pause();
        Ok(self.position.clone())
    }

    fn get_market_data(&mut self, window: &MarketWindow) -> Result<Vec<Tick>, ExecutorError> {
        self.pause();
        if self.fault == Some(Fault::MarketData) {
            self.fault = None;
            return Err(ExecutorError::Data("simulated feed outage".to_string()));
        }
        if window.symbol != self.symbol {
            return Err(ExecutorError::Data(format!(
                "unknown symbol {} (session serves {})",
                window.symbol, self.symbol
            )));
        }
        let end = window.start.saturating_add(window.len);
        if end > self.ticks.len() {
            return Err(ExecutorError::Data(format!(
                "window {} exceeds series of {} ticks",
                window.id(),
                self.ticks.len()
            )));
        }
        let slice = self.ticks[window.start..end].to_vec();
        self.last_price = slice.last().map(|t| t.price);
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> SimulatedExecutor {
        let ticks = Arc::new(crate::data::synthetic_ticks(3, 20, 100.0, 0.0, 0.01));
        SimulatedExecutor::new("SIM", ticks)
    }

    #[test]
    fn tracks_signed_position_and_average_price() {
        let mut sim = executor();
        sim.place_order(Side::Buy, 2.0, Some(100.0)).unwrap();
        sim.place_order(Side::Buy, 2.0, Some(110.0)).unwrap();
        let pos = sim.get_position().unwrap();
        assert_eq!(pos.quantity, 4.0);
        assert!((pos.avg_price - 105.0).abs() < 1e-9);

        sim.place_order(Side::Sell, 4.0, Some(120.0)).unwrap();
        assert!(sim.get_position().unwrap().is_flat());

        sim.place_order(Side::Sell, 1.0, Some(50.0)).unwrap();
        assert_eq!(sim.get_position().unwrap().quantity, -1.0);
    }

    #[test]
    fn rejects_bad_orders_recoverably() {
        let mut sim = executor();
        let err = sim.place_order(Side::Buy, 0.0, Some(100.0)).unwrap_err();
        assert!(err.is_recoverable());
        let err = sim.place_order(Side::Buy, 1.0, None).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[test]
    fn window_bounds_are_enforced() {
        let mut sim = executor();
        assert_eq!(sim.get_market_data(&MarketWindow::new("SIM", 5, 10)).unwrap().len(), 10);
        assert!(sim.get_market_data(&MarketWindow::new("SIM", 15, 10)).is_err());
        assert!(sim.get_market_data(&MarketWindow::new("ETH", 0, 10)).is_err());
    }

    #[test]
    fn connectivity_fault_fires_once() {
        let mut sim = executor().with_fault(Fault::ConnectivityAfterOrders(1));
        assert!(sim.place_order(Side::Buy, 1.0, Some(10.0)).is_ok());
        let err = sim.place_order(Side::Buy, 1.0, Some(10.0)).unwrap_err();
        assert!(!err.is_recoverable());
        assert!(sim.place_order(Side::Buy, 1.0, Some(10.0)).is_ok());
    }
}
