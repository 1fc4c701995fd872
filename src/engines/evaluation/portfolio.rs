use crate::types::FillResult;

/// Closed (or partially closed) position slice
#[derive(Debug, Clone, PartialEq)]
pub struct ClosedTrade {
    pub quantity: f64,
    pub entry_price: f64,
    pub exit_price: f64,
    pub profit: f64,
}

/// Episode-local book built from executor fills.
///
/// Positions are signed, so shorting adds the sale proceeds to cash and
/// buying back deducts them.
#[derive(Debug, Clone)]
pub struct Portfolio {
    pub initial_capital: f64,
    pub cash: f64,
    pub quantity: f64,
    pub entry_price: f64,
    pub fees: f64,
    pub fills: usize,
    pub trades: Vec<ClosedTrade>,
    pub equity_curve: Vec<f64>,
    pub peak_equity: f64,
    pub max_drawdown: f64,
    pub current_drawdown: f64,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            cash: initial_capital,
            quantity: 0.0,
            entry_price: 0.0,
            fees: 0.0,
            fills: 0,
            trades: Vec::new(),
            equity_curve: vec![initial_capital],
            peak_equity: initial_capital,
            max_drawdown: 0.0,
            current_drawdown: 0.0,
        }
    }

    pub fn apply_fill(&mut self, fill: &FillResult) {
        if fill.filled <= 0.0 {
            return;
        }
        let signed = fill.side.sign() * fill.filled;
        self.cash -= signed * fill.price + fill.fee;
        self.fees += fill.fee;
        self.fills += 1;

        let old = self.quantity;
        let new = old + signed;
        if old != 0.0 && old.signum() != signed.signum() {
            let closed = signed.abs().min(old.abs());
            self.trades.push(ClosedTrade {
                quantity: closed,
                entry_price: self.entry_price,
                exit_price: fill.price,
                profit: closed * (fill.price - self.entry_price) * old.signum(),
            });
        }

        if new.abs() < 1e-12 {
            self.quantity = 0.0;
            self.entry_price = 0.0;
        } else if old == 0.0 || old.signum() != new.signum() {
            // opened, or flipped through zero
            self.quantity = new;
            self.entry_price = fill.price;
        } else if new.abs() > old.abs() {
            self.entry_price = (self.entry_price * old.abs() + fill.price * signed.abs()) / new.abs();
            self.quantity = new;
        } else {
            self.quantity = new;
        }
    }

    pub fn equity(&self, price: f64) -> f64 {
        self.cash + self.quantity * price
    }

    /// Marks the book at `price`, extending the equity curve and drawdown.
    pub fn mark(&mut self, price: f64) -> f64 {
        let equity = self.equity(price);
        if equity > self.peak_equity {
            self.peak_equity = equity;
        }
        self.current_drawdown = if self.peak_equity > 0.0 {
            ((self.peak_equity - equity) / self.peak_equity).max(0.0)
        } else {
            1.0
        };
        self.max_drawdown = self.max_drawdown.max(self.current_drawdown);
        self.equity_curve.push(equity);
        equity
    }

    pub fn total_return(&self) -> f64 {
        let last = self.equity_curve.last().copied().unwrap_or(self.initial_capital);
        if self.initial_capital > 0.0 {
            (last - self.initial_capital) / self.initial_capital
        } else {
            0.0
        }
    }

    pub fn win_rate(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        let wins = self.trades.iter().filter(|t| t.profit > 0.0).count();
        wins as f64 / self.trades.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    fn fill(side: Side, qty: f64, price: f64) -> FillResult {
        FillResult { side, requested: qty, filled: qty, price, fee: 0.0 }
    }

    #[test]
    fn long_round_trip_realizes_profit() {
        let mut book = Portfolio::new(1000.0);
        book.apply_fill(&fill(Side::Buy, 2.0, 100.0));
        assert_eq!(book.cash, 800.0);
        book.apply_fill(&fill(Side::Sell, 2.0, 110.0));
        assert_eq!(book.quantity, 0.0);
        assert_eq!(book.cash, 1020.0);
        assert_eq!(book.trades.len(), 1);
        assert!((book.trades[0].profit - 20.0).abs() < 1e-9);
        assert_eq!(book.win_rate(), 1.0);
    }

    #[test]
    fn short_loses_when_price_rises() {
        let mut book = Portfolio::new(1000.0);
        book.apply_fill(&fill(Side::Sell, 1.0, 100.0));
        assert_eq!(book.equity(120.0), 980.0);
        book.apply_fill(&fill(Side::Buy, 1.0, 120.0));
        assert!((book.trades[0].profit + 20.0).abs() < 1e-9);
        assert_eq!(book.win_rate(), 0.0);
    }

    #[test]
    fn flipping_resets_entry_price() {
        let mut book = Portfolio::new(1000.0);
        book.apply_fill(&fill(Side::Buy, 1.0, 100.0));
        book.apply_fill(&fill(Side::Sell, 3.0, 90.0));
        assert_eq!(book.quantity, -2.0);
        assert_eq!(book.entry_price, 90.0);
        assert_eq!(book.trades.len(), 1);
    }

    #[test]
    fn drawdown_tracks_peak() {
        let mut book = Portfolio::new(100.0);
        book.apply_fill(&fill(Side::Buy, 1.0, 50.0));
        book.mark(100.0);
        book.mark(25.0);
        assert!((book.current_drawdown - 0.5).abs() < 1e-9);
        book.mark(75.0);
        assert!((book.max_drawdown - 0.5).abs() < 1e-9);
        assert!((book.total_return() - 0.25).abs() < 1e-9);
    }
}
