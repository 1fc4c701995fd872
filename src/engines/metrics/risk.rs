// src/engines/metrics/risk.rs

pub struct RiskMetrics;

impl RiskMetrics {
    /// Peak-to-trough decline as a fraction of the peak
    pub fn max_drawdown(equity: &[f64]) -> f64 {
        let Some(&first) = equity.first() else {
            return 0.0;
        };
        let mut max_dd: f64 = 0.0;
        let mut peak = first;

        for &value in equity {
            if value > peak {
                peak = value;
            }
            if peak > 0.0 {
                max_dd = max_dd.max((peak - value) / peak);
            }
        }

        max_dd
    }

    pub fn returns(equity: &[f64]) -> Vec<f64> {
        equity
            .windows(2)
            .filter(|w| w[0] != 0.0)
            .map(|w| (w[1] - w[0]) / w[0])
            .collect()
    }

    /// Per-step Sharpe ratio with a zero risk-free rate. Flat curves give 0.
    pub fn sharpe(equity: &[f64]) -> f64 {
        let returns = Self::returns(equity);
        if returns.is_empty() {
            return 0.0;
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        let volatility = Self::std_dev(&returns);
        if volatility > 0.0 {
            mean / volatility
        } else {
            0.0
        }
    }

    fn std_dev(values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }

        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|&v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

        variance.sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drawdown_is_fractional() {
        assert!((RiskMetrics::max_drawdown(&[100.0, 120.0, 90.0, 130.0]) - 0.25).abs() < 1e-12);
        assert_eq!(RiskMetrics::max_drawdown(&[]), 0.0);
    }

    #[test]
    fn flat_curve_has_zero_sharpe() {
        assert_eq!(RiskMetrics::sharpe(&[100.0, 100.0, 100.0]), 0.0);
        assert!(RiskMetrics::sharpe(&[100.0, 101.0, 103.0, 104.0]) > 0.0);
    }
}
