use crate::error::{AeteError, Result};
use crate::types::Tick;

pub struct TickValidator;

impl TickValidator {
    /// Every price must be finite and positive, volumes non-negative
    pub fn validate_prices(ticks: &[Tick]) -> Result<()> {
        for (i, tick) in ticks.iter().enumerate() {
            if !tick.price.is_finite() || tick.price <= 0.0 {
                return Err(AeteError::Config(format!(
                    "Tick {} has invalid price {}",
                    i, tick.price
                )));
            }
            if !tick.volume.is_finite() || tick.volume < 0.0 {
                return Err(AeteError::Config(format!(
                    "Tick {} has invalid volume {}",
                    i, tick.volume
                )));
            }
        }
        Ok(())
    }

    pub fn validate_minimum_rows(ticks: &[Tick], min_rows: usize) -> Result<()> {
        if ticks.len() < min_rows {
            return Err(AeteError::Config(format!(
                "Insufficient ticks: {} rows (minimum {} required)",
                ticks.len(),
                min_rows
            )));
        }
        Ok(())
    }

    pub fn count_out_of_order(ticks: &[Tick]) -> usize {
        ticks.windows(2).filter(|w| w[1].timestamp < w[0].timestamp).count()
    }
}
