use super::traits::ConfigSection;
use crate::error::AeteError;
use serde::{Deserialize, Serialize};

/// Hard limits applied to every simulated or live episode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskLimits {
    /// Maximum position notional as a fraction of current equity
    pub max_position_size: f64,
    /// Drawdown (fraction of peak equity) beyond which exposure may only shrink
    pub max_drawdown: f64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_position_size: 0.1,
            max_drawdown: 0.2,
        }
    }
}

impl ConfigSection for RiskLimits {
    fn section_name() -> &'static str {
        "risk"
    }

    fn validate(&self) -> Result<(), AeteError> {
        if self.max_position_size <= 0.0 || self.max_position_size > 1.0 {
            return Err(AeteError::Config(format!(
                "risk.max_position_size must be in (0, 1], got {}",
                self.max_position_size
            )));
        }
        if self.max_drawdown <= 0.0 || self.max_drawdown > 1.0 {
            return Err(AeteError::Config(format!(
                "risk.max_drawdown must be in (0, 1], got {}",
                self.max_drawdown
            )));
        }
        Ok(())
    }
}
