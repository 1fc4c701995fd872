use super::traits::{ensure_unit_interval, ConfigSection};
use crate::error::AeteError;
use serde::{Deserialize, Serialize};

/// Reinforcement learning parameters for the fitness episodes
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RlParams {
    pub learning_rate: f64,
    pub gamma: f64,
    pub epsilon_start: f64,
    pub epsilon_end: f64,
    /// Multiplicative decay applied after every step
    pub epsilon_decay: f64,
    pub memory_size: usize,
    pub batch_size: usize,
    /// Episodes replayed over the market window per evaluation
    pub episodes: usize,
    pub initial_equity: f64,
    pub reward: RewardShaping,
}

/// Maps an episode outcome to the primary fitness
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum RewardShaping {
    /// `return / max(drawdown, epsilon)`
    RiskAdjusted { epsilon: f64 },
    RawReturn,
    /// `return - penalty * drawdown`
    DrawdownPenalized { penalty: f64 },
}

impl Default for RewardShaping {
    fn default() -> Self {
        RewardShaping::RiskAdjusted { epsilon: 0.01 }
    }
}

impl RewardShaping {
    pub fn fitness(&self, total_return: f64, max_drawdown: f64) -> f64 {
        match *self {
            RewardShaping::RiskAdjusted { epsilon } => {
                total_return / max_drawdown.max(epsilon).max(f64::EPSILON)
            }
            RewardShaping::RawReturn => total_return,
            RewardShaping::DrawdownPenalized { penalty } => total_return - penalty * max_drawdown,
        }
    }
}

impl Default for RlParams {
    fn default() -> Self {
        Self {
            learning_rate: 0.001,
            gamma: 0.99,
            epsilon_start: 1.0,
            epsilon_end: 0.01,
            epsilon_decay: 0.995,
            memory_size: 10000,
            batch_size: 64,
            episodes: 3,
            initial_equity: 10_000.0,
            reward: RewardShaping::default(),
        }
    }
}

impl ConfigSection for RlParams {
    fn section_name() -> &'static str {
        "rl"
    }

    fn validate(&self) -> Result<(), AeteError> {
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(AeteError::Config(format!(
                "rl.learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        ensure_unit_interval("rl", "gamma", self.gamma)?;
        ensure_unit_interval("rl", "epsilon_start", self.epsilon_start)?;
        ensure_unit_interval("rl", "epsilon_end", self.epsilon_end)?;
        ensure_unit_interval("rl", "epsilon_decay", self.epsilon_decay)?;
        if self.epsilon_end > self.epsilon_start {
            return Err(AeteError::Config(
                "rl.epsilon_end must not exceed rl.epsilon_start".to_string(),
            ));
        }
        if self.batch_size == 0 || self.memory_size < self.batch_size {
            return Err(AeteError::Config(format!(
                "rl.memory_size ({}) must be >= rl.batch_size ({}) > 0",
                self.memory_size, self.batch_size
            )));
        }
        if self.episodes == 0 {
            return Err(AeteError::Config("rl.episodes must be at least 1".to_string()));
        }
        if self.initial_equity <= 0.0 {
            return Err(AeteError::Config("rl.initial_equity must be positive".to_string()));
        }
        if let RewardShaping::RiskAdjusted { epsilon } = self.reward {
            if epsilon <= 0.0 {
                return Err(AeteError::Config(
                    "rl.reward epsilon must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risk_adjusted_never_divides_by_zero() {
        let shaping = RewardShaping::RiskAdjusted { epsilon: 0.01 };
        let fitness = shaping.fitness(0.05, 0.0);
        assert!(fitness.is_finite());
        assert!((fitness - 5.0).abs() < 1e-9);
    }

    #[test]
    fn drawdown_penalized_subtracts() {
        let shaping = RewardShaping::DrawdownPenalized { penalty: 2.0 };
        assert!((shaping.fitness(0.10, 0.03) - 0.04).abs() < 1e-12);
    }

    #[test]
    fn rejects_batch_larger_than_memory() {
        let params = RlParams {
            memory_size: 8,
            batch_size: 16,
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
