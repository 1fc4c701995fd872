use super::traits::ConfigSection;
use crate::error::AeteError;
use crate::types::MarketWindow;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Run-level settings for the generation loop
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Strategy lineage key under which versions are promoted
    pub lineage: String,
    pub seed: Option<u64>,
    /// Evaluation worker threads, 0 lets rayon decide
    pub workers: usize,
    pub improvement_threshold: f64,
    pub convergence_patience: usize,
    pub evaluation_timeout_ms: u64,
    pub lease_timeout_ms: u64,
    pub hall_of_fame_size: usize,
    pub window: MarketWindow,
    pub retry: RetryPolicy,
}

/// Bounded exponential backoff for store calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff_ms: 50,
            max_backoff_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based: the wait after the first failure is `backoff(1)`).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        let ms = self.initial_backoff_ms as f64 * self.multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_backoff_ms as f64) as u64)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            lineage: "aete".to_string(),
            seed: None,
            workers: 0,
            improvement_threshold: 1e-6,
            convergence_patience: 10,
            evaluation_timeout_ms: 30_000,
            lease_timeout_ms: 10_000,
            hall_of_fame_size: 10,
            window: MarketWindow::new("SIM", 0, 500),
            retry: RetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_millis(self.evaluation_timeout_ms)
    }

    pub fn lease_timeout(&self) -> Duration {
        Duration::from_millis(self.lease_timeout_ms)
    }
}

impl ConfigSection for OrchestratorConfig {
    fn section_name() -> &'static str {
        "orchestrator"
    }

    fn validate(&self) -> Result<(), AeteError> {
        if self.lineage.trim().is_empty() {
            return Err(AeteError::Config("orchestrator.lineage must not be empty".to_string()));
        }
        if self.improvement_threshold < 0.0 {
            return Err(AeteError::Config(
                "orchestrator.improvement_threshold must be non-negative".to_string(),
            ));
        }
        if self.convergence_patience == 0 {
            return Err(AeteError::Config(
                "orchestrator.convergence_patience must be at least 1".to_string(),
            ));
        }
        if self.evaluation_timeout_ms == 0 {
            return Err(AeteError::Config(
                "orchestrator.evaluation_timeout_ms must be positive".to_string(),
            ));
        }
        if self.window.len < 2 {
            return Err(AeteError::Config(
                "orchestrator.window must span at least two ticks".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 || self.retry.multiplier < 1.0 {
            return Err(AeteError::Config(
                "orchestrator.retry needs max_attempts >= 1 and multiplier >= 1".to_string(),
            ));
        }
        Ok(())
    }
}
