use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engines::generation::genome::GenomeId;

/// Fitness assigned to genomes whose evaluation failed. It is finite so it
/// survives JSON persistence, and no successful evaluation can score below it.
pub const SENTINEL_FITNESS: f64 = f64::MIN;

/// Auxiliary diagnostics of the scored episode
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessMetrics {
    pub total_return: f64,
    /// Peak-to-trough drawdown as a fraction of peak equity
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub trade_count: usize,
    pub risk_violations: usize,
    pub episodes: usize,
    pub sharpe: f64,
}

/// Outcome of one completed evaluation. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessRecord {
    pub genome_id: GenomeId,
    /// Generation in which the evaluation ran
    pub generation: u32,
    pub fitness: f64,
    pub metrics: FitnessMetrics,
    pub episode_seed: u64,
    pub market_window: String,
    pub evaluated_at: DateTime<Utc>,
    pub failure: Option<String>,
}

impl FitnessRecord {
    pub fn scored(
        genome_id: GenomeId,
        generation: u32,
        fitness: f64,
        metrics: FitnessMetrics,
        episode_seed: u64,
        market_window: String,
    ) -> Self {
        Self {
            genome_id,
            generation,
            fitness,
            metrics,
            episode_seed,
            market_window,
            evaluated_at: Utc::now(),
            failure: None,
        }
    }

    /// Sentinel record for an aborted evaluation
    pub fn failed(
        genome_id: GenomeId,
        generation: u32,
        episode_seed: u64,
        market_window: String,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            genome_id,
            generation,
            fitness: SENTINEL_FITNESS,
            metrics: FitnessMetrics {
                max_drawdown: 1.0,
                ..Default::default()
            },
            episode_seed,
            market_window,
            evaluated_at: Utc::now(),
            failure: Some(reason.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}
