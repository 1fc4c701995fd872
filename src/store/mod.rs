//! Versioned strategy persistence.

pub mod backend;
pub mod document;

pub use backend::{DocumentBackend, DocumentWrite, JsonFileBackend, MemoryBackend};
pub use document::DocumentStrategyStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engines::evaluation::record::FitnessRecord;
use crate::engines::generation::genome::{Genome, GenomeId};
use crate::engines::generation::population::{DiversityStats, Population};
use crate::error::StoreError;
use crate::types::Side;

/// A promoted genome checkpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyVersion {
    pub lineage: String,
    /// Strictly increasing per lineage, never reused
    pub version: u64,
    pub genome: Genome,
    pub record: FitnessRecord,
    pub promoted_at: DateTime<Utc>,
}

impl StrategyVersion {
    /// Identifier used for trade logging, e.g. `btc-momentum@v3`
    pub fn strategy_id(&self) -> String {
        format!("{}@v{}", self.lineage, self.version)
    }
}

/// Persisted view of one generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSnapshot {
    pub generation: u32,
    pub genomes: Vec<Genome>,
    pub records: Vec<FitnessRecord>,
    pub diversity: DiversityStats,
}

impl GenerationSnapshot {
    pub fn from_population(population: &Population) -> Self {
        Self {
            generation: population.generation(),
            genomes: population.genomes().to_vec(),
            records: population.records().cloned().collect(),
            diversity: population.diversity().clone(),
        }
    }
}

/// Latest persisted state of a single genome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredStrategy {
    pub genome: Genome,
    pub last_generation: u32,
    pub last_record: Option<FitnessRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLog {
    pub strategy_id: String,
    pub side: Side,
    pub quantity: f64,
    pub price: f64,
    /// Realized profit of the trade, zero for opening fills
    pub pnl: f64,
    pub timestamp: DateTime<Utc>,
}

/// Running per-strategy aggregate over logged trades
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyPerformance {
    pub strategy_id: String,
    pub trade_count: u64,
    pub wins: u64,
    pub realized_pnl: f64,
    pub last_trade_at: Option<DateTime<Utc>>,
}

impl StrategyPerformance {
    pub fn win_rate(&self) -> f64 {
        if self.trade_count == 0 {
            0.0
        } else {
            self.wins as f64 / self.trade_count as f64
        }
    }
}

pub trait StrategyStore: Send + Sync {
    /// Persists all genomes and records of `population`, all or nothing.
    fn save_generation(&self, population: &Population) -> Result<(), StoreError>;

    /// Creates the next version in `lineage`. Concurrent calls never share
    /// or reorder version numbers.
    fn promote(&self, lineage: &str, genome: &Genome, record: &FitnessRecord) -> Result<StrategyVersion, StoreError>;

    fn get_best(&self, lineage: &str) -> Result<Option<StrategyVersion>, StoreError>;

    fn get_strategy(&self, id: GenomeId) -> Result<Option<StoredStrategy>, StoreError>;

    fn get_generation(&self, generation: u32) -> Result<Option<GenerationSnapshot>, StoreError>;

    /// All versions of a lineage, oldest first
    fn versions(&self, lineage: &str) -> Result<Vec<StrategyVersion>, StoreError>;

    fn log_trade(&self, trade: &TradeLog) -> Result<(), StoreError>;

    fn get_performance(&self, strategy_id: &str) -> Result<Option<StrategyPerformance>, StoreError>;
}
