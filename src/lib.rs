//! Adaptive evolutionary trading engine: a genetic search over strategy
//! parameters, scored by reinforcement-learning trading episodes and
//! persisted as versioned strategy checkpoints.

pub mod config;
pub mod data;
pub mod engines;
pub mod error;
pub mod execution;
pub mod store;
pub mod types;

pub use engines::evaluation::{FitnessEvaluator, FitnessRecord};
pub use engines::generation::{EvolutionOrchestrator, GeneSchema, Genome, PopulationManager, RunReport};
pub use error::{AeteError, Result};
