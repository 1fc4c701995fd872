pub mod genome;
pub mod hall_of_fame;
pub mod operators;
pub mod orchestrator;
pub mod population;
pub mod progress;

pub use genome::{Gene, GeneSchema, GeneSpec, GeneValue, Genome, GenomeFactory, GenomeId, Offspring};
pub use hall_of_fame::{EliteStrategy, HallOfFame};
pub use operators::{GeneticOperators, Tournament};
pub use orchestrator::{
    EvolutionOrchestrator, GenerationSummary, ProgressCallback, RunReport, RunState, StopHandle, StopReason,
};
pub use population::{DiversityStats, Population, PopulationManager};
pub use progress::{ChannelProgressCallback, LogProgressCallback, ProgressMessage};
