use std::sync::mpsc::Sender;

use super::orchestrator::{GenerationSummary, ProgressCallback};
use crate::engines::evaluation::record::FitnessRecord;

/// Reports progress through the `log` facade
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: u32, size: usize) {
        log::info!("Generation {} starting ({} genomes to evaluate)", generation, size);
    }

    fn on_strategy_evaluated(&mut self, record: &FitnessRecord, completed: usize, total: usize) {
        if completed % 10 == 0 || completed == total {
            log::debug!("  Evaluated {}/{} strategies", completed, total);
        }
        if let Some(reason) = &record.failure {
            log::debug!("  {} failed: {}", record.genome_id, reason);
        }
    }

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        log::info!(
            "Generation {} complete. Best fitness: {:.4}, mean: {:.4}, failures: {}, Hall of Fame size: {}",
            summary.generation,
            summary.best_fitness,
            summary.mean_fitness,
            summary.failures,
            summary.hall_of_fame_size
        );
    }
}

/// Forwards progress to another thread, e.g. a supervisor or UI
pub struct ChannelProgressCallback {
    sender: Sender<ProgressMessage>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressMessage {
    GenerationStart { generation: u32, size: usize },
    StrategyEvaluated { record: FitnessRecord, completed: usize, total: usize },
    GenerationComplete(GenerationSummary),
}

impl ChannelProgressCallback {
    pub fn new(sender: Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: u32, size: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart { generation, size });
    }

    fn on_strategy_evaluated(&mut self, record: &FitnessRecord, completed: usize, total: usize) {
        let _ = self.sender.send(ProgressMessage::StrategyEvaluated {
            record: record.clone(),
            completed,
            total,
        });
    }

    fn on_generation_complete(&mut self, summary: &GenerationSummary) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete(summary.clone()));
    }
}
