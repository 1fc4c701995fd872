//! The generation loop.
//!
//! Each generation is evaluated in parallel on a dedicated rayon pool with a
//! single fan-in barrier, then bred and persisted before the next one may
//! start evaluating. The store therefore only ever sees generations in
//! order. Store faults are retried with bounded backoff; once retries are
//! exhausted the run keeps evolving in memory and stops writing.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::config::{AppConfig, RetryPolicy};
use crate::engines::evaluation::{FitnessEvaluator, FitnessRecord};
use crate::engines::generation::genome::{GeneSchema, Genome, Offspring};
use crate::engines::generation::hall_of_fame::{EliteStrategy, HallOfFame};
use crate::engines::generation::operators::GeneticOperators;
use crate::engines::generation::population::{Population, PopulationManager};
use crate::error::{AeteError, Result, StoreError};
use crate::execution::ExecutorPool;
use crate::store::{StrategyStore, StrategyVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Evaluating,
    Breeding,
    Persisting,
    Converged,
    Terminated,
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Converged,
    MaxGenerations,
    Cancelled,
}

/// Cooperative stop signal, checked before each genome starts evaluating
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: u32, size: usize);
    /// Called from worker threads as each evaluation finishes
    fn on_strategy_evaluated(&mut self, record: &FitnessRecord, completed: usize, total: usize);
    fn on_generation_complete(&mut self, summary: &GenerationSummary);
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSummary {
    pub generation: u32,
    pub evaluated: usize,
    pub failures: usize,
    pub best_fitness: f64,
    /// Mean over successful evaluations
    pub mean_fitness: f64,
    pub promoted_version: Option<u64>,
    pub hall_of_fame_size: usize,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub state: RunState,
    pub stop_reason: StopReason,
    pub generations_completed: u32,
    /// Last version actually written to the store
    pub best_version: Option<StrategyVersion>,
    pub best_genome: Option<Genome>,
    pub best_record: Option<FitnessRecord>,
    pub hall_of_fame: Vec<EliteStrategy>,
    pub degraded_reason: Option<String>,
}

pub struct EvolutionOrchestrator {
    config: AppConfig,
    manager: PopulationManager,
    operators: GeneticOperators,
    evaluator: FitnessEvaluator,
    executors: Arc<ExecutorPool>,
    store: Arc<dyn StrategyStore>,
    workers: rayon::ThreadPool,
    rng: StdRng,
    state: RunState,
    stop: StopHandle,
    hall_of_fame: HallOfFame,
    best: Option<(Genome, FitnessRecord)>,
    best_version: Option<StrategyVersion>,
    stale_generations: usize,
    generations_completed: u32,
    degraded_reason: Option<String>,
}

impl EvolutionOrchestrator {
    pub fn new(
        config: AppConfig,
        schema: GeneSchema,
        executors: Arc<ExecutorPool>,
        store: Arc<dyn StrategyStore>,
    ) -> Result<Self> {
        config.validate()?;
        let seed = config.orchestrator.seed.unwrap_or_else(rand::random);
        log::info!(
            "Evolution run '{}' seeded with {} (population {}, {} generations max)",
            config.orchestrator.lineage,
            seed,
            config.ga.population_size,
            config.ga.max_generations
        );

        let manager = PopulationManager::new(config.ga.clone(), schema.clone(), Some(seed))?;
        let operators = GeneticOperators::new(config.ga.clone(), schema);
        let evaluator = FitnessEvaluator::new(
            config.rl.clone(),
            config.risk.clone(),
            seed,
            config.orchestrator.evaluation_timeout(),
            config.orchestrator.lease_timeout(),
        )?;
        let workers = rayon::ThreadPoolBuilder::new()
            .num_threads(config.orchestrator.workers)
            .build()
            .map_err(|e| AeteError::Config(format!("Failed to create worker pool: {}", e)))?;
        let hall_of_fame = HallOfFame::new(config.orchestrator.hall_of_fame_size);

        Ok(Self {
            config,
            manager,
            operators,
            evaluator,
            executors,
            store,
            workers,
            rng: StdRng::seed_from_u64(seed.rotate_left(17) ^ 0xB4EE_D5EE_D000_0001),
            state: RunState::Idle,
            stop: StopHandle::new(),
            hall_of_fame,
            best: None,
            best_version: None,
            stale_generations: 0,
            generations_completed: 0,
            degraded_reason: None,
        })
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn manager(&self) -> &PopulationManager {
        &self.manager
    }

    pub fn hall_of_fame(&self) -> &HallOfFame {
        &self.hall_of_fame
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded_reason.is_some()
    }

    /// Runs generations until convergence, `max_generations`, or a stop
    /// request. Only configuration and consistency faults abort the run.
    pub fn run(&mut self, progress: &mut dyn ProgressCallback) -> Result<RunReport> {
        if self.manager.current().is_none() {
            let schema = self.manager.schema().clone();
            self.manager.initialize(self.config.ga.population_size, &schema)?;
        }

        let stop_reason = loop {
            let generation = self
                .manager
                .generation()
                .ok_or_else(|| AeteError::Consistency("No current population".to_string()))?;

            self.state = RunState::Evaluating;
            if !self.evaluate_generation(generation, progress)? {
                log::warn!(
                    "Stop requested during generation {}; partial generation is discarded",
                    generation
                );
                break StopReason::Cancelled;
            }

            self.state = RunState::Breeding;
            let offspring = self.breed()?;

            self.state = RunState::Persisting;
            let summary = self.persist(generation)?;
            self.generations_completed += 1;
            progress.on_generation_complete(&summary);

            if self.stale_generations >= self.config.orchestrator.convergence_patience {
                break StopReason::Converged;
            }
            if self.generations_completed as usize >= self.config.ga.max_generations {
                break StopReason::MaxGenerations;
            }
            if self.stop.is_stopped() {
                break StopReason::Cancelled;
            }

            self.manager.advance(offspring)?;
        };

        self.state = if self.degraded_reason.is_some() {
            RunState::Degraded
        } else if stop_reason == StopReason::Converged {
            RunState::Converged
        } else {
            RunState::Terminated
        };

        let report = self.report(stop_reason);
        log::info!(
            "Run finished: {:?} ({:?}) after {} generations, best version {}",
            report.state,
            report.stop_reason,
            report.generations_completed,
            report
                .best_version
                .as_ref()
                .map(|v| format!("v{}", v.version))
                .unwrap_or_else(|| "none".to_string())
        );
        Ok(report)
    }

    /// Evaluates every unscored genome of the current generation. Returns
    /// false when a stop request left some genomes unscored.
    fn evaluate_generation(&mut self, generation: u32, progress: &mut dyn ProgressCallback) -> Result<bool> {
        let pending: Vec<Genome> = self
            .manager
            .current()
            .ok_or_else(|| AeteError::Consistency("No current population".to_string()))?
            .unscored()
            .into_iter()
            .cloned()
            .collect();
        let total = pending.len();
        progress.on_generation_start(generation, total);

        let records: Vec<FitnessRecord> = {
            let progress = Mutex::new(&mut *progress);
            let completed = AtomicUsize::new(0);
            let evaluator = &self.evaluator;
            let executors = self.executors.as_ref();
            let window = &self.config.orchestrator.window;
            let stop = &self.stop;

            self.workers.install(|| {
                pending
                    .par_iter()
                    .filter_map(|genome| {
                        if stop.is_stopped() {
                            return None;
                        }
                        let record = evaluator.evaluate(genome, generation, window, executors);
                        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                        progress
                            .lock()
                            .unwrap_or_else(|e| e.into_inner())
                            .on_strategy_evaluated(&record, done, total);
                        Some(record)
                    })
                    .collect()
            })
        };

        for record in records {
            self.manager.record(record)?;
        }
        Ok(self.manager.current().map(Population::is_fully_scored).unwrap_or(false))
    }

    fn breed(&mut self) -> Result<Vec<Offspring>> {
        let scored = self
            .manager
            .current()
            .ok_or_else(|| AeteError::Consistency("No current population".to_string()))?;
        let count = self.config.ga.population_size - self.config.ga.elitism_count;
        self.operators.breed(scored, count, &mut self.rng)
    }

    /// Saves the scored generation, then promotes its top genome if it beat
    /// the best so far by more than the improvement threshold.
    fn persist(&mut self, generation: u32) -> Result<GenerationSummary> {
        let population = self
            .manager
            .current()
            .ok_or_else(|| AeteError::Consistency("No current population".to_string()))?;
        let ranked = population.ranked()?;
        let (top_genome, top_record) = ranked
            .first()
            .map(|(g, r)| ((*g).clone(), (*r).clone()))
            .ok_or_else(|| AeteError::Consistency(format!("Generation {} is empty", generation)))?;

        let successes: Vec<f64> = ranked
            .iter()
            .filter(|(_, r)| !r.is_failure())
            .map(|(_, r)| r.fitness)
            .collect();
        let failures = ranked.len() - successes.len();
        let mean_fitness = if successes.is_empty() {
            0.0
        } else {
            successes.iter().sum::<f64>() / successes.len() as f64
        };
        for (genome, record) in &ranked {
            self.hall_of_fame
                .try_add(EliteStrategy::new((*genome).clone(), (*record).clone()));
        }

        let saved = if self.degraded_reason.is_none() {
            Some(with_retry(&self.config.orchestrator.retry, "save_generation", || {
                self.store.save_generation(population)
            }))
        } else {
            None
        };
        let evaluated = population.len();
        if let Some(Err(reason)) = saved {
            self.enter_degraded(reason);
        }

        let improved = !top_record.is_failure()
            && match &self.best {
                None => true,
                Some((_, best)) => {
                    top_record.fitness > best.fitness + self.config.orchestrator.improvement_threshold
                }
            };

        let mut promoted_version = None;
        if improved {
            self.stale_generations = 0;
            if self.degraded_reason.is_none() {
                let lineage = self.config.orchestrator.lineage.clone();
                let store = Arc::clone(&self.store);
                match with_retry(&self.config.orchestrator.retry, "promote", || {
                    store.promote(&lineage, &top_genome, &top_record)
                }) {
                    Ok(version) => {
                        promoted_version = Some(version.version);
                        self.best_version = Some(version);
                    }
                    Err(reason) => self.enter_degraded(reason),
                }
            }
            self.best = Some((top_genome, top_record.clone()));
        } else {
            self.stale_generations += 1;
        }

        log::info!(
            "Generation {}: best {:.4}, mean {:.4}, {} failures, stale {}{}",
            generation,
            top_record.fitness,
            mean_fitness,
            failures,
            self.stale_generations,
            promoted_version.map(|v| format!(", promoted v{}", v)).unwrap_or_default()
        );

        Ok(GenerationSummary {
            generation,
            evaluated,
            failures,
            best_fitness: top_record.fitness,
            mean_fitness,
            promoted_version,
            hall_of_fame_size: self.hall_of_fame.len(),
        })
    }

    fn enter_degraded(&mut self, reason: String) {
        log::error!("Persistence degraded, continuing in memory: {}", reason);
        self.degraded_reason = Some(reason);
    }

    fn report(&self, stop_reason: StopReason) -> RunReport {
        RunReport {
            state: self.state,
            stop_reason,
            generations_completed: self.generations_completed,
            best_version: self.best_version.clone(),
            best_genome: self.best.as_ref().map(|(g, _)| g.clone()),
            best_record: self.best.as_ref().map(|(_, r)| r.clone()),
            hall_of_fame: self.hall_of_fame.get_all().to_vec(),
            degraded_reason: self.degraded_reason.clone(),
        }
    }
}

/// Calls `call` until it succeeds or the policy's attempts run out. The
/// error names the operation and the last fault.
fn with_retry<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut call: impl FnMut() -> std::result::Result<T, StoreError>,
) -> std::result::Result<T, String> {
    let mut attempt = 1;
    loop {
        match call() {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                log::warn!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    operation,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => {
                return Err(format!("{} failed after {} attempts: {}", operation, attempt, e));
            }
        }
    }
}
