use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use aete::config::ConfigManager;
use aete::data::{synthetic_ticks, CsvConnector};
use aete::engines::generation::{EvolutionOrchestrator, GeneSchema, LogProgressCallback};
use aete::execution::{ExecutorPool, SimulatedExecutor, TradeExecutor};
use aete::store::{DocumentStrategyStore, JsonFileBackend, MemoryBackend, StrategyStore};

const USAGE: &str = "usage: aete [--config aete.toml] [--ticks prices.csv] [--store aete.json] [--sessions N]";

struct RunnerArgs {
    config: PathBuf,
    ticks: Option<PathBuf>,
    store: Option<PathBuf>,
    sessions: usize,
}

impl RunnerArgs {
    fn parse(mut args: impl Iterator<Item = String>) -> Result<Self> {
        let mut parsed = RunnerArgs {
            config: PathBuf::from("aete.toml"),
            ticks: None,
            store: None,
            sessions: 4,
        };
        while let Some(flag) = args.next() {
            let mut value = || args.next().with_context(|| format!("{} needs a value\n{}", flag, USAGE));
            match flag.as_str() {
                "--config" => parsed.config = PathBuf::from(value()?),
                "--ticks" => parsed.ticks = Some(PathBuf::from(value()?)),
                "--store" => parsed.store = Some(PathBuf::from(value()?)),
                "--sessions" => parsed.sessions = value()?.parse().context("--sessions expects a number")?,
                "-h" | "--help" => {
                    println!("{}", USAGE);
                    std::process::exit(0);
                }
                other => bail!("unknown argument '{}'\n{}", other, USAGE),
            }
        }
        if parsed.sessions == 0 {
            bail!("--sessions must be at least 1");
        }
        Ok(parsed)
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = RunnerArgs::parse(std::env::args().skip(1))?;

    let config_manager = ConfigManager::new();
    config_manager
        .load_from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let config = config_manager.get();

    let window = config.orchestrator.window.clone();
    let needed = window.start + window.len;
    let ticks = match &args.ticks {
        Some(path) => CsvConnector::load_and_validate(path, Some(needed))
            .with_context(|| format!("loading ticks from {}", path.display()))?,
        None => {
            log::info!("No tick file given, generating {} synthetic ticks", needed);
            synthetic_ticks(config.orchestrator.seed.unwrap_or(7), needed, 100.0, 0.0001, 0.01)
        }
    };
    let ticks = Arc::new(ticks);

    let sessions: Vec<Box<dyn TradeExecutor>> = (0..args.sessions)
        .map(|_| {
            Box::new(SimulatedExecutor::new(window.symbol.clone(), Arc::clone(&ticks)).with_costs(0.0005, 0.0002))
                as Box<dyn TradeExecutor>
        })
        .collect();
    let executors = Arc::new(ExecutorPool::new(sessions));

    let store: Arc<dyn StrategyStore> = match &args.store {
        Some(path) => Arc::new(DocumentStrategyStore::new(
            JsonFileBackend::open(path).with_context(|| format!("opening store {}", path.display()))?,
        )),
        None => {
            log::warn!("No --store given, results are kept in memory only");
            Arc::new(DocumentStrategyStore::new(MemoryBackend::new()))
        }
    };

    let lineage = config.orchestrator.lineage.clone();
    let mut orchestrator =
        EvolutionOrchestrator::new(config, GeneSchema::default_strategy(), executors, Arc::clone(&store))?;
    let report = orchestrator.run(&mut LogProgressCallback)?;

    if let Some(reason) = &report.degraded_reason {
        log::error!("Persistence degraded: {}", reason);
    }
    match (&report.best_genome, &report.best_record) {
        (Some(genome), Some(record)) => {
            log::info!(
                "Best genome {} (fitness {:.4}, return {:.2}%, drawdown {:.2}%)",
                genome.id(),
                record.fitness,
                record.metrics.total_return * 100.0,
                record.metrics.max_drawdown * 100.0
            );
            println!("{}", serde_json::to_string_pretty(genome.genes())?);
        }
        _ => log::warn!("No successful evaluation in this run"),
    }
    if let Some(version) = &report.best_version {
        log::info!("Best stored version: {} ({} versions in lineage)", version.strategy_id(), store.versions(&lineage)?.len());
    }

    Ok(())
}
