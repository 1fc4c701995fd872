use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Mutex;

use super::backend::{DocumentBackend, DocumentWrite};
use super::{GenerationSnapshot, StoredStrategy, StrategyPerformance, StrategyStore, StrategyVersion, TradeLog};
use crate::engines::evaluation::record::FitnessRecord;
use crate::engines::generation::genome::{Genome, GenomeId};
use crate::engines::generation::population::Population;
use crate::error::StoreError;

const GENOMES: &str = "genomes";
const GENERATIONS: &str = "generations";
const STRATEGIES: &str = "strategies";
const BEST: &str = "best";
const TRADES: &str = "trades";
const PERFORMANCE: &str = "performance";

/// [`StrategyStore`] over any document backend
pub struct DocumentStrategyStore<B: DocumentBackend> {
    backend: B,
    /// Serializes promotions and trade aggregation
    write_lock: Mutex<()>,
}

impl<B: DocumentBackend> DocumentStrategyStore<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    fn version_key(lineage: &str, version: u64) -> String {
        format!("{}/v{:08}", lineage, version)
    }

    fn generation_key(generation: u32) -> String {
        format!("{:08}", generation)
    }

    fn read<T: DeserializeOwned>(&self, collection: &str, key: &str, field: &str) -> Result<Option<T>, StoreError> {
        match self.backend.get(collection, key)? {
            Some(doc) => match doc.get(field) {
                Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
                None => Err(StoreError::Serde(format!("{}/{} has no '{}' field", collection, key, field))),
            },
            None => Ok(None),
        }
    }
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, StoreError> {
    Ok(serde_json::to_value(value)?)
}

impl<B: DocumentBackend> StrategyStore for DocumentStrategyStore<B> {
    fn save_generation(&self, population: &Population) -> Result<(), StoreError> {
        let snapshot = GenerationSnapshot::from_population(population);
        let mut writes = Vec::with_capacity(population.len() + 1);
        for genome in population.genomes() {
            let stored = StoredStrategy {
                genome: genome.clone(),
                last_generation: population.generation(),
                last_record: population.record(genome.id()).cloned(),
            };
            writes.push(DocumentWrite::new(
                GENOMES,
                genome.id().to_string(),
                json!({ "strategy": to_value(&stored)? }),
            ));
        }
        writes.push(DocumentWrite::new(
            GENERATIONS,
            Self::generation_key(population.generation()),
            json!({ "snapshot": to_value(&snapshot)? }),
        ));
        self.backend.upsert_batch(writes)?;
        log::debug!(
            "Persisted generation {} ({} genomes)",
            population.generation(),
            population.len()
        );
        Ok(())
    }

    fn promote(&self, lineage: &str, genome: &Genome, record: &FitnessRecord) -> Result<StrategyVersion, StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Backend("promotion lock poisoned".to_string()))?;

        let version = self.backend.next_version(lineage)?;
        let promoted = StrategyVersion {
            lineage: lineage.to_string(),
            version,
            genome: genome.clone(),
            record: record.clone(),
            promoted_at: chrono::Utc::now(),
        };
        let key = Self::version_key(lineage, version);
        self.backend.upsert_batch(vec![
            DocumentWrite::new(STRATEGIES, key.clone(), json!({ "version": to_value(&promoted)? })),
            DocumentWrite::new(BEST, lineage, json!({ "key": key, "version": version })),
        ])?;
        log::info!(
            "Promoted {} as {} v{} (fitness {:.4})",
            genome.id(),
            lineage,
            version,
            record.fitness
        );
        Ok(promoted)
    }

    fn get_best(&self, lineage: &str) -> Result<Option<StrategyVersion>, StoreError> {
        let Some(key) = self.read::<String>(BEST, lineage, "key")? else {
            return Ok(None);
        };
        match self.read(STRATEGIES, &key, "version")? {
            Some(version) => Ok(Some(version)),
            None => Err(StoreError::NotFound {
                collection: STRATEGIES.to_string(),
                key,
            }),
        }
    }

    fn get_strategy(&self, id: GenomeId) -> Result<Option<StoredStrategy>, StoreError> {
        self.read(GENOMES, &id.to_string(), "strategy")
    }

    fn get_generation(&self, generation: u32) -> Result<Option<GenerationSnapshot>, StoreError> {
        self.read(GENERATIONS, &Self::generation_key(generation), "snapshot")
    }

    fn versions(&self, lineage: &str) -> Result<Vec<StrategyVersion>, StoreError> {
        let prefix = format!("{}/v", lineage);
        let mut versions = Vec::new();
        for (key, doc) in self.backend.list(STRATEGIES)? {
            if !key.starts_with(&prefix) {
                continue;
            }
            if let Some(value) = doc.get("version") {
                versions.push(serde_json::from_value::<StrategyVersion>(value.clone())?);
            }
        }
        versions.sort_by_key(|v| v.version);
        Ok(versions)
    }

    fn log_trade(&self, trade: &TradeLog) -> Result<(), StoreError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| StoreError::Backend("trade lock poisoned".to_string()))?;

        let seq = self.backend.next_version(&format!("{}:{}", TRADES, trade.strategy_id))?;
        let mut performance = self
            .read::<StrategyPerformance>(PERFORMANCE, &trade.strategy_id, "performance")?
            .unwrap_or_else(|| StrategyPerformance {
                strategy_id: trade.strategy_id.clone(),
                ..Default::default()
            });
        performance.trade_count += 1;
        if trade.pnl > 0.0 {
            performance.wins += 1;
        }
        performance.realized_pnl += trade.pnl;
        performance.last_trade_at = Some(trade.timestamp);

        self.backend.upsert_batch(vec![
            DocumentWrite::new(
                TRADES,
                format!("{}/{:010}", trade.strategy_id, seq),
                json!({ "trade": to_value(trade)? }),
            ),
            DocumentWrite::new(
                PERFORMANCE,
                trade.strategy_id.clone(),
                json!({ "performance": to_value(&performance)? }),
            ),
        ])
    }

    fn get_performance(&self, strategy_id: &str) -> Result<Option<StrategyPerformance>, StoreError> {
        self.read(PERFORMANCE, strategy_id, "performance")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GaParams;
    use crate::engines::evaluation::record::FitnessMetrics;
    use crate::engines::generation::genome::GeneSchema;
    use crate::engines::generation::population::PopulationManager;
    use crate::store::{JsonFileBackend, MemoryBackend};
    use crate::types::Side;
    use std::sync::Arc;
    use std::thread;

    fn scored_manager() -> PopulationManager {
        let params = GaParams {
            population_size: 4,
            elitism_count: 1,
            ..Default::default()
        };
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params, schema.clone(), Some(1)).unwrap();
        let ids: Vec<GenomeId> = manager
            .initialize(4, &schema)
            .unwrap()
            .genomes()
            .iter()
            .map(|g| g.id())
            .collect();
        for (i, id) in ids.into_iter().enumerate() {
            manager
                .record(FitnessRecord::scored(id, 0, i as f64, FitnessMetrics::default(), 0, "w".into()))
                .unwrap();
        }
        manager
    }

    #[test]
    fn generation_round_trips() {
        let store = DocumentStrategyStore::new(MemoryBackend::new());
        let manager = scored_manager();
        let population = manager.current().unwrap();
        store.save_generation(population).unwrap();

        let snapshot = store.get_generation(0).unwrap().unwrap();
        assert_eq!(snapshot.genomes.len(), 4);
        assert_eq!(snapshot.records.len(), 4);
        assert!(store.get_generation(1).unwrap().is_none());

        let first = &population.genomes()[0];
        let stored = store.get_strategy(first.id()).unwrap().unwrap();
        assert_eq!(&stored.genome, first);
        assert_eq!(stored.last_record.as_ref().map(|r| r.fitness), Some(0.0));
    }

    #[test]
    fn best_pointer_follows_promotions() {
        let store = DocumentStrategyStore::new(MemoryBackend::new());
        assert!(store.get_best("l").unwrap().is_none());
        let manager = scored_manager();
        let population = manager.current().unwrap();
        let (genome, record) = population.best().unwrap();

        let v1 = store.promote("l", genome, record).unwrap();
        let v2 = store.promote("l", genome, record).unwrap();
        let other = store.promote("other", genome, record).unwrap();
        assert_eq!((v1.version, v2.version, other.version), (1, 2, 1));
        assert_eq!(store.get_best("l").unwrap().unwrap().version, 2);
        assert_eq!(store.versions("l").unwrap().len(), 2);
    }

    #[test]
    fn concurrent_promotions_never_collide() {
        let store = Arc::new(DocumentStrategyStore::new(MemoryBackend::new()));
        let manager = scored_manager();
        let (genome, record) = manager.current().unwrap().best().unwrap();
        let (genome, record) = (genome.clone(), record.clone());
        store.promote("l", &genome, &record).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                let (genome, record) = (genome.clone(), record.clone());
                thread::spawn(move || store.promote("l", &genome, &record).unwrap().version)
            })
            .collect();
        let mut versions: Vec<u64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        versions.sort();
        assert_eq!(versions, vec![2, 3]);
        assert_eq!(store.get_best("l").unwrap().unwrap().version, 3);
    }

    #[test]
    fn trades_aggregate_per_strategy() {
        let store = DocumentStrategyStore::new(MemoryBackend::new());
        for pnl in [5.0, -2.0, 1.0] {
            store
                .log_trade(&TradeLog {
                    strategy_id: "l@v1".into(),
                    side: Side::Sell,
                    quantity: 1.0,
                    price: 100.0,
                    pnl,
                    timestamp: chrono::Utc::now(),
                })
                .unwrap();
        }
        let performance = store.get_performance("l@v1").unwrap().unwrap();
        assert_eq!(performance.trade_count, 3);
        assert_eq!(performance.wins, 2);
        assert!((performance.realized_pnl - 4.0).abs() < 1e-12);
        assert_eq!(store.backend().list(TRADES).unwrap().len(), 3);
        assert!(store.get_performance("nope").unwrap().is_none());
    }

    #[test]
    fn json_store_keeps_versions_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aete.json");
        let manager = scored_manager();
        let (genome, record) = manager.current().unwrap().best().unwrap();
        {
            let store = DocumentStrategyStore::new(JsonFileBackend::open(&path).unwrap());
            store.promote("l", genome, record).unwrap();
        }
        let store = DocumentStrategyStore::new(JsonFileBackend::open(&path).unwrap());
        assert_eq!(store.get_best("l").unwrap().unwrap().genome, *genome);
        assert_eq!(store.promote("l", genome, record).unwrap().version, 2);
    }
}
