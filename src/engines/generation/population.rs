use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use crate::config::{ConfigSection, GaParams};
use crate::engines::evaluation::record::FitnessRecord;
use crate::engines::generation::genome::{GeneSchema, Genome, GenomeFactory, GenomeId, Offspring};
use crate::error::{AeteError, Result};

/// Diversity statistics recorded when a generation is formed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiversityStats {
    /// Distinct gene vectors divided by population size
    pub unique_fraction: f64,
    /// Non-elite members gene-identical to an elite, before the guard ran
    pub elite_duplicates: usize,
    /// Random genomes injected in place of duplicates
    pub injected: usize,
}

/// Ranking order: higher fitness, then lower drawdown, then lower id.
pub fn rank_order(a: (&Genome, &FitnessRecord), b: (&Genome, &FitnessRecord)) -> Ordering {
    b.1.fitness
        .total_cmp(&a.1.fitness)
        .then_with(|| a.1.metrics.max_drawdown.total_cmp(&b.1.metrics.max_drawdown))
        .then_with(|| a.0.id().cmp(&b.0.id()))
}

#[derive(Debug, Clone)]
pub struct Population {
    generation: u32,
    genomes: Vec<Genome>,
    records: HashMap<GenomeId, FitnessRecord>,
    diversity: DiversityStats,
}

impl Population {
    pub fn new(generation: u32, genomes: Vec<Genome>) -> Self {
        let diversity = DiversityStats {
            unique_fraction: unique_fraction(&genomes),
            ..Default::default()
        };
        Self {
            generation,
            genomes,
            records: HashMap::new(),
            diversity,
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn genomes(&self) -> &[Genome] {
        &self.genomes
    }

    pub fn len(&self) -> usize {
        self.genomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genomes.is_empty()
    }

    pub fn contains(&self, id: GenomeId) -> bool {
        self.genomes.iter().any(|g| g.id() == id)
    }

    pub fn get(&self, id: GenomeId) -> Option<&Genome> {
        self.genomes.iter().find(|g| g.id() == id)
    }

    pub fn record(&self, id: GenomeId) -> Option<&FitnessRecord> {
        self.records.get(&id)
    }

    pub fn records(&self) -> impl Iterator<Item = &FitnessRecord> {
        self.genomes.iter().filter_map(|g| self.records.get(&g.id()))
    }

    pub fn diversity(&self) -> &DiversityStats {
        &self.diversity
    }

    /// Attaches a record. Records are write-once per genome.
    pub fn insert_record(&mut self, record: FitnessRecord) -> Result<()> {
        if !self.contains(record.genome_id) {
            return Err(AeteError::Consistency(format!(
                "Record for {} does not belong to generation {}",
                record.genome_id, self.generation
            )));
        }
        if self.records.contains_key(&record.genome_id) {
            return Err(AeteError::Consistency(format!(
                "Genome {} already scored in generation {}",
                record.genome_id, self.generation
            )));
        }
        self.records.insert(record.genome_id, record);
        Ok(())
    }

    pub fn unscored(&self) -> Vec<&Genome> {
        self.genomes
            .iter()
            .filter(|g| !self.records.contains_key(&g.id()))
            .collect()
    }

    pub fn is_fully_scored(&self) -> bool {
        self.genomes.iter().all(|g| self.records.contains_key(&g.id()))
    }

    /// Members in ranking order. Fails if any member is unscored.
    pub fn ranked(&self) -> Result<Vec<(&Genome, &FitnessRecord)>> {
        let mut ranked = Vec::with_capacity(self.genomes.len());
        for genome in &self.genomes {
            let record = self.records.get(&genome.id()).ok_or_else(|| {
                AeteError::Consistency(format!(
                    "Genome {} in generation {} has no fitness record",
                    genome.id(),
                    self.generation
                ))
            })?;
            ranked.push((genome, record));
        }
        ranked.sort_by(|a, b| rank_order(*a, *b));
        Ok(ranked)
    }

    pub fn best(&self) -> Option<(&Genome, &FitnessRecord)> {
        self.genomes
            .iter()
            .filter_map(|g| self.records.get(&g.id()).map(|r| (g, r)))
            .min_by(|a, b| rank_order(*a, *b))
    }
}

fn unique_fraction(genomes: &[Genome]) -> f64 {
    if genomes.is_empty() {
        return 0.0;
    }
    let distinct: HashSet<String> = genomes.iter().map(|g| g.signature()).collect();
    distinct.len() as f64 / genomes.len() as f64
}

/// Owns the current generation, its history and the lineage index.
pub struct PopulationManager {
    params: GaParams,
    schema: GeneSchema,
    rng: StdRng,
    next_id: u64,
    birth: HashMap<GenomeId, u32>,
    current: Option<Population>,
    history: Vec<Population>,
}

impl PopulationManager {
    pub fn new(params: GaParams, schema: GeneSchema, seed: Option<u64>) -> Result<Self> {
        params.validate()?;
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            params,
            schema,
            rng,
            next_id: 0,
            birth: HashMap::new(),
            current: None,
            history: Vec::new(),
        })
    }

    pub fn params(&self) -> &GaParams {
        &self.params
    }

    pub fn schema(&self) -> &GeneSchema {
        &self.schema
    }

    /// Creates `size` parentless seed genomes as generation 0.
    pub fn initialize(&mut self, size: usize, factory: &dyn GenomeFactory) -> Result<&Population> {
        if size < 2 {
            return Err(AeteError::Config(format!(
                "Population size must be at least 2, got {}",
                size
            )));
        }
        let mut genomes = Vec::with_capacity(size);
        for _ in 0..size {
            let genes = factory.create(&mut self.rng);
            self.schema.validate(&genes)?;
            genomes.push(self.mint(0, Offspring { genes, parents: Vec::new() }));
        }
        self.history.clear();
        log::info!("Initialized generation 0 with {} seed genomes", size);
        Ok(&*self.current.insert(Population::new(0, genomes)))
    }

    pub fn current(&self) -> Option<&Population> {
        self.current.as_ref()
    }

    /// Prior generations, oldest first
    pub fn history(&self) -> &[Population] {
        &self.history
    }

    pub fn generation(&self) -> Option<u32> {
        self.current.as_ref().map(|p| p.generation())
    }

    /// Birth generation of any genome this manager has created
    pub fn birth_generation(&self, id: GenomeId) -> Option<u32> {
        self.birth.get(&id).copied()
    }

    /// Attaches a fitness record to the current generation.
    pub fn record(&mut self, record: FitnessRecord) -> Result<()> {
        self.current
            .as_mut()
            .ok_or_else(|| AeteError::Consistency("No current population".to_string()))?
            .insert_record(record)
    }

    /// Forms the next generation from the scored current one.
    ///
    /// The top `elitism_count` genomes are carried over unchanged, the rest
    /// is filled from `offspring` (truncated, or padded with random seed
    /// genomes), then the diversity guard runs.
    pub fn advance(&mut self, offspring: Vec<Offspring>) -> Result<&Population> {
        let population_size = self.params.population_size;
        let elitism_count = self.params.elitism_count;
        if elitism_count >= population_size {
            return Err(AeteError::Consistency(format!(
                "Elitism count {} leaves no room in population of {}",
                elitism_count, population_size
            )));
        }

        let scored = self
            .current
            .as_ref()
            .ok_or_else(|| AeteError::Consistency("advance called before initialize".to_string()))?;
        let next_generation = scored.generation() + 1;

        let elites: Vec<Genome> = scored
            .ranked()?
            .into_iter()
            .take(elitism_count)
            .map(|(genome, _)| genome.clone())
            .collect();

        let slots = population_size - elites.len();
        let mut candidates: Vec<Offspring> = Vec::with_capacity(slots);
        for child in offspring.into_iter().take(slots) {
            self.check_offspring(&child, next_generation)?;
            candidates.push(child);
        }
        while candidates.len() < slots {
            candidates.push(self.random_offspring());
        }

        let (elite_duplicates, injected) = self.guard_diversity(&elites, &mut candidates);
        if injected > 0 {
            log::debug!(
                "Generation {}: replaced {} of {} elite duplicates with random genomes",
                next_generation,
                injected,
                elite_duplicates
            );
        }

        let mut genomes = elites;
        for child in candidates {
            genomes.push(self.mint(next_generation, child));
        }

        let mut next = Population::new(next_generation, genomes);
        next.diversity.elite_duplicates = elite_duplicates;
        next.diversity.injected = injected;

        if let Some(previous) = self.current.take() {
            self.history.push(previous);
        }
        Ok(&*self.current.insert(next))
    }

    fn check_offspring(&self, child: &Offspring, next_generation: u32) -> Result<()> {
        self.schema.validate(&child.genes)?;
        if child.parents.len() > 2 {
            return Err(AeteError::Consistency(format!(
                "Offspring lists {} parents, at most two are allowed",
                child.parents.len()
            )));
        }
        for parent in &child.parents {
            match self.birth.get(parent) {
                Some(&born) if born < next_generation => {}
                Some(&born) => {
                    return Err(AeteError::Consistency(format!(
                        "Parent {} (generation {}) is not older than generation {}",
                        parent, born, next_generation
                    )));
                }
                None => {
                    return Err(AeteError::Consistency(format!(
                        "Parent {} is unknown to this population",
                        parent
                    )));
                }
            }
        }
        Ok(())
    }

    /// Replaces elite duplicates beyond the allowed fraction. Returns
    /// `(duplicates_found, injected)`.
    fn guard_diversity(&mut self, elites: &[Genome], candidates: &mut [Offspring]) -> (usize, usize) {
        if elites.is_empty() || candidates.is_empty() {
            return (0, 0);
        }
        let duplicate_slots: Vec<usize> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| elites.iter().any(|e| e.genes() == c.genes.as_slice()))
            .map(|(i, _)| i)
            .collect();

        let allowed = (self.params.diversity_threshold * self.params.population_size as f64).floor() as usize;
        if duplicate_slots.len() <= allowed {
            return (duplicate_slots.len(), 0);
        }

        let excess = duplicate_slots.len() - allowed;
        for &slot in duplicate_slots.iter().rev().take(excess) {
            candidates[slot] = self.random_offspring();
        }
        (duplicate_slots.len(), excess)
    }

    fn random_offspring(&mut self) -> Offspring {
        Offspring {
            genes: self.schema.sample(&mut self.rng),
            parents: Vec::new(),
        }
    }

    fn mint(&mut self, generation: u32, child: Offspring) -> Genome {
        let id = GenomeId(self.next_id);
        self.next_id += 1;
        self.birth.insert(id, generation);
        Genome::new(id, generation, child.genes, child.parents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::record::FitnessMetrics;
    use crate::engines::generation::operators::GeneticOperators;

    fn params(size: usize, elites: usize) -> GaParams {
        GaParams {
            population_size: size,
            elitism_count: elites,
            ..Default::default()
        }
    }

    fn score(manager: &mut PopulationManager, fitness: &[f64]) {
        let ids: Vec<GenomeId> = manager.current().unwrap().genomes().iter().map(|g| g.id()).collect();
        let generation = manager.generation().unwrap();
        for (id, f) in ids.into_iter().zip(fitness) {
            let record = FitnessRecord::scored(id, generation, *f, FitnessMetrics::default(), 0, "w".into());
            manager.record(record).unwrap();
        }
    }

    #[test]
    fn initialize_rejects_tiny_population() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(4, 1), schema.clone(), Some(1)).unwrap();
        assert!(matches!(manager.initialize(1, &schema), Err(AeteError::Config(_))));
    }

    #[test]
    fn seeds_have_no_parents() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(6, 1), schema.clone(), Some(1)).unwrap();
        let population = manager.initialize(6, &schema).unwrap();
        assert_eq!(population.generation(), 0);
        assert!(population.genomes().iter().all(|g| g.is_seed() && g.generation() == 0));
    }

    #[test]
    fn advance_requires_full_scoring() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(4, 1), schema.clone(), Some(3)).unwrap();
        manager.initialize(4, &schema).unwrap();
        score(&mut manager, &[1.0, 2.0]);
        assert!(matches!(manager.advance(Vec::new()), Err(AeteError::Consistency(_))));
    }

    #[test]
    fn advance_pads_and_keeps_elites() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(5, 2), schema.clone(), Some(9)).unwrap();
        manager.initialize(5, &schema).unwrap();
        score(&mut manager, &[3.0, 9.0, 1.0, 9.0, 2.0]);

        let top: Vec<GenomeId> = manager
            .current()
            .unwrap()
            .ranked()
            .unwrap()
            .iter()
            .take(2)
            .map(|(g, _)| g.id())
            .collect();

        let next = manager.advance(Vec::new()).unwrap();
        assert_eq!(next.len(), 5);
        assert_eq!(next.generation(), 1);
        assert_eq!(next.genomes()[0].id(), top[0]);
        assert_eq!(next.genomes()[1].id(), top[1]);
        assert!(next.genomes()[2..].iter().all(|g| g.generation() == 1));
        assert_eq!(manager.history().len(), 1);
    }

    #[test]
    fn ties_break_on_drawdown_then_id() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(3, 1), schema.clone(), Some(2)).unwrap();
        manager.initialize(3, &schema).unwrap();
        let ids: Vec<GenomeId> = manager.current().unwrap().genomes().iter().map(|g| g.id()).collect();
        let drawdowns = [0.2, 0.1, 0.1];
        for (id, dd) in ids.iter().zip(drawdowns) {
            let metrics = FitnessMetrics { max_drawdown: dd, ..Default::default() };
            manager.record(FitnessRecord::scored(*id, 0, 5.0, metrics, 0, "w".into())).unwrap();
        }
        let ranked: Vec<GenomeId> = manager.current().unwrap().ranked().unwrap().iter().map(|(g, _)| g.id()).collect();
        assert_eq!(ranked, vec![ids[1], ids[2], ids[0]]);
    }

    #[test]
    fn rejects_forward_parent_reference() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(4, 1), schema.clone(), Some(5)).unwrap();
        manager.initialize(4, &schema).unwrap();
        score(&mut manager, &[1.0, 2.0, 3.0, 4.0]);
        let bogus = Offspring {
            genes: schema.sample(&mut StdRng::seed_from_u64(0)),
            parents: vec![GenomeId(999)],
        };
        assert!(matches!(manager.advance(vec![bogus]), Err(AeteError::Consistency(_))));
    }

    #[test]
    fn diversity_guard_replaces_elite_clones() {
        let schema = GeneSchema::default_strategy();
        let ga = GaParams {
            diversity_threshold: 0.25,
            ..params(5, 1)
        };
        let mut manager = PopulationManager::new(ga, schema.clone(), Some(11)).unwrap();
        manager.initialize(5, &schema).unwrap();
        score(&mut manager, &[10.0, 1.0, 1.0, 1.0, 1.0]);
        let elite = manager.current().unwrap().best().unwrap().0.clone();

        let clones = vec![elite.to_offspring(); 4];
        let next = manager.advance(clones).unwrap();

        // at most floor(0.25 * 5) = 1 clone may remain
        let remaining = next.genomes()[1..].iter().filter(|g| g.same_genes(&elite)).count();
        assert_eq!(remaining, 1);
        assert_eq!(next.diversity().elite_duplicates, 4);
        assert_eq!(next.diversity().injected, 3);
    }

    #[test]
    fn diversity_fraction_counts_the_whole_population() {
        let schema = GeneSchema::default_strategy();
        let ga = GaParams {
            diversity_threshold: 0.4,
            ..params(5, 1)
        };
        let mut manager = PopulationManager::new(ga, schema.clone(), Some(11)).unwrap();
        manager.initialize(5, &schema).unwrap();
        score(&mut manager, &[10.0, 1.0, 1.0, 1.0, 1.0]);
        let elite = manager.current().unwrap().best().unwrap().0.clone();

        let next = manager.advance(vec![elite.to_offspring(); 4]).unwrap();
        let remaining = next.genomes()[1..].iter().filter(|g| g.same_genes(&elite)).count();
        assert_eq!(remaining, 2);
        assert_eq!(next.diversity().injected, 2);
    }

    #[test]
    fn best_of_four_survives_into_generation_one() {
        let schema = GeneSchema::default_strategy();
        let mut manager = PopulationManager::new(params(4, 1), schema.clone(), Some(21)).unwrap();
        manager.initialize(4, &schema).unwrap();
        score(&mut manager, &[10.0, 7.0, 4.0, 1.0]);
        let best = manager.current().unwrap().genomes()[0].clone();

        let ops = GeneticOperators::new(manager.params().clone(), schema.clone());
        let mut rng = StdRng::seed_from_u64(42);
        let offspring = ops.breed(manager.current().unwrap(), 3, &mut rng).unwrap();
        let next = manager.advance(offspring).unwrap();

        assert_eq!(next.generation(), 1);
        assert_eq!(next.len(), 4);
        assert_eq!(next.genomes()[0], best);
        assert_eq!(next.genomes()[0].generation(), 0);
        assert!(next.genomes()[1..].iter().all(|g| g.generation() == 1 && g.id() != best.id()));
    }
}
