use std::collections::HashSet;

use crate::engines::evaluation::record::FitnessRecord;
use crate::engines::generation::genome::Genome;
use crate::engines::generation::population::rank_order;

#[derive(Clone, Debug, PartialEq)]
pub struct EliteStrategy {
    pub genome: Genome,
    pub record: FitnessRecord,
    pub signature: String, // For deduplication
}

impl EliteStrategy {
    pub fn new(genome: Genome, record: FitnessRecord) -> Self {
        let signature = genome.signature();
        Self {
            genome,
            record,
            signature,
        }
    }
}

/// Best distinct gene vectors seen across the whole run
pub struct HallOfFame {
    strategies: Vec<EliteStrategy>,
    max_size: usize,
    seen_signatures: HashSet<String>,
}

impl HallOfFame {
    pub fn new(max_size: usize) -> Self {
        Self {
            strategies: Vec::new(),
            max_size,
            seen_signatures: HashSet::new(),
        }
    }

    /// Attempt to add a strategy. Failed evaluations are rejected. A gene
    /// vector already present only replaces the stored entry when its new
    /// record ranks higher.
    pub fn try_add(&mut self, strategy: EliteStrategy) -> bool {
        if strategy.record.is_failure() || self.max_size == 0 {
            return false;
        }
        if self.seen_signatures.contains(&strategy.signature) {
            return self.replace_if_better(strategy);
        }

        let signature = strategy.signature.clone();
        self.seen_signatures.insert(signature.clone());
        self.strategies.push(strategy);
        self.strategies
            .sort_by(|a, b| rank_order((&a.genome, &a.record), (&b.genome, &b.record)));

        while self.strategies.len() > self.max_size {
            if let Some(removed) = self.strategies.pop() {
                self.seen_signatures.remove(&removed.signature);
            }
        }

        // false when the newcomer was trimmed straight away
        self.seen_signatures.contains(&signature)
    }

    fn replace_if_better(&mut self, strategy: EliteStrategy) -> bool {
        let Some(slot) = self.strategies.iter().position(|s| s.signature == strategy.signature) else {
            return false;
        };
        let existing = &self.strategies[slot];
        let better = rank_order((&strategy.genome, &strategy.record), (&existing.genome, &existing.record))
            == std::cmp::Ordering::Less;
        if better {
            self.strategies[slot] = strategy;
            self.strategies
                .sort_by(|a, b| rank_order((&a.genome, &a.record), (&b.genome, &b.record)));
        }
        better
    }

    pub fn get_all(&self) -> &[EliteStrategy] {
        &self.strategies
    }

    pub fn get_top_n(&self, n: usize) -> &[EliteStrategy] {
        &self.strategies[..n.min(self.strategies.len())]
    }

    pub fn best(&self) -> Option<&EliteStrategy> {
        self.strategies.first()
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::evaluation::record::FitnessMetrics;
    use crate::engines::generation::genome::{Gene, GenomeId};

    fn elite(id: u64, lookback: f64, fitness: f64) -> EliteStrategy {
        let genome = Genome::new(GenomeId(id), 0, vec![Gene::real("lookback", lookback)], vec![]);
        let record = FitnessRecord::scored(GenomeId(id), 0, fitness, FitnessMetrics::default(), 0, "w".into());
        EliteStrategy::new(genome, record)
    }

    #[test]
    fn keeps_best_distinct_strategies() {
        let mut hof = HallOfFame::new(2);
        assert!(hof.try_add(elite(0, 5.0, 1.0)));
        assert!(!hof.try_add(elite(1, 5.0, 0.1)), "same genes, worse record");
        assert!(hof.try_add(elite(2, 6.0, 3.0)));
        assert!(hof.try_add(elite(3, 7.0, 2.0)));
        assert!(!hof.try_add(elite(4, 8.0, 0.5)));

        let fitness: Vec<f64> = hof.get_all().iter().map(|s| s.record.fitness).collect();
        assert_eq!(fitness, vec![3.0, 2.0]);
        // evicted signatures may come back
        assert!(hof.try_add(elite(5, 5.0, 10.0)));
        assert_eq!(hof.best().map(|s| s.genome.id()), Some(GenomeId(5)));
    }

    #[test]
    fn re_evaluated_elite_keeps_its_best_record() {
        let mut hof = HallOfFame::new(3);
        assert!(hof.try_add(elite(0, 5.0, 1.0)));
        assert!(hof.try_add(elite(1, 6.0, 2.0)));

        assert!(hof.try_add(elite(0, 5.0, 4.0)));
        assert_eq!(hof.len(), 2);
        assert_eq!(hof.best().map(|s| (s.genome.id(), s.record.fitness)), Some((GenomeId(0), 4.0)));

        assert!(!hof.try_add(elite(0, 5.0, 3.0)));
        assert_eq!(hof.best().map(|s| s.record.fitness), Some(4.0));
    }

    #[test]
    fn failures_are_never_admitted() {
        let mut hof = HallOfFame::new(3);
        let genome = Genome::new(GenomeId(0), 0, vec![Gene::real("lookback", 5.0)], vec![]);
        let record = FitnessRecord::failed(GenomeId(0), 0, 0, "w".into(), "boom");
        assert!(!hof.try_add(EliteStrategy::new(genome, record)));
        assert!(hof.is_empty());
    }
}
