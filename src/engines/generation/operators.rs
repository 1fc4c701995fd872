use rand::seq::index;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::config::{BlendMode, GaParams};
use crate::engines::evaluation::record::FitnessRecord;
use crate::engines::generation::genome::{Gene, GeneSchema, GeneSpec, GeneValue, Genome, GenomeId, Offspring};
use crate::engines::generation::population::{rank_order, Population};
use crate::error::Result;

/// One tournament draw: who competed and who won
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tournament {
    pub contestants: Vec<GenomeId>,
    pub winner: GenomeId,
}

/// Selection, crossover and mutation over immutable genomes.
///
/// The operators hold only read-only configuration; all randomness comes
/// from the caller's rng, so a fixed seed reproduces the exact output.
#[derive(Debug, Clone)]
pub struct GeneticOperators {
    params: GaParams,
    schema: GeneSchema,
}

impl GeneticOperators {
    pub fn new(params: GaParams, schema: GeneSchema) -> Self {
        Self { params, schema }
    }

    /// Tournament selection: `count` winners, each the best of
    /// `tournament_size` members sampled without replacement.
    ///
    /// Failed evaluations only compete when the whole generation failed.
    pub fn select<R: Rng + ?Sized>(&self, scored: &Population, count: usize, rng: &mut R) -> Result<Vec<Genome>> {
        let ranked = scored.ranked()?;
        let successful: Vec<(&Genome, &FitnessRecord)> =
            ranked.iter().copied().filter(|(_, r)| !r.is_failure()).collect();
        let pool = if successful.is_empty() { ranked } else { successful };
        let winners = self
            .tournaments(&pool, count, rng)
            .into_iter()
            .filter_map(|t| scored.get(t.winner).cloned())
            .collect();
        Ok(winners)
    }

    /// Runs `count` independent tournaments over a scored pool.
    pub fn tournaments<R: Rng + ?Sized>(
        &self,
        pool: &[(&Genome, &FitnessRecord)],
        count: usize,
        rng: &mut R,
    ) -> Vec<Tournament> {
        if pool.is_empty() {
            return Vec::new();
        }
        let k = self.params.tournament_size.clamp(1, pool.len());
        (0..count)
            .map(|_| {
                let picks = index::sample(rng, pool.len(), k);
                let contestants: Vec<(&Genome, &FitnessRecord)> = picks.iter().map(|i| pool[i]).collect();
                let winner = contestants
                    .iter()
                    .copied()
                    .min_by(|a, b| rank_order(*a, *b))
                    .map(|(g, _)| g.id())
                    .unwrap_or_else(|| pool[0].0.id());
                Tournament {
                    contestants: contestants.iter().map(|(g, _)| g.id()).collect(),
                    winner,
                }
            })
            .collect()
    }

    /// Blend crossover with probability `crossover_rate`, otherwise a clone
    /// of one uniformly chosen parent.
    pub fn crossover<R: Rng + ?Sized>(&self, a: &Genome, b: &Genome, rng: &mut R) -> Offspring {
        if rng.gen::<f64>() >= self.params.crossover_rate {
            let parent = if rng.gen_bool(0.5) { a } else { b };
            return parent.to_offspring();
        }

        let fixed = match self.params.blend {
            BlendMode::Fixed(ratio) => Some(ratio),
            BlendMode::Uniform => None,
        };

        let genes = self
            .schema
            .specs()
            .iter()
            .zip(a.genes().iter().zip(b.genes()))
            .map(|(spec, (ga, gb))| match (spec, &ga.value, &gb.value) {
                (GeneSpec::Real { min, max, .. }, GeneValue::Real(x), GeneValue::Real(y)) => {
                    let w = fixed.unwrap_or_else(|| rng.gen::<f64>());
                    Gene::real(ga.name.clone(), (w * x + (1.0 - w) * y).clamp(*min, *max))
                }
                _ => {
                    if rng.gen_bool(0.5) {
                        ga.clone()
                    } else {
                        gb.clone()
                    }
                }
            })
            .collect();

        let mut parents = vec![a.id()];
        if b.id() != a.id() {
            parents.push(b.id());
        }
        Offspring { genes, parents }
    }

    /// Per-gene mutation: bounded Gaussian noise for real genes, a
    /// different allowed option for categorical ones. Lineage is untouched.
    pub fn mutate<R: Rng + ?Sized>(&self, child: Offspring, rng: &mut R) -> Offspring {
        let Offspring { genes, parents } = child;
        let genes = genes
            .into_iter()
            .zip(self.schema.specs())
            .map(|(gene, spec)| {
                if rng.gen::<f64>() >= self.params.mutation_rate {
                    return gene;
                }
                match (spec, gene.value) {
                    (GeneSpec::Real { min, max, sigma, .. }, GeneValue::Real(v)) => {
                        let noise = match Normal::new(0.0, *sigma) {
                            Ok(normal) => normal.sample(rng),
                            Err(_) => 0.0,
                        };
                        Gene::real(gene.name, (v + noise).clamp(*min, *max))
                    }
                    (GeneSpec::Categorical { options, .. }, GeneValue::Categorical(current)) => {
                        let others: Vec<&String> = options.iter().filter(|o| **o != current).collect();
                        if others.is_empty() {
                            Gene::categorical(gene.name, current)
                        } else {
                            let pick = others[rng.gen_range(0..others.len())].clone();
                            Gene::categorical(gene.name, pick)
                        }
                    }
                    (_, value) => Gene { name: gene.name, value },
                }
            })
            .collect();
        Offspring { genes, parents }
    }

    /// select → crossover → mutate, producing `count` offspring.
    pub fn breed<R: Rng + ?Sized>(&self, scored: &Population, count: usize, rng: &mut R) -> Result<Vec<Offspring>> {
        let parents = self.select(scored, count * 2, rng)?;
        let offspring = parents
            .chunks(2)
            .filter(|pair| pair.len() == 2)
            .map(|pair| {
                let child = self.crossover(&pair[0], &pair[1], rng);
                self.mutate(child, rng)
            })
            .collect();
        Ok(offspring)
    }
}
