use super::traits::{ensure_unit_interval, ConfigSection};
use crate::error::AeteError;
use serde::{Deserialize, Serialize};

/// Genetic algorithm parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GaParams {
    pub population_size: usize,
    pub mutation_rate: f64,
    pub crossover_rate: f64,
    pub elitism_count: usize,
    pub max_generations: usize,
    pub tournament_size: usize,
    /// Fraction of the new population allowed to be gene-identical to an
    /// elite before random genomes are injected in their place.
    pub diversity_threshold: f64,
    pub blend: BlendMode,
}

/// How real-valued genes are combined during crossover
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Fresh convex weight drawn per gene
    Uniform,
    /// Same weight for every gene, `ratio * a + (1 - ratio) * b`
    Fixed(f64),
}

impl Default for GaParams {
    fn default() -> Self {
        Self {
            population_size: 50,
            mutation_rate: 0.1,
            crossover_rate: 0.8,
            elitism_count: 5,
            max_generations: 100,
            tournament_size: 3,
            diversity_threshold: 0.5,
            blend: BlendMode::Uniform,
        }
    }
}

impl ConfigSection for GaParams {
    fn section_name() -> &'static str {
        "ga"
    }

    fn validate(&self) -> Result<(), AeteError> {
        if self.population_size < 2 {
            return Err(AeteError::Config(format!(
                "Population size must be at least 2 (crossover needs two parents), got {}",
                self.population_size
            )));
        }
        if self.elitism_count >= self.population_size {
            return Err(AeteError::Config(format!(
                "Elitism count ({}) must be smaller than population size ({})",
                self.elitism_count, self.population_size
            )));
        }
        if self.tournament_size == 0 {
            return Err(AeteError::Config(
                "Tournament size must be at least 1".to_string(),
            ));
        }
        if self.max_generations == 0 {
            return Err(AeteError::Config(
                "Max generations must be at least 1".to_string(),
            ));
        }
        ensure_unit_interval("ga", "mutation_rate", self.mutation_rate)?;
        ensure_unit_interval("ga", "crossover_rate", self.crossover_rate)?;
        ensure_unit_interval("ga", "diversity_threshold", self.diversity_threshold)?;
        if let BlendMode::Fixed(ratio) = self.blend {
            ensure_unit_interval("ga", "blend", ratio)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(GaParams::default().validate().is_ok());
    }

    #[test]
    fn rejects_population_below_two() {
        let params = GaParams {
            population_size: 1,
            elitism_count: 0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(AeteError::Config(_))));
    }

    #[test]
    fn rejects_elitism_filling_population() {
        let params = GaParams {
            population_size: 4,
            elitism_count: 4,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(AeteError::Config(_))));
    }

    #[test]
    fn rejects_out_of_range_rates() {
        let params = GaParams {
            mutation_rate: 1.5,
            ..Default::default()
        };
        assert!(params.validate().is_err());

        let params = GaParams {
            blend: BlendMode::Fixed(-0.1),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }
}
