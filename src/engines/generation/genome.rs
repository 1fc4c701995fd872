//! Genome representation for strategy evolution
//!
//! A genome is an ordered, fixed-schema vector of named genes. Each gene is
//! either a bounded real value or a categorical choice, so the genetic
//! operators can treat every kind exhaustively instead of guessing at an
//! open-ended parameter dictionary.
//!
//! Genomes are immutable. Operators produce an [`Offspring`] (genes plus
//! parent links, no identity); the population manager assigns the id and
//! birth generation when the offspring enters a population.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AeteError;

/// Totally ordered genome identity. Lower ids were created earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GenomeId(pub u64);

impl fmt::Display for GenomeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "g{:06}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneValue {
    Real(f64),
    Categorical(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gene {
    pub name: String,
    pub value: GeneValue,
}

impl Gene {
    pub fn real(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value: GeneValue::Real(value),
        }
    }

    pub fn categorical(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: GeneValue::Categorical(value.into()),
        }
    }
}

/// Schema entry describing one gene slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GeneSpec {
    Real {
        name: String,
        min: f64,
        max: f64,
        /// Standard deviation of the mutation noise
        sigma: f64,
    },
    Categorical {
        name: String,
        options: Vec<String>,
    },
}

impl GeneSpec {
    pub fn name(&self) -> &str {
        match self {
            GeneSpec::Real { name, .. } | GeneSpec::Categorical { name, .. } => name,
        }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Gene {
        match self {
            GeneSpec::Real { name, min, max, .. } => {
                let value = if max > min { rng.gen_range(*min..=*max) } else { *min };
                Gene::real(name.clone(), value)
            }
            GeneSpec::Categorical { name, options } => {
                let pick = rng.gen_range(0..options.len());
                Gene::categorical(name.clone(), options[pick].clone())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneSchema {
    specs: Vec<GeneSpec>,
}

impl GeneSchema {
    pub fn new(specs: Vec<GeneSpec>) -> Result<Self, AeteError> {
        if specs.is_empty() {
            return Err(AeteError::Config("Gene schema must not be empty".to_string()));
        }
        for (i, spec) in specs.iter().enumerate() {
            if specs[..i].iter().any(|s| s.name() == spec.name()) {
                return Err(AeteError::Config(format!("Duplicate gene name '{}'", spec.name())));
            }
            match spec {
                GeneSpec::Real { name, min, max, sigma } => {
                    if !(min.is_finite() && max.is_finite()) || min > max || *sigma < 0.0 {
                        return Err(AeteError::Config(format!(
                            "Gene '{}' needs finite min <= max and sigma >= 0",
                            name
                        )));
                    }
                }
                GeneSpec::Categorical { name, options } => {
                    if options.is_empty() {
                        return Err(AeteError::Config(format!(
                            "Categorical gene '{}' has no options",
                            name
                        )));
                    }
                }
            }
        }
        Ok(Self { specs })
    }

    /// Parameters understood by the built-in Q-learning trading policy
    pub fn default_strategy() -> Self {
        Self {
            specs: vec![
                GeneSpec::Real { name: "lookback".into(), min: 2.0, max: 50.0, sigma: 4.0 },
                GeneSpec::Real { name: "entry_threshold".into(), min: 0.0, max: 0.05, sigma: 0.005 },
                GeneSpec::Real { name: "position_fraction".into(), min: 0.01, max: 1.0, sigma: 0.1 },
                GeneSpec::Real { name: "risk_aversion".into(), min: 0.0, max: 5.0, sigma: 0.5 },
                GeneSpec::Categorical {
                    name: "signal".into(),
                    options: vec!["momentum".into(), "mean_reversion".into()],
                },
            ],
        }
    }

    pub fn specs(&self) -> &[GeneSpec] {
        &self.specs
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<Gene> {
        self.specs.iter().map(|spec| spec.sample(rng)).collect()
    }

    /// Checks names, kinds, bounds and categorical membership slot by slot.
    pub fn validate(&self, genes: &[Gene]) -> Result<(), AeteError> {
        if genes.len() != self.specs.len() {
            return Err(AeteError::Consistency(format!(
                "Genome has {} genes, schema expects {}",
                genes.len(),
                self.specs.len()
            )));
        }
        for (gene, spec) in genes.iter().zip(&self.specs) {
            if gene.name != spec.name() {
                return Err(AeteError::Consistency(format!(
                    "Gene '{}' found where schema expects '{}'",
                    gene.name,
                    spec.name()
                )));
            }
            match (spec, &gene.value) {
                (GeneSpec::Real { min, max, .. }, GeneValue::Real(v)) => {
                    if !v.is_finite() || v < min || v > max {
                        return Err(AeteError::Consistency(format!(
                            "Gene '{}' = {} outside [{}, {}]",
                            gene.name, v, min, max
                        )));
                    }
                }
                (GeneSpec::Categorical { options, .. }, GeneValue::Categorical(v)) => {
                    if !options.contains(v) {
                        return Err(AeteError::Consistency(format!(
                            "Gene '{}' = '{}' is not an allowed option",
                            gene.name, v
                        )));
                    }
                }
                _ => {
                    return Err(AeteError::Consistency(format!(
                        "Gene '{}' has the wrong kind",
                        gene.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Produces seed gene vectors for `PopulationManager::initialize`.
pub trait GenomeFactory {
    fn create(&self, rng: &mut dyn rand::RngCore) -> Vec<Gene>;
}

impl GenomeFactory for GeneSchema {
    fn create(&self, rng: &mut dyn rand::RngCore) -> Vec<Gene> {
        self.sample(rng)
    }
}

/// Genes plus lineage, before an identity is assigned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offspring {
    pub genes: Vec<Gene>,
    pub parents: Vec<GenomeId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome {
    id: GenomeId,
    generation: u32,
    genes: Vec<Gene>,
    parents: Vec<GenomeId>,
    created_at: DateTime<Utc>,
}

impl Genome {
    pub(crate) fn new(id: GenomeId, generation: u32, genes: Vec<Gene>, parents: Vec<GenomeId>) -> Self {
        Self {
            id,
            generation,
            genes,
            parents,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> GenomeId {
        self.id
    }

    /// Generation in which this genome was created
    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn genes(&self) -> &[Gene] {
        &self.genes
    }

    pub fn parents(&self) -> &[GenomeId] {
        &self.parents
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_seed(&self) -> bool {
        self.parents.is_empty()
    }

    pub fn gene(&self, name: &str) -> Option<&GeneValue> {
        self.genes.iter().find(|g| g.name == name).map(|g| &g.value)
    }

    pub fn real(&self, name: &str) -> Option<f64> {
        match self.gene(name) {
            Some(GeneValue::Real(v)) => Some(*v),
            _ => None,
        }
    }

    pub fn categorical(&self, name: &str) -> Option<&str> {
        match self.gene(name) {
            Some(GeneValue::Categorical(v)) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Gene-vector equality, ignoring identity and lineage
    pub fn same_genes(&self, other: &Genome) -> bool {
        self.genes == other.genes
    }

    /// Copy of this genome's genes as an offspring with a single parent
    pub fn to_offspring(&self) -> Offspring {
        Offspring {
            genes: self.genes.clone(),
            parents: vec![self.id],
        }
    }

    /// Canonical gene signature used for de-duplication
    pub fn signature(&self) -> String {
        serde_json::to_string(&self.genes).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn sampled_genes_satisfy_schema() {
        let schema = GeneSchema::default_strategy();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let genes = schema.sample(&mut rng);
            schema.validate(&genes).unwrap();
        }
    }

    #[test]
    fn rejects_duplicate_names() {
        let specs = vec![
            GeneSpec::Real { name: "a".into(), min: 0.0, max: 1.0, sigma: 0.1 },
            GeneSpec::Real { name: "a".into(), min: 0.0, max: 1.0, sigma: 0.1 },
        ];
        assert!(GeneSchema::new(specs).is_err());
    }

    #[test]
    fn validate_catches_bad_categorical() {
        let schema = GeneSchema::default_strategy();
        let mut rng = StdRng::seed_from_u64(1);
        let mut genes = schema.sample(&mut rng);
        genes[4] = Gene::categorical("signal", "astrology");
        assert!(matches!(schema.validate(&genes), Err(AeteError::Consistency(_))));
    }

    #[test]
    fn typed_accessors() {
        let genome = Genome::new(
            GenomeId(3),
            0,
            vec![Gene::real("lookback", 12.0), Gene::categorical("signal", "momentum")],
            vec![],
        );
        assert_eq!(genome.real("lookback"), Some(12.0));
        assert_eq!(genome.categorical("signal"), Some("momentum"));
        assert_eq!(genome.real("signal"), None);
        assert!(genome.is_seed());
        assert_eq!(genome.id().to_string(), "g000003");
    }
}
