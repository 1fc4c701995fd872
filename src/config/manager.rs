use super::{
    evolution::GaParams,
    orchestration::OrchestratorConfig,
    risk::RiskLimits,
    rl::RlParams,
    traits::ConfigSection,
};
use crate::error::AeteError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Prefix for environment overrides, e.g. `AETE__GA__POPULATION_SIZE=80`
pub const ENV_PREFIX: &str = "AETE";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ga: GaParams,
    pub rl: RlParams,
    pub risk: RiskLimits,
    pub orchestrator: OrchestratorConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), AeteError> {
        self.ga.validate()?;
        self.rl.validate()?;
        self.risk.validate()?;
        self.orchestrator.validate()?;
        Ok(())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, AeteError> {
        let config: AppConfig = toml::from_str(contents)
            .map_err(|e| AeteError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Snapshot persisted next to run artifacts
    pub fn to_json(&self) -> Result<serde_json::Value, AeteError> {
        let mut sections = serde_json::Map::new();
        sections.insert(GaParams::section_name().to_string(), serde_json::to_value(&self.ga)?);
        sections.insert(RlParams::section_name().to_string(), serde_json::to_value(&self.rl)?);
        sections.insert(RiskLimits::section_name().to_string(), serde_json::to_value(&self.risk)?);
        sections.insert(
            OrchestratorConfig::section_name().to_string(),
            serde_json::to_value(&self.orchestrator)?,
        );
        Ok(serde_json::Value::Object(sections))
    }
}

pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config: Arc::new(RwLock::new(AppConfig::default())),
        }
    }

    /// Loads a TOML file (optional) layered with `AETE__SECTION__FIELD`
    /// environment overrides, then validates the result.
    pub fn load_from_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AeteError> {
        let path = path.as_ref();
        let settings = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AeteError::Config(format!("Failed to read config {}: {}", path.display(), e)))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| AeteError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate()?;

        log::info!(
            "Loaded configuration from {} (population {}, generations {})",
            path.display(),
            config.ga.population_size,
            config.ga.max_generations
        );
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), AeteError> {
        let config = self.get();
        let toml_str = toml::to_string_pretty(&config)
            .map_err(|e| AeteError::Config(format!("Failed to serialize: {}", e)))?;

        std::fs::write(path, toml_str)
            .map_err(|e| AeteError::Config(format!("Failed to write config: {}", e)))?;

        Ok(())
    }

    pub fn get(&self) -> AppConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Applies `f` to a copy and only commits it when the result validates.
    pub fn update<F>(&self, f: F) -> Result<(), AeteError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut config = self.config.write().unwrap_or_else(|e| e.into_inner());
        let mut candidate = config.clone();
        f(&mut candidate);
        candidate.validate()?;
        *config = candidate;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // serialises tests that read the process environment
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config = AppConfig::from_toml_str(
            r#"
            [ga]
            population_size = 8
            elitism_count = 2

            [risk]
            max_drawdown = 0.3
            "#,
        )
        .unwrap();
        assert_eq!(config.ga.population_size, 8);
        assert_eq!(config.ga.tournament_size, 3);
        assert_eq!(config.risk.max_drawdown, 0.3);
        assert_eq!(config.rl.batch_size, 64);
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = AppConfig::from_toml_str("[ga]\npopulation_size = 1\nelitism_count = 0\n").unwrap_err();
        assert!(matches!(err, AeteError::Config(_)));
    }

    #[test]
    fn update_rejects_invalid_changes() {
        let manager = ConfigManager::new();
        assert!(manager.update(|c| c.ga.elitism_count = 1000).is_err());
        assert_eq!(manager.get().ga.elitism_count, 5);
        manager.update(|c| c.ga.elitism_count = 2).unwrap();
        assert_eq!(manager.get().ga.elitism_count, 2);
    }

    #[test]
    fn round_trips_through_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aete.toml");
        let manager = ConfigManager::new();
        manager.update(|c| c.orchestrator.lineage = "btc-momentum".to_string()).unwrap();
        manager.save_to_file(&path).unwrap();

        let reloaded = ConfigManager::new();
        reloaded.load_from_file(&path).unwrap();
        assert_eq!(reloaded.get().orchestrator.lineage, "btc-momentum");
    }

    #[test]
    fn environment_overrides_win_over_the_file() {
        let _env = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aete.toml");
        std::fs::write(&path, "[ga]\npopulation_size = 8\nelitism_count = 2\n").unwrap();

        std::env::set_var("AETE__GA__POPULATION_SIZE", "12");
        let manager = ConfigManager::new();
        let loaded = manager.load_from_file(&path);
        std::env::remove_var("AETE__GA__POPULATION_SIZE");
        loaded.unwrap();
        assert_eq!(manager.get().ga.population_size, 12);
        assert_eq!(manager.get().ga.elitism_count, 2);

        std::env::set_var("AETE__GA__ELITISM_COUNT", "999");
        let rejected = ConfigManager::new().load_from_file(&path);
        std::env::remove_var("AETE__GA__ELITISM_COUNT");
        assert!(matches!(rejected, Err(AeteError::Config(_))));
    }

    #[test]
    fn json_snapshot_has_every_section() {
        let snapshot = AppConfig::default().to_json().unwrap();
        for section in ["ga", "rl", "risk", "orchestrator"] {
            assert!(snapshot.get(section).is_some(), "missing {}", section);
        }
    }
}
