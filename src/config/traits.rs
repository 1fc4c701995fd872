use crate::error::AeteError;
use serde::{Deserialize, Serialize};

/// Trait for configuration sections
pub trait ConfigSection: Serialize + for<'de> Deserialize<'de> + Default + Clone {
    fn section_name() -> &'static str;
    fn validate(&self) -> Result<(), AeteError>;
}

/// Shared range check used by the section validators.
pub(crate) fn ensure_unit_interval(section: &str, field: &str, value: f64) -> Result<(), AeteError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(AeteError::Config(format!(
            "{}.{} must be between 0 and 1, got {}",
            section, field, value
        )));
    }
    Ok(())
}
