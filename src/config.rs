//! Engine Configuration
//!
//! Thresholds and naming conventions shared by selection, extraction,
//! validation and optimization. Loaded from a JSON file and/or `SQLGEN_*`
//! environment variables; every field has a default.

use crate::error::{Result, SqlGenError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Minimum similarity for a template to be selected (0.0 - 1.0)
    pub similarity_threshold: f64,
    /// LIMIT values above this raise an ExcessiveLimit warning
    pub max_result_limit: u64,
    /// Complexity score above which the optimizer proposes a rewrite (0 - 10)
    pub complexity_threshold: f64,
    /// Dates further than this many years from today are flagged
    pub date_sanity_years: i64,
    /// Currency amounts above this are flagged as unusually large
    pub large_currency_threshold: f64,
    /// Extracted parameters below this confidence are dropped
    pub min_extraction_confidence: f64,
    /// Rule sets applied to every validation
    pub default_rule_sets: Vec<String>,
    /// Name of the system tenant parameter in templates
    pub tenant_parameter: String,
    /// Name of the tenant column on tenant-scoped tables
    pub tenant_column: String,
    /// Parameter name suffixes treated as primary-key shaped
    pub primary_key_suffixes: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.75,
            max_result_limit: 1000,
            complexity_threshold: 5.0,
            date_sanity_years: 100,
            large_currency_threshold: 1_000_000.0,
            min_extraction_confidence: 0.5,
            default_rule_sets: vec!["default".to_string()],
            tenant_parameter: "tenantId".to_string(),
            tenant_column: "TenantId".to_string(),
            primary_key_suffixes: vec!["id".to_string()],
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading engine config from {:?}", path);
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overridden by `SQLGEN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SQLGEN_*` overrides on top of the current values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(v) = env_parse::<f64>("SQLGEN_SIMILARITY_THRESHOLD")? {
            self.similarity_threshold = v;
        }
        if let Some(v) = env_parse::<u64>("SQLGEN_MAX_RESULT_LIMIT")? {
            self.max_result_limit = v;
        }
        if let Some(v) = env_parse::<f64>("SQLGEN_COMPLEXITY_THRESHOLD")? {
            self.complexity_threshold = v;
        }
        if let Some(v) = env_parse::<i64>("SQLGEN_DATE_SANITY_YEARS")? {
            self.date_sanity_years = v;
        }
        if let Some(v) = env_parse::<f64>("SQLGEN_MIN_EXTRACTION_CONFIDENCE")? {
            self.min_extraction_confidence = v;
        }
        if let Ok(v) = std::env::var("SQLGEN_TENANT_PARAMETER") {
            self.tenant_parameter = v;
        }
        if let Ok(v) = std::env::var("SQLGEN_TENANT_COLUMN") {
            self.tenant_column = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(SqlGenError::Config(format!(
                "similarity_threshold must be within [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.min_extraction_confidence) {
            return Err(SqlGenError::Config(format!(
                "min_extraction_confidence must be within [0, 1], got {}",
                self.min_extraction_confidence
            )));
        }
        if !(0.0..=10.0).contains(&self.complexity_threshold) {
            return Err(SqlGenError::Config(format!(
                "complexity_threshold must be within [0, 10], got {}",
                self.complexity_threshold
            )));
        }
        if self.date_sanity_years <= 0 {
            return Err(SqlGenError::Config("date_sanity_years must be positive".to_string()));
        }
        if self.tenant_parameter.trim().is_empty() {
            return Err(SqlGenError::Config("tenant_parameter must not be empty".to_string()));
        }
        Ok(())
    }

    /// True when a parameter name looks like a primary key (e.g. `orderId`, `id`).
    pub fn is_primary_key_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.primary_key_suffixes
            .iter()
            .any(|suffix| lower.ends_with(&suffix.to_lowercase()))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| SqlGenError::Config(format!("{} has invalid value '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_result_limit, 1000);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_result_limit": 250}}"#).unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.max_result_limit, 250);
        assert_eq!(config.tenant_parameter, "tenantId");
    }

    #[test]
    fn test_rejects_out_of_range_threshold() {
        let config = EngineConfig {
            similarity_threshold: 1.5,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SqlGenError::Config(_))));
    }

    #[test]
    fn test_primary_key_names() {
        let config = EngineConfig::default();
        assert!(config.is_primary_key_name("orderId"));
        assert!(config.is_primary_key_name("id"));
        assert!(!config.is_primary_key_name("status"));
    }
}
