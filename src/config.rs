use std::env;
use std::path::PathBuf;

use crate::api_connection::endpoints::{DEFAULT_MODEL, OPENROUTER_BASE_URL};
use crate::error::ConfigError;
use crate::reconciliation::BatchMode;

pub const API_KEY_ENV_VAR: &str = "OPENROUTER_API_KEY";
pub const API_BASE_ENV_VAR: &str = "CHEFBYTE_API_BASE";
pub const MODEL_ENV_VAR: &str = "CHEFBYTE_MODEL";
pub const TEMPERATURE_ENV_VAR: &str = "CHEFBYTE_TEMPERATURE";
pub const DB_ENV_VAR: &str = "CHEFBYTE_DB";
pub const BATCH_MODE_ENV_VAR: &str = "CHEFBYTE_BATCH_MODE";

const DEFAULT_DB_PATH: &str = "chefbyte.db";
const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// Name of the variable holding the API key, not the key itself.
    pub api_key_env_var: String,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub db_path: PathBuf,
    pub batch_mode: BatchMode,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key_env_var: API_KEY_ENV_VAR.to_string(),
            api_base: OPENROUTER_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            batch_mode: BatchMode::default(),
        }
    }
}

impl AppConfig {
    /// Read settings from the process environment, after loading `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(base) = lookup(API_BASE_ENV_VAR) {
            config.api_base = base;
        }
        if let Some(model) = lookup(MODEL_ENV_VAR) {
            config.model = model;
        }
        if let Some(raw) = lookup(TEMPERATURE_ENV_VAR) {
            config.temperature = parse_temperature(&raw)?;
        }
        if let Some(path) = lookup(DB_ENV_VAR) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(BATCH_MODE_ENV_VAR) {
            config.batch_mode = raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: BATCH_MODE_ENV_VAR.to_string(),
                message,
            })?;
        }

        Ok(config)
    }

    /// Command-line flags take precedence over the environment.
    pub fn with_overrides(mut self, db: Option<PathBuf>, model: Option<String>, atomic: bool) -> Self {
        if let Some(db) = db {
            self.db_path = db;
        }
        if let Some(model) = model {
            self.model = model;
        }
        if atomic {
            self.batch_mode = BatchMode::Atomic;
        }
        self
    }
}

fn parse_temperature(raw: &str) -> Result<f32, ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: TEMPERATURE_ENV_VAR.to_string(),
        message,
    };
    let value: f32 = raw
        .trim()
        .parse()
        .map_err(|_| invalid(format!("'{}' is not a number", raw)))?;
    if !(0.0..=2.0).contains(&value) {
        return Err(invalid(format!("{} is outside 0.0..=2.0", value)));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = AppConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.batch_mode, BatchMode::Sequential);
        assert_eq!(config.db_path, PathBuf::from("chefbyte.db"));
    }

    #[test]
    fn test_env_values_are_applied() {
        let config = AppConfig::from_lookup(lookup_from(&[
            (MODEL_ENV_VAR, "qwen/qwen3-32b"),
            (TEMPERATURE_ENV_VAR, "0.2"),
            (DB_ENV_VAR, "/tmp/pantry.db"),
            (BATCH_MODE_ENV_VAR, "atomic"),
        ]))
        .unwrap();
        assert_eq!(config.model, "qwen/qwen3-32b");
        assert_eq!(config.temperature, 0.2);
        assert_eq!(config.db_path, PathBuf::from("/tmp/pantry.db"));
        assert_eq!(config.batch_mode, BatchMode::Atomic);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AppConfig::from_lookup(lookup_from(&[(TEMPERATURE_ENV_VAR, "warm")])).unwrap_err();
        assert!(err.to_string().contains(TEMPERATURE_ENV_VAR));

        let err = AppConfig::from_lookup(lookup_from(&[(TEMPERATURE_ENV_VAR, "3.5")])).unwrap_err();
        assert!(err.to_string().contains("outside"));

        let err = AppConfig::from_lookup(lookup_from(&[(BATCH_MODE_ENV_VAR, "lazy")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == BATCH_MODE_ENV_VAR));
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = AppConfig::default().with_overrides(
            Some(PathBuf::from("other.db")),
            Some("mistral".to_string()),
            true,
        );
        assert_eq!(config.db_path, PathBuf::from("other.db"));
        assert_eq!(config.model, "mistral");
        assert_eq!(config.batch_mode, BatchMode::Atomic);
    }
}
