use crate::domain::Amount;
use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: String,
    pub indexer_api_url: String,
    pub lookback_secs: i64,
    /// Seconds between sweeps over all accounts; zero disables the sweep.
    pub sweep_interval_secs: u64,
    pub sweep_concurrency: usize,
    pub allowance_threshold: Amount,
    pub max_reference_age_secs: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let port = parse_or(&env_map, "PORT", "8080", "must be a valid u16")?;

        let database_path = env_map
            .get("DATABASE_PATH")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("DATABASE_PATH".to_string()))?;

        let indexer_api_url = env_map
            .get("INDEXER_API_URL")
            .cloned()
            .ok_or_else(|| ConfigError::MissingEnv("INDEXER_API_URL".to_string()))?;

        let lookback_secs: i64 =
            parse_or(&env_map, "LOOKBACK_SECS", "86400", "must be a valid i64")?;
        if lookback_secs < 0 {
            return Err(ConfigError::InvalidValue(
                "LOOKBACK_SECS".to_string(),
                "must not be negative".to_string(),
            ));
        }

        let sweep_interval_secs =
            parse_or(&env_map, "SWEEP_INTERVAL_SECS", "300", "must be a valid u64")?;

        let sweep_concurrency: usize =
            parse_or(&env_map, "SWEEP_CONCURRENCY", "8", "must be a valid usize")?;
        if sweep_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "SWEEP_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let allowance_threshold = parse_or(
            &env_map,
            "ALLOWANCE_THRESHOLD",
            "0",
            "must be a non-negative integer",
        )?;

        let max_reference_age_secs = env_map
            .get("MAX_REFERENCE_AGE_SECS")
            .map(|s| {
                s.parse::<i64>().map_err(|_| {
                    ConfigError::InvalidValue(
                        "MAX_REFERENCE_AGE_SECS".to_string(),
                        "must be a valid i64".to_string(),
                    )
                })
            })
            .transpose()?;

        Ok(Config {
            port,
            database_path,
            indexer_api_url,
            lookback_secs,
            sweep_interval_secs,
            sweep_concurrency,
            allowance_threshold,
            max_reference_age_secs,
        })
    }
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: &str,
    expectation: &str,
) -> Result<T, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.as_str())
        .unwrap_or(default)
        .parse::<T>()
        .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string()))
}
