//! Gateway configuration, loaded once at startup from the environment.

use secrecy::SecretString;
use std::env;
use std::time::Duration;
use tracing::Level;

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub openai_api_key: Option<SecretString>,
    pub log_level: Level,
    pub max_speed: u8,
    pub max_brightness: u8,
    pub command_timeout: Duration,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
    #[error("Invalid value for {var}: {value}")]
    InvalidNumber { var: String, value: String },
}

fn parse_var<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse::<T>().map_err(|_| ConfigError::InvalidNumber {
            var: var.to_string(),
            value,
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `HOST`: (Optional) Bind address. Defaults to "0.0.0.0".
    // *   `PORT`: (Optional) Listen port. Defaults to 8000.
    // *   `OPENAI_API_KEY`: (Optional) Key for the realtime speech service.
    //     Without it the voice endpoints report an error instead of working.
    // *   `RUST_LOG`: (Optional) Logging level. Defaults to "INFO".
    // *   `MAX_SPEED`: (Optional) Roll speed cap 0-255. Defaults to 30.
    // *   `MAX_BRIGHTNESS`: (Optional) LED brightness cap 0-255. Defaults to 50.
    // *   `COMMAND_TIMEOUT_MS`: (Optional) Per-command device timeout.
    //     Defaults to 10000.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. Useful for local development, ignored if absent.
        dotenvy::dotenv().ok();

        let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = parse_var("PORT", 8000u16)?;

        let openai_api_key = env::var("OPENAI_API_KEY").ok().map(SecretString::from);

        let log_level_str = env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        let max_speed = parse_var("MAX_SPEED", 30u8)?;
        let max_brightness = parse_var("MAX_BRIGHTNESS", 50u8)?;
        let command_timeout = Duration::from_millis(parse_var("COMMAND_TIMEOUT_MS", 10_000u64)?);

        Ok(Self {
            host,
            port,
            openai_api_key,
            log_level,
            max_speed,
            max_brightness,
            command_timeout,
        })
    }
}
