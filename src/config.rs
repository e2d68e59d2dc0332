//! Configuration module for the greeterd engine.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the greeter engine
#[derive(Parser, Debug)]
#[command(name = "greeterd")]
#[command(author = "greeterd authors")]
#[command(version = "0.1.0")]
#[command(about = "An asynchronous greeter RPC engine", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address the worker pool binds to (e.g., 127.0.0.1:12001)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Number of reusable worker contexts sharing the pool socket
    #[arg(short = 'p', long)]
    pub pool_size: Option<usize>,

    /// Simulated per-request processing delay in milliseconds
    #[arg(short = 'd', long)]
    pub work_delay_ms: Option<u64>,

    /// Interval for publishing periodic stats in seconds
    #[arg(short = 's', long)]
    pub stats_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address the worker pool binds to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker contexts
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            pool_size: default_pool_size(),
        }
    }
}

/// Engine-related configuration
#[derive(Debug, Deserialize)]
pub struct EngineConfig {
    /// Simulated per-request processing delay in milliseconds
    #[serde(default)]
    pub work_delay_ms: u64,
    /// Interval for publishing periodic stats in seconds
    #[serde(default = "default_stats_interval")]
    pub stats_interval: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            work_delay_ms: 0,
            stats_interval: default_stats_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_listen() -> String {
    "127.0.0.1:12001".to_string()
}

fn default_pool_size() -> usize {
    1
}

fn default_stats_interval() -> u64 {
    4
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub pool_size: usize,
    pub work_delay_ms: u64,
    pub stats_interval: u64,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            pool_size: cli.pool_size.unwrap_or(toml_config.server.pool_size),
            work_delay_ms: cli
                .work_delay_ms
                .unwrap_or(toml_config.engine.work_delay_ms),
            stats_interval: cli
                .stats_interval
                .unwrap_or(toml_config.engine.stats_interval),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }

    /// Simulated processing delay as a `Duration`.
    pub fn work_delay(&self) -> Duration {
        Duration::from_millis(self.work_delay_ms)
    }

    /// Stats publishing interval as a `Duration`.
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval)
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:12001");
        assert_eq!(config.server.pool_size, 1);
        assert_eq!(config.engine.work_delay_ms, 0);
        assert_eq!(config.engine.stats_interval, 4);
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:12001"
            pool_size = 4

            [engine]
            work_delay_ms = 250
            stats_interval = 10

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:12001");
        assert_eq!(config.server.pool_size, 4);
        assert_eq!(config.engine.work_delay_ms, 250);
        assert_eq!(config.engine.stats_interval, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_duration_helpers() {
        let config = Config {
            listen: "127.0.0.1:0".to_string(),
            pool_size: 1,
            work_delay_ms: 250,
            stats_interval: 4,
            log_level: "info".to_string(),
        };
        assert_eq!(config.work_delay(), Duration::from_millis(250));
        assert_eq!(config.stats_interval(), Duration::from_secs(4));
    }
}
