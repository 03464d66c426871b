//! Configuration module for the tunnel server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the tunnel server
#[derive(Parser, Debug)]
#[command(name = "refdata-tunneld")]
#[command(version = "0.1.0")]
#[command(about = "Tunnels reference-data lookups over plain TCP", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1:2600)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Backend resolver host
    #[arg(long)]
    pub backend_host: Option<String>,

    /// Backend resolver port
    #[arg(long)]
    pub backend_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
        }
    }
}

/// Backend resolver connection parameters.
///
/// These describe the desktop reference-data service the tunnel delegates
/// lookups to. They are fixed configuration, never negotiated over the
/// tunnel protocol.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Backend host
    #[serde(default = "default_backend_host")]
    pub host: String,
    /// Backend port
    #[serde(default = "default_backend_port")]
    pub port: u16,
    /// Authentication option string sent when a session opens
    #[serde(default = "default_auth")]
    pub auth: String,
    /// Bounded wait per response-page poll, in milliseconds
    #[serde(default = "default_poll_wait_ms")]
    pub poll_wait_ms: u64,
    /// Overall patience for the terminal page, in milliseconds
    #[serde(default = "default_patience_ms")]
    pub patience_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            auth: default_auth(),
            poll_wait_ms: default_poll_wait_ms(),
            patience_ms: default_patience_ms(),
        }
    }
}

impl BackendConfig {
    /// Bounded wait applied to each page poll
    pub fn poll_wait(&self) -> Duration {
        Duration::from_millis(self.poll_wait_ms)
    }

    /// Deadline for observing the terminal page
    pub fn patience(&self) -> Duration {
        Duration::from_millis(self.patience_ms)
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
    "127.0.0.1:2600".to_string()
}

fn default_backend_host() -> String {
    "127.0.0.1".to_string()
}

fn default_backend_port() -> u16 {
    8194
}

fn default_auth() -> String {
    "AuthenticationType=OS_LOGON".to_string()
}

fn default_poll_wait_ms() -> u64 {
    500
}

fn default_patience_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub backend: BackendConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();
        Self::merge(cli)
    }

    fn merge(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::resolve(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let mut backend = toml_config.backend;
        if let Some(host) = cli.backend_host {
            backend.host = host;
        }
        if let Some(port) = cli.backend_port {
            backend.port = port;
        }

        Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            backend,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:2600");
        assert_eq!(config.backend.host, "127.0.0.1");
        assert_eq!(config.backend.port, 8194);
        assert_eq!(config.backend.auth, "AuthenticationType=OS_LOGON");
        assert_eq!(config.backend.poll_wait_ms, 500);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:2600"

            [backend]
            host = "10.0.0.5"
            port = 8195
            poll_wait_ms = 250
            patience_ms = 10000

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:2600");
        assert_eq!(config.backend.host, "10.0.0.5");
        assert_eq!(config.backend.port, 8195);
        assert_eq!(config.backend.poll_wait(), Duration::from_millis(250));
        assert_eq!(config.backend.patience(), Duration::from_millis(10_000));
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliArgs {
            config: None,
            listen: Some("127.0.0.1:9999".to_string()),
            backend_host: Some("192.168.1.1".to_string()),
            backend_port: None,
            log_level: Some("trace".to_string()),
        };

        let config = Config::merge(cli).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.backend.host, "192.168.1.1");
        assert_eq!(config.backend.port, 8194);
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_explicit_default_log_level_still_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();

        let cli = CliArgs {
            config: None,
            listen: None,
            backend_host: None,
            backend_port: None,
            log_level: Some("info".to_string()),
        };

        let config = Config::resolve(cli, toml_config);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn test_absent_log_level_falls_back_to_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [logging]
            level = "debug"
        "#,
        )
        .unwrap();

        let cli = CliArgs {
            config: None,
            listen: None,
            backend_host: None,
            backend_port: None,
            log_level: None,
        };

        let config = Config::resolve(cli, toml_config);
        assert_eq!(config.log_level, "debug");
    }
}
