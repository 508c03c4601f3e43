//! Configuration module for the bubblecast server.
//!
//! Supports command-line arguments, a `PORT` environment variable, and a
//! TOML configuration file. Precedence: CLI arguments > `PORT` > TOML file.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;

/// Command-line arguments for the bubble server
#[derive(Parser, Debug)]
#[command(name = "bubblecast")]
#[command(author = "bubblecast authors")]
#[command(version = "0.1.0")]
#[command(about = "Serves a quotation in an ASCII speech bubble per connection", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:9000)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// Program that emits one quotation on stdout
    #[arg(long)]
    pub quote_command: Option<String>,

    /// Program that reads text on stdin and emits the decorated bubble on stdout
    #[arg(long)]
    pub bubble_command: Option<String>,

    /// Per-connection handling deadline in seconds
    #[arg(short = 't', long)]
    pub timeout: Option<u64>,

    /// Maximum number of concurrently handled connections
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

impl Default for CliArgs {
    fn default() -> Self {
        Self {
            config: None,
            listen: None,
            quote_command: None,
            bubble_command: None,
            timeout: None,
            max_connections: None,
            log_level: "info".to_string(),
        }
    }
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub collaborators: CollaboratorConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Per-connection handling deadline in seconds
    #[serde(default = "default_timeout")]
    pub handler_timeout: u64,
    /// Maximum number of concurrently handled connections
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            handler_timeout: default_timeout(),
            max_connections: default_max_connections(),
        }
    }
}

/// External text-generation programs
#[derive(Debug, Deserialize)]
pub struct CollaboratorConfig {
    /// Quotation source; no arguments required, quotation on stdout
    #[serde(default = "default_quote_command")]
    pub quote_command: String,
    #[serde(default = "default_quote_args")]
    pub quote_args: Vec<String>,
    /// Bubble renderer; quotation on stdin, decorated text on stdout
    #[serde(default = "default_bubble_command")]
    pub bubble_command: String,
    #[serde(default)]
    pub bubble_args: Vec<String>,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            quote_command: default_quote_command(),
            quote_args: default_quote_args(),
            bubble_command: default_bubble_command(),
            bubble_args: Vec::new(),
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
    "0.0.0.0:9000".to_string()
}

fn default_timeout() -> u64 {
    5 // seconds
}

fn default_max_connections() -> usize {
    1024
}

fn default_quote_command() -> String {
    "fortune".to_string()
}

fn default_quote_args() -> Vec<String> {
    vec!["-s".to_string()]
}

fn default_bubble_command() -> String {
    "cowsay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub quote_command: String,
    pub quote_args: Vec<String>,
    pub bubble_command: String,
    pub bubble_args: Vec<String>,
    pub handler_timeout: u64,
    pub max_connections: usize,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args, the `PORT` environment variable,
    /// and an optional TOML file. CLI arguments take precedence.
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

        Self::resolve(cli, std::env::var("PORT").ok(), toml_config)
    }

    /// Merge the three configuration sources (CLI > `PORT` > TOML).
    pub fn resolve(
        cli: CliArgs,
        port_env: Option<String>,
        toml_config: TomlConfig,
    ) -> Result<Self, ConfigError> {
        let listen = match (cli.listen, port_env) {
            (Some(listen), _) => listen,
            (None, Some(port)) => {
                let port: u16 = port
                    .parse()
                    .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
                format!("0.0.0.0:{}", port)
            }
            (None, None) => toml_config.server.listen,
        };

        Ok(Config {
            listen,
            quote_command: cli
                .quote_command
                .unwrap_or(toml_config.collaborators.quote_command),
            quote_args: toml_config.collaborators.quote_args,
            bubble_command: cli
                .bubble_command
                .unwrap_or(toml_config.collaborators.bubble_command),
            bubble_args: toml_config.collaborators.bubble_args,
            handler_timeout: cli.timeout.unwrap_or(toml_config.server.handler_timeout),
            max_connections: cli
                .max_connections
                .unwrap_or(toml_config.server.max_connections),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidPort(String),
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
            ConfigError::InvalidPort(value) => {
                write!(f, "Invalid PORT value '{}': expected 1-65535", value)
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
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.server.handler_timeout, 5);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.collaborators.quote_command, "fortune");
        assert_eq!(config.collaborators.bubble_command, "cowsay");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9100"
            handler_timeout = 10
            max_connections = 64

            [collaborators]
            quote_command = "fortune"
            quote_args = ["-s", "-o"]
            bubble_command = "cowthink"
            bubble_args = ["-b"]

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9100");
        assert_eq!(config.server.handler_timeout, 10);
        assert_eq!(config.server.max_connections, 64);
        assert_eq!(config.collaborators.quote_args, vec!["-s", "-o"]);
        assert_eq!(config.collaborators.bubble_command, "cowthink");
        assert_eq!(config.collaborators.bubble_args, vec!["-b"]);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_port_env_overrides_toml() {
        let config =
            Config::resolve(CliArgs::default(), Some("8080".to_string()), TomlConfig::default())
                .unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
    }

    #[test]
    fn test_cli_listen_beats_port_env() {
        let cli = CliArgs {
            listen: Some("127.0.0.1:9999".to_string()),
            ..Default::default()
        };
        let config = Config::resolve(cli, Some("8080".to_string()), TomlConfig::default()).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9999");
    }

    #[test]
    fn test_invalid_port_env_rejected() {
        let err = Config::resolve(CliArgs::default(), Some("quack".to_string()), TomlConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPort(_)));
    }
}
