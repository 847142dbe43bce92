//! Configuration module for the ota-serve responder.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::responder::SizeSource;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the responder
#[derive(Parser, Debug)]
#[command(name = "ota-serve")]
#[command(author = "ota-serve authors")]
#[command(version = "0.1.0")]
#[command(about = "Streams one file to any client that sends a byte", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 0.0.0.0:8123)
    #[arg(short = 'l', long)]
    pub listen: Option<String>,

    /// File streamed to clients
    #[arg(short = 'f', long)]
    pub file: Option<PathBuf>,

    /// Where the size field comes from
    #[arg(long, value_enum)]
    pub size_from: Option<SizeSource>,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Fetch one frame from a running server at this address instead of serving
    #[arg(long, value_name = "ADDR")]
    pub fetch: Option<String>,

    /// Where fetched content is written (defaults to the transfer file)
    #[arg(short = 'o', long, requires = "fetch")]
    pub output: Option<PathBuf>,

    /// Bytes sent to trigger the transfer
    #[arg(long, default_value = "x")]
    pub trigger: String,

    /// Seconds to wait for a complete frame
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Number of worker threads
    pub workers: Option<usize>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            workers: None,
        }
    }
}

/// Transfer-related configuration
#[derive(Debug, Deserialize)]
pub struct TransferConfig {
    /// File streamed to clients
    #[serde(default = "default_file")]
    pub file: PathBuf,
    /// Source of the size field
    #[serde(default)]
    pub size_from: SizeSource,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            file: default_file(),
            size_from: SizeSource::default(),
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
    "0.0.0.0:8123".to_string()
}

fn default_file() -> PathBuf {
    PathBuf::from("app.bin")
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Client mode settings, present only when `--fetch` is given.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub addr: String,
    pub output: PathBuf,
    pub trigger: Vec<u8>,
    pub timeout: Duration,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub listen: String,
    pub file: PathBuf,
    pub size_from: SizeSource,
    pub workers: Option<usize>,
    pub log_level: String,
    pub fetch: Option<FetchConfig>,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve already-parsed CLI args against the optional TOML file.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        let file = cli.file.unwrap_or(toml_config.transfer.file);

        let fetch = cli.fetch.map(|addr| FetchConfig {
            addr,
            output: cli.output.unwrap_or_else(|| file.clone()),
            trigger: cli.trigger.into_bytes(),
            timeout: Duration::from_secs(cli.timeout_secs),
        });

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            file,
            size_from: cli.size_from.unwrap_or(toml_config.transfer.size_from),
            workers: cli.workers.or(toml_config.server.workers),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            fetch,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "0.0.0.0:8123");
        assert_eq!(config.transfer.file, PathBuf::from("app.bin"));
        assert_eq!(config.transfer.size_from, SizeSource::Content);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "127.0.0.1:9000"
            workers = 2

            [transfer]
            file = "/srv/firmware/app.bin"
            size_from = "metadata"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9000");
        assert_eq!(config.server.workers, Some(2));
        assert_eq!(config.transfer.file, PathBuf::from("/srv/firmware/app.bin"));
        assert_eq!(config.transfer.size_from, SizeSource::Metadata);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_defaults() {
        let cli = CliArgs::try_parse_from(["ota-serve"]).unwrap();
        let config = Config::from_args(cli).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8123");
        assert_eq!(config.file, PathBuf::from("app.bin"));
        assert_eq!(config.size_from, SizeSource::Content);
        assert!(config.workers.is_none());
        assert!(config.fetch.is_none());
    }

    #[test]
    fn test_cli_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[server]\nlisten = \"127.0.0.1:9000\"\n[transfer]\nfile = \"from-toml.bin\"\n[logging]\nlevel = \"warn\""
        )
        .unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let cli = CliArgs::try_parse_from([
            "ota-serve",
            "--config",
            &path,
            "--listen",
            "127.0.0.1:7000",
            "--size-from",
            "metadata",
        ])
        .unwrap();
        let config = Config::from_args(cli).unwrap();

        assert_eq!(config.listen, "127.0.0.1:7000");
        assert_eq!(config.file, PathBuf::from("from-toml.bin"));
        assert_eq!(config.size_from, SizeSource::Metadata);
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn test_fetch_mode() {
        let cli = CliArgs::try_parse_from([
            "ota-serve",
            "--file",
            "image.bin",
            "--fetch",
            "10.0.0.5:8123",
            "--trigger",
            "30aea4000001",
        ])
        .unwrap();
        let config = Config::from_args(cli).unwrap();
        let fetch = config.fetch.unwrap();

        assert_eq!(fetch.addr, "10.0.0.5:8123");
        assert_eq!(fetch.output, PathBuf::from("image.bin"));
        assert_eq!(fetch.trigger, b"30aea4000001".to_vec());
        assert_eq!(fetch.timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_missing_config_file() {
        let cli =
            CliArgs::try_parse_from(["ota-serve", "--config", "/nonexistent/ota.toml"]).unwrap();
        match Config::from_args(cli) {
            Err(ConfigError::FileRead(path, _)) => {
                assert_eq!(path, PathBuf::from("/nonexistent/ota.toml"))
            }
            other => panic!("unexpected: {:?}", other),
        }
    }
}
