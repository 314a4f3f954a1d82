//! Configuration module for buffered-transfer.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::path::PathBuf;

use crate::benchmark::CopyMode;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "buffered-transfer")]
#[command(author = "buffered-transfer authors")]
#[command(version = "0.1.0")]
#[command(about = "Blocking file transfer through a fixed-size staging buffer", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Address the receiving side binds to (e.g., 127.0.0.1:9999)
    #[arg(short = 'l', long, global = true)]
    pub listen: Option<String>,

    /// Address the sending side connects to
    #[arg(short = 'a', long, global = true)]
    pub connect: Option<String>,

    /// Staging buffer size in bytes
    #[arg(short = 'b', long, global = true)]
    pub buffer_size: Option<usize>,

    /// Acknowledgment the receiver sends after a complete transfer
    #[arg(long, global = true)]
    pub ack_message: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

/// What to run
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a file to a receiver and print its acknowledgment
    Send {
        /// File to send
        file: PathBuf,
        /// Do not wait for the acknowledgment
        #[arg(long)]
        no_ack: bool,
    },
    /// Accept one connection and store what it sends
    Receive {
        /// Destination file (created or truncated)
        output: PathBuf,
    },
    /// Accept connections in a loop, one worker thread per transfer
    Serve {
        /// Directory received files are written to
        dir: PathBuf,
        /// Stop after this many connections
        #[arg(long)]
        max_transfers: Option<u64>,
    },
    /// Copy a local file and report how long it took
    Copy {
        source: PathBuf,
        destination: PathBuf,
        #[arg(long, value_enum, default_value_t = CopyMode::Chunked)]
        mode: CopyMode,
    },
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Receiving-side configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to
    #[serde(default = "default_address")]
    pub listen: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_address(),
        }
    }
}

/// Sending-side configuration
#[derive(Debug, Deserialize)]
pub struct ClientConfig {
    /// Address to connect to
    #[serde(default = "default_address")]
    pub connect: String,
    /// Drain the receiver's acknowledgment after sending
    #[serde(default = "default_await_ack")]
    pub await_ack: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect: default_address(),
            await_ack: default_await_ack(),
        }
    }
}

/// Copy configuration shared by both sides
#[derive(Debug, Deserialize)]
pub struct TransferConfig {
    /// Staging buffer size in bytes
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    /// Acknowledgment text
    #[serde(default = "default_ack_message")]
    pub ack_message: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            ack_message: default_ack_message(),
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

fn default_address() -> String {
    "127.0.0.1:9999".to_string()
}

fn default_await_ack() -> bool {
    true
}

fn default_buffer_size() -> usize {
    crate::runtime::DEFAULT_BUFFER_SIZE
}

fn default_ack_message() -> String {
    "Successfully received data".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub command: Command,
    pub listen: String,
    pub connect: String,
    pub buffer_size: usize,
    pub ack_message: String,
    pub await_ack: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve already-parsed CLI args against the TOML file they name.
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

        Self::merge(cli, toml_config)
    }

    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Result<Self, ConfigError> {
        let buffer_size = cli
            .buffer_size
            .unwrap_or(toml_config.transfer.buffer_size);
        if buffer_size == 0 {
            return Err(ConfigError::InvalidBufferSize);
        }

        let await_ack = match cli.command {
            Command::Send { no_ack: true, .. } => false,
            _ => toml_config.client.await_ack,
        };

        // Merge CLI args with TOML config (CLI takes precedence)
        Ok(Config {
            listen: cli.listen.unwrap_or(toml_config.server.listen),
            connect: cli.connect.unwrap_or(toml_config.client.connect),
            buffer_size,
            ack_message: cli
                .ack_message
                .unwrap_or(toml_config.transfer.ack_message),
            await_ack,
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
            command: cli.command,
        })
    }
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {1}", path = .0.display())]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{path}': {1}", path = .0.display())]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("buffer size must be at least 1 byte")]
    InvalidBufferSize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::try_parse_from(std::iter::once("buffered-transfer").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_default_config() {
        let config = TomlConfig::default();
        assert_eq!(config.server.listen, "127.0.0.1:9999");
        assert_eq!(config.client.connect, "127.0.0.1:9999");
        assert!(config.client.await_ack);
        assert_eq!(config.transfer.buffer_size, 1024);
        assert_eq!(config.transfer.ack_message, "Successfully received data");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_toml_parsing() {
        let toml_str = r#"
            [server]
            listen = "0.0.0.0:9000"

            [client]
            connect = "10.0.0.2:9000"
            await_ack = false

            [transfer]
            buffer_size = 4096
            ack_message = "ok"

            [logging]
            level = "debug"
        "#;

        let config: TomlConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.client.connect, "10.0.0.2:9000");
        assert!(!config.client.await_ack);
        assert_eq!(config.transfer.buffer_size, 4096);
        assert_eq!(config.transfer.ack_message, "ok");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_cli_overrides_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [transfer]
            buffer_size = 4096

            [logging]
            level = "warn"
        "#,
        )
        .unwrap();

        let cli = parse(&["send", "1.jpg", "-b", "16", "--connect", "127.0.0.1:1234"]);
        let config = Config::merge(cli, toml_config).unwrap();

        assert_eq!(config.buffer_size, 16);
        assert_eq!(config.connect, "127.0.0.1:1234");
        assert_eq!(config.listen, "127.0.0.1:9999");
        assert_eq!(config.log_level, "warn");
        assert!(config.await_ack);
        assert_eq!(
            config.command,
            Command::Send {
                file: PathBuf::from("1.jpg"),
                no_ack: false
            }
        );
    }

    #[test]
    fn test_no_ack_flag() {
        let config = Config::merge(parse(&["send", "a", "--no-ack"]), TomlConfig::default()).unwrap();
        assert!(!config.await_ack);
    }

    #[test]
    fn test_copy_mode_parsing() {
        let cli = parse(&["copy", "a", "b", "--mode", "mapped"]);
        assert!(matches!(
            cli.command,
            Command::Copy {
                mode: CopyMode::Mapped,
                ..
            }
        ));
    }

    #[test]
    fn test_zero_buffer_rejected() {
        let err = Config::merge(parse(&["receive", "out", "-b", "0"]), TomlConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBufferSize));
    }

    #[test]
    fn test_missing_config_file() {
        let cli = parse(&["receive", "out", "--config", "/nonexistent/transfer.toml"]);
        let err = Config::from_args(cli).unwrap_err();
        assert!(matches!(err, ConfigError::FileRead(..)));
    }
}
