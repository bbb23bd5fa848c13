//! Server configuration loading from file and environment variables.

use roomgate_voice::LiveKitConfig;
use roomgate_worker::WorkerConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// LiveKit signing keys and routing URL.
    #[serde(default)]
    pub livekit: LiveKitConfig,

    /// Worker process command.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Default-name sequence.
    #[serde(default)]
    pub sequence: SequenceConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Durable counter used to name sessions the caller left anonymous.
#[derive(Debug, Clone, Deserialize)]
pub struct SequenceConfig {
    /// File holding the last issued value.
    #[serde(default = "default_sequence_path")]
    pub path: PathBuf,

    /// Value assumed when the file does not exist yet.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Prefix of generated identities and rooms (`<prefix>-<n>`).
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "roomgate_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

fn default_sequence_path() -> PathBuf {
    PathBuf::from("counter.txt")
}

fn default_seed() -> u64 {
    50
}

fn default_name_prefix() -> String {
    "realtime".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            path: default_sequence_path(),
            seed: default_seed(),
            name_prefix: default_name_prefix(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `LIVEKIT_URL`, `LIVEKIT_API_KEY`, `LIVEKIT_API_SECRET` override `[livekit]`
/// - `PORT` overrides `server.port`
/// - `LOG_LEVEL` overrides `logging.level`
/// - `ROOMGATE_HOST` overrides `server.host`
/// - `ROOMGATE_COUNTER_PATH` overrides `sequence.path`
/// - `ROOMGATE_WORKER_PROGRAM` overrides `worker.program`
/// - `ROOMGATE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => parse_config(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    Ok(config)
}

/// Parses a TOML configuration document.
pub fn parse_config(contents: &str) -> Result<Config, ConfigError> {
    Ok(toml::from_str(contents)?)
}

/// Applies environment overrides read through `lookup`.
pub fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(url) = lookup("LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = lookup("LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = lookup("LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
    if let Some(host) = lookup("ROOMGATE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(path) = lookup("ROOMGATE_COUNTER_PATH") {
        config.sequence.path = PathBuf::from(path);
    }
    if let Some(program) = lookup("ROOMGATE_WORKER_PROGRAM") {
        config.worker.program = program;
    }
    if let Some(level) = lookup("LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("ROOMGATE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
}
