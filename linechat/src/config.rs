//! Configuration system for the `linechat` client.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/linechat/config.toml`)
//! 4. Compiled defaults
//!
//! The four positional arguments (own port, mode, relay host, relay port)
//! are always taken from the command line. Missing config file is not an
//! error; an explicit `--config` path that doesn't exist is.

use std::path::PathBuf;
use std::time::Duration;

use linechat_proto::codec::DEFAULT_MAX_LINE_LENGTH;
use linechat_proto::identity::PeerIdentity;

use crate::session::SessionConfig;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A setting is out of range.
    #[error("invalid setting `{name}`: {reason}")]
    Invalid {
        /// Setting name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Output mode selected by the second positional argument.
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Everything, including rendered traffic, goes to the log at INFO.
    #[default]
    #[value(name = "d")]
    Detailed,
    /// Rendered traffic goes to stdout; the log only carries warnings.
    #[value(name = "q")]
    Quiet,
}

impl Mode {
    /// Default log filter for this mode.
    #[must_use]
    pub const fn log_level(self) -> &'static str {
        match self {
            Self::Detailed => "info",
            Self::Quiet => "warn",
        }
    }
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    client: ClientFileConfig,
    log: LogFileConfig,
}

/// `[client]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ClientFileConfig {
    host: Option<String>,
    username: Option<String>,
    join_timeout_secs: Option<u64>,
}

/// `[log]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct LogFileConfig {
    file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// CLI arguments for the client.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "linechat client")]
pub struct CliArgs {
    /// Own listening port, announced to the relay as this peer's identity.
    pub port: u16,

    /// Output mode: `d` (detailed log) or `q` (quiet, traffic on stdout).
    #[arg(value_enum)]
    pub mode: Mode,

    /// Relay host.
    pub relay_host: String,

    /// Relay port.
    pub relay_port: u16,

    /// Host announced alongside the port.
    #[arg(long, env = "LINECHAT_HOST")]
    pub host: Option<String>,

    /// Username shown to other peers instead of `[host:port]`.
    #[arg(short, long, env = "LINECHAT_USERNAME")]
    pub username: Option<String>,

    /// Seconds allowed for connecting and receiving the join reply.
    #[arg(long)]
    pub join_timeout_secs: Option<u64>,

    /// Write logs to this file instead of stderr.
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Path to config file (default: `~/.config/linechat/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Resolved configuration
// ---------------------------------------------------------------------------

/// Fully resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Announced host.
    pub host: String,
    /// Announced port.
    pub port: u16,
    /// Optional username.
    pub username: Option<String>,
    /// Output mode.
    pub mode: Mode,
    /// Relay host.
    pub relay_host: String,
    /// Relay port.
    pub relay_port: u16,
    /// Bound on connecting plus waiting for the join reply.
    pub join_timeout: Duration,
    /// Log file; `None` logs to stderr.
    pub log_file: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 9000,
            username: None,
            mode: Mode::Detailed,
            relay_host: "127.0.0.1".to_string(),
            relay_port: 9002,
            join_timeout: Duration::from_secs(5),
            log_file: None,
        }
    }
}

impl ClientConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the explicit config file cannot be read or
    /// parsed, or a resolved setting is invalid.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Self::resolve(cli, &file).validate()
    }

    /// Resolve a `ClientConfig` from CLI args and a parsed config file.
    ///
    /// Priority: CLI > file > default.
    #[must_use]
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            host: cli
                .host
                .clone()
                .or_else(|| file.client.host.clone())
                .unwrap_or(defaults.host),
            port: cli.port,
            username: cli
                .username
                .clone()
                .or_else(|| file.client.username.clone()),
            mode: cli.mode,
            relay_host: cli.relay_host.clone(),
            relay_port: cli.relay_port,
            join_timeout: cli
                .join_timeout_secs
                .or(file.client.join_timeout_secs)
                .map_or(defaults.join_timeout, Duration::from_secs),
            log_file: cli.log_file.clone().or_else(|| file.log.file.clone()),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::Invalid {
                name: "port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.relay_port == 0 {
            return Err(ConfigError::Invalid {
                name: "relay_port",
                reason: "must be between 1 and 65535".to_string(),
            });
        }
        if self.host.is_empty() || self.host.contains(char::is_whitespace) {
            return Err(ConfigError::Invalid {
                name: "host",
                reason: format!("`{}` is not a single token", self.host),
            });
        }
        if let Some(name) = &self.username
            && (name.is_empty() || name.contains(char::is_whitespace))
        {
            return Err(ConfigError::Invalid {
                name: "username",
                reason: format!("`{name}` must be a single word"),
            });
        }
        Ok(self)
    }

    /// Identity announced to the relay.
    #[must_use]
    pub fn identity(&self) -> PeerIdentity {
        PeerIdentity::new(self.host.clone(), self.port)
    }

    /// Relay address as `host:port`.
    #[must_use]
    pub fn relay_addr(&self) -> String {
        format!("{}:{}", self.relay_host, self.relay_port)
    }

    /// Builds the session settings for this configuration.
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::new(self.relay_addr(), self.identity());
        session.username.clone_from(&self.username);
        session.join_timeout = self.join_timeout;
        session.max_line_length = DEFAULT_MAX_LINE_LENGTH;
        session
    }
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    let path = if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    } else {
        let Some(config_dir) = dirs::config_dir() else {
            return Ok(ConfigFile::default());
        };
        config_dir.join("linechat").join("config.toml")
    };

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
