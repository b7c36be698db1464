//! Relay settings.
//!
//! Each setting is taken from the first source that has it: command line
//! (or its `LINECHAT_RELAY_*` environment variable), then the TOML file,
//! then the built-in value. The file lives at
//! `<config dir>/linechat-relay/config.toml` unless `--config` names one:
//!
//! ```toml
//! [server]
//! bind_addr = "127.0.0.1:9002"
//! max_line_length = 8192
//! quit_flush_secs = 5
//!
//! [log]
//! level = "info"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use linechat_proto::codec::DEFAULT_MAX_LINE_LENGTH;

use crate::relay::{DEFAULT_QUIT_FLUSH_TIMEOUT, RelayState};

/// Shortest line limit that still fits a join with a long host name.
const MIN_LINE_LENGTH: usize = 64;

/// Problems found while assembling the relay settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        /// File that was opened.
        path: PathBuf,
        /// What the OS reported.
        source: std::io::Error,
    },

    /// The settings file is not valid TOML for this schema.
    #[error("bad settings file: {0}")]
    ParseToml(#[from] toml::de::Error),

    /// A value was read but is unusable.
    #[error("invalid setting `{name}`: {reason}")]
    Invalid {
        /// Which setting.
        name: &'static str,
        /// Why it was refused.
        reason: String,
    },
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct SettingsFile {
    server: ServerSection,
    log: LogSection,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ServerSection {
    bind_addr: Option<String>,
    max_line_length: Option<usize>,
    quit_flush_secs: Option<u64>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LogSection {
    level: Option<String>,
}

/// Command line of `linechat-relay`.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Relays chat lines between linechat peers")]
pub struct RelayCliArgs {
    /// Listen address, `host:port`.
    #[arg(short, long, env = "LINECHAT_RELAY_ADDR")]
    pub bind: Option<String>,

    /// Settings file to use instead of the default location.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Longest line a peer may send, in bytes.
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Seconds a quitting peer gets to read the lines still queued for it.
    #[arg(long)]
    pub quit_flush_secs: Option<u64>,

    /// Log filter, e.g. `info` or `linechat_relay=debug`.
    #[arg(long, env = "LINECHAT_RELAY_LOG")]
    pub log_level: Option<String>,
}

/// Settings the relay runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    pub bind_addr: String,
    pub max_line_length: usize,
    pub quit_flush_timeout: Duration,
    pub log_level: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:9002".to_string(),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            quit_flush_timeout: DEFAULT_QUIT_FLUSH_TIMEOUT,
            log_level: "info".to_string(),
        }
    }
}

impl RelayConfig {
    /// Reads the settings file (if any) and merges it under `cli`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ReadFile`] when `--config` points at an unreadable
    /// file (a missing default file is fine), [`ConfigError::ParseToml`] for
    /// a malformed file, and [`ConfigError::Invalid`] for unusable values.
    pub fn load(cli: &RelayCliArgs) -> Result<Self, ConfigError> {
        let file = match &cli.config {
            Some(path) => read_settings(path)?,
            None => default_settings_path()
                .map(|path| read_settings_if_present(&path))
                .transpose()?
                .unwrap_or_default(),
        };
        Self::merge(cli, file).validate()
    }

    fn merge(cli: &RelayCliArgs, file: SettingsFile) -> Self {
        let builtin = Self::default();
        let SettingsFile { server, log } = file;
        Self {
            bind_addr: cli
                .bind
                .clone()
                .or(server.bind_addr)
                .unwrap_or(builtin.bind_addr),
            max_line_length: cli
                .max_line_length
                .or(server.max_line_length)
                .unwrap_or(builtin.max_line_length),
            quit_flush_timeout: cli
                .quit_flush_secs
                .or(server.quit_flush_secs)
                .map_or(builtin.quit_flush_timeout, Duration::from_secs),
            log_level: cli
                .log_level
                .clone()
                .or(log.level)
                .unwrap_or(builtin.log_level),
        }
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if self.max_line_length < MIN_LINE_LENGTH {
            return Err(ConfigError::Invalid {
                name: "max_line_length",
                reason: format!("{} is below {MIN_LINE_LENGTH}", self.max_line_length),
            });
        }
        if self.bind_addr.rsplit_once(':').is_none() {
            return Err(ConfigError::Invalid {
                name: "bind_addr",
                reason: format!("`{}` has no port", self.bind_addr),
            });
        }
        Ok(self)
    }

    /// Fresh relay state carrying these limits.
    #[must_use]
    pub fn relay_state(&self) -> RelayState {
        RelayState::with_config(self.max_line_length)
            .with_quit_flush_timeout(self.quit_flush_timeout)
    }
}

fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("linechat-relay").join("config.toml"))
}

fn read_settings(path: &Path) -> Result<SettingsFile, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(toml::from_str(&text)?)
}

fn read_settings_if_present(path: &Path) -> Result<SettingsFile, ConfigError> {
    match read_settings(path) {
        Err(ConfigError::ReadFile { source, .. })
            if source.kind() == std::io::ErrorKind::NotFound =>
        {
            Ok(SettingsFile::default())
        }
        other => other,
    }
}
