//! `rollcall.toml` loading and validation.
//!
//! Every field has a default, so an absent file or a partial one is valid.
//!
//! ```toml
//! log_level = "debug"
//!
//! [reader]
//! listen_addr = "127.0.0.1:65432"
//! command = ["python3", "reader.py"]
//!
//! [session]
//! window_timeout_ms = 5000
//!
//! [database]
//! path = "/var/lib/rollcall/rollcall.db"
//! ```

use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rollcall_core::constants::{
    DEFAULT_LAUNCH_DELAY_MS, DEFAULT_MAX_READER_CONNECTIONS, DEFAULT_MAX_RESTARTS,
    DEFAULT_READER_PORT, DEFAULT_REARM_DELAY_MS, DEFAULT_RETRY_INTERVAL_MS,
    DEFAULT_SETTLE_DELAY_MS, DEFAULT_WINDOW_TIMEOUT_MS,
};
use rollcall_network::ListenerConfig;
use rollcall_reader::{AnyReaderProcess, CommandProcess, ReaderError, RestartPolicy, TransportConfig};
use rollcall_session::SessionConfig;
use rollcall_storage::DatabaseConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "rollcall.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reader: ReaderSection,
    pub session: SessionSection,
    pub database: DatabaseSection,
    /// Used when `RUST_LOG` is not set.
    pub log_level: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderSection {
    pub listen_addr: SocketAddr,
    /// argv of the reader program. Without one the reader is expected to
    /// be started by something else.
    pub command: Option<Vec<String>>,
    pub launch_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub retry_interval_ms: u64,
    pub max_restarts: u32,
    pub max_connections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub window_timeout_ms: u64,
    pub rearm_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    pub path: String,
    pub max_connections: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reader: ReaderSection::default(),
            session: SessionSection::default(),
            database: DatabaseSection::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for ReaderSection {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), DEFAULT_READER_PORT),
            command: None,
            launch_delay_ms: DEFAULT_LAUNCH_DELAY_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            max_restarts: DEFAULT_MAX_RESTARTS,
            max_connections: DEFAULT_MAX_READER_CONNECTIONS,
        }
    }
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            window_timeout_ms: DEFAULT_WINDOW_TIMEOUT_MS,
            rearm_delay_ms: DEFAULT_REARM_DELAY_MS,
        }
    }
}

impl Default for DatabaseSection {
    fn default() -> Self {
        let defaults = DatabaseConfig::default();
        Self {
            path: defaults.database_path,
            max_connections: defaults.max_connections,
        }
    }
}

impl Config {
    /// Load the configuration.
    ///
    /// An explicit `path` must exist. Without one, `./rollcall.toml` is
    /// used when present and the defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.exists() {
                    return Ok(Config::default());
                }
                fallback
            }
        };

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.clone(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reader = &self.reader;
        if reader.retry_interval_ms == 0 {
            return Err(ConfigError::invalid("reader.retry_interval_ms must be greater than 0"));
        }
        if reader.max_restarts == 0 {
            return Err(ConfigError::invalid("reader.max_restarts must be greater than 0"));
        }
        if reader.max_connections == 0 {
            return Err(ConfigError::invalid("reader.max_connections must be greater than 0"));
        }
        if let Some(argv) = &reader.command
            && argv.first().is_none_or(|program| program.trim().is_empty())
        {
            return Err(ConfigError::invalid("reader.command must name a program"));
        }

        if self.session.window_timeout_ms == 0 {
            return Err(ConfigError::invalid("session.window_timeout_ms must be greater than 0"));
        }
        if self.session.rearm_delay_ms == 0 {
            return Err(ConfigError::invalid("session.rearm_delay_ms must be greater than 0"));
        }

        if self.database.path.trim().is_empty() {
            return Err(ConfigError::invalid("database.path must not be empty"));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::invalid("database.max_connections must be greater than 0"));
        }

        Ok(())
    }

    pub fn transport_config(&self) -> TransportConfig {
        let reader = &self.reader;
        TransportConfig {
            listener: ListenerConfig {
                bind_addr: reader.listen_addr,
                max_connections: reader.max_connections,
            },
            policy: RestartPolicy {
                max_restarts: reader.max_restarts,
                retry_interval: Duration::from_millis(reader.retry_interval_ms),
                launch_delay: Duration::from_millis(reader.launch_delay_ms),
                settle_delay: Duration::from_millis(reader.settle_delay_ms),
            },
        }
    }

    /// The supervised reader process, or `Detached` when none is configured.
    pub fn reader_process(&self) -> Result<AnyReaderProcess, ReaderError> {
        match &self.reader.command {
            Some(argv) => Ok(AnyReaderProcess::Command(CommandProcess::new(argv.clone())?)),
            None => Ok(AnyReaderProcess::Detached),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            window_timeout: Duration::from_millis(self.session.window_timeout_ms),
            rearm_delay: Duration::from_millis(self.session.rearm_delay_ms),
        }
    }

    pub fn database_config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.database.path.clone()).max_connections(self.database.max_connections)
    }
}
