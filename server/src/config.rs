//! Process configuration read from the environment.
//!
//! A `.env` file in the working directory is loaded first; real environment
//! variables win over it. A missing `.env` is fine, a malformed one is not.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use todo_core::ConnectOptions;

use crate::logging::LoggingConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("failed to load .env: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub connect_attempts: u32,
    pub connect_backoff: Duration,
    pub request_timeout: Duration,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".into(),
            port: 3000,
            db_path: PathBuf::from("todolist.db"),
            connect_attempts: 5,
            connect_backoff: Duration::from_secs(2),
            request_timeout: Duration::from_secs(10),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load `.env` if present, then read the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        check_dotenv(dotenvy::dotenv())?;
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build a config from any variable source. Unset variables keep their
    /// defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
            port: parse_var(&lookup, "PORT", defaults.port)?,
            db_path: lookup("TODO_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            connect_attempts: parse_var(&lookup, "TODO_CONNECT_ATTEMPTS", defaults.connect_attempts)?,
            connect_backoff: Duration::from_secs(parse_var(
                &lookup,
                "TODO_CONNECT_BACKOFF_SECS",
                defaults.connect_backoff.as_secs(),
            )?),
            request_timeout: Duration::from_secs(parse_var(
                &lookup,
                "TODO_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
            logging: LoggingConfig {
                level: lookup("LOG_LEVEL").unwrap_or(defaults.logging.level),
                format: parse_var(&lookup, "LOG_FORMAT", defaults.logging.format)?,
            },
        })
    }

    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.bind_addr, self.port);
        addr.parse().map_err(|_| ConfigError::Invalid {
            var: "BIND_ADDR",
            value: self.bind_addr.clone(),
        })
    }

    /// Store options. Lock waits are capped at the request deadline so a
    /// statement never outlives the request that issued it.
    pub fn connect_options(&self) -> ConnectOptions {
        let options = ConnectOptions::new(&self.db_path)
            .attempts(self.connect_attempts)
            .backoff(self.connect_backoff);
        let busy_timeout = options.busy_timeout.min(self.request_timeout);
        options.busy_timeout(busy_timeout)
    }
}

/// Accept a loaded or absent `.env`, reject anything else.
fn check_dotenv<T>(loaded: dotenvy::Result<T>) -> Result<(), ConfigError> {
    match loaded {
        Ok(_) => Ok(()),
        Err(err) if err.not_found() => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
