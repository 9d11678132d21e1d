//! Runtime configuration read from the environment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use utils::logging::mask_secret;

pub const DEFAULT_TABLE: &str = "samples";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://qc-samples.db";
pub const DEFAULT_PORT: u16 = 3001;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

/// Connection settings for the remote sample table
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub api_key: SecretString,
    pub table: String,
}

impl RemoteConfig {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: SecretString::from(api_key.into()),
            table: DEFAULT_TABLE.to_string(),
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// First characters of the key, safe to log.
    pub fn masked_key(&self) -> String {
        mask_secret(self.api_key.expose_secret())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the config from any variable lookup (the process env in production).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let url = get("QC_REMOTE_URL").ok_or(ConfigError::Missing("QC_REMOTE_URL"))?;
        let api_key = get("QC_REMOTE_KEY").ok_or(ConfigError::Missing("QC_REMOTE_KEY"))?;
        let table = get("QC_REMOTE_TABLE").unwrap_or_else(|| DEFAULT_TABLE.to_string());

        let host = match get("HOST") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "HOST",
                value,
            })?,
            None => IpAddr::V4(Ipv4Addr::LOCALHOST),
        };
        let port = match get("PORT") {
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        Ok(Self {
            remote: RemoteConfig::new(url, api_key).with_table(table),
            database_url: get("QC_DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            host,
            port,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
