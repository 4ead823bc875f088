//! TOML configuration for the service and its store client.

use std::collections::BTreeMap;
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::server::ServerOptions;
use crate::store::HttpStoreOptions;

/// Default listening port.
pub const DEFAULT_PORT: u16 = 3030;

/// Resolved configuration file contents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Store endpoint settings.
    #[serde(default)]
    pub store: StoreSection,
    /// HTTP listener settings.
    #[serde(default)]
    pub server: ServerSection,
}

/// `[store]` table.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSection {
    /// Transactional commit endpoint.
    pub url: Option<String>,
    /// Request timeout in seconds.
    pub timeout_secs: Option<u64>,
    /// Headers added to every store request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// `[server]` table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerSection {
    /// Bind address.
    #[serde(default = "default_host")]
    pub host: IpAddr,
    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins.
    #[serde(default)]
    pub allow_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            allow_origins: Vec::new(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Command-line values that take precedence over the file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    /// `--store-url`.
    pub store_url: Option<String>,
    /// `--timeout-secs`.
    pub timeout_secs: Option<u64>,
    /// `--header NAME=VALUE`, already split.
    pub headers: Vec<(String, String)>,
    /// `--host`.
    pub host: Option<IpAddr>,
    /// `--port`.
    pub port: Option<u16>,
    /// `--allow-origin`, appended to the configured list.
    pub allow_origins: Vec<String>,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`Config`].
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// File that was read.
        path: PathBuf,
        /// TOML decoding failure.
        source: toml::de::Error,
    },
    /// Neither the file nor the command line named a store endpoint.
    #[error("no store url configured; pass --store-url or set [store].url")]
    MissingStoreUrl,
    /// A `--header` argument lacked the `=` separator or a name.
    #[error("header '{0}' must be given as NAME=VALUE")]
    InvalidHeader(String),
}

impl Config {
    /// Loads `explicit`, or the default location when it exists.
    ///
    /// An explicit path must exist; a missing default file yields defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => read_file(path),
            None => match default_config_path() {
                Some(path) if path.exists() => read_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Applies command-line overrides.
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(url) = overrides.store_url {
            self.store.url = Some(url);
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.store.timeout_secs = Some(timeout);
        }
        self.store.headers.extend(overrides.headers);
        if let Some(host) = overrides.host {
            self.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.server.port = port;
        }
        self.server.allow_origins.extend(overrides.allow_origins);
    }

    /// Store client settings; fails without a store url.
    pub fn store_options(&self) -> Result<HttpStoreOptions, ConfigError> {
        let url = self
            .store
            .url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(ConfigError::MissingStoreUrl)?;
        Ok(HttpStoreOptions {
            url: url.to_owned(),
            headers: self.store.headers.clone(),
            timeout: self.store.timeout_secs.map(Duration::from_secs),
        })
    }

    /// Listener settings.
    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            host: self.server.host,
            port: self.server.port,
            allow_origins: self.server.allow_origins.clone(),
        }
    }

    /// Copy with header values masked, safe to print.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for value in copy.store.headers.values_mut() {
            *value = "<redacted>".into();
        }
        copy
    }
}

/// Splits a `NAME=VALUE` header argument.
pub fn parse_header(raw: &str) -> Result<(String, String), ConfigError> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => {
            Ok((name.trim().to_owned(), value.trim().to_owned()))
        }
        _ => Err(ConfigError::InvalidHeader(raw.to_owned())),
    }
}

fn read_file(path: &Path) -> Result<Config, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Default config location, e.g. `~/.config/depgraph/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("depgraph").join("config.toml"))
}
