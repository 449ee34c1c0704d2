//! Configuration loading.
//!
//! Connection settings come from a JSON file, then environment overrides.
//!
//! # File lookup
//!
//! 1. Explicit path passed to [`HubConfig::load`]
//! 2. `HUBBY_CONFIG` env var
//! 3. `<platform config dir>/hubby/config.json`, if it exists
//! 4. Built-in defaults
//!
//! # Environment overrides
//!
//! `HUBBY_HOST`, `HUBBY_PORT`, `HUBBY_HUB_ID`, `HUBBY_CLIENT_ID`.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_PORT,
    DEFAULT_READ_BUFFER_SIZE,
};

/// What the read loop does when a read completes with zero bytes.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ZeroReadPolicy {
    /// Treat a zero-byte read as the peer closing the stream and stop reading.
    #[default]
    Stop,
    /// Keep reissuing reads after a short backoff.
    Reissue,
}

/// Settings for one hub connection.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct HubConfig {
    /// Hub host name or IP address.
    pub host: String,
    /// Hub TCP port.
    pub port: u16,
    /// Identifier sent to the hub during the handshake.
    pub hub_id: i64,
    /// Local identity, used for logging only.
    pub client_id: i64,
    /// Capacity of the inbound scratch buffer in bytes.
    pub read_buffer_size: usize,
    /// Connect timeout in seconds. `None` waits indefinitely.
    pub connect_timeout_secs: Option<u64>,
    /// Per-write timeout in seconds. `None` lets a stalled write block the queue forever.
    pub write_timeout_secs: Option<u64>,
    /// Maximum payloads waiting behind the in-flight write. `None` is unbounded.
    pub max_queued_writes: Option<usize>,
    /// Behavior on a zero-byte read.
    pub zero_read: ZeroReadPolicy,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            hub_id: 0,
            client_id: 0,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            write_timeout_secs: None,
            max_queued_writes: None,
            zero_read: ZeroReadPolicy::Stop,
        }
    }
}

impl HubConfig {
    /// Create a config for `host:port` with the given identifiers and default tuning.
    pub fn new(host: impl Into<String>, port: u16, hub_id: i64, client_id: i64) -> Self {
        Self {
            host: host.into(),
            port,
            hub_id,
            client_id,
            ..Self::default()
        }
    }

    /// Returns the default config file path (`<config dir>/hubby/config.json`).
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load configuration from file (see module docs for lookup order),
    /// then apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("HUBBY_CONFIG").ok().map(PathBuf::from));

        let mut config = match explicit {
            Some(p) => Self::load_from_file(&p)?,
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::load_from_file(&p)?,
                _ => Self::default(),
            },
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file. Missing fields take their defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Apply `HUBBY_*` overrides using `lookup` to resolve variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("HUBBY_HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("HUBBY_PORT") {
            self.port = port
                .trim()
                .parse()
                .with_context(|| format!("Invalid HUBBY_PORT: {port}"))?;
        }
        if let Some(hub_id) = lookup("HUBBY_HUB_ID") {
            self.hub_id = hub_id
                .trim()
                .parse()
                .with_context(|| format!("Invalid HUBBY_HUB_ID: {hub_id}"))?;
        }
        if let Some(client_id) = lookup("HUBBY_CLIENT_ID") {
            self.client_id = client_id
                .trim()
                .parse()
                .with_context(|| format!("Invalid HUBBY_CLIENT_ID: {client_id}"))?;
        }
        Ok(())
    }

    /// Reject settings the connection cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            bail!("host must not be empty");
        }
        if self.port == 0 {
            bail!("port must be non-zero");
        }
        if self.read_buffer_size == 0 {
            bail!("read_buffer_size must be non-zero");
        }
        if self.max_queued_writes == Some(0) {
            bail!("max_queued_writes must be non-zero when set");
        }
        Ok(())
    }

    /// `host:port` as dialled by the connection.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect timeout as a `Duration`.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Write timeout as a `Duration`.
    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout_secs.map(Duration::from_secs)
    }
}
