use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::discovery::{
    BROADCAST_INTERVAL_SECS, DISCOVERY_PORT, REAP_INTERVAL_SECS, STALE_THRESHOLD_SECS,
};
use crate::transfer::TransferOptions;
use crate::transfer::constants::{
    CHUNK_SIZE, DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_IO_TIMEOUT_SECS, MAX_CHUNK_SIZE,
    TRANSFER_PORT,
};

const APP_QUALIFIER: &str = "com";
const APP_ORGANIZATION: &str = "lanshare";
const APP_NAME: &str = "lanshare";
const CONFIG_FILE: &str = "config.json";
const RECEIVE_DIR_NAME: &str = "ReceivedFiles";

/// Overrides the config directory, mostly for tests
pub const CONFIG_DIR_ENV: &str = "LANSHARE_CONFIG_DIR";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Announced name; the hostname when unset
    pub display_name: Option<String>,
    pub transfer_port: u16,
    pub discovery_port: u16,
    /// Local address for the discovery and transfer sockets
    pub bind_ip: IpAddr,
    /// Destination of presence broadcasts
    pub broadcast_ip: IpAddr,
    pub broadcast_interval_secs: u64,
    pub stale_threshold_secs: u64,
    pub reap_interval_secs: u64,
    pub chunk_size: usize,
    pub receive_dir: PathBuf,
    /// `null` disables the timeout
    pub connect_timeout_secs: Option<u64>,
    pub io_timeout_secs: Option<u64>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            display_name: None,
            transfer_port: TRANSFER_PORT,
            discovery_port: DISCOVERY_PORT,
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            broadcast_ip: IpAddr::V4(Ipv4Addr::BROADCAST),
            broadcast_interval_secs: BROADCAST_INTERVAL_SECS,
            stale_threshold_secs: STALE_THRESHOLD_SECS,
            reap_interval_secs: REAP_INTERVAL_SECS,
            chunk_size: CHUNK_SIZE,
            receive_dir: default_receive_dir(),
            connect_timeout_secs: Some(DEFAULT_CONNECT_TIMEOUT_SECS),
            io_timeout_secs: Some(DEFAULT_IO_TIMEOUT_SECS),
        }
    }
}

/// `~/ReceivedFiles`, or `./ReceivedFiles` without a home directory
pub fn default_receive_dir() -> PathBuf {
    directories::UserDirs::new()
        .map(|dirs| dirs.home_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
        .join(RECEIVE_DIR_NAME)
}

impl NodeConfig {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        if let Ok(dir) = std::env::var(CONFIG_DIR_ENV) {
            return Some(PathBuf::from(dir).join(CONFIG_FILE));
        }

        ProjectDirs::from(APP_QUALIFIER, APP_ORGANIZATION, APP_NAME)
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Load from `path` (or the default path). A missing file yields the
    /// defaults; a file that does not parse is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => return Ok(Self::default()),
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {}, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Write the config as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Startup layering: `.env` into the process environment, then the
    /// config file (whose location may come from `.env`), then `LANSHARE_*`
    /// variables. `env_file` defaults to `.env` in the working directory or
    /// a parent, and a missing default file is fine.
    pub fn load_layered(path: Option<&Path>, env_file: Option<&Path>) -> Result<Self> {
        match env_file {
            Some(env_file) => {
                dotenvy::from_path(env_file)
                    .with_context(|| format!("Failed to load {}", env_file.display()))?;
            }
            None => {
                let _ = dotenvy::dotenv();
            }
        }

        let mut config = Self::load(path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Apply `LANSHARE_*` variables from the process environment
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_env_overrides_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_overrides_from(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(name) = lookup("LANSHARE_NAME") {
            self.display_name = Some(name);
        }
        if let Some(port) = lookup("LANSHARE_TRANSFER_PORT") {
            self.transfer_port = port
                .parse()
                .with_context(|| format!("LANSHARE_TRANSFER_PORT is not a port: {}", port))?;
        }
        if let Some(port) = lookup("LANSHARE_DISCOVERY_PORT") {
            self.discovery_port = port
                .parse()
                .with_context(|| format!("LANSHARE_DISCOVERY_PORT is not a port: {}", port))?;
        }
        if let Some(dir) = lookup("LANSHARE_RECEIVE_DIR") {
            self.receive_dir = PathBuf::from(dir);
        }
        if let Some(ip) = lookup("LANSHARE_BROADCAST_IP") {
            self.broadcast_ip = ip
                .parse()
                .with_context(|| format!("LANSHARE_BROADCAST_IP is not an address: {}", ip))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            bail!("chunk_size must be greater than zero");
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            bail!(
                "chunk_size {} exceeds the maximum of {} bytes",
                self.chunk_size,
                MAX_CHUNK_SIZE
            );
        }
        if self.broadcast_interval_secs == 0 {
            bail!("broadcast_interval_secs must be greater than zero");
        }
        if self.stale_threshold_secs == 0 {
            bail!("stale_threshold_secs must be greater than zero");
        }
        if self.reap_interval_secs == 0 {
            bail!("reap_interval_secs must be greater than zero");
        }
        if self.display_name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            bail!("display_name must not be blank");
        }

        if self.stale_threshold_secs <= self.broadcast_interval_secs {
            tracing::warn!(
                "stale_threshold_secs ({}) is not larger than broadcast_interval_secs ({}); peers may flicker",
                self.stale_threshold_secs,
                self.broadcast_interval_secs
            );
        }
        Ok(())
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }

    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }

    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            chunk_size: self.chunk_size,
            connect_timeout: self.connect_timeout_secs.map(Duration::from_secs),
            io_timeout: self.io_timeout_secs.map(Duration::from_secs),
        }
    }
}
