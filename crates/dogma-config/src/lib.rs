//! Layered configuration loading for Central Dogma (§6).
//!
//! Precedence, lowest to highest:
//! 1. Built-in defaults
//! 2. `~/.config/central-dogma/config.toml` (user defaults)
//! 3. `<dataDir>/central-dogma.toml` (deployment config)
//! 4. `CENTRAL_DOGMA_*` environment variables

use std::collections::HashMap;
use std::net::{IpAddr, ToSocketAddrs, UdpSocket};
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use paths::Paths;

fn default_num_repository_workers() -> u32 {
    16
}

fn default_max_removed_repository_age_millis() -> i64 {
    604_800_000
}

fn default_mirroring_enabled() -> bool {
    true
}

fn default_num_mirroring_threads() -> u32 {
    16
}

fn default_max_num_files_per_mirror() -> u64 {
    8192
}

fn default_max_num_bytes_per_mirror() -> u64 {
    33_554_432
}

/// Top-level Central Dogma server configuration (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DogmaConfig {
    /// Storage root. Required — there is no sensible default.
    pub data_dir: PathBuf,

    #[serde(default)]
    pub replication: ReplicationConfig,

    #[serde(default = "default_num_repository_workers")]
    pub num_repository_workers: u32,

    #[serde(default = "default_max_removed_repository_age_millis")]
    pub max_removed_repository_age_millis: i64,

    #[serde(default)]
    pub repository_cache_spec: Option<String>,

    #[serde(default = "default_mirroring_enabled")]
    pub mirroring_enabled: bool,

    #[serde(default = "default_num_mirroring_threads")]
    pub num_mirroring_threads: u32,

    #[serde(default = "default_max_num_files_per_mirror")]
    pub max_num_files_per_mirror: u64,

    #[serde(default = "default_max_num_bytes_per_mirror")]
    pub max_num_bytes_per_mirror: u64,

    #[serde(default)]
    pub authentication: AuthenticationConfig,
}

impl DogmaConfig {
    /// Loads configuration from all layered sources.
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Loads configuration rooted at a specific data directory, for tests
    /// and for callers that already know where they're running.
    pub fn load_from_data_dir(data_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        ConfigLoader::new().with_data_dir(data_dir).load()
    }

    /// A minimal, single-node configuration, useful for tests and for the
    /// standalone (non-clustered) deployment mode.
    #[must_use]
    pub fn standalone(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            replication: ReplicationConfig::default(),
            num_repository_workers: default_num_repository_workers(),
            max_removed_repository_age_millis: default_max_removed_repository_age_millis(),
            repository_cache_spec: None,
            mirroring_enabled: default_mirroring_enabled(),
            num_mirroring_threads: default_num_mirroring_threads(),
            max_num_files_per_mirror: default_max_num_files_per_mirror(),
            max_num_bytes_per_mirror: default_max_num_bytes_per_mirror(),
            authentication: AuthenticationConfig::default(),
        }
    }

    /// Validates cross-field invariants that serde's per-field defaults
    /// can't express, and resolves `replication.serverId` when the
    /// deployment config omitted it.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError("dataDir must not be empty".to_string()));
        }
        if self.replication.method == ReplicationMethod::Quorum {
            if self.replication.servers.is_empty() {
                return Err(ConfigError::ValidationError(
                    "replication.servers must be non-empty when method = QUORUM".to_string(),
                ));
            }
            if self.replication.server_id.is_none() {
                self.replication.server_id = Some(self.replication.detect_server_id()?);
            }
            let server_id = self.replication.server_id.expect("just set above");
            if !self.replication.servers.contains_key(&server_id.to_string()) {
                return Err(ConfigError::ValidationError(
                    "replication.serverId does not appear in replication.servers".to_string(),
                ));
            }
        }
        // Validated eagerly so a malformed cron expression is a startup
        // error, not a runtime surprise the first time the sweep fires.
        cron::Schedule::from_str(&self.authentication.session_validation_schedule)
            .map_err(ConfigError::ScheduleError)?;
        Ok(())
    }
}

/// `replication.*` (§6): quorum membership and log retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplicationConfig {
    pub method: ReplicationMethod,
    pub server_id: Option<u32>,
    /// Keyed by the server id as a string — TOML tables require string
    /// keys, and the `config` crate's environment source does too.
    pub servers: HashMap<String, ServerAddress>,
    pub secret: String,
    pub timeout_millis: u64,
    pub num_workers: u32,
    pub max_log_count: u32,
    pub min_log_age_millis: i64,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            method: ReplicationMethod::None,
            server_id: None,
            servers: HashMap::new(),
            secret: String::new(),
            timeout_millis: 1000,
            num_workers: 16,
            max_log_count: 1024,
            min_log_age_millis: 86_400_000,
        }
    }
}

impl ReplicationConfig {
    /// Finds the one server entry whose host resolves to an address bound
    /// on this machine. Ambiguous (more than one match) or no match at all
    /// is a fatal config error, per §6.
    fn detect_server_id(&self) -> Result<u32, ConfigError> {
        let local = local_outbound_ip()
            .map_err(|e| ConfigError::ServerIdError(format!("could not determine local address: {e}")))?;

        let mut matches: Vec<u32> = Vec::new();
        for (id, address) in &self.servers {
            let id: u32 = id
                .parse()
                .map_err(|_| ConfigError::ServerIdError(format!("replication.servers key {id} is not a valid server id")))?;
            let resolved = (address.host.as_str(), address.quorum_port)
                .to_socket_addrs()
                .map_err(|e| ConfigError::ServerIdError(format!("could not resolve host {}: {e}", address.host)))?;
            if resolved.map(|addr| addr.ip()).any(|ip| ip == local) {
                matches.push(id);
            }
        }
        match matches.len() {
            1 => Ok(matches[0]),
            0 => Err(ConfigError::ServerIdError(format!(
                "no entry in replication.servers matches this host's address ({local})"
            ))),
            _ => Err(ConfigError::ServerIdError(format!(
                "ambiguous replication.serverId: {matches:?} all match this host's address ({local})"
            ))),
        }
    }
}

fn local_outbound_ip() -> std::io::Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    Ok(socket.local_addr()?.ip())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReplicationMethod {
    #[default]
    None,
    Quorum,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerAddress {
    pub host: String,
    pub quorum_port: u16,
    pub election_port: u16,
}

/// `authentication.*` (§6): session lifetime and the expiry-sweep schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AuthenticationConfig {
    pub session_timeout_millis: i64,
    pub session_cache_spec: Option<String>,
    pub session_validation_schedule: String,
}

impl Default for AuthenticationConfig {
    fn default() -> Self {
        Self {
            session_timeout_millis: 8 * 60 * 60 * 1000,
            session_cache_spec: None,
            session_validation_schedule: "0 30 */4 ? * *".to_string(),
        }
    }
}
