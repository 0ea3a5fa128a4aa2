//! Driver configuration.
//!
//! Configuration is loaded from environment variables with sensible defaults,
//! and persisted as `config.json` in the machine's store directory once the
//! machine has been created.

use crate::error::{DriverError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use utm_vm::NetworkMode;

/// Default boot2docker release image.
pub const DEFAULT_BOOT2DOCKER_URL: &str =
    "https://github.com/iIIusi0n/docker-machine-driver-utm/releases/download/v1.0.0/boot2docker.iso";

/// Default SSH login on boot2docker.
pub const DEFAULT_SSH_USER: &str = "docker";

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Name of the persisted configuration file.
pub const CONFIG_FILENAME: &str = "config.json";

/// Configuration for one machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Machine name; the UTM VM is named `docker-machine-<name>`.
    pub machine_name: String,
    /// Root directory holding every machine's store.
    pub storage_path: PathBuf,
    /// Memory in MB (default: 1024).
    pub memory_mb: u32,
    /// Disk size in MB (default: 8192).
    pub disk_mb: u64,
    /// CPU core count (default: 1).
    pub cpu_count: u32,
    /// Network mode (default: shared).
    pub network: NetworkMode,
    /// Host interface for bridged networking.
    pub host_interface: String,
    /// Where to fetch the boot image from.
    pub boot2docker_url: String,
    /// SSH login user (default: docker).
    pub ssh_user: String,
    /// SSH port (default: 22).
    pub ssh_port: u16,
    /// Scriptable application to drive (default: UTM).
    pub application: String,
    /// Delay between IP address queries while waiting for boot.
    pub ip_poll_interval: Duration,
    /// Maximum number of IP address queries while waiting for boot.
    pub ip_poll_attempts: u32,
    /// Pause between stopping and deleting a VM on removal.
    pub settle_delay: Duration,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            machine_name: String::new(),
            storage_path: default_storage_path(),
            memory_mb: 1024,
            disk_mb: 8192,
            cpu_count: 1,
            network: NetworkMode::Shared,
            host_interface: String::new(),
            boot2docker_url: DEFAULT_BOOT2DOCKER_URL.to_string(),
            ssh_user: DEFAULT_SSH_USER.to_string(),
            ssh_port: DEFAULT_SSH_PORT,
            application: utm_vm::DEFAULT_APPLICATION.to_string(),
            ip_poll_interval: Duration::from_secs(5),
            ip_poll_attempts: 120,
            settle_delay: Duration::from_secs(1),
        }
    }
}

fn default_storage_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".utm-machine")
}

impl DriverConfig {
    /// Create a new config builder for the named machine.
    pub fn builder(machine_name: impl Into<String>) -> DriverConfigBuilder {
        DriverConfigBuilder {
            config: Self {
                machine_name: machine_name.into(),
                ..Default::default()
            },
        }
    }

    /// Load configuration for `machine_name` from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `UTM_MEMORY` | `1024` |
    /// | `UTM_DISK` | `8192` |
    /// | `UTM_CPU` | `1` |
    /// | `UTM_NETWORK` | `shared` (emulated, shared, host, bridged) |
    /// | `UTM_HOST_INTERFACE` | empty |
    /// | `UTM_BOOT2DOCKER_URL` | GitHub release image |
    /// | `UTM_SSH_USER` | `docker` |
    /// | `UTM_APPLICATION` | `UTM` |
    /// | `UTM_MACHINE_STORAGE_PATH` | `$HOME/.utm-machine` |
    ///
    /// Unparseable values fall back to the default.
    pub fn from_env(machine_name: impl Into<String>) -> Self {
        Self::from_lookup(machine_name, |key| std::env::var(key).ok())
    }

    /// Same as [`DriverConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(
        machine_name: impl Into<String>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Self {
        let default = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());

        Self {
            machine_name: machine_name.into(),
            storage_path: non_empty("UTM_MACHINE_STORAGE_PATH")
                .map(PathBuf::from)
                .unwrap_or(default.storage_path),
            memory_mb: non_empty("UTM_MEMORY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.memory_mb),
            disk_mb: non_empty("UTM_DISK")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.disk_mb),
            cpu_count: non_empty("UTM_CPU")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.cpu_count),
            network: non_empty("UTM_NETWORK")
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.network),
            host_interface: lookup("UTM_HOST_INTERFACE").unwrap_or(default.host_interface),
            boot2docker_url: non_empty("UTM_BOOT2DOCKER_URL").unwrap_or(default.boot2docker_url),
            ssh_user: non_empty("UTM_SSH_USER").unwrap_or(default.ssh_user),
            application: non_empty("UTM_APPLICATION").unwrap_or(default.application),
            ..default
        }
    }

    /// Directory holding this machine's files.
    pub fn store_path(&self) -> PathBuf {
        self.storage_path.join("machines").join(&self.machine_name)
    }

    /// Resolve a file name inside the machine's store.
    pub fn resolve_store_path(&self, file: impl AsRef<Path>) -> PathBuf {
        self.store_path().join(file)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.machine_name.is_empty() {
            return Err(DriverError::Config("machine_name is required".into()));
        }
        if self.machine_name.contains(['/', '\\']) {
            return Err(DriverError::Config(format!(
                "machine_name must not contain path separators: {:?}",
                self.machine_name
            )));
        }
        if self.memory_mb == 0 {
            return Err(DriverError::Config("memory_mb must be > 0".into()));
        }
        if self.cpu_count == 0 {
            return Err(DriverError::Config("cpu_count must be > 0".into()));
        }
        if self.disk_mb == 0 {
            return Err(DriverError::Config("disk_mb must be > 0".into()));
        }
        if self.ip_poll_attempts == 0 {
            return Err(DriverError::Config("ip_poll_attempts must be > 0".into()));
        }
        if self.boot2docker_url.is_empty() {
            return Err(DriverError::Config("boot2docker_url is required".into()));
        }
        Ok(())
    }

    /// Write the configuration to `config.json` in the machine's store.
    pub async fn save(&self) -> Result<()> {
        let path = self.resolve_store_path(CONFIG_FILENAME);
        let json = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(&path, json).await?;
        tracing::debug!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Read a configuration previously written by [`DriverConfig::save`].
    pub async fn load(store_path: impl AsRef<Path>) -> Result<Self> {
        let path = store_path.as_ref().join(CONFIG_FILENAME);
        let json = tokio::fs::read(&path).await?;
        let config = serde_json::from_slice(&json)?;
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }
}

/// Builder for DriverConfig.
#[derive(Debug)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// Set the root storage directory.
    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Set memory in MB.
    pub fn memory_mb(mut self, mb: u32) -> Self {
        self.config.memory_mb = mb;
        self
    }

    /// Set disk size in MB.
    pub fn disk_mb(mut self, mb: u64) -> Self {
        self.config.disk_mb = mb;
        self
    }

    /// Set CPU core count.
    pub fn cpu_count(mut self, count: u32) -> Self {
        self.config.cpu_count = count;
        self
    }

    /// Set the network mode and, for bridged mode, the host interface.
    pub fn network(mut self, mode: NetworkMode, host_interface: impl Into<String>) -> Self {
        self.config.network = mode;
        self.config.host_interface = host_interface.into();
        self
    }

    /// Set the boot image URL.
    pub fn boot2docker_url(mut self, url: impl Into<String>) -> Self {
        self.config.boot2docker_url = url.into();
        self
    }

    /// Set the SSH login user.
    pub fn ssh_user(mut self, user: impl Into<String>) -> Self {
        self.config.ssh_user = user.into();
        self
    }

    /// Set the scriptable application name.
    pub fn application(mut self, name: impl Into<String>) -> Self {
        self.config.application = name.into();
        self
    }

    /// Set the IP polling interval and attempt ceiling.
    pub fn ip_poll(mut self, interval: Duration, attempts: u32) -> Self {
        self.config.ip_poll_interval = interval;
        self.config.ip_poll_attempts = attempts;
        self
    }

    /// Set the pause between stop and delete on removal.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    /// Build the configuration, validating all required fields.
    pub fn build(self) -> Result<DriverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
