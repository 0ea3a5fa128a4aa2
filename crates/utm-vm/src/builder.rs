//! Builder pattern for ergonomic QEMU VM configuration.

use crate::client::UtmClient;
use crate::config::{
    DirectoryShareMode, DriveConfiguration, DriveInterface, DriveSource, NetworkConfiguration,
    NetworkMode, QemuConfiguration,
};
use crate::error::Result;
use crate::machine::VirtualMachine;
use std::path::PathBuf;

/// Fluent builder for configuring and creating QEMU virtual machines.
///
/// # Example
///
/// ```no_run
/// use utm_vm::{NetworkMode, QemuVmBuilder, UtmClient};
///
/// # async fn example() -> utm_vm::Result<()> {
/// let client = UtmClient::osascript();
/// let vm = QemuVmBuilder::new("docker-machine-dev")
///     .architecture("x86_64")
///     .memory_mb(2048)
///     .cpu_cores(2)
///     .with_removable_image("/path/to/boot2docker.iso")
///     .with_raw_disk("/path/to/dev.img", utm_vm::DriveInterface::Ide)
///     .with_network(NetworkMode::Shared, "")
///     .create(&client)
///     .await?;
/// vm.start().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QemuVmBuilder {
    config: QemuConfiguration,
}

impl QemuVmBuilder {
    /// Create a builder for a VM with the given display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: QemuConfiguration {
                name: name.into(),
                ..Default::default()
            },
        }
    }

    /// Set free-text notes shown in UTM.
    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.config.notes = notes.into();
        self
    }

    /// Set the guest architecture (e.g. `x86_64`).
    pub fn architecture(mut self, arch: impl Into<String>) -> Self {
        self.config.architecture = arch.into();
        self
    }

    /// Set the memory size in MB.
    pub fn memory_mb(mut self, mb: u32) -> Self {
        self.config.memory = mb;
        self
    }

    /// Set the number of CPU cores.
    pub fn cpu_cores(mut self, count: u32) -> Self {
        self.config.cpu_cores = count;
        self
    }

    /// Boot with UEFI firmware.
    pub fn uefi(mut self, enabled: bool) -> Self {
        self.config.uefi = enabled;
        self
    }

    /// Set how host directories are shared.
    pub fn directory_share_mode(mut self, mode: DirectoryShareMode) -> Self {
        self.config.directory_share_mode = Some(mode);
        self
    }

    /// Attach a removable drive backed by a host image (e.g. an ISO).
    pub fn with_removable_image(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.drives.push(DriveConfiguration {
            removable: true,
            source: DriveSource::path(path),
            ..Default::default()
        });
        self
    }

    /// Attach a raw disk image on the given interface.
    pub fn with_raw_disk(mut self, path: impl Into<PathBuf>, interface: DriveInterface) -> Self {
        self.config.drives.push(DriveConfiguration {
            raw: true,
            interface: Some(interface),
            source: DriveSource::path(path),
            ..Default::default()
        });
        self
    }

    /// Attach a drive with full options.
    pub fn with_drive(mut self, drive: DriveConfiguration) -> Self {
        self.config.drives.push(drive);
        self
    }

    /// Add a network interface. `host_interface` only applies to bridged mode.
    pub fn with_network(mut self, mode: NetworkMode, host_interface: &str) -> Self {
        self.config
            .network_interfaces
            .push(NetworkConfiguration::new(mode, host_interface));
        self
    }

    /// Add a network interface with full options.
    pub fn with_network_config(mut self, network: NetworkConfiguration) -> Self {
        self.config.network_interfaces.push(network);
        self
    }

    /// Build and return the configuration without creating a VM.
    pub fn build_config(self) -> QemuConfiguration {
        self.config
    }

    /// Register the VM with UTM. The VM is not started.
    ///
    /// # Errors
    /// Returns an error if the configuration cannot be encoded or UTM rejects it.
    pub async fn create(self, client: &UtmClient) -> Result<VirtualMachine> {
        client.create_qemu_vm(&self.config).await
    }
}
