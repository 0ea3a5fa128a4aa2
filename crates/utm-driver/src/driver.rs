//! Driver - provisions one boot2docker machine on UTM and manages its lifecycle.

use crate::boot_media::{self, ISO_FILENAME};
use crate::config::{DriverConfig, DEFAULT_SSH_PORT, DEFAULT_SSH_USER};
use crate::disk;
use crate::error::{DriverError, Result};
use crate::ssh::{self, KEY_FILENAME};
use crate::state::MachineState;
use std::path::PathBuf;
use std::time::Instant;
use utm_vm::{
    DriveInterface, QemuConfiguration, QemuVmBuilder, UtmClient, VirtualMachine, VmError,
    VmStatus,
};

/// Port the Docker daemon listens on inside the guest.
pub const DOCKER_PORT: u16 = 2376;

/// Guest architecture of boot2docker.
const ARCHITECTURE: &str = "x86_64";

/// Failures swallowed by [`Driver::remove`] on its way to deleting the VM.
#[derive(Debug, Default)]
pub struct RemoveReport {
    /// Stopping the VM failed
    pub stop: Option<VmError>,
    /// Re-resolving the VM handle before deletion failed
    pub validate: Option<VmError>,
}

impl RemoveReport {
    /// Returns `true` if every step succeeded.
    pub fn is_clean(&self) -> bool {
        self.stop.is_none() && self.validate.is_none()
    }
}

/// Drives one machine: a UTM VM named `docker-machine-<name>` plus its files
/// in the machine store.
///
/// The VM handle is resolved by name on first use and cached; UTM stays the
/// source of truth for its state.
#[derive(Debug)]
pub struct Driver {
    client: UtmClient,
    config: DriverConfig,
    vm: Option<VirtualMachine>,
}

impl Driver {
    /// Create a driver talking to UTM through `osascript`.
    pub fn new(config: DriverConfig) -> Self {
        let client = UtmClient::osascript().with_application(config.application.clone());
        Self::with_client(client, config)
    }

    /// Create a driver using an existing client.
    pub fn with_client(client: UtmClient, config: DriverConfig) -> Self {
        Self {
            client,
            config,
            vm: None,
        }
    }

    /// Get the driver configuration.
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// Get the machine name.
    pub fn machine_name(&self) -> &str {
        &self.config.machine_name
    }

    /// Display name of the machine's VM in UTM.
    pub fn vm_name(&self) -> String {
        format!("docker-machine-{}", self.config.machine_name)
    }

    /// Path of the boot image.
    pub fn iso_path(&self) -> PathBuf {
        self.config.resolve_store_path(ISO_FILENAME)
    }

    /// Path of the data disk image.
    pub fn disk_path(&self) -> PathBuf {
        self.config
            .resolve_store_path(format!("{}.img", self.config.machine_name))
    }

    /// Path of the SSH private key.
    pub fn ssh_key_path(&self) -> PathBuf {
        self.config.resolve_store_path(KEY_FILENAME)
    }

    /// Get the SSH port.
    pub fn ssh_port(&self) -> u16 {
        match self.config.ssh_port {
            0 => DEFAULT_SSH_PORT,
            port => port,
        }
    }

    /// Get the SSH login user.
    pub fn ssh_username(&self) -> &str {
        match self.config.ssh_user.as_str() {
            "" => DEFAULT_SSH_USER,
            user => user,
        }
    }

    /// VM configuration for this machine: boot image first, then the data
    /// disk on IDE, with a single network interface.
    pub fn vm_configuration(&self) -> QemuConfiguration {
        QemuVmBuilder::new(self.vm_name())
            .architecture(ARCHITECTURE)
            .memory_mb(self.config.memory_mb)
            .cpu_cores(self.config.cpu_count)
            .uefi(false)
            .with_removable_image(self.iso_path())
            .with_raw_disk(self.disk_path(), DriveInterface::Ide)
            .with_network(self.config.network, &self.config.host_interface)
            .build_config()
    }

    /// Provision the machine's files, register the VM with UTM and start it.
    ///
    /// # Errors
    /// Fails if any provisioning step fails, or if the VM does not get an IP
    /// address in time.
    pub async fn create(&mut self) -> Result<()> {
        self.config.validate()?;
        let start = Instant::now();
        let store = self.config.store_path();
        tracing::info!(machine = %self.machine_name(), store = %store.display(), "Creating machine");

        tokio::fs::create_dir_all(&store).await?;

        let key = self.ssh_key_path();
        ssh::ensure_ssh_key(&key).await?;
        boot_media::ensure_boot_media(&self.iso_path(), &self.config.boot2docker_url).await?;

        let public_key = tokio::fs::read(ssh::public_key_path(&key)).await?;
        disk::create_disk_image(&self.disk_path(), public_key, self.config.disk_mb).await?;

        let vm = self.client.create_qemu_vm(&self.vm_configuration()).await?;
        tracing::info!(
            machine = %self.machine_name(),
            vm_id = %vm.id(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "VM registered"
        );
        self.vm = Some(vm);
        self.config.save().await?;

        self.start().await
    }

    /// Resolve the VM handle by name if it is not cached yet.
    pub async fn validate_vm(&mut self) -> Result<&VirtualMachine> {
        Ok(self.resolve_vm().await?)
    }

    async fn resolve_vm(&mut self) -> utm_vm::Result<&VirtualMachine> {
        let vm = match self.vm.take() {
            Some(vm) => vm,
            None => {
                let vm = self.client.vm_by_name(&self.vm_name()).await?;
                tracing::debug!(machine = %self.config.machine_name, vm_id = %vm.id(), "Resolved VM");
                vm
            }
        };
        Ok(self.vm.insert(vm))
    }

    /// Start the VM and wait until it has an IP address.
    pub async fn start(&mut self) -> Result<()> {
        tracing::info!(machine = %self.machine_name(), "Starting machine");
        self.validate_vm().await?.start().await?;
        self.wait_for_ip().await.map(drop)
    }

    /// Poll for the VM's IP address until one appears or the attempt ceiling
    /// is reached.
    ///
    /// Query failures count as "no address yet".
    pub async fn wait_for_ip(&mut self) -> Result<String> {
        let interval = self.config.ip_poll_interval;
        let attempts = self.config.ip_poll_attempts;
        let start = Instant::now();
        tracing::info!(
            machine = %self.machine_name(),
            attempts,
            interval_ms = interval.as_millis() as u64,
            "Waiting for VM to get an IP address"
        );

        for attempt in 1..=attempts {
            match self.get_ip().await {
                Ok(ip) if !ip.is_empty() => {
                    tracing::info!(
                        machine = %self.machine_name(),
                        %ip,
                        attempt,
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "VM is up"
                    );
                    return Ok(ip);
                }
                Ok(_) => tracing::trace!(attempt, "No IP address yet"),
                Err(e) => tracing::trace!(attempt, error = %e, "IP query failed"),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }

        let vm_id = match &self.vm {
            Some(vm) => vm.id().to_string(),
            None => self.vm_name(),
        };
        tracing::warn!(%vm_id, attempts, "Timed out waiting for an IP address");
        Err(DriverError::Timeout {
            vm_id,
            attempts,
            interval,
        })
    }

    /// Suspend the VM. Paused machines report [`MachineState::Stopped`].
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!(machine = %self.machine_name(), "Stopping machine");
        self.validate_vm().await?.pause().await?;
        tracing::info!(machine = %self.machine_name(), "Machine stopped");
        Ok(())
    }

    /// Stop, then start again.
    pub async fn restart(&mut self) -> Result<()> {
        self.validate_vm().await?;
        self.stop().await?;
        self.start().await
    }

    /// Kill the VM process.
    pub async fn kill(&mut self) -> Result<()> {
        self.validate_vm().await?.kill().await?;
        Ok(())
    }

    /// Tear the VM down.
    ///
    /// Stops the VM, waits for the settle delay, then deletes it. Failures
    /// before the delete are logged and returned in the report; only a failed
    /// delete is an error. Without a resolvable handle the VM is deleted by
    /// name.
    pub async fn remove(&mut self) -> Result<RemoveReport> {
        let mut report = RemoveReport::default();
        tracing::info!(machine = %self.machine_name(), "Removing machine");

        let stopped = match self.resolve_vm().await {
            Ok(vm) => vm.stop().await,
            Err(e) => Err(e),
        };
        if let Err(e) = stopped {
            tracing::warn!(machine = %self.config.machine_name, error = %e, "Error while stopping VM");
            report.stop = Some(e);
        }

        tokio::time::sleep(self.config.settle_delay).await;

        if let Err(e) = self.resolve_vm().await {
            tracing::warn!(machine = %self.config.machine_name, error = %e, "Error while validating VM");
            report.validate = Some(e);
        }

        match self.vm.take() {
            Some(vm) => vm.delete().await?,
            None => self.client.delete_vm_by_name(&self.vm_name()).await?,
        }

        tracing::info!(machine = %self.machine_name(), clean = report.is_clean(), "Machine removed");
        Ok(report)
    }

    /// Current IP address, or empty unless the VM is started.
    pub async fn get_ip(&mut self) -> Result<String> {
        let vm = self.validate_vm().await?;
        if vm.status().await? != VmStatus::Started {
            return Ok(String::new());
        }
        Ok(vm.ip().await?)
    }

    /// Docker daemon URL, or empty when the VM has no address.
    pub async fn get_url(&mut self) -> Result<String> {
        let ip = self.get_ip().await?;
        if ip.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("tcp://{ip}:{DOCKER_PORT}"))
    }

    /// Host to SSH into.
    pub async fn ssh_hostname(&mut self) -> Result<String> {
        self.get_ip().await
    }

    /// Current machine state.
    ///
    /// An address query failure on a started VM is read as "no address yet".
    pub async fn get_state(&mut self) -> Result<MachineState> {
        let vm = self.validate_vm().await?;
        let status = vm.status().await?;
        let ip = match status {
            VmStatus::Started => vm.ip().await.unwrap_or_else(|e| {
                tracing::trace!(vm_id = %vm.id(), error = %e, "No IP address yet");
                String::new()
            }),
            _ => String::new(),
        };
        Ok(MachineState::from_status(&status, &ip))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_test::{assert_err, assert_ok};
    use utm_vm::testing::FakeBridge;
    use utm_vm::NetworkMode;

    const LISTING: &str = "ID1|#|docker-machine-dev|#|qemu|#|stopped|&|";

    fn config(storage: &std::path::Path) -> DriverConfig {
        DriverConfig::builder("dev")
            .storage_path(storage)
            .build()
            .unwrap()
    }

    fn driver(bridge: &Arc<FakeBridge>, config: DriverConfig) -> Driver {
        Driver::with_client(UtmClient::new(bridge.clone()), config)
    }

    #[test]
    fn test_paths_and_names() {
        let driver = driver(&Arc::new(FakeBridge::new()), config(std::path::Path::new("/s")));
        assert_eq!(driver.vm_name(), "docker-machine-dev");
        assert_eq!(driver.iso_path(), PathBuf::from("/s/machines/dev/boot2docker.iso"));
        assert_eq!(driver.disk_path(), PathBuf::from("/s/machines/dev/dev.img"));
        assert_eq!(driver.ssh_key_path(), PathBuf::from("/s/machines/dev/id_rsa"));
        assert_eq!(driver.ssh_port(), 22);
        assert_eq!(driver.ssh_username(), "docker");
    }

    #[test]
    fn test_vm_configuration() {
        let mut config = config(std::path::Path::new("/s"));
        config.memory_mb = 2048;
        config.cpu_count = 2;
        config.network = NetworkMode::Bridged;
        config.host_interface = "en0".into();
        let vm = driver(&Arc::new(FakeBridge::new()), config).vm_configuration();

        assert_eq!(vm.name, "docker-machine-dev");
        assert_eq!(vm.architecture, "x86_64");
        assert_eq!(vm.memory, 2048);
        assert_eq!(vm.cpu_cores, 2);
        assert_eq!(vm.drives.len(), 2);
        assert!(vm.drives[0].removable);
        assert_eq!(vm.drives[1].interface, Some(DriveInterface::Ide));
        assert!(vm.drives[1].raw);
        assert_eq!(vm.network_interfaces.len(), 1);
        assert_eq!(vm.network_interfaces[0].host_interface, "en0");
    }

    #[tokio::test]
    async fn test_start_returns_on_first_address() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("return status of vm", Ok("started"))
            .on("query ip", Ok("192.168.64.7"));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        assert_ok!(driver.start().await);
        assert_eq!(bridge.count("start vm"), 1);
        assert_eq!(bridge.count("query ip"), 1);
        assert_eq!(assert_ok!(driver.get_state().await), MachineState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ip_retries_until_address() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("return status of vm", Ok("started"))
            .on_sequence("query ip", [Err("no address"), Ok(""), Ok("10.0.2.15")]);
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        let ip = assert_ok!(driver.wait_for_ip().await);
        assert_eq!(ip, "10.0.2.15");
        assert_eq!(bridge.count("query ip"), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ip_times_out_after_ceiling() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("return status of vm", Ok("started"))
            .on("query ip", Err("Can't get item 1 of {}."));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        let begin = tokio::time::Instant::now();
        let err = assert_err!(driver.wait_for_ip().await);
        match err {
            DriverError::Timeout {
                vm_id,
                attempts,
                interval,
            } => {
                assert_eq!(vm_id, "ID1");
                assert_eq!(attempts, 120);
                assert_eq!(interval, Duration::from_secs(5));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(bridge.count("query ip"), 120);
        // 119 sleeps: none after the last attempt.
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_secs(5 * 119), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(5 * 120), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_ip_skips_query_until_started() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on_sequence("return status of vm", [Ok("starting"), Ok("started")])
            .on("query ip", Ok("10.0.2.15"));
        let mut config = config(std::path::Path::new("/s"));
        config.ip_poll_attempts = 3;
        let mut driver = driver(&bridge, config);

        assert_ok!(driver.wait_for_ip().await);
        assert_eq!(bridge.count("return status of vm"), 2);
        assert_eq!(bridge.count("query ip"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_deletes_even_when_stop_fails() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("stop vm", Err("VM is not running"));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        let report = assert_ok!(driver.remove().await);
        assert!(report.stop.is_some());
        assert!(report.validate.is_none());
        assert!(!report.is_clean());
        assert_eq!(bridge.count(r#"delete virtual machine id "ID1""#), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_falls_back_to_name() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.on("virtual machines", Ok(""));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        let report = assert_ok!(driver.remove().await);
        assert!(report.stop.as_ref().is_some_and(VmError::is_not_found));
        assert!(report.validate.as_ref().is_some_and(VmError::is_not_found));
        assert_eq!(
            bridge.count(r#"delete virtual machine named "docker-machine-dev""#),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_remove_fails_when_delete_fails() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("delete virtual machine", Err("permission denied"));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        let err = assert_err!(driver.remove().await);
        assert!(matches!(err, DriverError::Vm(VmError::Command { .. })));
    }

    #[tokio::test]
    async fn test_stop_suspends() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.on("virtual machines", Ok(LISTING));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        assert_ok!(driver.stop().await);
        assert_eq!(bridge.count("suspend vm"), 1);
        assert_eq!(bridge.count("stop vm"), 0);
    }

    #[tokio::test]
    async fn test_kill_and_handle_caching() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.on("virtual machines", Ok(LISTING));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        assert_ok!(driver.kill().await);
        assert_ok!(driver.kill().await);
        assert_eq!(bridge.count("stop vm by kill"), 2);
        assert_eq!(bridge.count("virtual machines"), 1);
    }

    #[tokio::test]
    async fn test_missing_vm_is_not_found() {
        let bridge = Arc::new(FakeBridge::new());
        bridge.on("virtual machines", Ok(""));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        let err = assert_err!(driver.kill().await);
        match err {
            DriverError::Vm(e) => assert!(e.is_not_found()),
            other => panic!("expected VM error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_url_and_state_when_stopped() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("return status of vm", Ok("paused"));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        assert_eq!(assert_ok!(driver.get_url().await), "");
        assert_eq!(assert_ok!(driver.get_state().await), MachineState::Stopped);
        assert_eq!(bridge.count("query ip"), 0);
    }

    #[tokio::test]
    async fn test_url_when_running() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("return status of vm", Ok("started"))
            .on("query ip", Ok("192.168.64.7"));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        assert_eq!(
            assert_ok!(driver.get_url().await),
            "tcp://192.168.64.7:2376"
        );
        assert_eq!(assert_ok!(driver.ssh_hostname().await), "192.168.64.7");
    }

    #[tokio::test]
    async fn test_state_started_without_address_is_starting() {
        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on("virtual machines", Ok(LISTING))
            .on("return status of vm", Ok("started"))
            .on("query ip", Err("Can't get item 1 of {}."));
        let mut driver = driver(&bridge, config(std::path::Path::new("/s")));

        assert_eq!(assert_ok!(driver.get_state().await), MachineState::Starting);
    }

    #[tokio::test]
    async fn test_create_with_provisioned_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.disk_mb = 1;
        let store = config.store_path();
        std::fs::create_dir_all(&store).unwrap();
        std::fs::write(store.join("id_rsa"), "private").unwrap();
        std::fs::write(store.join("id_rsa.pub"), "ssh-rsa AAAA test\n").unwrap();
        std::fs::write(store.join("boot2docker.iso"), "iso").unwrap();

        let bridge = Arc::new(FakeBridge::new());
        bridge
            .on(
                "make new virtual machine",
                Ok("ID1|#|docker-machine-dev|#|qemu|#|stopped"),
            )
            .on("return status of vm", Ok("started"))
            .on("query ip", Ok("192.168.64.7"));
        let mut driver = driver(&bridge, config.clone());

        assert_ok!(driver.create().await);

        let calls = bridge.calls();
        let create = &calls[0].script;
        let iso = store.join("boot2docker.iso");
        let img = store.join("dev.img");
        assert_eq!(
            create[0],
            format!("set drive0 to POSIX file \"{}\"", iso.display())
        );
        assert_eq!(
            create[1],
            format!("set drive1 to POSIX file \"{}\"", img.display())
        );
        assert!(create[2].contains(
            "drives: {{removable: true, source: drive0}, {interface: IDE, raw: true, source: drive1}}"
        ));
        assert!(create[2].contains("network interfaces: {{mode: shared}}"));
        assert_eq!(calls[1].script[1], "start vm");

        assert_eq!(std::fs::metadata(&img).unwrap().len(), 1 << 20);
        assert_eq!(assert_ok!(DriverConfig::load(&store).await), config);
        // Listing is never needed: the handle comes from the create response.
        assert_eq!(bridge.count("virtual machines"), 0);
    }
}
