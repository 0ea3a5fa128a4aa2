//! VirtualMachine type - lifecycle commands for one UTM virtual machine.

use crate::client::UtmClient;
use crate::error::{Result, VmError};
use crate::record::{quote, to_record_string};
use std::fmt;
use std::path::Path;

/// Virtualization backend of a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmBackend {
    /// Apple Virtualization.framework
    Apple,
    /// QEMU
    Qemu,
    /// Backend not available on this host
    Unavailable,
}

impl VmBackend {
    /// The backend as written in scripts.
    pub fn as_str(&self) -> &'static str {
        match self {
            VmBackend::Apple => "apple",
            VmBackend::Qemu => "qemu",
            VmBackend::Unavailable => "unavailable",
        }
    }
}

impl From<&str> for VmBackend {
    fn from(s: &str) -> Self {
        match s.trim() {
            "apple" => VmBackend::Apple,
            "qemu" => VmBackend::Qemu,
            _ => VmBackend::Unavailable,
        }
    }
}

impl fmt::Display for VmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by UTM for a VM.
///
/// UTM's vocabulary may grow, so anything unrecognized is kept verbatim in
/// [`VmStatus::Unknown`] instead of being rejected.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum VmStatus {
    Stopped,
    Starting,
    Started,
    Pausing,
    Paused,
    Resuming,
    Stopping,
    /// A status this crate does not know about
    Unknown(String),
}

impl VmStatus {
    /// The status as written in scripts.
    pub fn as_str(&self) -> &str {
        match self {
            VmStatus::Stopped => "stopped",
            VmStatus::Starting => "starting",
            VmStatus::Started => "started",
            VmStatus::Pausing => "pausing",
            VmStatus::Paused => "paused",
            VmStatus::Resuming => "resuming",
            VmStatus::Stopping => "stopping",
            VmStatus::Unknown(raw) => raw,
        }
    }
}

impl From<&str> for VmStatus {
    fn from(s: &str) -> Self {
        match s.trim() {
            "stopped" => VmStatus::Stopped,
            "starting" => VmStatus::Starting,
            "started" => VmStatus::Started,
            "pausing" => VmStatus::Pausing,
            "paused" => VmStatus::Paused,
            "resuming" => VmStatus::Resuming,
            "stopping" => VmStatus::Stopping,
            other => VmStatus::Unknown(other.to_string()),
        }
    }
}

impl fmt::Display for VmStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A VM as listed by UTM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vm {
    /// Identifier assigned by UTM
    pub id: String,
    /// Display name
    pub name: String,
    pub backend: VmBackend,
    /// Status at the time of the listing
    pub status: VmStatus,
}

/// Handle for issuing commands to one VM.
///
/// UTM decides the resulting state of every command; call
/// [`VirtualMachine::status`] to observe it. Preconditions (e.g. `pause` needs
/// a started VM) are not checked locally.
#[derive(Debug, Clone)]
pub struct VirtualMachine {
    info: Vm,
    client: UtmClient,
}

impl VirtualMachine {
    pub(crate) fn new(info: Vm, client: UtmClient) -> Self {
        Self { info, client }
    }

    /// Get the UTM identifier of this VM.
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Get the display name.
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Listing data captured when this handle was resolved.
    pub fn info(&self) -> &Vm {
        &self.info
    }

    /// Start the VM (if stopped or paused).
    pub async fn start(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Starting VM");
        self.run("start", &["start vm"]).await.map(drop)
    }

    /// Start the VM without persisting changes made while it runs.
    pub async fn start_disposable(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Starting disposable VM");
        self.run("start without saving", &["start vm without saving"])
            .await
            .map(drop)
    }

    /// Suspend a running VM.
    pub async fn pause(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Pausing VM");
        self.run("suspend", &["suspend vm"]).await.map(drop)
    }

    /// Suspend a running VM and save its state to disk.
    pub async fn pause_and_save(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Pausing VM with saving");
        self.run("suspend with saving", &["suspend vm with saving"])
            .await
            .map(drop)
    }

    /// Ask the guest to shut down.
    pub async fn stop(&self) -> Result<()> {
        tracing::info!(vm_id = %self.id(), "Stopping VM");
        self.run("stop", &["stop vm"]).await.map(drop)
    }

    /// Power off without a graceful guest shutdown.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::warn!(vm_id = %self.id(), "Force stopping VM");
        self.run("stop by force", &["stop vm by force"]).await.map(drop)
    }

    /// Kill the VM process immediately.
    pub async fn kill(&self) -> Result<()> {
        tracing::warn!(vm_id = %self.id(), "Killing VM");
        self.run("stop by kill", &["stop vm by kill"]).await.map(drop)
    }

    /// Query the current status.
    pub async fn status(&self) -> Result<VmStatus> {
        let raw = self.run("status", &["return status of vm"]).await?;
        Ok(VmStatus::from(raw.as_str()))
    }

    /// Query the first IP address reported by the guest agent.
    ///
    /// Fails while the guest has no address yet; pollers should treat an
    /// error here as "not available yet".
    pub async fn ip(&self) -> Result<String> {
        self.run("query ip", &["return item 1 of (query ip of vm)"])
            .await
    }

    /// Copy a host file to `dst` inside the guest.
    pub async fn push_file(&self, src: &Path, dst: &str) -> Result<()> {
        tracing::debug!(vm_id = %self.id(), src = %src.display(), dst, "Pushing file to guest");
        let bind = format!("set input to POSIX file {}", quote(&src.to_string_lossy()));
        let push = format!(
            "push of (open file of vm at {} for writing) from input",
            quote(dst)
        );
        self.run("push file", &[bind.as_str(), push.as_str()]).await.map(drop)
    }

    /// Run a program inside the guest.
    pub async fn execute(&self, program: &str, args: &[&str]) -> Result<()> {
        tracing::debug!(vm_id = %self.id(), program, ?args, "Executing in guest");
        let args = to_record_string(args)?;
        let line = format!("execute of vm at {} with arguments {args}", quote(program));
        self.run("execute", &[line.as_str()]).await.map(drop)
    }

    /// Delete the VM from UTM. The handle is consumed.
    pub async fn delete(self) -> Result<()> {
        self.client.delete_vm_by_id(&self.info.id).await
    }

    /// Re-read this VM's listing from UTM.
    pub async fn refresh(&mut self) -> Result<()> {
        self.info = self.client.vm_by_id(&self.info.id).await?.info;
        Ok(())
    }

    /// Run a command script targeting this VM.
    async fn run(&self, command: &'static str, lines: &[&str]) -> Result<String> {
        let mut script = Vec::with_capacity(lines.len() + 1);
        script.push(format!("set vm to virtual machine id {}", quote(self.id())));
        script.extend(lines.iter().map(|line| line.to_string()));

        self.client
            .tell(script)
            .await
            .map_err(|e| VmError::command(self.id(), command, e))
    }
}
