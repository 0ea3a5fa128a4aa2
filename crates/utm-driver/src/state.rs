//! Coarse machine state derived from UTM's VM status.

use std::fmt;
use utm_vm::VmStatus;

/// State of a machine as seen by its users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MachineState {
    /// Not running (stopped or paused)
    Stopped,
    /// Booting, or booted without a network address yet
    Starting,
    /// Booted and reachable
    Running,
    /// Shutting down or pausing
    Stopping,
    /// UTM reported a status with no mapping
    Indeterminate,
}

impl MachineState {
    /// Map a VM status and its current IP address (empty when unknown).
    pub fn from_status(status: &VmStatus, ip: &str) -> Self {
        match status {
            VmStatus::Stopped | VmStatus::Paused => MachineState::Stopped,
            VmStatus::Starting | VmStatus::Resuming => MachineState::Starting,
            VmStatus::Started if ip.is_empty() => MachineState::Starting,
            VmStatus::Started => MachineState::Running,
            VmStatus::Stopping | VmStatus::Pausing => MachineState::Stopping,
            VmStatus::Unknown(_) => MachineState::Indeterminate,
        }
    }

    /// Lowercase name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineState::Stopped => "stopped",
            MachineState::Starting => "starting",
            MachineState::Running => "running",
            MachineState::Stopping => "stopping",
            MachineState::Indeterminate => "indeterminate",
        }
    }
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
