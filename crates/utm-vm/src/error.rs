//! Error types for utm-vm.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for utm-vm operations.
pub type Result<T> = std::result::Result<T, VmError>;

/// How a VM was looked up in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VmSelector {
    /// Lookup by the identifier UTM assigned at creation.
    Id(String),
    /// Lookup by display name.
    Name(String),
}

impl fmt::Display for VmSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmSelector::Id(id) => write!(f, "id {id:?}"),
            VmSelector::Name(name) => write!(f, "name {name:?}"),
        }
    }
}

/// Errors that can occur while talking to UTM.
#[derive(Debug, Error)]
pub enum VmError {
    /// The target application rejected or failed to run a script
    #[error("script failed in {application}: {message}")]
    Script {
        /// Application the script was sent to
        application: String,
        /// Error text reported by the scripting host
        message: String,
    },

    /// A lifecycle command failed for a specific VM
    #[error("`{command}` failed for VM {vm_id}: {source}")]
    Command {
        /// Identifier of the VM the command targeted
        vm_id: String,
        /// Command that was attempted
        command: &'static str,
        /// Underlying failure
        #[source]
        source: Box<VmError>,
    },

    /// A response did not have the expected shape
    #[error("unexpected response to {context}: {response:?}")]
    Parse {
        /// What was being parsed
        context: &'static str,
        /// Raw response text
        response: String,
    },

    /// No VM matched the lookup
    #[error("VM not found by {0}")]
    NotFound(VmSelector),

    /// The configuration could not be encoded as a record literal
    #[error("failed to encode configuration: {0}")]
    Encode(#[from] EncodeError),

    /// I/O error (spawning the scripting host)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VmError {
    /// Attach the VM identifier and attempted command to an error.
    pub(crate) fn command(vm_id: &str, command: &'static str, source: VmError) -> Self {
        VmError::Command {
            vm_id: vm_id.to_string(),
            command,
            source: Box::new(source),
        }
    }

    /// Returns `true` if this is a not-found lookup failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, VmError::NotFound(_))
    }
}

/// Errors produced by the record-literal encoder.
#[derive(Debug, Error, PartialEq)]
pub enum EncodeError {
    /// The value kind has no record-literal representation
    #[error("unsupported value kind: {0}")]
    Unsupported(&'static str),

    /// A drive source still holds a host path instead of a script variable
    #[error("drive source {0:?} must be bound to a script variable before encoding")]
    UnboundSource(PathBuf),

    /// Error raised by a `Serialize` implementation
    #[error("{0}")]
    Custom(String),
}

impl serde::ser::Error for EncodeError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        EncodeError::Custom(msg.to_string())
    }
}
