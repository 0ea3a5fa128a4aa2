//! Error types for utm-driver.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for utm-driver operations.
pub type Result<T> = std::result::Result<T, DriverError>;

/// Errors that can occur while provisioning or operating a machine.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Error from utm-vm
    #[error("VM error: {0}")]
    Vm(#[from] utm_vm::VmError),

    /// The VM never reported an IP address
    #[error("timeout waiting for VM {vm_id} to get an IP address ({attempts} attempts every {interval:?})")]
    Timeout {
        /// VM that was polled
        vm_id: String,
        /// Number of address queries made
        attempts: u32,
        /// Delay between queries
        interval: Duration,
    },

    /// Invalid driver configuration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// SSH key generation failed
    #[error("SSH key generation failed for {path}: {message}")]
    SshKey {
        /// Private key path
        path: PathBuf,
        /// Reason reported by the key generator
        message: String,
    },

    /// Boot media could not be fetched
    #[error("failed to download {url}: {source}")]
    Download {
        /// Source URL
        url: String,
        /// Underlying HTTP error
        #[source]
        source: reqwest::Error,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
