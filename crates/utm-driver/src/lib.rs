//! # utm-driver
//!
//! Provisions boot2docker machines on UTM and manages their lifecycle.
//! Built on [`utm_vm`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use utm_driver::{Driver, DriverConfig, MachineState};
//!
//! # async fn example() -> utm_driver::Result<()> {
//! let config = DriverConfig::from_env("dev");
//! let mut driver = Driver::new(config);
//!
//! // Download media, build the disk, register the VM and wait for an address
//! driver.create().await?;
//! assert_eq!(driver.get_state().await?, MachineState::Running);
//! println!("docker host: {}", driver.get_url().await?);
//!
//! // Best-effort teardown
//! let report = driver.remove().await?;
//! if !report.is_clean() {
//!     eprintln!("removed with warnings: {report:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod boot_media;
mod config;
mod disk;
mod driver;
mod error;
mod ssh;
mod state;

pub use boot_media::{ensure_boot_media, ISO_FILENAME};
pub use config::{
    DriverConfig, DriverConfigBuilder, CONFIG_FILENAME, DEFAULT_BOOT2DOCKER_URL,
    DEFAULT_SSH_PORT, DEFAULT_SSH_USER,
};
pub use disk::{create_disk_image, FORMAT_MARKER};
pub use driver::{Driver, RemoveReport, DOCKER_PORT};
pub use error::{DriverError, Result};
pub use ssh::{ensure_ssh_key, public_key_path, KEY_FILENAME};
pub use state::MachineState;
