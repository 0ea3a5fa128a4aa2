//! # utm-vm
//!
//! Virtual machine management for UTM on macOS.
//! Drives UTM through its AppleScript interface.
//!
//! ## Quick Start
//!
//! ```no_run
//! use utm_vm::{QemuVmBuilder, UtmClient, VmStatus};
//!
//! # async fn example() -> utm_vm::Result<()> {
//! let client = UtmClient::osascript();
//!
//! // Register a QEMU VM and boot it
//! let vm = QemuVmBuilder::new("scratch")
//!     .architecture("x86_64")
//!     .memory_mb(1024)
//!     .cpu_cores(1)
//!     .create(&client)
//!     .await?;
//! vm.start().await?;
//!
//! if vm.status().await? == VmStatus::Started {
//!     println!("guest address: {}", vm.ip().await?);
//! }
//!
//! // Cleanup
//! vm.stop().await?;
//! vm.delete().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Registry**: List VMs and look them up by id or name
//! - **Lifecycle Management**: Start, pause, stop, kill and delete VMs
//! - **Record Encoding**: Typed configurations rendered as AppleScript records
//! - **Guest Access**: Query the guest IP, push files and run programs
//! - **Pluggable Bridge**: `ScriptBridge` trait, with a scripted fake behind the
//!   `testing` feature

mod bridge;
mod builder;
mod client;
mod config;
mod error;
mod machine;
pub mod record;
mod registry;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{tell_script, OsascriptBridge, ScriptBridge};
pub use builder::QemuVmBuilder;
pub use client::{UtmClient, DEFAULT_APPLICATION};
pub use config::{
    DirectoryShareMode, DriveConfiguration, DriveInterface, DriveSource, NetworkConfiguration,
    NetworkMode, PortForwardingConfiguration, PortProtocol, QemuConfiguration,
};
pub use error::{EncodeError, Result, VmError, VmSelector};
pub use machine::{VirtualMachine, Vm, VmBackend, VmStatus};
pub use record::to_record_string;
pub use registry::{parse_vm_list, parse_vm_record, FIELD_SEPARATOR, RECORD_SEPARATOR};
