//! Configuration types for QEMU-backed UTM virtual machines.
//!
//! Field names map onto UTM's scripting dictionary through `serde(rename)`;
//! see [`crate::record`] for how these are encoded.

use crate::record::{HOST_PATH, SCRIPT_VARIABLE};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Declares a closed set of UTM scripting constants.
macro_rules! script_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident => $wire:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $wire)] $variant,)+
        }

        impl $name {
            /// Every value, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The constant as written in scripts.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                $name::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(s))
                    .ok_or_else(|| {
                        let allowed: Vec<_> = $name::ALL.iter().map(|v| v.as_str()).collect();
                        format!("invalid {} {:?}, expected one of: {}", stringify!($name), s, allowed.join(", "))
                    })
            }
        }
    };
}

script_enum! {
    /// How host directories are shared with the guest.
    DirectoryShareMode {
        None => "none",
        WebDav => "WebDAV",
        VirtFs => "VirtFS",
    }
}

script_enum! {
    /// Bus a drive is attached to.
    DriveInterface {
        None => "none",
        Ide => "IDE",
        Scsi => "SCSI",
        Sd => "SD",
        Mtd => "MTD",
        Floppy => "Floppy",
        PFlash => "PFlash",
        VirtIo => "VirtIO",
        Nvme => "NVMe",
        Usb => "USB",
    }
}

script_enum! {
    /// Guest network mode.
    NetworkMode {
        Emulated => "emulated",
        Shared => "shared",
        Host => "host",
        /// Attach to a host interface; the only mode that uses `host_interface`.
        Bridged => "bridged",
    }
}

script_enum! {
    /// Transport protocol of a port forward.
    PortProtocol {
        Tcp => "TCP",
        Udp => "UDP",
    }
}

/// Where a drive's image comes from.
///
/// UTM only accepts files bound as script variables, so a [`DriveSource::Path`]
/// must be turned into a [`DriveSource::Variable`] before the configuration is
/// encoded. [`crate::UtmClient::create_qemu_vm`] does this automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DriveSource {
    /// No image; UTM creates a blank drive.
    #[default]
    None,
    /// A file on the host.
    Path(PathBuf),
    /// Name of a script variable holding a file reference.
    Variable(String),
}

impl DriveSource {
    /// Source pointing at a host file.
    pub fn path(path: impl Into<PathBuf>) -> Self {
        DriveSource::Path(path.into())
    }

    /// Source referring to an already-bound script variable.
    pub fn variable(name: impl Into<String>) -> Self {
        DriveSource::Variable(name.into())
    }

    /// Returns `true` if no image is attached.
    pub fn is_none(&self) -> bool {
        matches!(self, DriveSource::None)
    }
}

impl Serialize for DriveSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            DriveSource::None => serializer.serialize_none(),
            DriveSource::Path(path) => {
                serializer.serialize_newtype_struct(HOST_PATH, &path.to_string_lossy())
            }
            DriveSource::Variable(name) => serializer.serialize_newtype_struct(SCRIPT_VARIABLE, name),
        }
    }
}

/// Configuration for a new QEMU virtual machine.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QemuConfiguration {
    /// Display name
    pub name: String,
    /// Free-text notes
    pub notes: String,
    /// Guest CPU architecture (e.g. `x86_64`, `aarch64`)
    pub architecture: String,
    /// Memory size in MB
    pub memory: u32,
    /// Number of CPU cores
    #[serde(rename = "cpu cores")]
    pub cpu_cores: u32,
    /// Boot with UEFI firmware
    pub uefi: bool,
    #[serde(rename = "directory share mode")]
    pub directory_share_mode: Option<DirectoryShareMode>,
    /// Drives in boot order
    pub drives: Vec<DriveConfiguration>,
    #[serde(rename = "network interfaces")]
    pub network_interfaces: Vec<NetworkConfiguration>,
}

/// A drive attached to the VM.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriveConfiguration {
    pub id: String,
    pub removable: bool,
    pub interface: Option<DriveInterface>,
    /// Size of the image on the host in MB
    #[serde(rename = "host size")]
    pub host_size: u64,
    /// Size seen by the guest in MB
    #[serde(rename = "guest size")]
    pub guest_size: u64,
    /// Raw image instead of qcow2
    pub raw: bool,
    pub source: DriveSource,
}

/// A network interface.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkConfiguration {
    pub index: u32,
    /// Emulated NIC model
    pub hardware: String,
    pub mode: Option<NetworkMode>,
    /// MAC address
    pub address: String,
    /// Host interface name, used in bridged mode only
    #[serde(rename = "host interface")]
    pub host_interface: String,
    #[serde(rename = "port forwarding")]
    pub port_forwards: Vec<PortForwardingConfiguration>,
}

impl NetworkConfiguration {
    /// Interface in the given mode. `host_interface` is kept only for
    /// [`NetworkMode::Bridged`].
    pub fn new(mode: NetworkMode, host_interface: impl Into<String>) -> Self {
        let host_interface = match mode {
            NetworkMode::Bridged => host_interface.into(),
            _ => String::new(),
        };
        Self {
            mode: Some(mode),
            host_interface,
            ..Default::default()
        }
    }
}

/// A port forwarded from the host into the guest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PortForwardingConfiguration {
    pub protocol: Option<PortProtocol>,
    #[serde(rename = "host address")]
    pub host_address: String,
    #[serde(rename = "host port")]
    pub host_port: u16,
    #[serde(rename = "guest address")]
    pub guest_address: String,
    #[serde(rename = "guest port")]
    pub guest_port: u16,
}
