//! Command-line arguments.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use utm_driver::DriverConfig;
use utm_vm::NetworkMode;

#[derive(Parser, Debug)]
#[command(name = "utm-machine", version, about = "Manage boot2docker machines on UTM")]
pub struct Cli {
    /// Root directory for machine stores (default: $HOME/.utm-machine).
    #[arg(long, global = true)]
    pub storage_path: Option<PathBuf>,

    /// Scriptable application to drive.
    #[arg(long, global = true)]
    pub application: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Provision a machine and boot it
    Create(CreateArgs),
    /// Start a machine and wait for its IP address
    Start(MachineArg),
    /// Suspend a machine
    Stop(MachineArg),
    /// Stop and start a machine
    Restart(MachineArg),
    /// Kill a machine's VM process
    Kill(MachineArg),
    /// Stop and delete a machine's VM
    Rm(MachineArg),
    /// Print a machine's state
    Status(MachineArg),
    /// Print a machine's IP address
    Ip(MachineArg),
    /// Print a machine's Docker URL
    Url(MachineArg),
    /// List machines known to UTM
    Ls,
}

#[derive(Args, Debug)]
pub struct MachineArg {
    /// Machine name.
    pub name: String,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Machine name.
    pub name: String,

    /// Memory size in MB.
    #[arg(long)]
    pub memory: Option<u32>,

    /// Disk size in MB.
    #[arg(long)]
    pub disk: Option<u64>,

    /// Number of CPUs.
    #[arg(long)]
    pub cpu: Option<u32>,

    /// Network mode (emulated, shared, host, bridged).
    #[arg(long)]
    pub network: Option<NetworkMode>,

    /// Host interface for bridged networking.
    #[arg(long)]
    pub host_interface: Option<String>,

    /// URL of the boot2docker image.
    #[arg(long)]
    pub boot2docker_url: Option<String>,

    /// SSH login user.
    #[arg(long)]
    pub ssh_user: Option<String>,
}

impl CreateArgs {
    /// Override `config` with every flag that was given.
    pub fn apply(&self, config: &mut DriverConfig) {
        if let Some(memory) = self.memory {
            config.memory_mb = memory;
        }
        if let Some(disk) = self.disk {
            config.disk_mb = disk;
        }
        if let Some(cpu) = self.cpu {
            config.cpu_count = cpu;
        }
        if let Some(network) = self.network {
            config.network = network;
        }
        if let Some(host_interface) = &self.host_interface {
            config.host_interface = host_interface.clone();
        }
        if let Some(url) = &self.boot2docker_url {
            config.boot2docker_url = url.clone();
        }
        if let Some(user) = &self.ssh_user {
            config.ssh_user = user.clone();
        }
    }
}

impl Cli {
    /// Apply the global overrides to `config`.
    pub fn apply(&self, config: &mut DriverConfig) {
        if let Some(path) = &self.storage_path {
            config.storage_path = path.clone();
        }
        if let Some(application) = &self.application {
            config.application = application.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_create_flags() {
        let cli = Cli::try_parse_from([
            "utm-machine",
            "create",
            "dev",
            "--memory",
            "2048",
            "--network",
            "bridged",
            "--host-interface",
            "en0",
        ])
        .unwrap();

        let Command::Create(args) = &cli.command else {
            panic!("expected create, got {:?}", cli.command);
        };
        let mut config = DriverConfig::from_lookup(&args.name, |_| None);
        args.apply(&mut config);

        assert_eq!(config.machine_name, "dev");
        assert_eq!(config.memory_mb, 2048);
        assert_eq!(config.disk_mb, 8192);
        assert_eq!(config.network, NetworkMode::Bridged);
        assert_eq!(config.host_interface, "en0");
    }

    #[test]
    fn test_parse_rejects_unknown_network() {
        let result = Cli::try_parse_from(["utm-machine", "create", "dev", "--network", "wifi"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_storage_path_after_subcommand() {
        let cli = Cli::try_parse_from([
            "utm-machine",
            "status",
            "dev",
            "--storage-path",
            "/tmp/machines",
        ])
        .unwrap();

        let mut config = DriverConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.storage_path, PathBuf::from("/tmp/machines"));
        assert!(matches!(cli.command, Command::Status(MachineArg { ref name }) if name == "dev"));
    }

    #[test]
    fn test_ls_takes_no_name() {
        assert!(Cli::try_parse_from(["utm-machine", "ls"]).is_ok());
        assert!(Cli::try_parse_from(["utm-machine", "start"]).is_err());
    }
}
