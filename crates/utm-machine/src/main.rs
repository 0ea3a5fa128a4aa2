//! utm-machine entry point.
//!
//! Creates and manages boot2docker machines on UTM from the command line.
//! Results go to stdout; logs go to stderr and are filtered with `RUST_LOG`.
//!
//! ## Configuration
//!
//! `create` starts from the `UTM_*` environment variables and applies flags on
//! top. Every other command reads the machine's saved `config.json`, falling
//! back to the environment when the machine has none.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use utm_driver::{Driver, DriverConfig};
use utm_vm::UtmClient;

/// Prefix of the UTM display name of every machine.
const VM_NAME_PREFIX: &str = "docker-machine-";

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::from_default_env()
                .add_directive("utm_machine=info".parse()?)
                .add_directive("utm_driver=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Command::Create(args) => {
            let mut config = DriverConfig::from_env(&args.name);
            cli.apply(&mut config);
            args.apply(&mut config);
            tracing::debug!(?config, "Configuration loaded");

            let mut driver = Driver::new(config);
            driver
                .create()
                .await
                .with_context(|| format!("failed to create machine {}", args.name))?;
            println!("{}", driver.get_url().await?);
        }
        Command::Start(m) => {
            driver(&cli, &m.name).await.start().await?;
        }
        Command::Stop(m) => {
            driver(&cli, &m.name).await.stop().await?;
        }
        Command::Restart(m) => {
            driver(&cli, &m.name).await.restart().await?;
        }
        Command::Kill(m) => {
            driver(&cli, &m.name).await.kill().await?;
        }
        Command::Rm(m) => {
            let report = driver(&cli, &m.name)
                .await
                .remove()
                .await
                .with_context(|| format!("failed to remove machine {}", m.name))?;
            if let Some(e) = &report.stop {
                eprintln!("warning: stop failed: {e}");
            }
            if let Some(e) = &report.validate {
                eprintln!("warning: lookup failed: {e}");
            }
        }
        Command::Status(m) => {
            println!("{}", driver(&cli, &m.name).await.get_state().await?);
        }
        Command::Ip(m) => {
            println!("{}", driver(&cli, &m.name).await.get_ip().await?);
        }
        Command::Url(m) => {
            println!("{}", driver(&cli, &m.name).await.get_url().await?);
        }
        Command::Ls => {
            let mut config = DriverConfig::from_env("");
            cli.apply(&mut config);
            let client = UtmClient::osascript().with_application(config.application);

            println!("{:<24} {:<10} {}", "NAME", "STATUS", "VM ID");
            for vm in client.list_vms().await? {
                if let Some(name) = vm.name.strip_prefix(VM_NAME_PREFIX) {
                    println!("{:<24} {:<10} {}", name, vm.status.as_str(), vm.id);
                }
            }
        }
    }

    Ok(())
}

/// Build a driver for an existing machine.
async fn driver(cli: &Cli, name: &str) -> Driver {
    let mut config = DriverConfig::from_env(name);
    cli.apply(&mut config);

    let config = match DriverConfig::load(config.store_path()).await {
        Ok(mut saved) => {
            saved.storage_path = config.storage_path;
            cli.apply(&mut saved);
            saved
        }
        Err(e) => {
            tracing::debug!(machine = %name, error = %e, "No saved configuration, using environment");
            config
        }
    };
    Driver::new(config)
}
