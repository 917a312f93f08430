mod bootloader;
mod cmd;
mod config;
mod create;
mod dataset;
mod errors;
mod mount;
mod resolver;
#[cfg(test)]
mod testutil;
mod ui;
mod util;
mod zfs;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use config::Config;
use ui::UX;

#[derive(Parser)]
#[command(name = "zbe", version, about = "Manage ZFS boot environments.")]
struct Cli {
    /// Print verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Alternate config file (default /etc/zbe.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a boot environment.
    Create {
        /// Name of the new boot environment, e.g. default-2.
        boot_environment: String,

        /// Use an existing boot environment or snapshot as source.
        #[arg(short, long, value_name = "SRC")]
        existing: Option<String>,
    },
    /// Activate a boot environment and regenerate bootloader configuration.
    Activate {
        /// Name of the boot environment to activate.
        boot_environment: String,
    },
}

fn run(cli: &Cli, ux: &UX) -> Result<()> {
    let cfg = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match &cli.command {
        Commands::Create {
            boot_environment,
            existing,
        } => cmd::create::run_create(ux, &cfg, boot_environment, existing.as_deref()),
        Commands::Activate { boot_environment } => {
            cmd::activate::run_activate(ux, &cfg, boot_environment)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let ux = UX::new(cli.verbose);

    // Fatal errors name the dataset/snapshot/path involved and exit
    // non-zero; warnings have already been printed and keep status zero.
    match run(&cli, &ux) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            ux.error(&format!("{e:#}"));
            ExitCode::FAILURE
        }
    }
}
