// ABOUTME: Entry point for the nomad-setup host setup tool
// ABOUTME: Parses flags, loads configuration and runs quick setup or key migration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use nomad_setup::{FileConfig, MigrateArgs, SetupArgs, SetupConfig};
use nomad_ssh::{AccountEnv, DEFAULT_PRUNE_PREFIX};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "nomad-setup")]
#[command(about = "Prepare this machine for the Nomad app and show a quick-setup QR code")]
#[command(version)]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    setup: SetupFlags,

    /// Path to config file (defaults to ~/.config/nomad/setup.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(clap::Args)]
struct SetupFlags {
    /// Address the app should connect to (detected when omitted)
    #[arg(long)]
    host: Option<String>,

    /// Login account (defaults to SUDO_USER, then USER)
    #[arg(long, short = 'u')]
    user: Option<String>,

    /// SSH port
    #[arg(long, short = 'p', value_parser = clap::value_parser!(u16).range(1..))]
    port: Option<u16>,

    /// Skip package installation and service setup
    #[arg(long)]
    skip_system: bool,

    /// Do not open the QR page in a browser
    #[arg(long)]
    no_browser: bool,

    /// Detect the LAN address even if the config file disables detection
    #[arg(long)]
    auto_detect: bool,

    /// Directory for the QR image and page
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Base64-encoded public key line to authorize
    #[arg(long, env = "NOMAD_PUBKEY_B64", hide_env_values = true)]
    pubkey_b64: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Remove legacy ecdsa keys tagged with the prune prefix, keeping a backup
    MigrateKeys {
        /// Account whose authorized_keys to migrate
        #[arg(long, short = 'u')]
        user: Option<String>,

        /// Comment prefix of keys to remove
        #[arg(long)]
        prefix: Option<String>,

        /// Do not write a timestamped backup
        #[arg(long)]
        no_backup: bool,

        /// Base64-encoded public key line to add after pruning
        #[arg(long, env = "NOMAD_PUBKEY_B64", hide_env_values = true)]
        pubkey_b64: Option<String>,
    },
}

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    if cli.verbose {
        nomad_log::init_verbose();
    } else {
        nomad_log::init();
    }

    match dispatch(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(1)
        }
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    let file = match &cli.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::load_default().context("Failed to load default config")?,
    };

    match cli.command {
        Some(Commands::MigrateKeys {
            user,
            prefix,
            no_backup,
            pubkey_b64,
        }) => {
            let args = MigrateArgs {
                user: user.or(file.user),
                prune_prefix: prefix
                    .or(file.prune_prefix)
                    .filter(|p| !p.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_PRUNE_PREFIX.to_string()),
                pubkey_b64,
                backup: !no_backup,
            };
            nomad_setup::migrate_keys(&args, &AccountEnv::from_process())?;
        }
        None => {
            let flags = cli.setup;
            let config = SetupConfig::resolve(
                file,
                SetupArgs {
                    host: flags.host,
                    user: flags.user,
                    port: flags.port,
                    pubkey_b64: flags.pubkey_b64,
                    skip_system: flags.skip_system,
                    no_browser: flags.no_browser,
                    auto_detect: flags.auto_detect,
                    output_dir: flags.output_dir,
                },
            );
            let deps = nomad_setup::Collaborators::for_host(&config);
            nomad_setup::run(&config, &deps)?;
        }
    }

    Ok(())
}
