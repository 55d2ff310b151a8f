// ABOUTME: Quick-setup and key-migration drivers for nomad-setup.
// ABOUTME: Sequences system setup, key provisioning, host detection, payload and display.

use anyhow::{bail, Context, Result};
use colored::Colorize;
use nomad_ssh::{
    decode_key, provision_key, prune_keys, resolve_account, AccountEnv, ProvisionOptions,
    ProvisionOutcome,
};
use std::path::PathBuf;

use crate::config::SetupConfig;
use crate::display;
use crate::network::{default_strategies, detect_primary_ipv4, AddressStrategy};
use crate::payload::ConnectionRequest;
use crate::qr::{select_renderer, QrImage, QrRenderer, RemoteEndpoint};
use crate::system::{self, SystemSetup};
use crate::token::new_token;

/// Packages that make the host reachable over SSH and mosh.
pub const REQUIRED_PACKAGES: &[&str] = &["openssh-server", "mosh"];

/// Host integrations used by [`run`].
pub struct Collaborators {
    pub system: Box<dyn SystemSetup>,
    pub strategies: Vec<Box<dyn AddressStrategy>>,
    pub renderer: Box<dyn QrRenderer>,
    pub accounts: AccountEnv,
}

impl Collaborators {
    /// Real implementations for the current OS.
    pub fn for_host(config: &SetupConfig) -> Self {
        let accounts = AccountEnv::from_process();
        let use_sudo = cfg!(unix) && accounts.invoking_user.as_deref() != Some("root");

        Self {
            system: system::for_host(use_sudo),
            strategies: default_strategies(),
            renderer: select_renderer(&config.qr_endpoint),
            accounts,
        }
    }
}

/// What a quick-setup run produced.
#[derive(Debug)]
pub struct SetupReport {
    pub request: ConnectionRequest,
    pub payload: String,
    pub key: Option<ProvisionOutcome>,
    pub image: Option<QrImage>,
    pub page: Option<PathBuf>,
}

/// Run the quick setup.
///
/// Only a missing host or user is fatal. System setup, key provisioning,
/// QR rendering and browser launch log a warning and continue.
pub fn run(config: &SetupConfig, deps: &Collaborators) -> Result<SetupReport> {
    if config.skip_system {
        tracing::info!("skipping system setup");
    } else {
        println!("{} Setting up SSH and mosh...", "[1/4]".dimmed());
        ensure_system(deps.system.as_ref());
    }

    println!("{} Provisioning public key...", "[2/4]".dimmed());
    let key = provision_from_env(config, &deps.accounts);

    println!("{} Determining connection details...", "[3/4]".dimmed());
    let host = determine_host(config, &deps.strategies)?;
    let user = config
        .user
        .clone()
        .or_else(|| deps.accounts.default_account().map(str::to_string))
        .context("could not determine the login user; pass --user <name>")?;

    let request = ConnectionRequest::new(&host, &user, config.port, &new_token())
        .context("invalid connection details")?;
    let payload = request.to_uri();
    tracing::debug!(%payload, "built quick setup payload");

    println!("{} Rendering QR code...", "[4/4]".dimmed());
    let image = render_image(deps.renderer.as_ref(), config, &payload);
    let terminal_qr = deps.renderer.render_terminal(&payload);

    display::print_summary(&request, &payload, terminal_qr.as_deref());

    let page = image.as_ref().and_then(|image| {
        let html = display::render_page(&request, &payload, image);
        match display::write_page(&config.output_dir, &html) {
            Ok(path) => {
                println!("  QR page: {}", path.display());
                Some(path)
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not write quick setup page");
                None
            }
        }
    });

    if config.open_browser {
        if let Some(path) = &page {
            display::open_in_browser(path);
        }
    }

    Ok(SetupReport {
        request,
        payload,
        key,
        image,
        page,
    })
}

fn ensure_system(system: &dyn SystemSetup) {
    if let Err(e) = system.install_packages(REQUIRED_PACKAGES) {
        tracing::warn!(error = %e, "package installation failed, continuing");
    }

    let service = system.ssh_service_name();
    if let Err(e) = system.ensure_service_running(service) {
        tracing::warn!(service, error = %e, "could not start SSH service, continuing");
    }
}

/// Decode and provision the key from the configuration, if one was given.
fn provision_from_env(config: &SetupConfig, accounts: &AccountEnv) -> Option<ProvisionOutcome> {
    let Some(blob) = config.pubkey_b64.as_deref() else {
        tracing::info!("NOMAD_PUBKEY_B64 not set, skipping key provisioning");
        return None;
    };

    let Some(key_line) = decode_key(blob) else {
        tracing::warn!("NOMAD_PUBKEY_B64 is not a valid base64 key, continuing without it");
        return None;
    };

    let target = match resolve_account(config.user.as_deref(), accounts) {
        Ok(target) => target,
        Err(e) => {
            tracing::warn!(error = %e, "could not resolve account for key provisioning");
            return None;
        }
    };

    // Quick setup only appends; legacy keys are removed by `migrate-keys`.
    let options = ProvisionOptions {
        prune: false,
        ..ProvisionOptions::default()
    };

    match provision_key(&target, &key_line, &options) {
        Ok(report) => {
            println!(
                "  Key {} in {}",
                report.outcome.to_string().green(),
                report.path.display()
            );
            Some(report.outcome)
        }
        Err(e) => {
            tracing::warn!(account = %target.name, error = %e, "key provisioning failed");
            None
        }
    }
}

/// Explicit host, else detection when enabled.
fn determine_host(config: &SetupConfig, strategies: &[Box<dyn AddressStrategy>]) -> Result<String> {
    if let Some(host) = &config.host {
        return Ok(host.clone());
    }

    if !config.auto_detect {
        bail!("no host given and auto-detection is disabled; pass --host <address> or --auto-detect");
    }

    match detect_primary_ipv4(strategies) {
        Some(addr) => Ok(addr.to_string()),
        None => bail!("could not detect a LAN IPv4 address; pass --host <address>"),
    }
}

/// Render the image, falling back to the remote endpoint if the renderer fails.
fn render_image(renderer: &dyn QrRenderer, config: &SetupConfig, payload: &str) -> Option<QrImage> {
    match renderer.render_image(payload, &config.output_dir) {
        Ok(image) => Some(image),
        Err(e) => {
            tracing::warn!(
                renderer = renderer.name(),
                error = %e,
                "QR rendering failed, using remote endpoint"
            );
            RemoteEndpoint::new(&config.qr_endpoint)
                .render_image(payload, &config.output_dir)
                .ok()
        }
    }
}

/// Inputs for the key-migration entry point.
#[derive(Debug, Clone)]
pub struct MigrateArgs {
    pub user: Option<String>,
    pub prune_prefix: String,
    pub pubkey_b64: Option<String>,
    pub backup: bool,
}

/// What the migration changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub removed: usize,
    pub added: bool,
    pub backup: Option<PathBuf>,
}

/// Prune legacy keys and, if a key is supplied, provision it.
///
/// Unlike the quick setup, failures here are fatal: migration is the
/// whole operation.
pub fn migrate_keys(args: &MigrateArgs, accounts: &AccountEnv) -> Result<MigrationReport> {
    let target = resolve_account(args.user.as_deref(), accounts)
        .context("could not resolve the account to migrate")?;

    let key_line = match args.pubkey_b64.as_deref() {
        Some(blob) => {
            let decoded = decode_key(blob);
            if decoded.is_none() {
                tracing::warn!("NOMAD_PUBKEY_B64 is not a valid base64 key, only pruning");
            }
            decoded
        }
        None => None,
    };

    let report = match key_line {
        Some(line) => {
            let options = ProvisionOptions {
                backup: args.backup,
                ..ProvisionOptions::migration(args.prune_prefix.clone())
            };
            let report = provision_key(&target, &line, &options)
                .with_context(|| format!("failed to migrate keys for {}", target.name))?;
            MigrationReport {
                removed: report.pruned,
                added: report.outcome.added(),
                backup: report.backup,
            }
        }
        None => {
            let report = prune_keys(&target, &args.prune_prefix, args.backup)
                .with_context(|| format!("failed to prune keys for {}", target.name))?;
            MigrationReport {
                removed: report.removed,
                added: false,
                backup: report.backup,
            }
        }
    };

    println!(
        "{} Removed {} legacy key(s) for {}",
        "✓".green().bold(),
        report.removed,
        target.name
    );
    if report.added {
        println!("{} Added new key", "✓".green().bold());
    }
    if let Some(backup) = &report.backup {
        println!("  Backup: {}", backup.display());
    }

    Ok(report)
}
