//! CLI entry point for the Enpass vault reader.
//!
//! This binary provides the `enpass` command with subcommands for listing
//! and showing entries, printing a single password, and managing the PIN
//! cache.

mod cli;
mod config;
mod output;
mod prompt;

use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use enpass_vault::{PinOptions, Session, UnlockOptions, Vault, VaultError};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, ListArgs, PassArgs, PinArgs};
use crate::config::{FileConfig, Settings};
use crate::output::Mode;
use crate::prompt::TerminalPrompter;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.global.log);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let env = enpass_vault::EnvOverrides::from_lookup(|name| std::env::var(name).ok());
    let file = FileConfig::discover(cli.global.config.as_deref())?;
    let settings = Settings::resolve(&cli.global, cli.filters(), file, env)?;
    tracing::debug!(vault = %settings.vault_path.display(), "settings resolved");

    match cli.command {
        Commands::List(args) => cmd_entries(&settings, &args, Mode::List),
        Commands::Show(args) => cmd_entries(&settings, &args, Mode::Show),
        Commands::Pass(args) => cmd_pass(&settings, &args),
        Commands::Pin(args) => cmd_pin(&settings, &args),
    }
}

/// 2 for rejected credentials, 1 for everything else.
fn exit_code(error: &anyhow::Error) -> u8 {
    match error.downcast_ref::<VaultError>() {
        Some(VaultError::InvalidCredentials) => 2,
        _ => 1,
    }
}

// ---------------------------------------------------------------------------
// Subcommands
// ---------------------------------------------------------------------------

fn cmd_entries(settings: &Settings, args: &ListArgs, mode: Mode) -> Result<()> {
    let mut session = open_session(settings)?;
    let result = session.query(&settings.filter(&args.orderby))?;
    session.close()?;

    let entries: Vec<_> = result
        .entries
        .into_iter()
        .filter(|e| args.trashed || !e.is_trashed())
        .collect();
    tracing::debug!(count = entries.len(), "entries selected");

    let style = args.style().unwrap_or(settings.output_style);
    let mut stdout = io::stdout().lock();
    output::render(&mut stdout, &entries, style, mode).context("failed to write entries")?;
    stdout.flush().context("failed to write entries")
}

fn cmd_pass(settings: &Settings, args: &PassArgs) -> Result<()> {
    let mut session = open_session(settings)?;
    let entry = session.find_one(&settings.filter(&args.orderby), true)?;
    session.close()?;

    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{}", entry.value()).context("failed to write the password")
}

fn cmd_pin(settings: &Settings, args: &PinArgs) -> Result<()> {
    let vault = Vault::locate(&settings.vault_path)?;
    let identity = vault.identity();
    let store = enpass_vault::platform_store(&identity)?;

    if args.reset {
        store.delete()?;
        tracing::info!(%identity, "PIN cache reset");
        println!("cached key for {identity} removed");
    } else if store.exists()? {
        println!("a cached key exists for {identity}");
    } else {
        println!("no cached key for {identity}");
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn open_session(settings: &Settings) -> Result<Session> {
    let vault = Vault::locate(&settings.vault_path)?;
    tracing::debug!(
        vault = %vault.info().name,
        requires_keyfile = vault.info().requires_keyfile,
        "vault located"
    );

    let pin = if settings.pin {
        let store = enpass_vault::platform_store(&vault.identity())?;
        Some(
            PinOptions::new(store)
                .with_min_pin_len(settings.min_pin_len)
                .with_env(&settings.env),
        )
    } else {
        None
    };
    let options = UnlockOptions {
        env_password: settings.env.master_password.clone(),
        config_password: settings.config_password.clone(),
        keyfile: settings.keyfile.clone(),
        non_interactive: settings.non_interactive,
        pin,
    };

    let mut prompter = TerminalPrompter;
    let session = enpass_vault::unlock(&vault, options, &mut prompter)?;
    Ok(session)
}

/// Initialize the tracing subscriber on stderr. `RUST_LOG` wins over `--log`.
fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
