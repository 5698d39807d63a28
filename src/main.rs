// SwitchMaster — Credential Switching for Opaque Login Clients
// Copyright (C) 2026  Martin Gehrken (IamLumae)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// SPDX-License-Identifier: AGPL-3.0-or-later

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use switchmaster::config::{
    ClientLocator, SwitchConfig, Timings, CLIENT_PATHS_FILE, CONFIG_FILE, DEFAULT_CLIENT_PATHS,
};
use switchmaster::journal::{SwitchJournal, JOURNAL_FILE};
use switchmaster::platform::{Desktop, ScriptedDesktop};
use switchmaster::{Credential, ProgramId, SwitchExecutor, SwitchRequest, SwitchResult};

const LOG_ENV: &str = "SWITCHMASTER_LOG";

/// Switch the Riot Client to another account.
#[derive(Parser, Debug)]
#[command(name = "switchmaster", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Account to log in with
    #[arg(short, long)]
    username: Option<String>,

    /// Environment variable holding the password
    #[arg(long, default_value = "SWITCHMASTER_PASSWORD")]
    password_env: String,

    /// Login client executable (default: saved path, then install locations)
    #[arg(long)]
    client: Option<PathBuf>,

    /// Tick "stay signed in" on the login form
    #[arg(long)]
    stay_signed_in: bool,

    /// Start a game afterwards: league, valorant or a raw product id
    #[arg(long)]
    launch: Option<String>,

    #[arg(long, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Do not record the run in the history database
    #[arg(long)]
    no_journal: bool,

    /// Play the whole switch against a simulated login client
    #[arg(long)]
    dry_run: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Remember the login client executable
    SetClient { path: PathBuf },
    /// Show recent switches
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
}

fn init_tracing(log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(file).with_ansi(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }
    Ok(())
}

#[cfg(windows)]
fn real_desktop() -> Result<Arc<dyn Desktop>> {
    Ok(Arc::new(switchmaster::platform::win32::Win32Desktop::new()))
}

#[cfg(not(windows))]
fn real_desktop() -> Result<Arc<dyn Desktop>> {
    bail!("switching a real login client needs Windows; try --dry-run")
}

/// Simulated client that shows its window on the third poll.
fn dry_run_desktop(client: &Path) -> Arc<dyn Desktop> {
    let d = ScriptedDesktop::with_login_client(client, "Riot Client", 3);
    d.set_clipboard(Some("clipboard before the dry run"));
    Arc::new(d)
}

fn exit_code(result: &SwitchResult) -> ExitCode {
    match result {
        SwitchResult::Success { .. } => ExitCode::SUCCESS,
        SwitchResult::NeedsVerification => ExitCode::from(2),
        SwitchResult::Failed { .. } => ExitCode::from(1),
    }
}

fn show_history(limit: usize) -> Result<ExitCode> {
    let journal = SwitchJournal::open(Path::new(JOURNAL_FILE)).context("cannot open history")?;
    for run in journal.recent_runs(limit)? {
        println!(
            "#{:<4} {}  {:<20} {:<20} {}",
            run.id,
            run.started_at,
            run.username,
            run.outcome.as_deref().unwrap_or("unfinished"),
            run.reason.or(run.warning).unwrap_or_default()
        );
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.log_file.as_deref())?;

    let locator = ClientLocator::new(CLIENT_PATHS_FILE);
    match &cli.command {
        Some(Command::SetClient { path }) => {
            locator
                .set_client_path(path)
                .with_context(|| format!("cannot use {}", path.display()))?;
            println!("login client set to {}", path.display());
            return Ok(ExitCode::SUCCESS);
        }
        Some(Command::History { limit }) => return show_history(*limit),
        None => {}
    }

    let Some(username) = cli.username.clone() else {
        bail!("--username is required");
    };
    let password = std::env::var(&cli.password_env)
        .with_context(|| format!("password not found in ${}", cli.password_env))?;

    let mut config = SwitchConfig::load(&cli.config)?;
    let (client, desktop) = if cli.dry_run {
        config = config.with_timings(Timings::immediate());
        let client = cli
            .client
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CLIENT_PATHS[0]));
        let desktop = dry_run_desktop(&client);
        (client, desktop)
    } else {
        let client = locator
            .resolve(cli.client.as_deref())
            .context("cannot locate the login client")?;
        (client, real_desktop()?)
    };
    info!(client = %client.display(), dry_run = cli.dry_run, "login client");

    let credential = Credential::new(username, password)
        .stay_logged_in(cli.stay_signed_in)
        .launch(cli.launch.as_deref().map(ProgramId::from));

    let mut executor = SwitchExecutor::new(desktop, config);
    if !cli.no_journal {
        executor = executor.with_journal(JOURNAL_FILE);
    }

    let handle = executor.submit(SwitchRequest::new(client, credential))?;
    for event in handle.progress().iter() {
        println!("{event}");
    }
    let result = handle.wait();
    println!("{result}");
    Ok(exit_code(&result))
}
