/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use clap::{Parser, Subcommand};
use lama_core::config::{default_prefs_path, Config, APP_NAME, APP_VERSION};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser)]
#[command(name = "lama", version, about = "Archive a Mastodon account's activity locally")]
struct Cli {
    /// Path to prefs.json (defaults to $LAMA_PREFS, then the platform config dir).
    #[arg(long, global = true)]
    prefs: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Create folders and the database, then register and authorize every account.
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let prefs_path = match cli.prefs {
        Some(p) => p,
        None => default_prefs_path()?,
    };
    let cfg = Config::load(&prefs_path)?;

    if let Some(Command::Init) = cli.command {
        let stdin = std::io::stdin();
        lama_core::init::run_init(&cfg, &mut stdin.lock()).await?;
        return Ok(ExitCode::SUCCESS);
    }

    let log_path = lama_core::logging::init(&cfg)?;
    info!("running {APP_NAME} v.{APP_VERSION}, log file {}", log_path.display());

    let summary = lama_core::run::run_all(&cfg).await?;
    if summary.success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
