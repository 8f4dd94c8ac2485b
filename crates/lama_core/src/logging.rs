/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::{Config, APP_NAME};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::SystemTime;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

const RUN_STAMP: &[FormatItem<'static>] = format_description!("[year][month][day]-[hour][minute][second]");

fn log_prefix() -> String {
    format!("{APP_NAME}-run")
}

/// `debug|info|warning|critical`, anything else falls back to `warning`.
pub fn level_filter(name: &str) -> LevelFilter {
    match name.trim().to_ascii_lowercase().as_str() {
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "critical" | "error" => LevelFilter::ERROR,
        _ => LevelFilter::WARN,
    }
}

/// Deletes older run logs so that, with the file about to be created, at most
/// `history_limit` remain. A limit of zero or less keeps everything.
pub fn purge_logs(dir: &Path, history_limit: i64) -> Vec<PathBuf> {
    let keep = history_limit - 1;
    if keep < 0 {
        return Vec::new();
    }
    let Ok(entries) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let prefix = log_prefix();
    let mut logs: Vec<(SystemTime, PathBuf)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
        .filter_map(|e| {
            let meta = e.metadata().ok()?;
            if !meta.is_file() {
                return None;
            }
            Some((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), e.path()))
        })
        .collect();
    let keep = keep as usize;
    if logs.len() <= keep {
        return Vec::new();
    }
    logs.sort();
    let excess = logs.len() - keep;
    let mut deleted = Vec::new();
    for (_, path) in logs.into_iter().take(excess) {
        match std::fs::remove_file(&path) {
            Ok(()) => deleted.push(path),
            Err(e) => error!("Failed to delete expired log file ({}): {e}", path.display()),
        }
    }
    deleted
}

/// Installs the global subscriber writing to stderr and to a fresh per-run
/// log file. Returns that file's path.
pub fn init(cfg: &Config) -> Result<PathBuf> {
    let dir = cfg.logs_dir();
    std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    let deleted = purge_logs(&dir, cfg.prefs.log_history_limit);

    let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
    let stamp = now.format(RUN_STAMP)?;
    let path = dir.join(format!("{}-{stamp}.log", log_prefix()));
    let file = std::fs::File::create(&path)
        .with_context(|| format!("create log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(level_filter(&cfg.prefs.log_level).into()),
        )
        .with_ansi(false)
        .with_writer(std::io::stderr.and(Mutex::new(file)))
        .try_init()
        .ok();

    if !deleted.is_empty() {
        info!("Purging old log files");
        for path in &deleted {
            info!("  '{}' deleted", path.display());
        }
    }
    Ok(path)
}
