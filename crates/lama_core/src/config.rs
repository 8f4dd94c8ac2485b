/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};

pub const APP_NAME: &str = "LAMA";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_WEBSITE: &str = "https://github.com/s427/LAMA";

const MAX_FETCH_LIMIT: u32 = 80;

#[derive(Debug, Clone, serde::Deserialize)]
pub struct AccountEntry {
    pub username: String,
    pub instance: String,
}

/// Preferences as read from `prefs.json`. Every key is optional.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct Prefs {
    pub user_dir: Option<PathBuf>,
    pub accounts: Vec<AccountEntry>,
    pub fetch_limit: u32,
    pub recursion_limit: u32,
    pub fetch_reply_parents: bool,
    pub fetch_linked_posts: bool,
    pub fetch_favourites: bool,
    pub fetch_bookmarks: bool,
    pub fetch_mentions: bool,
    pub fetch_polls: bool,
    pub fetch_reblogs: bool,
    pub save_json: bool,
    pub download_own_attachments: bool,
    pub download_others_attachments: bool,
    pub log_level: String,
    pub log_history_limit: i64,
}

impl Default for Prefs {
    fn default() -> Self {
        Self {
            user_dir: None,
            accounts: Vec::new(),
            fetch_limit: 40,
            recursion_limit: 2,
            fetch_reply_parents: true,
            fetch_linked_posts: true,
            fetch_favourites: true,
            fetch_bookmarks: true,
            fetch_mentions: true,
            fetch_polls: true,
            fetch_reblogs: false,
            save_json: true,
            download_own_attachments: true,
            download_others_attachments: false,
            log_level: "info".to_string(),
            log_history_limit: 10,
        }
    }
}

/// A configured account with its derived identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountConfig {
    pub username: String,
    /// Base URL of the instance, always with a scheme and without trailing slash.
    pub instance: String,
    /// `username@host`, the account identifier used in the database.
    pub handle: String,
    /// `username_hostalnum`, used in file and folder names.
    pub safe: String,
    /// Human readable form for logs.
    pub text: String,
}

impl AccountConfig {
    pub fn new(username: &str, instance: &str) -> Self {
        let username = username.trim().trim_start_matches('@').to_string();
        let instance = instance.trim().trim_end_matches('/');
        let host = instance
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        let instance = if instance.starts_with("http://") || instance.starts_with("https://") {
            instance.to_string()
        } else {
            format!("https://{host}")
        };
        let safe = format!("{}_{}", alnum(&username), alnum(&host));
        Self {
            handle: format!("{username}@{host}"),
            text: format!("@{username} on {instance}"),
            username,
            instance,
            safe,
        }
    }
}

/// Immutable run configuration, handed to every component that needs it.
#[derive(Debug, Clone)]
pub struct Config {
    pub prefs: Prefs,
    pub user_dir: PathBuf,
    pub accounts: Vec<AccountConfig>,
}

impl Config {
    pub fn new(mut prefs: Prefs, user_dir: PathBuf) -> Self {
        prefs.fetch_limit = prefs.fetch_limit.clamp(1, MAX_FETCH_LIMIT);
        let accounts = prefs
            .accounts
            .iter()
            .map(|a| AccountConfig::new(&a.username, &a.instance))
            .collect();
        Self {
            prefs,
            user_dir,
            accounts,
        }
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let prefs: Prefs = serde_json::from_str(text).context("parse prefs json")?;
        if prefs.accounts.is_empty() {
            anyhow::bail!("no account configured");
        }
        let user_dir = match prefs.user_dir.clone() {
            Some(dir) => dir,
            None => default_user_dir()?,
        };
        Ok(Self::new(prefs, user_dir))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read prefs: {}", path.display()))?;
        Self::from_json(&text).with_context(|| format!("load prefs: {}", path.display()))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.user_dir.join("data")
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir().join("app.db")
    }

    pub fn creds_dir(&self) -> PathBuf {
        self.user_dir.join("creds")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.user_dir.join("logs")
    }

    pub fn client_cred_path(&self, account: &AccountConfig) -> PathBuf {
        self.creds_dir()
            .join(format!("{}_clientcred.secret", account.safe))
    }

    pub fn user_cred_path(&self, account: &AccountConfig) -> PathBuf {
        self.creds_dir().join(format!("{}_usercred.secret", account.safe))
    }
}

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("net", "lama", APP_NAME).context("unable to determine platform data dir")
}

pub fn default_user_dir() -> Result<PathBuf> {
    if let Ok(v) = std::env::var("LAMA_USER_DIR") {
        if !v.trim().is_empty() {
            return Ok(PathBuf::from(v));
        }
    }
    Ok(project_dirs()?.data_local_dir().to_path_buf())
}

pub fn default_prefs_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LAMA_PREFS") {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(project_dirs()?.config_dir().join("prefs.json"))
}

fn alnum(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}
