/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! `lama init`: folders, database, and OAuth credentials for every account.

use crate::api::{UserCredential, REQUEST_TIMEOUT};
use crate::config::{AccountConfig, Config, APP_NAME, APP_VERSION, APP_WEBSITE};
use crate::store::Store;
use anyhow::{Context, Result};
use lama_protocol::{Application, Token};
use reqwest::Url;
use std::io::BufRead;
use std::path::Path;
use tracing::info;

pub const APP_SCOPES: &str = "read";
pub const REDIRECT_URI: &str = "urn:ietf:wg:oauth:2.0:oob";

/// Registered application, as written to `<safe>_clientcred.secret`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientCredential {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
}

impl ClientCredential {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parse {}", path.display()))
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("write {}", path.display()))
}

pub fn check_folders(cfg: &Config) -> Result<()> {
    for dir in [cfg.creds_dir(), cfg.data_dir(), cfg.logs_dir()] {
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("create {}", dir.display()))?;
            println!("Folder '{}' created", dir.display());
        }
    }
    Ok(())
}

pub fn authorize_url(cred: &ClientCredential) -> Result<Url> {
    let base = format!("{}/oauth/authorize", cred.api_base_url.trim_end_matches('/'));
    Url::parse_with_params(
        &base,
        &[
            ("client_id", cred.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", REDIRECT_URI),
            ("scope", APP_SCOPES),
        ],
    )
    .with_context(|| format!("invalid instance url: {}", cred.api_base_url))
}

pub struct Initializer<'a> {
    cfg: &'a Config,
    http: reqwest::Client,
}

impl<'a> Initializer<'a> {
    pub fn new(cfg: &'a Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("LAMA/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { cfg, http })
    }

    /// Registers the application on the account's instance unless a client
    /// credential is already on disk.
    pub async fn register_app(&self, account: &AccountConfig) -> Result<ClientCredential> {
        println!("\nRegistering the app");
        let path = self.cfg.client_cred_path(account);
        if path.is_file() {
            println!("   File '{}' already present on disk. Skipping this step.", path.display());
            return ClientCredential::load(&path);
        }

        let url = format!("{}/api/v1/apps", account.instance);
        let app: Application = self
            .http
            .post(&url)
            .form(&[
                ("client_name", APP_NAME),
                ("redirect_uris", REDIRECT_URI),
                ("scopes", APP_SCOPES),
                ("website", APP_WEBSITE),
            ])
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("decode registered application")?;

        let cred = ClientCredential {
            client_id: app.client_id,
            client_secret: app.client_secret,
            api_base_url: account.instance.clone(),
        };
        write_json(&path, &cred)?;
        info!("client credential written for {}", account.handle);
        println!("   OK - File '{}' successfully created.", path.display());
        Ok(cred)
    }

    /// Exchanges an authorization code typed by the user for an access token,
    /// unless a user credential is already on disk.
    pub async fn authorize_app(
        &self,
        account: &AccountConfig,
        client: &ClientCredential,
        input: &mut dyn BufRead,
    ) -> Result<()> {
        println!("\nAuthorizing the app");
        let path = self.cfg.user_cred_path(account);
        if path.is_file() {
            println!("   File '{}' already present on disk. Skipping this step.", path.display());
            return Ok(());
        }

        println!("   Open the following URL in your browser, then copy the code you get.");
        println!("   Make sure you are logged in with the correct account ({}).", account.text);
        println!("\n   {}\n", authorize_url(client)?);
        println!("Enter the OAuth authorization code: ");
        let mut code = String::new();
        input.read_line(&mut code)?;
        let code = code.trim();
        if code.is_empty() {
            anyhow::bail!("no authorization code entered");
        }

        let url = format!("{}/oauth/token", client.api_base_url.trim_end_matches('/'));
        let token: Token = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client.client_id.as_str()),
                ("client_secret", client.client_secret.as_str()),
                ("redirect_uri", REDIRECT_URI),
                ("scope", APP_SCOPES),
            ])
            .send()
            .await
            .with_context(|| format!("POST {url}"))?
            .error_for_status()?
            .json()
            .await
            .context("decode access token")?;

        write_json(
            &path,
            &UserCredential {
                access_token: token.access_token,
                api_base_url: client.api_base_url.clone(),
            },
        )?;
        info!("user credential written for {}", account.handle);
        println!("   OK - File '{}' successfully created.", path.display());
        Ok(())
    }
}

pub async fn run_init(cfg: &Config, input: &mut dyn BufRead) -> Result<()> {
    let n = cfg.accounts.len();
    println!("\nrunning {APP_NAME} v.{APP_VERSION}, init mode\n");
    println!("Initializing app with {n} account{}.", if n > 1 { "s" } else { "" });

    check_folders(cfg)?;
    Store::open(cfg.db_path())?;

    let init = Initializer::new(cfg)?;
    for account in &cfg.accounts {
        println!("\nAccount: {}", account.text);
        let client = init.register_app(account).await?;
        init.authorize_app(account, &client, input).await?;
    }
    println!("\nAnd we're done! :)\n");
    Ok(())
}
