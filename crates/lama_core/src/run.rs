/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::api::{HttpMastodonClient, MastodonApi, UserCredential};
use crate::archive::Archiver;
use crate::attachments::{HttpMediaSource, MediaSource};
use crate::config::{AccountConfig, Config};
use crate::error::AccountError;
use crate::fetch::{ActivityKind, FetchOrchestrator, SweepReport};
use crate::store::Store;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

const MEDIA_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug)]
pub struct AccountOutcome {
    pub account: String,
    pub result: Result<Vec<(ActivityKind, SweepReport)>, AccountError>,
}

impl AccountOutcome {
    /// Skipped entirely, or at least one sweep was cut short.
    pub fn failed(&self) -> bool {
        match &self.result {
            Ok(sweeps) => sweeps.iter().any(|(_, r)| r.aborted),
            Err(_) => true,
        }
    }
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub accounts: Vec<AccountOutcome>,
}

impl RunSummary {
    pub fn success(&self) -> bool {
        !self.accounts.iter().any(AccountOutcome::failed)
    }
}

/// Sweeps every enabled listing of one account after checking that the
/// credentials belong to it.
pub async fn archive_account(
    cfg: &Config,
    account: &AccountConfig,
    api: Arc<dyn MastodonApi>,
    media: Arc<dyn MediaSource>,
    store: Store,
) -> Result<Vec<(ActivityKind, SweepReport)>, AccountError> {
    let me = api.verify_credentials().await?;
    if me.username != account.username {
        return Err(AccountError::IdentityMismatch {
            configured: account.username.clone(),
            authenticated: me.username,
        });
    }

    let archiver = Archiver::new(cfg, account.clone(), api, media, store);
    let orchestrator = FetchOrchestrator::new(&archiver, cfg.prefs.fetch_limit);
    let mut sweeps = Vec::new();
    for kind in ActivityKind::enabled(&cfg.prefs) {
        let report = orchestrator.sweep(kind).await;
        sweeps.push((kind, report));
    }
    Ok(sweeps)
}

fn connect(cfg: &Config, account: &AccountConfig) -> Result<Arc<dyn MastodonApi>, AccountError> {
    let cred = UserCredential::load(&cfg.user_cred_path(account))?;
    let client = HttpMastodonClient::from_credential(&cred)?;
    Ok(Arc::new(client))
}

/// Archives every configured account in turn. A failing account is logged and
/// does not prevent the next one from running.
pub async fn run_all(cfg: &Config) -> Result<RunSummary> {
    let store = Store::open(cfg.db_path())?;
    let media: Arc<dyn MediaSource> = Arc::new(HttpMediaSource::new(MEDIA_TIMEOUT)?);
    let mut summary = RunSummary::default();

    for account in &cfg.accounts {
        info!("=== {} ===", account.text);
        let result = match connect(cfg, account) {
            Ok(api) => archive_account(cfg, account, api, media.clone(), store.clone()).await,
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            error!("account {} skipped: {e:#}", account.handle);
        }
        summary.accounts.push(AccountOutcome {
            account: account.handle.clone(),
            result,
        });
    }

    let failed = summary.accounts.iter().filter(|a| a.failed()).count();
    info!(
        "run finished: {} account(s), {failed} with errors",
        summary.accounts.len()
    );
    Ok(summary)
}
