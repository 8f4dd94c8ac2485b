/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Save pipeline: provenance file, dedup against the store, extraction,
//! attachments, reblog policy, then recursive expansion of related posts.

use crate::api::MastodonApi;
use crate::attachments::{AttachmentResolver, MediaSource};
use crate::config::{AccountConfig, Config};
use crate::expand::{ChainLabel, Expansion, RecursiveExpander};
use crate::extract;
use crate::handle;
use crate::store::{format_timestamp, PostRecord, Store};
use anyhow::{Context, Result};
use lama_protocol::{FetchedItem, RawStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Root kind under which embedded reblogged posts are saved.
pub const REBLOG_KIND: &str = "reblog";

#[derive(Debug)]
enum Work {
    Save(FetchedItem, ChainLabel),
    Expand(Expansion),
}

/// What a single save did.
#[derive(Debug, Default)]
pub struct SaveOutcome {
    pub post_saved: bool,
    pub activity_saved: bool,
    follow_ups: Vec<Work>,
}

/// Archives fetched items for one account.
pub struct Archiver {
    account: AccountConfig,
    api: Arc<dyn MastodonApi>,
    store: Store,
    attachments: AttachmentResolver,
    expander: RecursiveExpander,
    json_dir: PathBuf,
    save_json: bool,
    fetch_reblogs: bool,
}

impl Archiver {
    pub fn new(
        cfg: &Config,
        account: AccountConfig,
        api: Arc<dyn MastodonApi>,
        media: Arc<dyn MediaSource>,
        store: Store,
    ) -> Self {
        Self {
            json_dir: cfg.data_dir().join("json").join(&account.safe),
            account,
            api,
            store,
            attachments: AttachmentResolver::new(cfg, media),
            expander: RecursiveExpander::new(cfg),
            save_json: cfg.prefs.save_json,
            fetch_reblogs: cfg.prefs.fetch_reblogs,
        }
    }

    pub fn account(&self) -> &AccountConfig {
        &self.account
    }

    pub fn api(&self) -> &dyn MastodonApi {
        self.api.as_ref()
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Saves `item` and, depth first, everything it leads to. Failures are
    /// logged per item and never stop the remaining work.
    pub async fn archive(&self, item: FetchedItem, chain: ChainLabel) -> usize {
        let mut saved = 0;
        let mut stack = vec![Work::Save(item, chain)];
        while let Some(work) = stack.pop() {
            match work {
                Work::Save(item, chain) => match self.save(&item, &chain).await {
                    Ok(outcome) => {
                        if outcome.post_saved || outcome.activity_saved {
                            saved += 1;
                        }
                        stack.extend(outcome.follow_ups.into_iter().rev());
                    }
                    Err(e) => error!(
                        "failed to save {} ({chain}) for {}: {e:#}",
                        item.source_id(),
                        self.account.text
                    ),
                },
                Work::Expand(expansion) => {
                    if let Some(next) = self.fetch_related(expansion).await {
                        stack.push(next);
                    }
                }
            }
        }
        saved
    }

    async fn fetch_related(&self, expansion: Expansion) -> Option<Work> {
        match expansion {
            Expansion::Parent { id, chain } => {
                info!("fetch_post_from_id ({chain}): {id} - account {}", self.account.text);
                let raw = match self.api.fetch_status(&id).await {
                    Ok(raw) => raw,
                    Err(e) => {
                        error!("  ERROR: {e}");
                        return None;
                    }
                };
                decode_status(raw).map(|item| Work::Save(item, chain))
            }
            Expansion::Link { url, chain } => {
                info!("fetch_post_by_url ({chain}): {url} - account {}", self.account.text);
                match self.api.search_post(&url).await {
                    Ok(Some(raw)) => decode_status(raw).map(|item| Work::Save(item, chain)),
                    Ok(None) => {
                        debug!("  no post found for {url}");
                        None
                    }
                    Err(e) => {
                        error!("  ERROR: {e}");
                        None
                    }
                }
            }
        }
    }

    /// Saves one item without following anything it leads to.
    pub async fn save(&self, item: &FetchedItem, chain: &ChainLabel) -> Result<SaveOutcome> {
        let kind = chain.to_string();
        info!(
            "save_fetched_data {} ({kind}) for {}",
            item.source_id(),
            self.account.text
        );
        let mut outcome = SaveOutcome::default();
        let Some(st) = item.status() else {
            warn!("  {} ({kind}) carries no status; skipping", item.source_id());
            return Ok(outcome);
        };

        if self.save_json && kind != REBLOG_KIND {
            if let Err(e) = self.write_json(item, chain) {
                error!("  failed to write provenance json: {e:#}");
            }
        }

        let post_uri = st.status.uri.clone();
        let save_activity = !self.store.has_activity(&self.account.handle, &post_uri, &kind)?;
        if !save_activity {
            info!("Activity {kind} by {} for {post_uri} is already archived; skipping.", self.account.handle);
        }

        let incoming_edit = st.status.edited_at.as_ref().map(format_timestamp);
        let save_post = match self.store.post_edited_at(&post_uri)? {
            None => true,
            Some(stored) if stored == incoming_edit => {
                info!("Post {post_uri} ({kind}) already archived with the same edited_at; skipping.");
                false
            }
            Some(stored) => {
                warn!(
                    "Post {post_uri} ({kind}) already archived with a different edited_at (this post: {:?}; db post: {stored:?}); updating.",
                    incoming_edit
                );
                true
            }
        };

        let mut expansions = Vec::new();
        if save_post {
            let Some((record, extracted)) = self.build_post(&st, &kind, &mut outcome).await? else {
                return Ok(outcome);
            };
            self.store.upsert_post(&record)?;
            outcome.post_saved = true;
            expansions = self.expander.expansions(
                chain,
                st.status.in_reply_to_id.as_deref(),
                &extracted.links,
            );
        }

        if save_activity {
            debug!(
                "Saving activity {}: {kind} by {} for {post_uri}",
                item.source_id(),
                self.account.handle
            );
            outcome.activity_saved = self.store.record_activity(
                &self.account.handle,
                &post_uri,
                &kind,
                item.source_id(),
            )?;
        }

        outcome
            .follow_ups
            .extend(expansions.into_iter().map(Work::Expand));
        Ok(outcome)
    }

    /// `None` for a pure reblog that is not to be kept.
    async fn build_post(
        &self,
        st: &RawStatus,
        kind: &str,
        outcome: &mut SaveOutcome,
    ) -> Result<Option<(PostRecord, extract::Extracted)>> {
        let status = &st.status;
        let extracted = extract::extract(status);

        let reblog = status
            .reblog
            .as_ref()
            .map(|r| r.uri.clone())
            .filter(|uri| !uri.is_empty());
        if reblog.is_some() {
            if self.fetch_reblogs {
                if let Some(inner) = st.reblogged() {
                    outcome
                        .follow_ups
                        .push(Work::Save(FetchedItem::Status(inner), ChainLabel::root(REBLOG_KIND)));
                }
            } else if extracted.text.is_empty()
                && status.media_attachments.is_empty()
                && extracted.poll_options.is_empty()
            {
                info!("Post {} ({kind}) is a pure reblog; not saved.", status.uri);
                return Ok(None);
            }
        }

        let attachments = self.attachments.resolve_all(&self.account, status).await;
        let author = status
            .account
            .profile_url()
            .map(|u| handle::handle(u, false))
            .unwrap_or_default();
        let json = serde_json::to_string(&st.raw).context("encode status json")?;

        let record = PostRecord {
            post_uri: status.uri.clone(),
            post_id: status.id.clone(),
            author,
            visibility: status.visibility.clone(),
            content: extracted.text.clone(),
            hashtags: extracted.hashtags.clone(),
            mentions: extracted.mentions.clone(),
            links: extracted.links.clone(),
            attachments,
            poll_options: extracted.poll_options.clone(),
            reblog,
            created_at: format_timestamp(&status.created_at),
            edited_at: status.edited_at.as_ref().map(format_timestamp),
            json,
        };
        Ok(Some((record, extracted)))
    }

    fn write_json(&self, item: &FetchedItem, chain: &ChainLabel) -> Result<PathBuf> {
        let created = item.created_at();
        let author = item
            .account()
            .and_then(|a| a.profile_url())
            .map(|u| handle::handle(u, true))
            .unwrap_or_else(|| "unknown".to_string());
        let path = self
            .json_dir
            .join(format!("{}s", chain.dir_name()))
            .join(created.year().to_string())
            .join(format!("{:02}", u8::from(created.month())))
            .join(format!("{author}_{}.json", item.source_id()));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let text = serde_json::to_string_pretty(item.raw())?;
        std::fs::write(&path, text).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

fn decode_status(raw: serde_json::Value) -> Option<FetchedItem> {
    match FetchedItem::status_from_value(raw) {
        Ok(item) => Some(item),
        Err(e) => {
            error!("  undecodable status: {e}");
            None
        }
    }
}
