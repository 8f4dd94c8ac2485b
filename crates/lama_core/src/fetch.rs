/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Incremental sweeps over the account's listings.
//!
//! Each sweep resumes from a boundary persisted by the previous run and walks
//! `prev` links until the newest page has been processed.

use crate::api::{NotificationKind, Page, FROM_START};
use crate::archive::Archiver;
use crate::config::Prefs;
use crate::error::ApiError;
use crate::expand::ChainLabel;
use anyhow::Result;
use lama_protocol::FetchedItem;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Post,
    Favourite,
    Bookmark,
    Mention,
    Poll,
}

impl ActivityKind {
    pub const ALL: [ActivityKind; 5] = [
        ActivityKind::Post,
        ActivityKind::Favourite,
        ActivityKind::Bookmark,
        ActivityKind::Mention,
        ActivityKind::Poll,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::Post => "post",
            ActivityKind::Favourite => "favourite",
            ActivityKind::Bookmark => "bookmark",
            ActivityKind::Mention => "mention",
            ActivityKind::Poll => "poll",
        }
    }

    /// Listings whose ids reflect the time the activity happened. Bookmark and
    /// favourite ids are those of the target posts, so those listings resume
    /// from an opaque cursor instead.
    pub fn is_id_ordered(self) -> bool {
        !matches!(self, ActivityKind::Favourite | ActivityKind::Bookmark)
    }

    fn notification(self) -> Option<NotificationKind> {
        match self {
            ActivityKind::Mention => Some(NotificationKind::Mention),
            ActivityKind::Poll => Some(NotificationKind::Poll),
            _ => None,
        }
    }

    /// State entry holding the resume cursor of cursor-ordered listings.
    pub fn cursor_state(self) -> Option<&'static str> {
        match self {
            ActivityKind::Favourite => Some("favourites_pagination_cursor"),
            ActivityKind::Bookmark => Some("bookmarks_pagination_cursor"),
            _ => None,
        }
    }

    /// Kinds enabled in `prefs`, in sweep order. Own posts are always swept.
    pub fn enabled(prefs: &Prefs) -> Vec<ActivityKind> {
        Self::ALL
            .into_iter()
            .filter(|kind| match kind {
                ActivityKind::Post => true,
                ActivityKind::Favourite => prefs.fetch_favourites,
                ActivityKind::Bookmark => prefs.fetch_bookmarks,
                ActivityKind::Mention => prefs.fetch_mentions,
                ActivityKind::Poll => prefs.fetch_polls,
            })
            .collect()
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub pages: usize,
    pub fetched: usize,
    pub skipped_no_content: usize,
    pub undecodable: usize,
    /// A request failed and the rest of the sweep was abandoned.
    pub aborted: bool,
}

pub struct FetchOrchestrator<'a> {
    archiver: &'a Archiver,
    fetch_limit: u32,
}

impl<'a> FetchOrchestrator<'a> {
    pub fn new(archiver: &'a Archiver, fetch_limit: u32) -> Self {
        Self {
            archiver,
            fetch_limit,
        }
    }

    /// Where the sweep of `kind` starts: the last archived activity id for
    /// id-ordered listings, the stored cursor otherwise.
    pub fn resume_point(&self, kind: ActivityKind) -> Result<String> {
        let store = self.archiver.store();
        let handle = &self.archiver.account().handle;
        let stored = match kind.cursor_state() {
            Some(state) => store.get_state(handle, state)?,
            None => store.last_activity_id(handle, kind.as_str())?,
        };
        Ok(stored.unwrap_or_else(|| FROM_START.to_string()))
    }

    async fn first_page(&self, kind: ActivityKind, min_id: &str) -> Result<Page, ApiError> {
        let api = self.archiver.api();
        match (kind, kind.notification()) {
            (_, Some(n)) => api.list_notifications(n, min_id, self.fetch_limit).await,
            (ActivityKind::Bookmark, _) => api.list_bookmarks(min_id, self.fetch_limit).await,
            (ActivityKind::Favourite, _) => api.list_favourites(min_id, self.fetch_limit).await,
            _ => api.list_own_statuses(min_id, self.fetch_limit).await,
        }
    }

    pub async fn sweep(&self, kind: ActivityKind) -> SweepReport {
        let account = self.archiver.account();
        let mut report = SweepReport::default();
        info!("fetch_posts ({kind}) - account {}", account.text);

        let start = match self.resume_point(kind) {
            Ok(start) => start,
            Err(e) => {
                error!("  cannot read resume point: {e:#}");
                report.aborted = true;
                return report;
            }
        };
        info!("  start_from: {start}");

        let mut page = match self.first_page(kind, &start).await {
            Ok(page) => page,
            Err(e) => {
                error!("  ERROR: {e}");
                report.aborted = true;
                return report;
            }
        };

        let mut cursor = None;
        while !page.is_empty() {
            report.pages += 1;
            info!("  page {}: {} item(s)", report.pages, page.items.len());
            if page.prev_cursor.is_some() {
                cursor = page.prev_cursor.clone();
            }
            // Pages come newest first; id-ordered listings are archived oldest
            // first so an interrupted sweep never skips anything on resume.
            let items: Vec<Value> = if kind.is_id_ordered() {
                page.items.iter().rev().cloned().collect()
            } else {
                page.items.clone()
            };
            for raw in items {
                self.process(kind, raw, &mut report).await;
            }

            page = match self.archiver.api().fetch_previous(&page).await {
                Ok(Some(next)) => next,
                Ok(None) => break,
                Err(e) => {
                    error!("  ERROR: {e}");
                    report.aborted = true;
                    break;
                }
            };
        }

        if let (Some(state), Some(cursor), false) = (kind.cursor_state(), cursor, report.aborted) {
            debug!("  saving {state} = {cursor}");
            if let Err(e) = self.archiver.store().set_state(&account.handle, state, &cursor) {
                error!("  cannot save {state}: {e:#}");
            }
        }

        if report.skipped_no_content > 0 {
            info!(
                "Done. {} {kind}(s) fetched. {} notification(s) skipped (no content).",
                report.fetched, report.skipped_no_content
            );
        } else {
            info!("Done. {} {kind}(s) fetched.", report.fetched);
        }
        report
    }

    async fn process(&self, kind: ActivityKind, raw: Value, report: &mut SweepReport) {
        let decoded = if kind.notification().is_some() {
            FetchedItem::notification_from_value(raw)
        } else {
            FetchedItem::status_from_value(raw)
        };
        let item = match decoded {
            Ok(item) => item,
            Err(e) => {
                error!("  undecodable {kind}: {e}");
                report.undecodable += 1;
                return;
            }
        };

        if item.status().is_none() {
            let author = item
                .account()
                .map(|a| a.acct.clone())
                .unwrap_or_default();
            warn!(
                "Post {} ({kind}) by {author} has no content (expired from the instance cache?); skipping.",
                item.source_id()
            );
            debug!("  {}", item.raw());
            report.skipped_no_content += 1;
            return;
        }

        self.archiver
            .archive(item, ChainLabel::root(kind.as_str()))
            .await;
        report.fetched += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attachments::MediaSource;
    use crate::store::Store;
    use crate::testkit::{notification_json, page, status_json, test_config, FakeApi, FakeMedia};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn archiver(dir: &TempDir, api: FakeApi) -> (Archiver, Arc<FakeApi>) {
        let cfg = test_config(dir, Prefs::default());
        let store = Store::open(cfg.db_path()).unwrap();
        let api = Arc::new(api);
        let media: Arc<dyn MediaSource> = Arc::new(FakeMedia);
        let archiver = Archiver::new(&cfg, cfg.accounts[0].clone(), api.clone(), media, store);
        (archiver, api)
    }

    const ME: &str = "me@example.social";

    #[test]
    fn kinds_follow_prefs() {
        let prefs = Prefs {
            fetch_bookmarks: false,
            fetch_polls: false,
            ..Prefs::default()
        };
        assert_eq!(
            ActivityKind::enabled(&prefs),
            vec![ActivityKind::Post, ActivityKind::Favourite, ActivityKind::Mention]
        );
        assert!(ActivityKind::Mention.is_id_ordered());
        assert!(!ActivityKind::Bookmark.is_id_ordered());
        assert_eq!(ActivityKind::Post.cursor_state(), None);
    }

    #[tokio::test]
    async fn resumes_from_last_activity_id() {
        let dir = TempDir::new().unwrap();
        let (a, api) = archiver(&dir, FakeApi::default());
        let orch = FetchOrchestrator::new(&a, 40);

        orch.sweep(ActivityKind::Post).await;
        let own = status_json("1000", "me", "example.social", "<p>x</p>");
        let item = FetchedItem::status_from_value(own).unwrap();
        assert!(a.save(&item, &ChainLabel::root("post")).await.unwrap().activity_saved);
        orch.sweep(ActivityKind::Post).await;
        assert_eq!(api.calls(), vec!["statuses min_id=0", "statuses min_id=1000"]);
    }

    #[tokio::test]
    async fn own_posts_are_archived_oldest_first() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.pages.insert(
            "statuses".into(),
            page(
                vec![
                    status_json("12", "me", "example.social", "<p>newest</p>"),
                    status_json("11", "me", "example.social", "<p>older</p>"),
                ],
                Some("12"),
            ),
        );
        api.pages.insert(
            "https://fake.example/prev?min_id=12".into(),
            page(vec![status_json("13", "me", "example.social", "<p>latest</p>")], Some("13")),
        );
        let (a, api) = archiver(&dir, api);
        let report = FetchOrchestrator::new(&a, 40).sweep(ActivityKind::Post).await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.pages, 2);
        assert!(!report.aborted);
        let ids: Vec<String> = a
            .store()
            .list_activities(ME)
            .unwrap()
            .into_iter()
            .map(|(uri, _)| uri.rsplit('/').next().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["11", "12", "13"]);
        assert_eq!(a.store().last_activity_id(ME, "post").unwrap().as_deref(), Some("13"));
        assert_eq!(
            api.calls(),
            vec![
                "statuses min_id=0",
                "prev https://fake.example/prev?min_id=12",
                "prev https://fake.example/prev?min_id=13",
            ]
        );
    }

    #[tokio::test]
    async fn bookmark_cursor_is_persisted() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.pages.insert(
            "bookmarks".into(),
            page(vec![status_json("5", "bob", "other.net", "<p>a</p>")], Some("777")),
        );
        let (a, api) = archiver(&dir, api);
        let orch = FetchOrchestrator::new(&a, 40);

        let report = orch.sweep(ActivityKind::Bookmark).await;
        assert_eq!(report.fetched, 1);
        assert_eq!(
            a.store().get_state(ME, "bookmarks_pagination_cursor").unwrap().as_deref(),
            Some("777")
        );
        orch.sweep(ActivityKind::Bookmark).await;
        assert_eq!(api.calls()[2], "bookmarks min_id=777");
    }

    #[tokio::test]
    async fn empty_sweep_keeps_cursor() {
        let dir = TempDir::new().unwrap();
        let (a, _api) = archiver(&dir, FakeApi::default());
        a.store()
            .set_state(ME, "favourites_pagination_cursor", "55")
            .unwrap();
        let report = FetchOrchestrator::new(&a, 40)
            .sweep(ActivityKind::Favourite)
            .await;
        assert_eq!(report, SweepReport::default());
        assert_eq!(
            a.store().get_state(ME, "favourites_pagination_cursor").unwrap().as_deref(),
            Some("55")
        );
    }

    #[tokio::test]
    async fn notifications_without_status_are_skipped() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.pages.insert(
            "mention".into(),
            page(
                vec![
                    notification_json("31", "mention", None),
                    notification_json(
                        "30",
                        "mention",
                        Some(status_json("8", "bob", "other.net", "<p>hey @me</p>")),
                    ),
                ],
                None,
            ),
        );
        let (a, _api) = archiver(&dir, api);
        let report = FetchOrchestrator::new(&a, 40)
            .sweep(ActivityKind::Mention)
            .await;
        assert_eq!(report.fetched, 1);
        assert_eq!(report.skipped_no_content, 1);
        assert_eq!(a.store().last_activity_id(ME, "mention").unwrap().as_deref(), Some("30"));
    }

    #[tokio::test]
    async fn failed_page_aborts_without_moving_cursor() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.pages.insert(
            "favourites".into(),
            page(vec![status_json("5", "bob", "other.net", "<p>a</p>")], Some("900")),
        );
        api.failing
            .insert("https://fake.example/prev?min_id=900".into());
        let (a, _api) = archiver(&dir, api);
        let report = FetchOrchestrator::new(&a, 40)
            .sweep(ActivityKind::Favourite)
            .await;
        assert!(report.aborted);
        assert_eq!(report.fetched, 1);
        assert_eq!(a.store().get_state(ME, "favourites_pagination_cursor").unwrap(), None);
    }

    #[tokio::test]
    async fn failed_listing_aborts_sweep() {
        let dir = TempDir::new().unwrap();
        let mut api = FakeApi::default();
        api.failing.insert("poll".into());
        let (a, _api) = archiver(&dir, api);
        let report = FetchOrchestrator::new(&a, 40).sweep(ActivityKind::Poll).await;
        assert!(report.aborted);
        assert_eq!(report.pages, 0);
    }
}
