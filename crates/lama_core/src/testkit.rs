/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! In-memory stand-ins for the remote server, shared by unit tests.

use crate::api::{MastodonApi, NotificationKind, Page};
use crate::attachments::{Download, MediaSource};
use crate::config::{AccountEntry, Config, Prefs};
use crate::error::ApiError;
use async_trait::async_trait;
use lama_protocol::Account;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tempfile::TempDir;

/// Config for the single account `me@example.social`, rooted in `dir`.
pub fn test_config(dir: &TempDir, mut prefs: Prefs) -> Config {
    prefs.accounts = vec![AccountEntry {
        username: "me".to_string(),
        instance: "https://example.social".to_string(),
    }];
    Config::new(prefs, dir.path().to_path_buf())
}

pub fn status_json(id: &str, username: &str, host: &str, content: &str) -> Value {
    json!({
        "id": id,
        "uri": format!("https://{host}/users/{username}/statuses/{id}"),
        "url": format!("https://{host}/@{username}/{id}"),
        "account": {
            "id": format!("acct-{username}"),
            "username": username,
            "acct": username,
            "url": format!("https://{host}/@{username}"),
            "uri": format!("https://{host}/users/{username}")
        },
        "in_reply_to_id": null,
        "reblog": null,
        "content": content,
        "visibility": "public",
        "created_at": "2024-03-05T10:00:00.000Z",
        "edited_at": null,
        "custom_field": {"kept": true}
    })
}

pub fn notification_json(id: &str, kind: &str, status: Option<Value>) -> Value {
    json!({
        "id": id,
        "type": kind,
        "created_at": "2024-03-06T10:00:00.000Z",
        "account": {
            "id": "acct-bob",
            "username": "bob",
            "url": "https://other.net/@bob"
        },
        "status": status
    })
}

/// A page whose `prev` link resumes after `prev_cursor`.
pub fn page(items: Vec<Value>, prev_cursor: Option<&str>) -> Page {
    Page {
        items,
        prev_url: prev_cursor.map(|c| format!("https://fake.example/prev?min_id={c}")),
        prev_cursor: prev_cursor.map(str::to_string),
    }
}

#[derive(Default)]
pub struct FakeApi {
    pub username: String,
    /// Statuses served by id.
    pub statuses: HashMap<String, Value>,
    /// Search hits by URL.
    pub search: HashMap<String, Value>,
    /// First page of a listing under its name, later pages under their `prev_url`.
    pub pages: HashMap<String, Page>,
    /// Listing names or URLs answered with an HTTP error.
    pub failing: HashSet<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    /// Server whose credentials belong to `username`.
    pub fn with_username(username: &str) -> Self {
        Self {
            username: username.to_string(),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn fail_if(&self, key: &str) -> Result<(), ApiError> {
        if self.failing.contains(key) {
            return Err(ApiError::Http {
                status: 503,
                reason: "Service Unavailable".into(),
                url: key.to_string(),
            });
        }
        Ok(())
    }

    fn listing(&self, name: &str, min_id: &str) -> Result<Page, ApiError> {
        self.record(format!("{name} min_id={min_id}"));
        self.fail_if(name)?;
        Ok(self.pages.get(name).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl MastodonApi for FakeApi {
    async fn verify_credentials(&self) -> Result<Account, ApiError> {
        self.record("verify_credentials".to_string());
        self.fail_if("verify_credentials")?;
        Ok(serde_json::from_value(json!({
            "id": "acct-me",
            "username": self.username,
        }))?)
    }

    async fn fetch_status(&self, id: &str) -> Result<Value, ApiError> {
        self.record(format!("status {id}"));
        self.statuses.get(id).cloned().ok_or_else(|| ApiError::Http {
            status: 404,
            reason: "Not Found".into(),
            url: format!("/api/v1/statuses/{id}"),
        })
    }

    async fn search_post(&self, url: &str) -> Result<Option<Value>, ApiError> {
        self.record(format!("search {url}"));
        Ok(self.search.get(url).cloned())
    }

    async fn list_notifications(
        &self,
        kind: NotificationKind,
        min_id: &str,
        _limit: u32,
    ) -> Result<Page, ApiError> {
        self.listing(kind.as_str(), min_id)
    }

    async fn list_bookmarks(&self, min_id: &str, _limit: u32) -> Result<Page, ApiError> {
        self.listing("bookmarks", min_id)
    }

    async fn list_favourites(&self, min_id: &str, _limit: u32) -> Result<Page, ApiError> {
        self.listing("favourites", min_id)
    }

    async fn list_own_statuses(&self, min_id: &str, _limit: u32) -> Result<Page, ApiError> {
        self.listing("statuses", min_id)
    }

    async fn fetch_previous(&self, page: &Page) -> Result<Option<Page>, ApiError> {
        let Some(url) = page.prev_url.as_deref() else {
            return Ok(None);
        };
        self.record(format!("prev {url}"));
        self.fail_if(url)?;
        Ok(Some(self.pages.get(url).cloned().unwrap_or_default()))
    }
}

/// Media server where every download fails.
#[derive(Default)]
pub struct FakeMedia;

#[async_trait]
impl MediaSource for FakeMedia {
    async fn download(&self, url: &str) -> Result<Download, ApiError> {
        Err(ApiError::Http {
            status: 404,
            reason: "Not Found".into(),
            url: url.to_string(),
        })
    }
}
