/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Remote Mastodon API consumed by the archiver.
//!
//! Calls are never retried: a failure aborts the enclosing sweep and the next
//! scheduled run picks up from the persisted cursors.

use crate::error::ApiError;
use async_trait::async_trait;
use lama_protocol::{Account, SearchResults};
use reqwest::header::{HeaderMap, LINK};
use reqwest::Url;
use serde_json::Value;
use std::path::Path;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind {
    Mention,
    Poll,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::Mention => "mention",
            NotificationKind::Poll => "poll",
        }
    }
}

/// One page of a paginated listing, newest item first.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Value>,
    /// Link to the page of newer items (`rel="prev"`).
    pub prev_url: Option<String>,
    /// `min_id` of that link: the boundary to resume from on the next run.
    pub prev_cursor: Option<String>,
}

impl Page {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// `min_id` value meaning "from the oldest item".
pub const FROM_START: &str = "0";

#[async_trait]
pub trait MastodonApi: Send + Sync {
    async fn verify_credentials(&self) -> Result<Account, ApiError>;
    async fn fetch_status(&self, id: &str) -> Result<Value, ApiError>;
    /// First status found when resolving `url`, if any.
    async fn search_post(&self, url: &str) -> Result<Option<Value>, ApiError>;
    async fn list_notifications(
        &self,
        kind: NotificationKind,
        min_id: &str,
        limit: u32,
    ) -> Result<Page, ApiError>;
    async fn list_bookmarks(&self, min_id: &str, limit: u32) -> Result<Page, ApiError>;
    async fn list_favourites(&self, min_id: &str, limit: u32) -> Result<Page, ApiError>;
    async fn list_own_statuses(&self, min_id: &str, limit: u32) -> Result<Page, ApiError>;
    /// The page of items newer than `page`, `None` when there is no such link.
    async fn fetch_previous(&self, page: &Page) -> Result<Option<Page>, ApiError>;
}

/// Access token as written by `lama init`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct UserCredential {
    pub access_token: String,
    pub api_base_url: String,
}

impl UserCredential {
    pub fn load(path: &Path) -> Result<Self, ApiError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| ApiError::Credentials(format!("read {}: {e}", path.display())))?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::Credentials(format!("parse {}: {e}", path.display())))
    }
}

pub struct HttpMastodonClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
    own_id: OnceLock<String>,
}

impl HttpMastodonClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("LAMA/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            own_id: OnceLock::new(),
        })
    }

    pub fn from_credential(cred: &UserCredential) -> Result<Self, ApiError> {
        Self::new(&cred.api_base_url, &cred.access_token)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get(&self, url: &str, query: &[(&str, String)]) -> Result<reqwest::Response, ApiError> {
        let resp = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .query(query)
            .send()
            .await?;
        log_rate_limit(resp.headers());
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::http(status, url));
        }
        Ok(resp)
    }

    async fn get_page(&self, url: &str, query: &[(&str, String)]) -> Result<Page, ApiError> {
        let resp = self.get(url, query).await?;
        let prev = resp
            .headers()
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_prev_link);
        let items: Vec<Value> = resp.json().await?;
        let (prev_url, prev_cursor) = match prev {
            Some((url, cursor)) => (Some(url), cursor),
            None => (None, None),
        };
        Ok(Page {
            items,
            prev_url,
            prev_cursor,
        })
    }

    async fn own_account_id(&self) -> Result<String, ApiError> {
        if let Some(id) = self.own_id.get() {
            return Ok(id.clone());
        }
        let me = self.verify_credentials().await?;
        Ok(me.id)
    }
}

fn paging(min_id: &str, limit: u32) -> Vec<(&'static str, String)> {
    vec![("min_id", min_id.to_string()), ("limit", limit.to_string())]
}

#[async_trait]
impl MastodonApi for HttpMastodonClient {
    async fn verify_credentials(&self) -> Result<Account, ApiError> {
        let url = self.endpoint("/api/v1/accounts/verify_credentials");
        let me: Account = self.get(&url, &[]).await?.json().await?;
        let _ = self.own_id.set(me.id.clone());
        Ok(me)
    }

    async fn fetch_status(&self, id: &str) -> Result<Value, ApiError> {
        let url = self.endpoint(&format!("/api/v1/statuses/{id}"));
        Ok(self.get(&url, &[]).await?.json().await?)
    }

    async fn search_post(&self, post_url: &str) -> Result<Option<Value>, ApiError> {
        let url = self.endpoint("/api/v2/search");
        let query = [
            ("q", post_url.to_string()),
            ("type", "statuses".to_string()),
            ("resolve", "true".to_string()),
        ];
        let results: SearchResults = self.get(&url, &query).await?.json().await?;
        Ok(results.statuses.into_iter().next())
    }

    async fn list_notifications(
        &self,
        kind: NotificationKind,
        min_id: &str,
        limit: u32,
    ) -> Result<Page, ApiError> {
        let url = self.endpoint("/api/v1/notifications");
        let mut query = paging(min_id, limit);
        query.push(("types[]", kind.as_str().to_string()));
        self.get_page(&url, &query).await
    }

    async fn list_bookmarks(&self, min_id: &str, limit: u32) -> Result<Page, ApiError> {
        let url = self.endpoint("/api/v1/bookmarks");
        self.get_page(&url, &paging(min_id, limit)).await
    }

    async fn list_favourites(&self, min_id: &str, limit: u32) -> Result<Page, ApiError> {
        let url = self.endpoint("/api/v1/favourites");
        self.get_page(&url, &paging(min_id, limit)).await
    }

    async fn list_own_statuses(&self, min_id: &str, limit: u32) -> Result<Page, ApiError> {
        let id = self.own_account_id().await?;
        let url = self.endpoint(&format!("/api/v1/accounts/{id}/statuses"));
        self.get_page(&url, &paging(min_id, limit)).await
    }

    async fn fetch_previous(&self, page: &Page) -> Result<Option<Page>, ApiError> {
        let Some(prev) = page.prev_url.as_deref() else {
            return Ok(None);
        };
        self.get_page(prev, &[]).await.map(Some)
    }
}

/// `rel="prev"` target of a `Link` header, with its `min_id` boundary.
pub fn parse_prev_link(header: &str) -> Option<(String, Option<String>)> {
    for part in header.split(',') {
        let mut fields = part.split(';');
        let target = fields.next()?.trim();
        let is_prev = fields.any(|f| {
            let f = f.trim();
            f == r#"rel="prev""# || f == "rel=prev"
        });
        if !is_prev {
            continue;
        }
        let url = target.trim_start_matches('<').trim_end_matches('>').to_string();
        let cursor = Url::parse(&url).ok().and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "min_id" || k == "since_id")
                .map(|(_, v)| v.into_owned())
        });
        return Some((url, cursor));
    }
    None
}

fn log_rate_limit(headers: &HeaderMap) {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    debug!(
        limit = %get("x-ratelimit-limit"),
        remaining = %get("x-ratelimit-remaining"),
        reset = %get("x-ratelimit-reset"),
        "rate limit"
    );
}
