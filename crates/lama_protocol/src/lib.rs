/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Account {
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub acct: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
}

impl Account {
    /// Web profile URL, falling back to the ActivityPub URI.
    pub fn profile_url(&self) -> Option<&str> {
        self.url.as_deref().or(self.uri.as_deref())
    }

    /// ActivityPub URI, falling back to the web profile URL.
    pub fn profile_uri(&self) -> Option<&str> {
        self.uri.as_deref().or(self.url.as_deref())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Tag {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Mention {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub username: String,
    /// Short handle; ambiguous for accounts on the viewer's own instance.
    #[serde(default)]
    pub acct: String,
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct MediaAttachment {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub remote_url: Option<String>,
    #[serde(default)]
    pub preview_url: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PollOption {
    pub title: String,
    #[serde(default)]
    pub votes_count: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Poll {
    pub id: String,
    #[serde(default)]
    pub options: Vec<PollOption>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Status {
    pub id: String,
    pub uri: String,
    #[serde(default)]
    pub url: Option<String>,
    pub account: Account,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub visibility: Option<String>,
    #[serde(default)]
    pub tags: Vec<Tag>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub media_attachments: Vec<MediaAttachment>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub edited_at: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub status: Option<Status>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Application {
    #[serde(default)]
    pub name: String,
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default)]
    pub scope: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SearchResults {
    #[serde(default)]
    pub statuses: Vec<Value>,
}

/// A status as returned by the API, together with the untouched JSON it was
/// decoded from.
#[derive(Debug, Clone)]
pub struct RawStatus {
    pub status: Status,
    pub raw: Value,
}

impl RawStatus {
    pub fn from_value(raw: Value) -> serde_json::Result<Self> {
        let status = serde_json::from_value(raw.clone())?;
        Ok(Self { status, raw })
    }

    /// The embedded reblogged status, if any, with its own raw payload.
    pub fn reblogged(&self) -> Option<RawStatus> {
        let status = self.status.reblog.as_deref()?.clone();
        let raw = self.raw.get("reblog").cloned().unwrap_or(Value::Null);
        Some(RawStatus { status, raw })
    }
}

/// One item of a fetched page. Notifications wrap the status they refer to;
/// everything else is the status itself.
#[derive(Debug, Clone)]
pub enum FetchedItem {
    Status(RawStatus),
    Notification {
        notification: Notification,
        raw: Value,
    },
}

impl FetchedItem {
    pub fn status_from_value(raw: Value) -> serde_json::Result<Self> {
        RawStatus::from_value(raw).map(FetchedItem::Status)
    }

    pub fn notification_from_value(raw: Value) -> serde_json::Result<Self> {
        let notification = serde_json::from_value(raw.clone())?;
        Ok(FetchedItem::Notification { notification, raw })
    }

    /// Id of the record on the source side: the notification id for
    /// notifications, the status id otherwise.
    pub fn source_id(&self) -> &str {
        match self {
            FetchedItem::Status(s) => &s.status.id,
            FetchedItem::Notification { notification, .. } => &notification.id,
        }
    }

    /// The wrapped status, `None` when a notification lost its content upstream.
    pub fn status(&self) -> Option<RawStatus> {
        match self {
            FetchedItem::Status(s) => Some(s.clone()),
            FetchedItem::Notification { notification, raw } => {
                let status = notification.status.clone()?;
                let raw = raw.get("status").cloned().unwrap_or(Value::Null);
                Some(RawStatus { status, raw })
            }
        }
    }

    /// Full record as fetched, for provenance files.
    pub fn raw(&self) -> &Value {
        match self {
            FetchedItem::Status(s) => &s.raw,
            FetchedItem::Notification { raw, .. } => raw,
        }
    }

    pub fn created_at(&self) -> OffsetDateTime {
        match self {
            FetchedItem::Status(s) => s.status.created_at,
            FetchedItem::Notification { notification, .. } => notification.created_at,
        }
    }

    /// Account attached to the record: the author for statuses, the notifying
    /// account for notifications.
    pub fn account(&self) -> Option<&Account> {
        match self {
            FetchedItem::Status(s) => Some(&s.status.account),
            FetchedItem::Notification { notification, .. } => notification.account.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn status_json(id: &str) -> Value {
        json!({
            "id": id,
            "uri": format!("https://example.social/users/alice/statuses/{id}"),
            "url": format!("https://example.social/@alice/{id}"),
            "account": {
                "id": "1",
                "username": "alice",
                "acct": "alice",
                "url": "https://example.social/@alice",
                "uri": "https://example.social/users/alice"
            },
            "content": "<p>hello</p>",
            "created_at": "2024-03-05T10:00:00.000Z",
            "edited_at": null,
            "custom_field": {"kept": true}
        })
    }

    #[test]
    fn status_keeps_raw_payload() {
        let item = FetchedItem::status_from_value(status_json("42")).unwrap();
        assert_eq!(item.source_id(), "42");
        assert_eq!(item.raw()["custom_field"]["kept"], json!(true));
        let st = item.status().unwrap();
        assert_eq!(st.status.account.username, "alice");
        assert!(st.status.edited_at.is_none());
        assert!(st.status.tags.is_empty());
    }

    #[test]
    fn notification_unwraps_status() {
        let raw = json!({
            "id": "900",
            "type": "mention",
            "created_at": "2024-03-06T10:00:00Z",
            "account": {"id": "2", "username": "bob", "url": "https://other.example/@bob"},
            "status": status_json("43")
        });
        let item = FetchedItem::notification_from_value(raw).unwrap();
        assert_eq!(item.source_id(), "900");
        let st = item.status().unwrap();
        assert_eq!(st.status.id, "43");
        assert_eq!(st.raw["id"], json!("43"));
        assert_eq!(item.account().unwrap().username, "bob");
    }

    #[test]
    fn notification_without_status() {
        let raw = json!({
            "id": "901",
            "type": "poll",
            "created_at": "2024-03-06T10:00:00Z",
            "status": null
        });
        let item = FetchedItem::notification_from_value(raw).unwrap();
        assert!(item.status().is_none());
        assert!(item.account().is_none());
    }

    #[test]
    fn reblogged_carries_nested_raw() {
        let mut outer = status_json("50");
        outer["content"] = json!("");
        outer["reblog"] = status_json("44");
        let st = RawStatus::from_value(outer).unwrap();
        let inner = st.reblogged().unwrap();
        assert_eq!(inner.status.id, "44");
        assert_eq!(inner.raw["custom_field"]["kept"], json!(true));
    }
}
