/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::attachments::AttachmentRecord;
use crate::config::{APP_NAME, APP_VERSION};
use crate::extract::Link;
use anyhow::{Context, Result};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Relational archive. Every operation opens its own short-lived connection,
/// so nothing stays locked across network calls.
#[derive(Clone)]
pub struct Store {
    path: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PostRecord {
    pub post_uri: String,
    pub post_id: String,
    pub author: String,
    pub visibility: Option<String>,
    pub content: String,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub links: Vec<Link>,
    pub attachments: Vec<AttachmentRecord>,
    pub poll_options: Vec<String>,
    pub reblog: Option<String>,
    pub created_at: String,
    pub edited_at: Option<String>,
    pub json: String,
}

const TIMESTAMP: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

/// Canonical text form of API timestamps, so stored and incoming values compare equal.
pub fn format_timestamp(ts: &OffsetDateTime) -> String {
    ts.to_offset(UtcOffset::UTC)
        .format(TIMESTAMP)
        .unwrap_or_default()
}

impl Store {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create db dir: {}", parent.display()))?;
        }
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS posts (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              post_uri TEXT UNIQUE NOT NULL,
              post_id INTEGER NOT NULL,
              author TEXT,
              visibility TEXT,
              content TEXT,
              hashtags TEXT,
              mentions TEXT,
              links TEXT,
              attachments TEXT,
              poll_options TEXT,
              reblog TEXT,
              created_at TEXT,
              edited_at TEXT,
              fetched_at TEXT NOT NULL DEFAULT (datetime('now','localtime')),
              json TEXT NOT NULL,
              note TEXT DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS activities (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              account TEXT NOT NULL,
              post_uri TEXT NOT NULL,
              activity_type TEXT NOT NULL,
              activity_id INTEGER NOT NULL,
              archived_at TEXT NOT NULL DEFAULT (datetime('now','localtime')),
              FOREIGN KEY (post_uri) REFERENCES posts(post_uri),
              UNIQUE(account, post_uri, activity_type)
            );
            CREATE INDEX IF NOT EXISTS idx_activities_resume
              ON activities(account, activity_type, archived_at DESC);

            CREATE TABLE IF NOT EXISTS states (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              account TEXT NOT NULL,
              name TEXT NOT NULL,
              value TEXT NOT NULL,
              UNIQUE(account, name)
            );
            "#,
        )?;
        let store = Self { path };
        store.set_state(APP_NAME, "app_version", APP_VERSION)?;
        Ok(store)
    }

    /// Inserts the post, or replaces the stored row when `edited_at` differs.
    /// Returns whether a row was written. Row id and `note` survive updates.
    pub fn upsert_post(&self, post: &PostRecord) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let changed = conn.execute(
            r#"
            INSERT INTO posts(post_uri, post_id, author, visibility, content, hashtags, mentions,
                              links, attachments, poll_options, reblog, created_at, edited_at, json)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            ON CONFLICT(post_uri) DO UPDATE SET
              post_id=excluded.post_id,
              author=excluded.author,
              visibility=excluded.visibility,
              content=excluded.content,
              hashtags=excluded.hashtags,
              mentions=excluded.mentions,
              links=excluded.links,
              attachments=excluded.attachments,
              poll_options=excluded.poll_options,
              reblog=excluded.reblog,
              created_at=excluded.created_at,
              edited_at=excluded.edited_at,
              fetched_at=datetime('now','localtime'),
              json=excluded.json
            WHERE posts.edited_at IS NOT excluded.edited_at
            "#,
            params![
                post.post_uri,
                id_value(&post.post_id),
                post.author,
                post.visibility,
                post.content,
                json_list(&post.hashtags)?,
                json_list(&post.mentions)?,
                json_list(&post.links)?,
                json_list(&post.attachments)?,
                json_list(&post.poll_options)?,
                post.reblog,
                post.created_at,
                post.edited_at,
                post.json,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Records that `account` saw `post_uri` as `kind`. Returns false when the
    /// activity was already archived.
    pub fn record_activity(
        &self,
        account: &str,
        post_uri: &str,
        kind: &str,
        source_id: &str,
    ) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO activities(account, post_uri, activity_type, activity_id) VALUES (?1, ?2, ?3, ?4)",
            params![account, post_uri, kind, id_value(source_id)],
        )?;
        Ok(inserted > 0)
    }

    /// Source-side id of the most recently archived activity of `kind`.
    pub fn last_activity_id(&self, account: &str, kind: &str) -> Result<Option<String>> {
        let conn = Connection::open(&self.path)?;
        let id = conn
            .query_row(
                r#"
                SELECT activity_id FROM activities
                WHERE account=?1 AND activity_type=?2
                ORDER BY archived_at DESC, id DESC
                LIMIT 1
                "#,
                params![account, kind],
                |r| Ok(value_string(r.get_ref(0)?)),
            )
            .optional()?
            .flatten();
        Ok(id.filter(|v| !v.is_empty() && v != "0"))
    }

    /// `None` when the post is not archived, `Some(edited_at)` otherwise.
    pub fn post_edited_at(&self, post_uri: &str) -> Result<Option<Option<String>>> {
        let conn = Connection::open(&self.path)?;
        conn.query_row(
            "SELECT edited_at FROM posts WHERE post_uri=?1",
            params![post_uri],
            |r| r.get::<_, Option<String>>(0),
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn has_activity(&self, account: &str, post_uri: &str, kind: &str) -> Result<bool> {
        let conn = Connection::open(&self.path)?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT id FROM activities WHERE account=?1 AND post_uri=?2 AND activity_type=?3",
                params![account, post_uri, kind],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_state(&self, account: &str, name: &str) -> Result<Option<String>> {
        let conn = Connection::open(&self.path)?;
        let v: Option<String> = conn
            .query_row(
                "SELECT value FROM states WHERE account=?1 AND name=?2",
                params![account, name],
                |r| Ok(value_string(r.get_ref(0)?)),
            )
            .optional()?
            .flatten();
        Ok(v.filter(|s| !s.is_empty()))
    }

    pub fn set_state(&self, account: &str, name: &str, value: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "INSERT INTO states(account, name, value) VALUES (?1, ?2, ?3)\n             ON CONFLICT(account, name) DO UPDATE SET value=excluded.value",
            params![account, name, value],
        )?;
        Ok(())
    }

    pub fn get_post(&self, post_uri: &str) -> Result<Option<PostRecord>> {
        let conn = Connection::open(&self.path)?;
        let row = conn
            .query_row(
                r#"
                SELECT post_uri, post_id, author, visibility, content, hashtags, mentions, links,
                       attachments, poll_options, reblog, created_at, edited_at, json
                FROM posts WHERE post_uri=?1
                "#,
                params![post_uri],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        value_string(r.get_ref(1)?).unwrap_or_default(),
                        r.get::<_, Option<String>>(2)?,
                        r.get::<_, Option<String>>(3)?,
                        r.get::<_, Option<String>>(4)?,
                        [
                            r.get::<_, Option<String>>(5)?,
                            r.get::<_, Option<String>>(6)?,
                            r.get::<_, Option<String>>(7)?,
                            r.get::<_, Option<String>>(8)?,
                            r.get::<_, Option<String>>(9)?,
                        ],
                        r.get::<_, Option<String>>(10)?,
                        r.get::<_, Option<String>>(11)?,
                        r.get::<_, Option<String>>(12)?,
                        r.get::<_, String>(13)?,
                    ))
                },
            )
            .optional()?;
        let Some((post_uri, post_id, author, visibility, content, lists, reblog, created_at, edited_at, json)) = row
        else {
            return Ok(None);
        };
        let [hashtags, mentions, links, attachments, poll_options] = lists;
        Ok(Some(PostRecord {
            post_uri,
            post_id,
            author: author.unwrap_or_default(),
            visibility,
            content: content.unwrap_or_default(),
            hashtags: parse_list(hashtags)?,
            mentions: parse_list(mentions)?,
            links: parse_list(links)?,
            attachments: parse_list(attachments)?,
            poll_options: parse_list(poll_options)?,
            reblog,
            created_at: created_at.unwrap_or_default(),
            edited_at,
            json,
        }))
    }

    pub fn set_post_note(&self, post_uri: &str, note: &str) -> Result<()> {
        let conn = Connection::open(&self.path)?;
        conn.execute(
            "UPDATE posts SET note=?2 WHERE post_uri=?1",
            params![post_uri, note],
        )?;
        Ok(())
    }

    pub fn get_post_note(&self, post_uri: &str) -> Result<Option<String>> {
        let conn = Connection::open(&self.path)?;
        let note: Option<Option<String>> = conn
            .query_row(
                "SELECT note FROM posts WHERE post_uri=?1",
                params![post_uri],
                |r| r.get(0),
            )
            .optional()?;
        Ok(note.flatten())
    }

    pub fn count_posts(&self) -> Result<u64> {
        let conn = Connection::open(&self.path)?;
        let total: u64 = conn.query_row("SELECT COUNT(*) FROM posts", [], |r| r.get(0))?;
        Ok(total)
    }

    /// `(post_uri, kind)` pairs archived for `account`, oldest first.
    pub fn list_activities(&self, account: &str) -> Result<Vec<(String, String)>> {
        let conn = Connection::open(&self.path)?;
        let mut stmt = conn.prepare(
            "SELECT post_uri, activity_type FROM activities WHERE account=?1 ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![account], |r| Ok((r.get(0)?, r.get(1)?)))?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r?);
        }
        Ok(out)
    }
}

/// Numeric ids are stored as integers, anything else (non-Mastodon servers) as text.
fn id_value(id: &str) -> Value {
    id.parse::<i64>()
        .map(Value::Integer)
        .unwrap_or_else(|_| Value::Text(id.to_string()))
}

fn value_string(v: ValueRef<'_>) -> Option<String> {
    match v {
        ValueRef::Null => None,
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
        ValueRef::Text(t) | ValueRef::Blob(t) => Some(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Empty lists are stored as NULL.
fn json_list<T: Serialize>(items: &[T]) -> Result<Option<String>> {
    if items.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::to_string(items)?))
}

fn parse_list<T: DeserializeOwned>(v: Option<String>) -> Result<Vec<T>> {
    match v {
        Some(s) if !s.is_empty() => serde_json::from_str(&s).context("decode stored list"),
        _ => Ok(Vec::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store() -> (TempDir, Store) {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("data").join("app.db")).unwrap();
        (dir, store)
    }

    fn post(uri: &str, edited_at: Option<&str>) -> PostRecord {
        PostRecord {
            post_uri: uri.to_string(),
            post_id: "1001".to_string(),
            author: "alice@example.social".to_string(),
            visibility: Some("public".to_string()),
            content: "hello".to_string(),
            hashtags: vec!["rust".to_string()],
            mentions: Vec::new(),
            links: vec![Link {
                url: "https://example.social/@bob/12".to_string(),
                text: String::new(),
                mastodon: true,
            }],
            attachments: vec![AttachmentRecord::saved("media/a.png", "a cat")],
            poll_options: Vec::new(),
            reblog: None,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            edited_at: edited_at.map(str::to_string),
            json: "{}".to_string(),
        }
    }

    #[test]
    fn upsert_is_noop_for_same_edit() {
        let (_dir, store) = store();
        let p = post("https://example.social/s/1", None);
        assert!(store.upsert_post(&p).unwrap());
        let mut again = p.clone();
        again.content = "changed but not edited".to_string();
        assert!(!store.upsert_post(&again).unwrap());
        assert_eq!(store.get_post(&p.post_uri).unwrap().unwrap(), p);
        assert_eq!(store.count_posts().unwrap(), 1);
    }

    #[test]
    fn upsert_replaces_on_edit_and_keeps_note() {
        let (_dir, store) = store();
        let p = post("https://example.social/s/1", None);
        store.upsert_post(&p).unwrap();
        store.set_post_note(&p.post_uri, "keep me").unwrap();

        let mut edited = post("https://example.social/s/1", Some("2024-02-01T00:00:00.000Z"));
        edited.content = "hello, edited".to_string();
        assert!(store.upsert_post(&edited).unwrap());

        let got = store.get_post(&p.post_uri).unwrap().unwrap();
        assert_eq!(got.content, "hello, edited");
        assert_eq!(
            store.post_edited_at(&p.post_uri).unwrap(),
            Some(Some("2024-02-01T00:00:00.000Z".to_string()))
        );
        assert_eq!(store.get_post_note(&p.post_uri).unwrap().as_deref(), Some("keep me"));
        assert_eq!(store.count_posts().unwrap(), 1);
    }

    #[test]
    fn edited_at_lookup_distinguishes_absent_and_null() {
        let (_dir, store) = store();
        assert_eq!(store.post_edited_at("https://nowhere/1").unwrap(), None);
        store.upsert_post(&post("https://example.social/s/1", None)).unwrap();
        assert_eq!(store.post_edited_at("https://example.social/s/1").unwrap(), Some(None));
    }

    /// Archives the post at `uri` and records one activity on it.
    fn observe(store: &Store, account: &str, uri: &str, kind: &str, id: &str) -> bool {
        store.upsert_post(&post(uri, None)).unwrap();
        store.record_activity(account, uri, kind, id).unwrap()
    }

    #[test]
    fn activity_requires_archived_post() {
        let (_dir, store) = store();
        assert!(store
            .record_activity("me@example.social", "https://example.social/s/9", "post", "9")
            .is_err());
        assert!(store.list_activities("me@example.social").unwrap().is_empty());
    }

    #[test]
    fn activities_are_idempotent() {
        let (_dir, store) = store();
        let uri = "https://example.social/s/1";
        assert!(observe(&store, "me@example.social", uri, "bookmark", "77"));
        assert!(!observe(&store, "me@example.social", uri, "bookmark", "77"));
        assert!(observe(&store, "me@example.social", uri, "favourite", "77"));
        assert!(store.has_activity("me@example.social", uri, "bookmark").unwrap());
        assert!(!store.has_activity("me@example.social", uri, "mention").unwrap());
        assert_eq!(store.list_activities("me@example.social").unwrap().len(), 2);
    }

    #[test]
    fn last_activity_id_is_most_recent() {
        let (_dir, store) = store();
        let me = "me@example.social";
        assert_eq!(store.last_activity_id(me, "post").unwrap(), None);
        observe(&store, me, "https://e/s/1", "post", "999");
        observe(&store, me, "https://e/s/2", "post", "1000");
        observe(&store, me, "https://e/s/3", "mention", "5");
        assert_eq!(store.last_activity_id(me, "post").unwrap().as_deref(), Some("1000"));
        assert_eq!(store.last_activity_id(me, "mention").unwrap().as_deref(), Some("5"));
        assert_eq!(store.last_activity_id("other@x", "post").unwrap(), None);
    }

    #[test]
    fn non_numeric_ids_round_trip() {
        let (_dir, store) = store();
        observe(&store, "me@x", "https://e/s/1", "post", "AbC123");
        assert_eq!(store.last_activity_id("me@x", "post").unwrap().as_deref(), Some("AbC123"));
    }

    #[test]
    fn state_is_single_valued() {
        let (_dir, store) = store();
        assert_eq!(store.get_state("me@x", "bookmarks_pagination_cursor").unwrap(), None);
        store.set_state("me@x", "bookmarks_pagination_cursor", "10").unwrap();
        store.set_state("me@x", "bookmarks_pagination_cursor", "20").unwrap();
        assert_eq!(
            store.get_state("me@x", "bookmarks_pagination_cursor").unwrap().as_deref(),
            Some("20")
        );
        assert_eq!(
            store.get_state(APP_NAME, "app_version").unwrap().as_deref(),
            Some(APP_VERSION)
        );
    }
}
