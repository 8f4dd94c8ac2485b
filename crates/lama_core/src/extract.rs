/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Structured fields derived from a status, independent of storage.

use crate::handle;
use lama_protocol::{Poll, Status};
use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static ANCHOR: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a[href]").expect("valid selector"));

/// Single-post URL shapes of Mastodon-compatible servers.
static POST_URL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^https?://[^/]+/@[^/]+/\d+",
        r"^https?://[^/]+/users/[^/]+/statuses/\d+",
        r"^https?://[^/]+/web/statuses/\d+",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Link {
    pub url: String,
    /// Anchor text, empty when it only repeats the URL.
    pub text: String,
    /// Whether the URL looks like a single post on a Mastodon-compatible server.
    pub mastodon: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub text: String,
    pub hashtags: Vec<String>,
    pub mentions: Vec<String>,
    pub links: Vec<Link>,
    pub poll_options: Vec<String>,
}

pub fn extract(status: &Status) -> Extracted {
    Extracted {
        text: strip_html(&status.content),
        hashtags: status.tags.iter().map(|t| t.name.clone()).collect(),
        // `acct` is relative to the viewer's instance, so the full handle is
        // rebuilt from the mentioned profile URL.
        mentions: status
            .mentions
            .iter()
            .map(|m| handle::handle(&m.url, false))
            .collect(),
        links: extract_links(&status.content),
        poll_options: poll_options(status.poll.as_ref()),
    }
}

pub fn strip_html(html: &str) -> String {
    if html.is_empty() {
        return String::new();
    }
    Html::parse_fragment(html).root_element().text().collect()
}

/// Outbound links of rendered content; hashtag and mention anchors are skipped.
pub fn extract_links(html: &str) -> Vec<Link> {
    if html.is_empty() {
        return Vec::new();
    }
    let fragment = Html::parse_fragment(html);
    let mut links = Vec::new();
    for a in fragment.select(&ANCHOR) {
        let Some(url) = a.value().attr("href") else {
            continue;
        };
        if a
            .value()
            .classes()
            .any(|c| c == "mention" || c == "hashtag")
        {
            continue;
        }
        let mut text: String = a.text().map(str::trim).collect();
        if text == url {
            text.clear();
        }
        links.push(Link {
            url: url.to_string(),
            text,
            mastodon: is_post_url(url),
        });
    }
    links
}

pub fn is_post_url(url: &str) -> bool {
    POST_URL_PATTERNS.iter().any(|re| re.is_match(url))
}

fn poll_options(poll: Option<&Poll>) -> Vec<String> {
    poll.map(|p| p.options.iter().map(|o| o.title.clone()).collect())
        .unwrap_or_default()
}
