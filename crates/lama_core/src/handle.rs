/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Account handles derived from profile URIs.
//!
//! Accepts both URI shapes served by Mastodon-compatible servers:
//! `https://host/users/name` and `https://host/@name`.

/// `name` from a profile URI. With `safe`, only alphanumerics are kept.
pub fn username(uri: &str, safe: bool) -> String {
    let last = uri
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .replace('@', "");
    if safe {
        alnum(&last)
    } else {
        last
    }
}

/// `host` from a profile URI. With `safe`, only alphanumerics are kept.
pub fn instance(uri: &str, safe: bool) -> String {
    let host = strip_scheme(uri).split('/').next().unwrap_or_default().to_string();
    if safe {
        alnum(&host)
    } else {
        host
    }
}

/// `name@host`, or `name_hostalnum` with `safe`.
///
/// Profiles bridged from Bluesky (`https://bsky.brid.gy/r/https://bsky.app/profile/name`)
/// are attributed to the bridged host rather than to the bridge.
pub fn handle(uri: &str, safe: bool) -> String {
    let uri = unwrap_bridged(uri);
    let name = username(&uri, safe);
    let host = instance(&uri, safe);
    if safe {
        format!("{name}_{host}")
    } else {
        format!("{name}@{host}")
    }
}

fn unwrap_bridged(uri: &str) -> String {
    if uri.contains("brid.gy") && uri.matches("https://").count() > 1 {
        let parts: Vec<&str> = uri.split("https://").filter(|p| !p.is_empty()).collect();
        if let Some(inner) = parts.get(1) {
            if inner.contains("/profile/") {
                return format!("https://{}", inner.replace("/profile/", "/users/"));
            }
        }
    }
    uri.to_string()
}

fn strip_scheme(uri: &str) -> &str {
    uri.trim_start_matches("https://").trim_start_matches("http://")
}

fn alnum(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).collect()
}
