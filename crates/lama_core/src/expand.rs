/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Follow-up fetches triggered by a saved post: its reply parent and the
//! posts it links to. Each chain follows one axis only, bounded in depth.

use crate::config::Config;
use crate::extract::Link;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Parent,
    Link,
}

impl Axis {
    fn as_str(self) -> &'static str {
        match self {
            Axis::Parent => "parent",
            Axis::Link => "link",
        }
    }
}

/// Activity kind of an archived post and how it was reached.
///
/// Renders as `bookmark`, `bookmark.parent`, `bookmark.parent#2`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLabel {
    root: String,
    axis: Option<Axis>,
    hops: u32,
}

impl ChainLabel {
    pub fn root(kind: impl Into<String>) -> Self {
        Self {
            root: kind.into(),
            axis: None,
            hops: 0,
        }
    }

    pub fn root_kind(&self) -> &str {
        &self.root
    }

    pub fn axis(&self) -> Option<Axis> {
        self.axis
    }

    /// Number of expansions between the top-level activity and this one.
    pub fn depth(&self) -> u32 {
        self.hops
    }

    /// One more step along `axis`. `None` when the chain already follows the other axis.
    pub fn next(&self, axis: Axis) -> Option<ChainLabel> {
        match self.axis {
            Some(current) if current != axis => None,
            _ => Some(ChainLabel {
                root: self.root.clone(),
                axis: Some(axis),
                hops: self.hops + 1,
            }),
        }
    }

    /// Folder name used for provenance files.
    pub fn dir_name(&self) -> &str {
        match self.axis {
            Some(axis) => axis.as_str(),
            None => &self.root,
        }
    }
}

impl fmt::Display for ChainLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.axis, self.hops) {
            (None, _) | (_, 0) => write!(f, "{}", self.root),
            (Some(axis), 1) => write!(f, "{}.{}", self.root, axis.as_str()),
            (Some(axis), n) => write!(f, "{}.{}#{n}", self.root, axis.as_str()),
        }
    }
}

impl FromStr for ChainLabel {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Some((root, rest)) = s.split_once('.') else {
            return Ok(ChainLabel::root(s));
        };
        let (axis_name, hops) = match rest.split_once('#') {
            Some((name, n)) => match n.parse::<u32>() {
                Ok(n) => (name, n),
                Err(_) => return Ok(ChainLabel::root(s)),
            },
            None => (rest, 1),
        };
        let axis = match axis_name {
            "parent" => Axis::Parent,
            "link" => Axis::Link,
            _ => return Ok(ChainLabel::root(s)),
        };
        Ok(ChainLabel {
            root: root.to_string(),
            axis: Some(axis),
            hops,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Fetch the status with this id.
    Parent { id: String, chain: ChainLabel },
    /// Resolve this post URL through search.
    Link { url: String, chain: ChainLabel },
}

#[derive(Debug, Clone)]
pub struct RecursiveExpander {
    recursion_limit: u32,
    fetch_parents: bool,
    fetch_links: bool,
}

impl RecursiveExpander {
    pub fn new(cfg: &Config) -> Self {
        Self {
            recursion_limit: cfg.prefs.recursion_limit,
            fetch_parents: cfg.prefs.fetch_reply_parents,
            fetch_links: cfg.prefs.fetch_linked_posts,
        }
    }

    /// Depth budget used by `chain`: one per label segment, so `bookmark.parent`
    /// and `bookmark.parent#2` both cost one, plus one per repeat past `#2`.
    fn spent(chain: &ChainLabel) -> u32 {
        match chain.depth() {
            hops @ 0..=1 => hops,
            hops => hops - 1,
        }
    }

    /// Follow-ups for a post just saved under `chain`, parent first.
    pub fn expansions(
        &self,
        chain: &ChainLabel,
        in_reply_to_id: Option<&str>,
        links: &[Link],
    ) -> Vec<Expansion> {
        let mut out = Vec::new();
        let wants_parent = self.fetch_parents && in_reply_to_id.is_some();
        let wants_links = self.fetch_links && links.iter().any(|l| l.mastodon);
        if !wants_parent && !wants_links {
            return out;
        }
        if Self::spent(chain) >= self.recursion_limit {
            warn!(
                "STOP. Not going any deeper than {chain} (recursion_limit is {})",
                self.recursion_limit
            );
            return out;
        }

        if let Some(id) = in_reply_to_id.filter(|_| self.fetch_parents) {
            if let Some(next) = chain.next(Axis::Parent) {
                out.push(Expansion::Parent {
                    id: id.to_string(),
                    chain: next,
                });
            }
        }

        if self.fetch_links {
            if let Some(next) = chain.next(Axis::Link) {
                for link in links.iter().filter(|l| l.mastodon) {
                    out.push(Expansion::Link {
                        url: link.url.clone(),
                        chain: next.clone(),
                    });
                }
            }
        }
        out
    }
}
