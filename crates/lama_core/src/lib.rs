/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Incremental archiver for Mastodon accounts: own posts, favourites,
//! bookmarks, mentions and polls, with their reply parents and linked posts.

pub mod api;
pub mod archive;
pub mod attachments;
pub mod config;
pub mod error;
pub mod expand;
pub mod extract;
pub mod fetch;
pub mod handle;
pub mod init;
pub mod logging;
pub mod run;
pub mod store;

#[cfg(test)]
mod testkit;
