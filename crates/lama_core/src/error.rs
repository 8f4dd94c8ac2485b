/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

/// Failure of a call to the remote server. Aborts only the enclosing sweep or
/// download candidate.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("HTTP {status}: {reason} ({url})")]
    Http {
        status: u16,
        reason: String,
        url: String,
    },

    #[error("URL Error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("credentials: {0}")]
    Credentials(String),
}

impl ApiError {
    pub fn http(status: reqwest::StatusCode, url: &str) -> Self {
        ApiError::Http {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
            url: url.to_string(),
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::Decode(e.to_string())
    }
}

/// Reasons an account is skipped before anything is fetched.
#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error("configured username {configured} does not match authenticated username {authenticated}")]
    IdentityMismatch {
        configured: String,
        authenticated: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
