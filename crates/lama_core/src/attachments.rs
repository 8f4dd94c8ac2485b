/*
 * SPDX-FileCopyrightText: 2026 RedHunt07 - FEDI3 Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::config::{AccountConfig, Config};
use crate::error::ApiError;
use crate::handle;
use async_trait::async_trait;
use lama_protocol::{MediaAttachment, Status};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Stored form of one attachment: a path relative to the data dir, or the
/// list of per-URL errors when every mirror failed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AttachmentRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    #[serde(default)]
    pub description: String,
}

impl AttachmentRecord {
    pub fn saved(path: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            path: Some(path.into()),
            errors: Vec::new(),
            description: description.into(),
        }
    }

    pub fn is_saved(&self) -> bool {
        self.path.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Download {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn download(&self, url: &str) -> Result<Download, ApiError>;
}

pub struct HttpMediaSource {
    http: reqwest::Client,
}

impl HttpMediaSource {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("LAMA/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl MediaSource for HttpMediaSource {
    async fn download(&self, url: &str) -> Result<Download, ApiError> {
        let resp = self.http.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ApiError::http(status, url));
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = resp.bytes().await?;
        Ok(Download {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}

/// Downloads the media of a post, trying each mirror in turn.
pub struct AttachmentResolver {
    source: Arc<dyn MediaSource>,
    data_dir: PathBuf,
    download_own: bool,
    download_others: bool,
}

impl AttachmentResolver {
    pub fn new(cfg: &Config, source: Arc<dyn MediaSource>) -> Self {
        Self {
            source,
            data_dir: cfg.data_dir(),
            download_own: cfg.prefs.download_own_attachments,
            download_others: cfg.prefs.download_others_attachments,
        }
    }

    /// Whether media of a post by `author` is downloaded for `account`.
    pub fn wants(&self, account: &AccountConfig, author: &str) -> bool {
        if account.handle == author {
            self.download_own
        } else {
            self.download_others
        }
    }

    pub async fn resolve_all(&self, account: &AccountConfig, status: &Status) -> Vec<AttachmentRecord> {
        let author = status
            .account
            .profile_url()
            .map(|u| handle::handle(u, false))
            .unwrap_or_default();
        if !self.wants(account, &author) {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(status.media_attachments.len());
        for (idx, att) in status.media_attachments.iter().enumerate() {
            out.push(self.resolve(status, idx, att).await);
        }
        out
    }

    pub async fn resolve(&self, status: &Status, idx: usize, att: &MediaAttachment) -> AttachmentRecord {
        let description = att.description.clone().unwrap_or_default();
        let candidates: Vec<&str> = [att.url.as_deref(), att.remote_url.as_deref()]
            .into_iter()
            .flatten()
            .filter(|u| !u.trim().is_empty())
            .collect();

        let relative = media_relative_path(status, idx);
        let local_path = self.data_dir.join(&relative);
        let mut errors = Vec::new();

        for (attempt, url) in candidates.iter().enumerate() {
            info!("  save_attachment, attempt {} - {url}", attempt + 1);
            match self.fetch_to(url, &local_path).await {
                Ok(download) => {
                    info!("    OK, saved as {}", local_path.display());
                    let ext = infer_extension(&download.bytes, download.content_type.as_deref());
                    let stored = finalize(&local_path, &relative, &ext);
                    return AttachmentRecord {
                        path: Some(stored),
                        errors,
                        description,
                    };
                }
                Err(e) => {
                    warn!("    Failed to download {url}: {e}");
                    errors.push(e);
                }
            }
        }

        error!("  Failed to download attachment (post: {})", status.uri);
        for e in &errors {
            error!("    {e}");
        }
        AttachmentRecord {
            path: None,
            errors,
            description,
        }
    }

    async fn fetch_to(&self, url: &str, local_path: &Path) -> Result<Download, String> {
        let download = self.source.download(url).await.map_err(|e| e.to_string())?;
        if let Some(parent) = local_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("create {}: {e}", parent.display()))?;
        }
        std::fs::write(local_path, &download.bytes)
            .map_err(|e| format!("write {}: {e}", local_path.display()))?;
        Ok(download)
    }
}

/// `media/<host>/<author>/<YYYY>/<MM>/<author>_<id>_<idx>`, without extension.
pub fn media_relative_path(status: &Status, idx: usize) -> String {
    let host = handle::instance(&status.uri, true);
    let author = status
        .account
        .profile_uri()
        .map(|u| handle::username(u, true))
        .unwrap_or_default();
    let year = status.created_at.year();
    let month = u8::from(status.created_at.month());
    format!(
        "media/{host}/{author}/{year}/{month:02}/{author}_{id}_{idx:02}",
        id = status.id
    )
}

/// Moves the download to its decorated name. On failure the undecorated file is kept.
fn finalize(local_path: &Path, relative: &str, ext: &str) -> String {
    let mut target = local_path.as_os_str().to_owned();
    target.push(format!(".{ext}"));
    let target = PathBuf::from(target);
    match std::fs::rename(local_path, &target) {
        Ok(()) => format!("{relative}.{ext}"),
        Err(e) => {
            error!(
                "    Failed to rename '{}' to '{}': {e}",
                local_path.display(),
                target.display()
            );
            relative.to_string()
        }
    }
}

/// File extension from the content signature, then from the served media type.
pub fn infer_extension(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some(ext) = sniff_extension(bytes) {
        return ext.to_string();
    }
    content_type
        .and_then(|ct| ct.split(';').next())
        .and_then(|ct| mime_guess::get_mime_extensions_str(ct.trim()))
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "undefined".to_string())
}

pub fn sniff_extension(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(b"\xFF\xD8\xFF") {
        return Some("jpg");
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some("png");
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some("gif");
    }
    if bytes.len() >= 12 && bytes.starts_with(b"RIFF") {
        return match &bytes[8..12] {
            b"WEBP" => Some("webp"),
            b"WAVE" => Some("wav"),
            b"AVI " => Some("avi"),
            _ => None,
        };
    }
    // ISO base media: size(4) + "ftyp" + major brand.
    if bytes.len() >= 12 && &bytes[4..8] == b"ftyp" {
        return Some(match &bytes[8..12] {
            b"avif" | b"avis" => "avif",
            b"heic" | b"heix" | b"mif1" | b"msf1" => "heic",
            b"qt  " => "mov",
            b"M4A " => "m4a",
            b"M4V " => "m4v",
            _ => "mp4",
        });
    }
    if bytes.starts_with(b"\x1A\x45\xDF\xA3") {
        let head = &bytes[..bytes.len().min(64)];
        let is_webm = head.windows(4).any(|w| w == b"webm");
        return Some(if is_webm { "webm" } else { "mkv" });
    }
    if bytes.starts_with(b"OggS") {
        return Some("ogg");
    }
    if bytes.starts_with(b"fLaC") {
        return Some("flac");
    }
    if bytes.starts_with(b"ID3") || (bytes.len() >= 2 && bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        return Some("mp3");
    }
    if bytes.starts_with(b"%PDF") {
        return Some("pdf");
    }
    if bytes.starts_with(b"II*\0") || bytes.starts_with(b"MM\0*") {
        return Some("tif");
    }
    if bytes.len() >= 14 && bytes.starts_with(b"BM") {
        return Some("bmp");
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let head = head.trim_start();
    if head.starts_with("<svg") || (head.starts_with("<?xml") && head.contains("<svg")) {
        return Some("svg");
    }
    None
}
