//! Image download flow.
//!
//! A download is two requests against two different hosts:
//! 1. POST to the catalog for a single-use grant URL
//! 2. GET the grant URL from the content host
//!
//! The binary is then saved under a filename taken from the content host's
//! `content-disposition` header, or derived from the image id.
//!
//! Saving goes through a staged file that is removed on every exit path
//! unless it was renamed into place.

use super::models::{extension_for_mime, DownloadGrant};
use super::transport::ApiClient;
use crate::error::{GalleryError, Result};
use bytes::Bytes;
use reqwest::header::{HeaderName, CONTENT_DISPOSITION, CONTENT_TYPE};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;

/// Extension used when neither the grant URL nor the media type gives one
const FALLBACK_EXTENSION: &str = "jpg";

/// Stage of a single download invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStage {
    Idle,
    Requesting,
    Granted,
    Fetching,
    Saving,
    Complete,
    Failed,
}

impl fmt::Display for DownloadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DownloadStage::Idle => "idle",
            DownloadStage::Requesting => "requesting",
            DownloadStage::Granted => "granted",
            DownloadStage::Fetching => "fetching",
            DownloadStage::Saving => "saving",
            DownloadStage::Complete => "complete",
            DownloadStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Binary payload fetched through a grant, not yet saved
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub filename: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A download written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedDownload {
    pub path: PathBuf,
    pub filename: String,
    pub bytes: u64,
}

/// Extract the quoted `filename="..."` token of a `content-disposition` value
///
/// Everything between the opening quote and the last quote is taken
/// verbatim. Empty names yield `None`.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    const TOKEN: &str = "filename=\"";

    let start = header.find(TOKEN)? + TOKEN.len();
    let rest = &header[start..];
    let end = rest.rfind('"')?;
    let name = &rest[..end];

    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}

/// Filename used when the content host does not declare one
///
/// `image-<id>.<ext>` where the extension comes from the grant URL's last
/// path segment, then the media type, then `jpg`.
pub fn fallback_filename(image_id: &str, grant_url: &str, content_type: Option<&str>) -> String {
    let extension = extension_from_url(grant_url)
        .or_else(|| content_type.and_then(extension_for_mime).map(str::to_string))
        .unwrap_or_else(|| FALLBACK_EXTENSION.to_string());

    format!("image-{}.{}", image_id, extension)
}

fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.next_back()?;
    let (stem, extension) = segment.rsplit_once('.')?;

    let valid = !stem.is_empty()
        && (1..=5).contains(&extension.len())
        && extension.chars().all(|c| c.is_ascii_alphanumeric());

    valid.then(|| extension.to_ascii_lowercase())
}

/// Reduce a declared filename to a single path component
fn safe_filename(declared: &str, fallback: impl FnOnce() -> String) -> String {
    Path::new(declared)
        .file_name()
        .and_then(|name| name.to_str())
        .filter(|name| !name.starts_with('.'))
        .map(str::to_string)
        .unwrap_or_else(fallback)
}

impl ApiClient {
    /// Ask the catalog for a download grant
    /// POST /downloads/{id}
    ///
    /// A well-formed body without a usable `download_url` is a protocol error.
    pub async fn request_grant(&self, image_id: &str) -> Result<DownloadGrant> {
        let body: serde_json::Value = self.post_json(&["downloads", image_id]).await?;

        match body.get("download_url").and_then(|v| v.as_str()) {
            Some(url) if !url.trim().is_empty() => Ok(DownloadGrant {
                download_url: url.to_string(),
            }),
            _ => Err(GalleryError::Protocol(format!(
                "download response for '{}' has no download_url",
                image_id
            ))),
        }
    }

    /// Request a grant and leave the save to the caller
    pub async fn download_image(&self, image_id: &str) -> Result<DownloadGrant> {
        let grant = self.request_grant(image_id).await?;
        tracing::info!("Download URL received for {}", image_id);
        Ok(grant)
    }

    /// Request a grant and fetch the binary it points to
    pub async fn fetch_download(&self, image_id: &str) -> Result<FetchedImage> {
        self.fetch_download_with(image_id, &mut |_: DownloadStage| {})
            .await
    }

    async fn fetch_download_with(
        &self,
        image_id: &str,
        on_stage: &mut (dyn FnMut(DownloadStage) + Send),
    ) -> Result<FetchedImage> {
        on_stage(DownloadStage::Requesting);
        let grant = self.request_grant(image_id).await.inspect_err(|_| {
            on_stage(DownloadStage::Failed);
        })?;
        on_stage(DownloadStage::Granted);

        on_stage(DownloadStage::Fetching);
        let fetched = async {
            let response = self.fetch_content(&grant.download_url).await?;

            let header = |name: HeaderName| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            let disposition = header(CONTENT_DISPOSITION);
            let content_type = header(CONTENT_TYPE);

            let bytes = response.bytes().await?;

            let filename = disposition
                .as_deref()
                .and_then(filename_from_content_disposition)
                .unwrap_or_else(|| {
                    fallback_filename(image_id, &grant.download_url, content_type.as_deref())
                });

            Ok::<_, GalleryError>(FetchedImage {
                filename,
                content_type,
                bytes,
            })
        }
        .await
        .inspect_err(|_| on_stage(DownloadStage::Failed))?;

        tracing::debug!(
            "Downloaded {} bytes for {} as '{}'",
            fetched.bytes.len(),
            image_id,
            fetched.filename
        );

        Ok(fetched)
    }

    /// Run the full download and save the binary into `dir`
    pub async fn save_to_disk(&self, image_id: &str, dir: &Path) -> Result<SavedDownload> {
        self.save_to_disk_with(image_id, dir, |_| {}).await
    }

    /// Like [`save_to_disk`](Self::save_to_disk), reporting each stage to `on_stage`
    pub async fn save_to_disk_with(
        &self,
        image_id: &str,
        dir: &Path,
        mut on_stage: impl FnMut(DownloadStage) + Send,
    ) -> Result<SavedDownload> {
        let mut report = |stage: DownloadStage| {
            tracing::debug!("Download {}: {}", image_id, stage);
            on_stage(stage);
        };

        let fetched = self.fetch_download_with(image_id, &mut report).await?;

        report(DownloadStage::Saving);
        let filename = safe_filename(&fetched.filename, || {
            fallback_filename(image_id, "", fetched.content_type.as_deref())
        });

        let saved = save_bytes(dir, &filename, &fetched.bytes)
            .await
            .inspect_err(|_| report(DownloadStage::Failed))?;
        report(DownloadStage::Complete);

        tracing::info!("Saved {} to {}", image_id, saved.path.display());
        Ok(saved)
    }
}

/// Write `bytes` to `dir/filename` through a staged file
///
/// An existing file is never overwritten; ` (1)`, ` (2)`, ... is appended to
/// the stem instead. The target name is claimed with an exclusive create, so
/// concurrent saves of the same name each end up in their own file.
pub async fn save_bytes(dir: &Path, filename: &str, bytes: &[u8]) -> Result<SavedDownload> {
    let mut staged = StagedFile::create(dir).await?;
    staged.write_all(bytes).await?;

    let path = staged.promote(dir, filename).await?;
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(filename)
        .to_string();

    Ok(SavedDownload {
        path,
        filename,
        bytes: bytes.len() as u64,
    })
}

/// `filename` for `n == 0`, otherwise `stem (n).ext`
fn numbered_name(filename: &str, n: u32) -> String {
    if n == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{} ({}).{}", stem, n, ext),
        _ => format!("{} ({})", filename, n),
    }
}

static STAGE_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Transient file holding a payload until it is renamed into place
///
/// Removed on drop unless promoted, so it is released exactly once whatever
/// happens between creation and promotion. Its name does not depend on the
/// target filename and always stays short.
struct StagedFile {
    path: PathBuf,
    file: Option<tokio::fs::File>,
    promoted: bool,
}

impl StagedFile {
    async fn create(dir: &Path) -> Result<Self> {
        let n = STAGE_COUNTER.fetch_add(1, Ordering::Relaxed);
        let path = dir.join(format!(".gallery-{}-{}.part", std::process::id(), n));

        let file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            file: Some(file),
            promoted: false,
        })
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        if let Some(file) = self.file.as_mut() {
            file.write_all(bytes).await?;
            file.flush().await?;
        }
        Ok(())
    }

    /// Move the payload to the first free `filename` variant in `dir`
    ///
    /// Each candidate is claimed with `create_new` before the rename, so no
    /// other save can pick the same name in between.
    async fn promote(mut self, dir: &Path, filename: &str) -> Result<PathBuf> {
        if let Some(file) = self.file.take() {
            file.sync_all().await?;
        }

        let mut n = 0;
        let target = loop {
            let candidate = dir.join(numbered_name(filename, n));
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => break candidate,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        };

        if let Err(e) = tokio::fs::rename(&self.path, &target).await {
            if let Err(cleanup) = tokio::fs::remove_file(&target).await {
                tracing::warn!("Failed to release {}: {}", target.display(), cleanup);
            }
            return Err(e.into());
        }

        self.promoted = true;
        Ok(target)
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        self.file.take();
        if !self.promoted {
            if let Err(e) = std::fs::remove_file(&self.path) {
                tracing::warn!("Failed to remove staged file {}: {}", self.path.display(), e);
            }
        }
    }
}
