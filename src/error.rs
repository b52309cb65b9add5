//! Error taxonomy for the gallery client.
//!
//! Catalog failures and content-host failures are separate variants so a
//! caller can tell which side of a download went wrong.

use thiserror::Error;

/// Errors raised by the transport and the services built on it
#[derive(Error, Debug)]
pub enum GalleryError {
    /// Non-success status from the catalog API
    #[error("API error: {status}")]
    Api { status: u16 },

    /// Non-success status from the content host serving a grant
    #[error("Failed to download image: {status}")]
    DownloadFetch { status: u16 },

    #[error("Failed to decode response JSON: {0}")]
    Decode(#[from] serde_json::Error),

    /// Well-formed body missing a required field
    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Failed to save download: {0}")]
    Io(#[from] std::io::Error),
}

impl GalleryError {
    /// HTTP status carried by the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            GalleryError::Api { status } | GalleryError::DownloadFetch { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

pub type Result<T> = std::result::Result<T, GalleryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_is_exposed_for_http_variants() {
        assert_eq!(GalleryError::Api { status: 404 }.status(), Some(404));
        assert_eq!(GalleryError::DownloadFetch { status: 503 }.status(), Some(503));
        assert_eq!(GalleryError::Protocol("x".into()).status(), None);
    }

    #[test]
    fn test_not_found() {
        assert!(GalleryError::Api { status: 404 }.is_not_found());
        assert!(!GalleryError::Api { status: 500 }.is_not_found());
    }

    #[test]
    fn test_display_distinguishes_catalog_and_content_host() {
        let api = GalleryError::Api { status: 502 }.to_string();
        let fetch = GalleryError::DownloadFetch { status: 502 }.to_string();
        assert_ne!(api, fetch);
        assert!(api.contains("502"));
        assert!(fetch.contains("502"));
    }
}
