//! HTTP transport for the catalog API.
//!
//! Resolves endpoints against the configured origin, sends one request and
//! normalizes non-success responses into [`GalleryError`]. There are no
//! retries and no timeouts at this layer.
//!
//! Uses a shared HTTP client so every `ApiClient` reuses one connection pool
//! and one cookie store.

use crate::config::Config;
use crate::error::{GalleryError, Result};
use once_cell::sync::Lazy;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::de::DeserializeOwned;
use url::Url;

/// Shared HTTP client for catalog and content-host requests
///
/// The cookie store stands in for credential inclusion on every request.
static HTTP_CLIENT: Lazy<reqwest::Client> = Lazy::new(|| {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("Failed to create HTTP client")
});

/// Query pairs in the order they are appended to the URL
pub type Query = Vec<(&'static str, String)>;

/// Client for the gallery catalog API
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
}

impl ApiClient {
    /// Create a client for `base_url` using the shared HTTP client
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_client(HTTP_CLIENT.clone(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim())?;
        if base_url.cannot_be_a_base() {
            return Err(GalleryError::InvalidUrl(
                url::ParseError::RelativeUrlWithCannotBeABaseBase,
            ));
        }
        Ok(Self { client, base_url })
    }

    /// Create a client for the origin the configuration resolved to
    pub fn from_config(config: &Config) -> Result<Self> {
        tracing::debug!(
            "Using {} catalog at {}",
            config.environment.display_name(),
            config.base_url()
        );
        Self::new(config.base_url())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Absolute URL for an endpoint given as path segments
    ///
    /// Each segment is percent-encoded on its own, so ids cannot add path
    /// components. Query pairs are appended in order, repeated keys included.
    pub fn endpoint_url(&self, segments: &[&str], query: &[(&'static str, String)]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                GalleryError::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase)
            })?;
            path.pop_if_empty();
            path.extend(segments);
        }

        if !query.is_empty() {
            url.query_pairs_mut()
                .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
        }

        Ok(url)
    }

    /// GET an endpoint and decode its JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&'static str, String)],
    ) -> Result<T> {
        self.request_json(Method::GET, segments, query).await
    }

    /// POST to an endpoint with no body and decode its JSON response
    pub async fn post_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T> {
        self.request_json(Method::POST, segments, &[]).await
    }

    /// Issue one catalog request
    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        query: &[(&'static str, String)],
    ) -> Result<T> {
        let url = self.endpoint_url(segments, query)?;

        tracing::debug!("Fetching from: {} {}", method, url);

        let response = self
            .client
            .request(method, url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("API error: {} for {}", status, url);
            return Err(GalleryError::Api {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// GET a content-host URL handed out by a download grant
    ///
    /// Non-success statuses become [`GalleryError::DownloadFetch`], never
    /// [`GalleryError::Api`].
    pub async fn fetch_content(&self, url: &str) -> Result<reqwest::Response> {
        let url = Url::parse(url.trim())?;

        tracing::debug!("Fetching content from: {}", url);

        let response = self.client.get(url.clone()).send().await?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Content host error: {} for {}", status, url);
            return Err(GalleryError::DownloadFetch {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}
