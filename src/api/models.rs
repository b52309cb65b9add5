//! Wire types for the gallery catalog API.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single image as served by the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub thumbnail_url: String,
    pub hd_url: String,
    #[serde(default)]
    pub downloads: u64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "optional_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
    pub file_size: u64,
    pub content_type: String,
}

impl ImageRecord {
    /// File extension matching the record's media type, if it is a known image format
    pub fn file_extension(&self) -> Option<&'static str> {
        extension_for_mime(&self.content_type)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// One window of the image listing plus the overall count
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImagePage {
    pub images: Vec<ImageRecord>,
    /// Total across all pages, not just this window
    pub total: u64,
}

impl ImagePage {
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Whether records remain after this window when it started at `skip`
    pub fn has_more(&self, skip: u32) -> bool {
        (skip as u64).saturating_add(self.images.len() as u64) < self.total
    }
}

/// Single-use reference to the binary content of an image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadGrant {
    pub download_url: String,
}

impl DownloadGrant {
    /// Name for saving the grant's target when the caller performs the save
    ///
    /// Uses the last path segment of the grant URL, or `image-<id>.jpg`.
    pub fn suggested_filename(&self, image_id: &str) -> String {
        let without_query = self
            .download_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        match without_query.rsplit('/').next() {
            Some(segment) if !segment.is_empty() => segment.to_string(),
            _ => format!("image-{}.jpg", image_id),
        }
    }
}

/// Global or per-image download counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadCount {
    pub total_downloads: u64,
}

/// Map a media type (parameters allowed) to its preferred file extension
pub(crate) fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim();
    if mime.is_empty() {
        return None;
    }
    image::ImageFormat::from_mime_type(mime)?
        .extensions_str()
        .first()
        .copied()
}

/// Catalog timestamps come as RFC 3339 or as naive ISO-8601 (read as UTC)
pub(crate) fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| value.parse::<NaiveDateTime>().map(|naive| naive.and_utc()))
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}

mod optional_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(dt) => serializer.serialize_some(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|raw| super::parse_timestamp(&raw).map_err(serde::de::Error::custom))
            .transpose()
    }
}
