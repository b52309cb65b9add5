//! Image listing endpoints.

use super::models::{ImagePage, ImageRecord};
use super::transport::{ApiClient, Query};
use crate::error::Result;

/// Build the `/images` query string pairs
///
/// `skip` and `limit` are always present and forwarded unmodified. One `tags`
/// pair is appended per tag in iteration order, duplicates included.
/// `featured` is only present when given.
pub fn list_query(skip: u32, limit: u32, tags: &[String], featured: Option<bool>) -> Query {
    let mut query: Query = vec![("skip", skip.to_string()), ("limit", limit.to_string())];

    query.extend(tags.iter().map(|tag| ("tags", tag.clone())));

    if let Some(featured) = featured {
        query.push(("featured", featured.to_string()));
    }

    query
}

impl ApiClient {
    /// List one window of images
    /// GET /images
    ///
    /// Bounds are not checked client-side; the server may clamp or reject.
    pub async fn list_images(
        &self,
        skip: u32,
        limit: u32,
        tags: &[String],
        featured: Option<bool>,
    ) -> Result<ImagePage> {
        let query = list_query(skip, limit, tags, featured);
        self.get_json(&["images"], &query).await
    }

    /// Get one image by id
    /// GET /images/{id}
    pub async fn get_image(&self, id: &str) -> Result<ImageRecord> {
        self.get_json(&["images", id], &[]).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GalleryError;
    use crate::testing::MockCatalog;

    fn tags(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn encode(query: &Query) -> String {
        query
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&")
    }

    #[test]
    fn test_skip_and_limit_always_present() {
        assert_eq!(encode(&list_query(0, 12, &[], None)), "skip=0&limit=12");
        assert_eq!(encode(&list_query(40, 1, &[], None)), "skip=40&limit=1");
    }

    #[test]
    fn test_out_of_range_values_forwarded_as_is() {
        assert_eq!(encode(&list_query(0, 0, &[], None)), "skip=0&limit=0");
        assert_eq!(
            encode(&list_query(u32::MAX, 100000, &[], None)),
            "skip=4294967295&limit=100000"
        );
    }

    #[test]
    fn test_one_tags_pair_per_tag_without_dedup() {
        let query = list_query(0, 20, &tags(&["sky", "nature", "sky"]), None);
        assert_eq!(
            encode(&query),
            "skip=0&limit=20&tags=sky&tags=nature&tags=sky"
        );
    }

    #[test]
    fn test_featured_only_when_given() {
        assert!(!list_query(0, 20, &[], None).iter().any(|(k, _)| *k == "featured"));
        assert_eq!(
            encode(&list_query(0, 20, &[], Some(true))),
            "skip=0&limit=20&featured=true"
        );
        assert_eq!(
            encode(&list_query(0, 20, &[], Some(false))),
            "skip=0&limit=20&featured=false"
        );
    }

    #[tokio::test]
    async fn test_list_images_sends_exact_query() {
        let mock = MockCatalog::start().await;
        let page = mock
            .client()
            .list_images(24, 12, &tags(&["a b", "c"]), Some(false))
            .await
            .unwrap();

        let hits = mock.hits();
        assert_eq!(hits[0].method, "GET");
        assert_eq!(hits[0].path, "/api/v1/images");
        assert_eq!(
            hits[0].query.as_deref(),
            Some("skip=24&limit=12&tags=a+b&tags=c&featured=false")
        );
        assert_eq!(page.len(), 3);
        assert_eq!(page.total, 57);
    }

    #[tokio::test]
    async fn test_get_image() {
        let mock = MockCatalog::start().await;
        let record = mock.client().get_image("abc123").await.unwrap();
        assert_eq!(record.id, "abc123");
        assert_eq!(mock.hits()[0].path, "/api/v1/images/abc123");
    }

    #[tokio::test]
    async fn test_unknown_image_surfaces_raw_status() {
        let mock = MockCatalog::start().await;
        let err = mock.client().get_image("missing").await.unwrap_err();
        assert!(matches!(err, GalleryError::Api { status: 404 }));
    }
}
