//! Download statistics endpoints. Nothing is cached; every call re-fetches.

use super::models::DownloadCount;
use super::transport::ApiClient;
use crate::error::Result;

impl ApiClient {
    /// Downloads across all images
    /// GET /downloads/total
    pub async fn get_total_downloads(&self) -> Result<DownloadCount> {
        self.get_json(&["downloads", "total"], &[]).await
    }

    /// Downloads of one image
    /// GET /downloads/{id}/count
    pub async fn get_image_downloads(&self, image_id: &str) -> Result<DownloadCount> {
        self.get_json(&["downloads", image_id, "count"], &[]).await
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::MockCatalog;

    #[tokio::test]
    async fn test_total_is_stable_without_downloads() {
        let mock = MockCatalog::start().await;
        let client = mock.client();

        let first = client.get_total_downloads().await.unwrap();
        let second = client.get_total_downloads().await.unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.hits().len(), 2);
    }

    #[tokio::test]
    async fn test_total_moves_after_a_download() {
        let mock = MockCatalog::start().await;
        let client = mock.client();

        let before = client.get_total_downloads().await.unwrap();
        client.download_image("vacation").await.unwrap();
        let after = client.get_total_downloads().await.unwrap();

        assert_eq!(after.total_downloads, before.total_downloads + 1);
    }

    #[tokio::test]
    async fn test_image_downloads_path() {
        let mock = MockCatalog::start().await;
        let count = mock.client().get_image_downloads("abc123").await.unwrap();

        assert_eq!(count.total_downloads, 7);
        assert_eq!(mock.hits()[0].path, "/api/v1/downloads/abc123/count");
    }
}
