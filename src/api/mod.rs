//! Catalog API access.
//!
//! Provides the transport, the image listing, download and statistics
//! services, and the wire types they decode.

pub mod downloads;
pub mod images;
pub mod models;
pub mod stats;
pub mod transport;

pub use downloads::{
    fallback_filename, filename_from_content_disposition, save_bytes, DownloadStage, FetchedImage,
    SavedDownload,
};
pub use images::list_query;
pub use models::{DownloadCount, DownloadGrant, ImagePage, ImageRecord};
pub use transport::ApiClient;
