//! Gallery Client
//!
//! Data-access layer for the image gallery API:
//! - Lists paginated, filterable image records
//! - Reports global and per-image download statistics
//! - Runs the two-step download flow (grant, then fetch and save)
//! - Wraps each call in view-state adapters for presentation code

pub mod adapters;
pub mod api;
pub mod config;
pub mod error;

#[cfg(test)]
mod testing;

pub use adapters::{
    CountScope, DownloadAdapter, DownloadStatsAdapter, ImageAdapter, ImagesAdapter, ImagesQuery,
    RequestState, Settlement, Tracker,
};
pub use api::{
    ApiClient, DownloadCount, DownloadGrant, DownloadStage, ImagePage, ImageRecord, SavedDownload,
};
pub use config::{Config, ConfigError, Environment};
pub use error::{GalleryError, Result};
