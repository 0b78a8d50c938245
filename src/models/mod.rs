//! Separation model management.

pub mod fetcher;
pub mod manifest;
pub mod store;

pub use fetcher::{Download, Fetcher, FetcherConfig, HttpFetcher, MemoryDownload};
pub use manifest::{ModelManifestEntry, ReleaseAsset, ReleaseDescriptor};
pub use store::{ArtifactStore, CachedArtifact, CachedFile, DownloadEvent, DownloadProgress};
