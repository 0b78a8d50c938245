//! Model artifact cache: manifest resolution, download, verification.
//!
//! Artifacts live in one flat directory, one file per manifest `file`.
//! Downloads go to `<file>.part` and are hashed while streaming; the part
//! file is renamed to its final name only after the transfer completed and
//! the SHA-256 matched. A file under its final name has therefore always
//! been verified, either during download or when it is reused.

use crate::defaults;
use crate::error::{Result, StemwerkError};
use crate::models::fetcher::Fetcher;
use crate::models::manifest::{self, ModelManifestEntry};
use crate::stems;
use sha2::{Digest, Sha256};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Get the default directory where models are stored.
///
/// Uses `~/.cache/stemwerk/models/` on Linux/Unix.
pub fn default_models_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("stemwerk")
        .join("models")
}

/// A verified model file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedArtifact {
    pub entry: ModelManifestEntry,
    pub path: PathBuf,
}

/// A file found in the models directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
}

/// Progress notifications from [`ArtifactStore::ensure_artifact_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// A transfer is starting
    Started {
        file: String,
        total_bytes: Option<u64>,
    },
    /// Percent complete, never decreasing within one transfer
    Progress { percent: u8, bytes: u64 },
    /// The artifact passed verification
    Verified { file: String, downloaded: bool },
}

/// Monotonic percentage tracker for one transfer.
///
/// With a known length the percentage is bytes over length. Without one,
/// each mebibyte counts as one percent. Either way it stays below 100
/// until [`DownloadProgress::complete`].
#[derive(Debug, Clone)]
pub struct DownloadProgress {
    total: Option<u64>,
    bytes: u64,
    percent: u8,
}

impl DownloadProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|&t| t > 0),
            bytes: 0,
            percent: 0,
        }
    }

    /// Record `n` more bytes. Returns the new percentage if it increased.
    pub fn advance(&mut self, n: u64) -> Option<u8> {
        self.bytes += n;
        let raw = match self.total {
            Some(total) => self.bytes.saturating_mul(100) / total,
            None => self.bytes / (1024 * 1024),
        };
        let percent = raw.min(99) as u8;
        if percent > self.percent {
            self.percent = percent;
            Some(percent)
        } else {
            None
        }
    }

    /// Mark the transfer finished.
    pub fn complete(&mut self) -> u8 {
        self.percent = 100;
        self.percent
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }
}

/// Hex SHA-256 of a file.
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path)
        && e.kind() != io::ErrorKind::NotFound
    {
        log::warn!("Failed to remove {}: {}", path.display(), e);
    }
}

/// Resolves, downloads and verifies separation models.
pub struct ArtifactStore {
    fetcher: Arc<dyn Fetcher>,
    models_dir: PathBuf,
    release_url: String,
    release_tag: String,
}

impl ArtifactStore {
    /// `release_url` is a template in which `{tag}` is replaced by the tag.
    pub fn new(
        fetcher: Arc<dyn Fetcher>,
        models_dir: impl Into<PathBuf>,
        release_url: &str,
        release_tag: &str,
    ) -> Self {
        Self {
            fetcher,
            models_dir: models_dir.into(),
            release_url: release_url.to_string(),
            release_tag: release_tag.to_string(),
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn release_tag(&self) -> &str {
        &self.release_tag
    }

    /// Release lookup URL for `tag`.
    pub fn release_url(&self, tag: &str) -> String {
        self.release_url.replace("{tag}", tag)
    }

    /// Where `entry` is stored once installed.
    pub fn artifact_path(&self, entry: &ModelManifestEntry) -> PathBuf {
        self.models_dir.join(&entry.file_name)
    }

    fn part_path(&self, entry: &ModelManifestEntry) -> PathBuf {
        self.models_dir
            .join(format!("{}{}", entry.file_name, defaults::PART_SUFFIX))
    }

    /// Fetch the release descriptor for `tag` and the manifest it carries.
    ///
    /// # Errors
    ///
    /// - [`StemwerkError::ManifestNotFound`] if the release or its
    ///   `manifest.json` asset does not exist
    /// - [`StemwerkError::AssetMissing`] if the manifest names a file the
    ///   release does not carry
    /// - [`StemwerkError::ManifestInvalid`] for malformed JSON or entries
    /// - network errors from the fetcher
    pub async fn resolve_manifest(&self, tag: &str) -> Result<Vec<ModelManifestEntry>> {
        let not_found = || StemwerkError::ManifestNotFound {
            tag: tag.to_string(),
        };

        let url = self.release_url(tag);
        log::info!("Resolving release {} ({})", tag, url);
        let text = self.fetcher.get_text(&url).await?.ok_or_else(not_found)?;
        let release = manifest::parse_release(&text)?;

        let asset = release.manifest_asset().ok_or_else(not_found)?;
        let text = self
            .fetcher
            .get_text(&asset.browser_download_url)
            .await?
            .ok_or_else(not_found)?;
        let records = manifest::parse_manifest(&text)?;
        let entries = manifest::bind_assets(records, &release)?;

        log::info!("Manifest for {} lists {} model(s)", tag, entries.len());
        Ok(entries)
    }

    /// [`ArtifactStore::ensure_artifact_with`] without progress reporting.
    pub async fn ensure_artifact(&self, stem_count: u32) -> Result<CachedArtifact> {
        self.ensure_artifact_with(stem_count, &mut |_| {}).await
    }

    /// Make sure the model for `stem_count` is present and verified.
    ///
    /// The first manifest entry with a matching stem count is used. A
    /// non-empty cached file is reused after re-verification; otherwise the
    /// file is downloaded. No retries are attempted.
    ///
    /// # Errors
    ///
    /// - [`StemwerkError::UnsupportedStemCount`] before any network access
    /// - [`StemwerkError::NoMatchingEntry`] if no entry has that stem count
    /// - [`StemwerkError::IntegrityMismatch`] if the digest differs; the
    ///   offending file is removed
    /// - any error of [`ArtifactStore::resolve_manifest`]
    pub async fn ensure_artifact_with(
        &self,
        stem_count: u32,
        on_event: &mut (dyn FnMut(DownloadEvent) + Send),
    ) -> Result<CachedArtifact> {
        stems::vocabulary(stem_count)?;

        let entries = self.resolve_manifest(&self.release_tag).await?;
        let entry = manifest::first_for_stems(&entries, stem_count)
            .ok_or(StemwerkError::NoMatchingEntry { count: stem_count })?
            .clone();
        let path = self.artifact_path(&entry);

        let cached = fs::metadata(&path).map(|m| m.len() > 0).unwrap_or(false);
        if cached {
            log::info!("Using cached {}", path.display());
            self.verify_cached(&entry, &path)?;
            on_event(DownloadEvent::Verified {
                file: entry.file_name.clone(),
                downloaded: false,
            });
            return Ok(CachedArtifact { entry, path });
        }

        fs::create_dir_all(&self.models_dir).inspect_err(|e| {
            log::error!(
                "Failed to create models directory {}: {e}",
                self.models_dir.display()
            )
        })?;

        let part = self.part_path(&entry);
        let result = self.download_verified(&entry, &part, on_event).await;
        if let Err(e) = result {
            remove_quietly(&part);
            return Err(e);
        }

        fs::rename(&part, &path).inspect_err(|e| {
            log::error!("Failed to move {} into place: {e}", part.display());
            remove_quietly(&part);
        })?;
        log::info!("Installed {} to {}", entry.id, path.display());
        on_event(DownloadEvent::Verified {
            file: entry.file_name.clone(),
            downloaded: true,
        });
        Ok(CachedArtifact { entry, path })
    }

    fn verify_cached(&self, entry: &ModelManifestEntry, path: &Path) -> Result<()> {
        let actual = file_sha256(path)?;
        if actual.eq_ignore_ascii_case(&entry.sha256) {
            return Ok(());
        }
        remove_quietly(path);
        Err(StemwerkError::IntegrityMismatch {
            file: entry.file_name.clone(),
            expected: entry.sha256.clone(),
            actual,
        })
    }

    /// Stream `entry` into `part`, hashing as it goes.
    async fn download_verified(
        &self,
        entry: &ModelManifestEntry,
        part: &Path,
        on_event: &mut (dyn FnMut(DownloadEvent) + Send),
    ) -> Result<()> {
        log::info!("Downloading {} from {}", entry.file_name, entry.download_url);
        let mut download = self.fetcher.download(&entry.download_url).await?;
        let total = download.content_length().or(entry.size);
        on_event(DownloadEvent::Started {
            file: entry.file_name.clone(),
            total_bytes: total,
        });

        let mut file = fs::File::create(part)
            .inspect_err(|e| log::error!("Failed to create {}: {e}", part.display()))?;
        let mut hasher = Sha256::new();
        let mut progress = DownloadProgress::new(total);

        while let Some(chunk) = download.chunk().await? {
            file.write_all(&chunk)
                .inspect_err(|e| log::error!("Failed to write {}: {e}", part.display()))?;
            hasher.update(&chunk);
            if let Some(percent) = progress.advance(chunk.len() as u64) {
                on_event(DownloadEvent::Progress {
                    percent,
                    bytes: progress.bytes(),
                });
            }
        }
        file.sync_all()?;

        let actual = format!("{:x}", hasher.finalize());
        if !actual.eq_ignore_ascii_case(&entry.sha256) {
            log::warn!(
                "Checksum mismatch for {}: expected {}, got {}",
                entry.file_name,
                entry.sha256,
                actual
            );
            return Err(StemwerkError::IntegrityMismatch {
                file: entry.file_name.clone(),
                expected: entry.sha256.clone(),
                actual,
            });
        }

        on_event(DownloadEvent::Progress {
            percent: progress.complete(),
            bytes: progress.bytes(),
        });
        Ok(())
    }

    /// Installed artifacts, sorted by name. In-flight `.part` files are
    /// skipped. A missing models directory is an empty cache.
    pub fn list_cached(&self) -> Result<Vec<CachedFile>> {
        let entries = match fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry?;
            let meta = entry.metadata()?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !meta.is_file() || name.ends_with(defaults::PART_SUFFIX) {
                continue;
            }
            files.push(CachedFile {
                name,
                path: entry.path(),
                size: meta.len(),
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Delete every file in the models directory, including leftovers of
    /// interrupted downloads. Returns how many files were removed.
    pub fn clear_cache(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.models_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            if entry.metadata()?.is_file() {
                fs::remove_file(entry.path())?;
                removed += 1;
            }
        }
        log::info!("Removed {} file(s) from {}", removed, self.models_dir.display());
        Ok(removed)
    }
}
