//! Release descriptor and model manifest schemas.
//!
//! Models are published as assets of a tagged release. One asset,
//! `manifest.json`, lists the models with their stem count and SHA-256;
//! every file it names must itself be an asset of the same release.

use crate::defaults;
use crate::error::{Result, StemwerkError};
use serde::{Deserialize, Serialize};

/// Tag-addressed release as returned by the release lookup endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReleaseDescriptor {
    #[serde(default)]
    pub tag_name: String,
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub browser_download_url: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl ReleaseDescriptor {
    pub fn asset(&self, name: &str) -> Option<&ReleaseAsset> {
        self.assets.iter().find(|a| a.name == name)
    }

    /// The `manifest.json` asset, matched by exact name.
    pub fn manifest_asset(&self) -> Option<&ReleaseAsset> {
        self.asset(defaults::MANIFEST_ASSET)
    }
}

/// One model as listed in `manifest.json`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ManifestRecord {
    pub id: String,
    pub stems: u32,
    pub format: String,
    pub file: String,
    pub sha256: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ManifestDocument {
    Wrapped { models: Vec<ManifestRecord> },
    Bare(Vec<ManifestRecord>),
}

/// A manifest record bound to its release asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelManifestEntry {
    pub id: String,
    pub stem_count: u32,
    pub format: String,
    pub file_name: String,
    /// Lower-case hex digest
    pub sha256: String,
    pub download_url: String,
    /// Asset size in bytes, if the release reports one
    pub size: Option<u64>,
}

/// Parse a release descriptor.
pub fn parse_release(text: &str) -> Result<ReleaseDescriptor> {
    serde_json::from_str(text).map_err(|e| StemwerkError::ManifestInvalid {
        message: format!("release descriptor: {}", e),
    })
}

/// Parse and validate `manifest.json`.
///
/// Accepts `{ "models": [...] }` or a bare array of records. Order is kept.
///
/// # Errors
///
/// [`StemwerkError::ManifestInvalid`] for malformed JSON, a record with an
/// empty or path-like `file`, or a `sha256` that is not 64 hex digits.
pub fn parse_manifest(text: &str) -> Result<Vec<ManifestRecord>> {
    let document: ManifestDocument =
        serde_json::from_str(text).map_err(|e| StemwerkError::ManifestInvalid {
            message: e.to_string(),
        })?;
    let records = match document {
        ManifestDocument::Wrapped { models } => models,
        ManifestDocument::Bare(models) => models,
    };

    for record in &records {
        validate_record(record)?;
    }
    Ok(records)
}

fn validate_record(record: &ManifestRecord) -> Result<()> {
    let file = record.file.as_str();
    if file.is_empty() || file.contains('/') || file.contains('\\') || file.starts_with('.') {
        return Err(StemwerkError::ManifestInvalid {
            message: format!("model '{}' has invalid file name '{}'", record.id, file),
        });
    }
    if file.ends_with(defaults::PART_SUFFIX) {
        return Err(StemwerkError::ManifestInvalid {
            message: format!("model '{}' file name '{}' is reserved", record.id, file),
        });
    }
    if record.sha256.len() != 64 || !record.sha256.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(StemwerkError::ManifestInvalid {
            message: format!(
                "model '{}' has malformed sha256 '{}'",
                record.id, record.sha256
            ),
        });
    }
    Ok(())
}

/// Bind every record to the release asset of the same name.
///
/// # Errors
///
/// [`StemwerkError::AssetMissing`] for the first record whose file is not
/// an asset of `release`.
pub fn bind_assets(
    records: Vec<ManifestRecord>,
    release: &ReleaseDescriptor,
) -> Result<Vec<ModelManifestEntry>> {
    records
        .into_iter()
        .map(|record| {
            let asset = release
                .asset(&record.file)
                .ok_or_else(|| StemwerkError::AssetMissing {
                    file: record.file.clone(),
                })?;
            Ok(ModelManifestEntry {
                id: record.id,
                stem_count: record.stems,
                format: record.format,
                file_name: record.file,
                sha256: record.sha256.to_ascii_lowercase(),
                download_url: asset.browser_download_url.clone(),
                size: asset.size,
            })
        })
        .collect()
}

/// First entry for `stem_count`, in manifest order.
pub fn first_for_stems(entries: &[ModelManifestEntry], stem_count: u32) -> Option<&ModelManifestEntry> {
    entries.iter().find(|e| e.stem_count == stem_count)
}
