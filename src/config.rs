use crate::defaults;
use crate::error::{Result, StemwerkError};
use crate::separation::ChunkPolicy;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub separation: SeparationConfig,
    pub models: ModelsConfig,
    pub output: OutputConfig,
}

/// Separation defaults
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SeparationConfig {
    pub stems: u32,
    pub segment_secs: f64,
    pub overlap_secs: f64,
}

/// Model release and cache configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelsConfig {
    /// Release lookup URL; `{tag}` is replaced by `release_tag`
    pub release_url: String,
    pub release_tag: String,
    /// Models directory; the user cache directory when unset
    pub dir: Option<PathBuf>,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct OutputConfig {
    /// Default output directory; `<input>_stems` next to the working
    /// directory when unset
    pub dir: Option<PathBuf>,
}

impl Default for SeparationConfig {
    fn default() -> Self {
        Self {
            stems: defaults::STEM_COUNT,
            segment_secs: defaults::SEGMENT_SECS,
            overlap_secs: defaults::OVERLAP_SECS,
        }
    }
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            release_url: defaults::RELEASE_URL.to_string(),
            release_tag: defaults::RELEASE_TAG.to_string(),
            dir: None,
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            request_timeout_secs: defaults::REQUEST_TIMEOUT_SECS,
            idle_timeout_secs: defaults::IDLE_TIMEOUT_SECS,
        }
    }
}

impl SeparationConfig {
    pub fn chunk_policy(&self) -> ChunkPolicy {
        ChunkPolicy::new(self.segment_secs, self.overlap_secs)
    }
}

impl ModelsConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Returns an error if the file is missing or contains invalid TOML.
    /// Missing fields will use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if file doesn't exist
    ///
    /// Only returns defaults if the file is missing.
    /// Returns errors for invalid TOML.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Ok(config) => Ok(config),
            Err(StemwerkError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                Ok(Self::default())
            }
            Err(StemwerkError::Config(e)) => Err(StemwerkError::ConfigParse {
                message: format!("{}: {}", path.display(), e),
            }),
            Err(e) => Err(e),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - STEMWERK_MODELS_DIR → models.dir
    /// - STEMWERK_RELEASE_TAG → models.release_tag
    /// - STEMWERK_RELEASE_URL → models.release_url
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("STEMWERK_MODELS_DIR")
            && !dir.is_empty()
        {
            self.models.dir = Some(PathBuf::from(dir));
        }

        if let Ok(tag) = std::env::var("STEMWERK_RELEASE_TAG")
            && !tag.is_empty()
        {
            self.models.release_tag = tag;
        }

        if let Ok(url) = std::env::var("STEMWERK_RELEASE_URL")
            && !url.is_empty()
        {
            self.models.release_url = url;
        }

        self
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/stemwerk/config.toml on Linux
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join("stemwerk")
            .join("config.toml")
    }

    /// Check values that deserialize fine but cannot be used.
    pub fn validate(&self) -> Result<()> {
        crate::stems::vocabulary(self.separation.stems)?;
        self.separation.chunk_policy().validate()?;
        if !self.models.release_url.contains("{tag}") {
            return Err(StemwerkError::ConfigParse {
                message: format!(
                    "models.release_url must contain {{tag}}, got '{}'",
                    self.models.release_url
                ),
            });
        }
        Ok(())
    }

    /// Serialize as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| StemwerkError::ConfigParse {
            message: e.to_string(),
        })
    }
}
