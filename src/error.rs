//! Error types for stemwerk.

use thiserror::Error;

/// Coarse classification of a failure, reported alongside the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or unsupported WAV input
    Format,
    /// Unsupported stem count, empty stem selection, invalid chunk policy
    Config,
    /// Transport, timeout, or remote-data failures during manifest/artifact fetch
    Network,
    /// Checksum mismatch on a downloaded artifact
    Integrity,
    /// Failure to create, open, or write an output destination
    Storage,
    /// The inference collaborator failed
    Inference,
    /// The run was cancelled by the caller
    Cancelled,
    /// Plain I/O failure outside the other categories
    Io,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Format => "format",
            ErrorKind::Config => "config",
            ErrorKind::Network => "network",
            ErrorKind::Integrity => "integrity",
            ErrorKind::Storage => "storage",
            ErrorKind::Inference => "inference",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Io => "io",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StemwerkError {
    // WAV format errors
    #[error("Not a WAV file (missing RIFF/WAVE header)")]
    MissingRiffHeader,

    #[error("WAV file has no fmt chunk")]
    MissingFormatChunk,

    #[error("WAV file has no data chunk")]
    MissingDataChunk,

    #[error("Only linear PCM WAV is supported (format tag {tag})")]
    UnsupportedAudioFormat { tag: u16 },

    #[error("Only 16-bit WAV is supported (bits per sample {bits})")]
    UnsupportedBitDepth { bits: u16 },

    #[error("Malformed fmt chunk: {message}")]
    MalformedFormatChunk { message: String },

    #[error("Cannot encode WAV: {message}")]
    UnencodableFormat { message: String },

    #[error("Audio data length {len} is not a multiple of the frame size {block_align}")]
    MisalignedAudioData { len: usize, block_align: usize },

    // Configuration errors
    #[error("Unsupported stem count: {count} (supported: 2, 4)")]
    UnsupportedStemCount { count: u32 },

    #[error("No stems selected (valid for {count} stems: {valid})")]
    NoStemsSelected { count: u32, valid: String },

    #[error("Invalid chunk policy: {message}")]
    InvalidChunkPolicy { message: String },

    #[error("Manifest has no model for {count} stems")]
    NoMatchingEntry { count: u32 },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Model acquisition errors
    #[error("Release '{tag}' has no manifest.json asset")]
    ManifestNotFound { tag: String },

    #[error("Manifest references '{file}' which is not an asset of the release")]
    AssetMissing { file: String },

    #[error("Invalid manifest: {message}")]
    ManifestInvalid { message: String },

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Network operation timed out: {message}")]
    Timeout { message: String },

    #[error("Checksum mismatch for {file}. Expected: {expected}, got: {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    // Output errors
    #[error("Unable to create {name} in output location: {message}")]
    SinkCreateFailed { name: String, message: String },

    #[error("Failed to write {name}: {message}")]
    SinkWrite { name: String, message: String },

    // Inference errors
    #[error("Inference failed on segment {segment}: {message}")]
    Inference { segment: usize, message: String },

    #[error("Run cancelled")]
    Cancelled,

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl StemwerkError {
    /// Category of this error, as reported to callers next to the message.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StemwerkError::MissingRiffHeader
            | StemwerkError::MissingFormatChunk
            | StemwerkError::MissingDataChunk
            | StemwerkError::UnsupportedAudioFormat { .. }
            | StemwerkError::UnsupportedBitDepth { .. }
            | StemwerkError::MalformedFormatChunk { .. }
            | StemwerkError::UnencodableFormat { .. }
            | StemwerkError::MisalignedAudioData { .. } => ErrorKind::Format,

            StemwerkError::UnsupportedStemCount { .. }
            | StemwerkError::NoStemsSelected { .. }
            | StemwerkError::InvalidChunkPolicy { .. }
            | StemwerkError::NoMatchingEntry { .. }
            | StemwerkError::ConfigParse { .. }
            | StemwerkError::Config(_) => ErrorKind::Config,

            StemwerkError::ManifestNotFound { .. }
            | StemwerkError::AssetMissing { .. }
            | StemwerkError::ManifestInvalid { .. }
            | StemwerkError::Network { .. }
            | StemwerkError::Timeout { .. } => ErrorKind::Network,

            StemwerkError::IntegrityMismatch { .. } => ErrorKind::Integrity,

            StemwerkError::SinkCreateFailed { .. } | StemwerkError::SinkWrite { .. } => {
                ErrorKind::Storage
            }

            StemwerkError::Inference { .. } => ErrorKind::Inference,
            StemwerkError::Cancelled => ErrorKind::Cancelled,
            StemwerkError::Io(_) | StemwerkError::Other(_) => ErrorKind::Io,
        }
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, StemwerkError>;
