//! Default configuration constants for stemwerk.
//!
//! Shared between the config file defaults, the CLI, and the library so the
//! values only live in one place.

/// Default number of stems to separate into.
pub const STEM_COUNT: u32 = 4;

/// Default inference segment length in seconds.
///
/// Matches the window the separation models are trained on; longer segments
/// raise memory use roughly linearly.
pub const SEGMENT_SECS: f64 = 10.0;

/// Default overlap between consecutive segments in seconds.
///
/// The overlap region is cross-faded during reconstruction to hide seams.
pub const OVERLAP_SECS: f64 = 1.0;

/// Release tag that holds the published model manifest.
pub const RELEASE_TAG: &str = "models-v1";

/// Release descriptor URL template. `{tag}` is replaced with the release tag.
pub const RELEASE_URL: &str = "https://api.github.com/repos/flark/stemwerk/releases/tags/{tag}";

/// Name of the manifest asset inside a release.
pub const MANIFEST_ASSET: &str = "manifest.json";

/// Suffix of in-flight downloads inside the models directory.
pub const PART_SUFFIX: &str = ".part";

/// MIME type hint passed to output sinks for encoded stems.
pub const WAV_MIME: &str = "audio/wav";

/// Connect timeout for model downloads.
pub const CONNECT_TIMEOUT_SECS: u64 = 15;

/// Overall timeout for small JSON requests (release descriptor, manifest).
pub const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Maximum time a download may go without receiving any bytes.
pub const IDLE_TIMEOUT_SECS: u64 = 30;

/// User agent sent with every request (GitHub's API rejects requests without one).
pub fn user_agent() -> String {
    format!("stemwerk/{}", env!("CARGO_PKG_VERSION"))
}
