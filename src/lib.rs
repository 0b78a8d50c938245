//! stemwerk - Split songs into stems
//!
//! PCM16 WAV codec, segment planning with overlap-add reassembly, verified
//! model downloads, and atomic stem output.

// Errors propagate; panics are reserved for tests
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod defaults;
pub mod error;
#[cfg(feature = "model-download")]
pub mod models;
#[cfg(feature = "cli")]
pub mod output;
pub mod separation;
pub mod sink;
pub mod stems;

// Composition root for the binary
#[cfg(feature = "cli")]
pub mod app;

// Core traits (input → separate → sink)
pub use separation::separator::StemSeparator;
pub use sink::{OutputSink, StemWriter};

// Orchestration
pub use separation::orchestrator::{
    RunEvent, RunHandle, RunReport, RunRequest, SeparationOrchestrator,
};

// Error handling
pub use error::{ErrorKind, Result, StemwerkError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.2.0+abc1234"` when git hash is available, `"0.2.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
