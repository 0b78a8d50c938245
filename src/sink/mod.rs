//! Output destinations for separated stems.
//!
//! A sink has one capability: open a named, writable stream. Bytes written
//! to the stream only appear under the final name once the writer is
//! finished, so a failed or cancelled run never leaves a half-written stem.

pub mod directory;
pub mod tree;

pub use directory::DirectorySink;
pub use tree::{Document, DocumentTree, FsTree, MemoryTree, TreeSink};

use crate::error::{Result, StemwerkError};
use std::io::Write;

/// Where a run writes its stems.
pub trait OutputSink: Send + Sync {
    /// Open `name` for writing, replacing any existing entry of that name.
    ///
    /// `mime_type` is a hint for providers that store one.
    fn open(&self, name: &str, mime_type: &str) -> Result<Box<dyn StemWriter>>;

    /// Human-readable location, for log lines and reports.
    fn location(&self) -> String;
}

/// Writable stream returned by [`OutputSink::open`].
///
/// Dropping a writer without calling [`StemWriter::finish`] discards the
/// written bytes.
pub trait StemWriter: Write + Send {
    /// Commit the written bytes under the final name.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Reject names that would escape a flat destination.
pub(crate) fn check_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0');
    if bad {
        return Err(StemwerkError::SinkCreateFailed {
            name: name.to_string(),
            message: "invalid file name".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_names_are_accepted() {
        assert!(check_name("vocals.wav").is_ok());
        assert!(check_name(".hidden").is_ok());
    }

    #[test]
    fn path_like_names_are_rejected() {
        for name in ["", ".", "..", "a/b.wav", "..\\x.wav", "nul\0.wav"] {
            assert!(
                matches!(
                    check_name(name),
                    Err(StemwerkError::SinkCreateFailed { .. })
                ),
                "{:?} should be rejected",
                name
            );
        }
    }
}
