//! Plain filesystem directory sink.

use crate::error::{Result, StemwerkError};
use crate::sink::{OutputSink, StemWriter, check_name};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Writes stems as files in an existing directory.
///
/// Each stem is written to a hidden temporary sibling and atomically renamed
/// over the final name on finish.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    /// Sink into `dir`, which must already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(StemwerkError::SinkCreateFailed {
                name: dir.display().to_string(),
                message: "output directory does not exist".to_string(),
            });
        }
        Ok(Self { dir })
    }

    /// Sink into `dir`, creating it (and parents) first.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StemwerkError::SinkCreateFailed {
            name: dir.display().to_string(),
            message: e.to_string(),
        })?;
        Self::new(dir)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl OutputSink for DirectorySink {
    fn open(&self, name: &str, _mime_type: &str) -> Result<Box<dyn StemWriter>> {
        check_name(name)?;
        let temp = tempfile::Builder::new()
            .prefix(&format!(".{}.", name))
            .suffix(".tmp")
            .tempfile_in(&self.dir)
            .map_err(|e| StemwerkError::SinkCreateFailed {
                name: name.to_string(),
                message: e.to_string(),
            })?;
        log::debug!("Writing {} via {}", name, temp.path().display());

        Ok(Box::new(DirectoryWriter {
            name: name.to_string(),
            target: self.dir.join(name),
            file: BufWriter::new(temp),
        }))
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

struct DirectoryWriter {
    name: String,
    target: PathBuf,
    file: BufWriter<NamedTempFile>,
}

impl Write for DirectoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl StemWriter for DirectoryWriter {
    fn finish(self: Box<Self>) -> Result<()> {
        let DirectoryWriter { name, target, file } = *self;
        let write_err = |message: String| StemwerkError::SinkWrite {
            name: name.clone(),
            message,
        };

        let temp = file.into_inner().map_err(|e| write_err(e.error().to_string()))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| write_err(e.to_string()))?;
        temp.persist(&target)
            .map_err(|e| write_err(e.error.to_string()))?;
        Ok(())
    }
}
