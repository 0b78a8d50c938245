//! Structured storage-tree sink.
//!
//! Models document providers where files are addressed through a tree
//! handle rather than paths: entries are created with a MIME type, cannot
//! be opened for append-or-create in one step, and may be refused by the
//! provider. An existing entry is deleted and recreated, never appended to.

use crate::defaults;
use crate::error::{Result, StemwerkError};
use crate::sink::{OutputSink, StemWriter, check_name};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

/// Metadata of one entry in a [`DocumentTree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub name: String,
    pub mime_type: Option<String>,
    pub len: u64,
}

/// Provider interface of a flat storage tree.
pub trait DocumentTree: Send + Sync {
    /// Look up an entry by display name.
    fn find(&self, name: &str) -> io::Result<Option<Document>>;

    /// Create a new, empty entry. Fails if the name is taken or the
    /// provider refuses.
    fn create(&self, name: &str, mime_type: &str) -> io::Result<Document>;

    fn delete(&self, name: &str) -> io::Result<()>;

    fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    /// Open an existing entry for writing from the start.
    fn open_write(&self, name: &str) -> io::Result<Box<dyn Write + Send>>;

    /// Human-readable description of the tree root.
    fn describe(&self) -> String;
}

/// Sink writing into a [`DocumentTree`].
///
/// Stems are written to a `<name>.part` entry and renamed into place on
/// finish, after the previous `<name>` entry (if any) is deleted.
#[derive(Clone)]
pub struct TreeSink {
    tree: Arc<dyn DocumentTree>,
}

impl TreeSink {
    pub fn new(tree: Arc<dyn DocumentTree>) -> Self {
        Self { tree }
    }
}

fn create_failed(name: &str, e: io::Error) -> StemwerkError {
    StemwerkError::SinkCreateFailed {
        name: name.to_string(),
        message: e.to_string(),
    }
}

impl OutputSink for TreeSink {
    fn open(&self, name: &str, mime_type: &str) -> Result<Box<dyn StemWriter>> {
        check_name(name)?;
        let part = format!("{}{}", name, defaults::PART_SUFFIX);

        // Leftover from an interrupted run
        if self.tree.find(&part).map_err(|e| create_failed(name, e))?.is_some() {
            self.tree.delete(&part).map_err(|e| create_failed(name, e))?;
        }

        self.tree
            .create(&part, mime_type)
            .map_err(|e| create_failed(name, e))?;
        let inner = match self.tree.open_write(&part) {
            Ok(inner) => inner,
            Err(e) => {
                if let Err(cleanup) = self.tree.delete(&part) {
                    log::warn!("Failed to remove {}: {}", part, cleanup);
                }
                return Err(create_failed(name, e));
            }
        };

        Ok(Box::new(TreeWriter {
            tree: Arc::clone(&self.tree),
            name: name.to_string(),
            part,
            inner: Some(inner),
        }))
    }

    fn location(&self) -> String {
        self.tree.describe()
    }
}

struct TreeWriter {
    tree: Arc<dyn DocumentTree>,
    name: String,
    part: String,
    /// `None` once finished
    inner: Option<Box<dyn Write + Send>>,
}

impl TreeWriter {
    fn write_err(&self, e: io::Error) -> StemwerkError {
        StemwerkError::SinkWrite {
            name: self.name.clone(),
            message: e.to_string(),
        }
    }

    fn commit(&mut self) -> Result<()> {
        if let Some(mut inner) = self.inner.take() {
            inner.flush().map_err(|e| self.write_err(e))?;
        }
        if self.tree.find(&self.name).map_err(|e| self.write_err(e))?.is_some() {
            self.tree.delete(&self.name).map_err(|e| self.write_err(e))?;
        }
        self.tree
            .rename(&self.part, &self.name)
            .map_err(|e| self.write_err(e))
    }
}

impl Write for TreeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(inner) => inner.write(buf),
            None => Err(io::Error::other("writer already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.inner.as_mut() {
            Some(inner) => inner.flush(),
            None => Ok(()),
        }
    }
}

impl StemWriter for TreeWriter {
    fn finish(mut self: Box<Self>) -> Result<()> {
        let result = self.commit();
        if result.is_err()
            && let Err(e) = self.tree.delete(&self.part)
        {
            log::warn!("Failed to discard {}: {}", self.part, e);
        }
        result
    }
}

impl Drop for TreeWriter {
    fn drop(&mut self) {
        // Unfinished: throw away the part entry
        if self.inner.take().is_some()
            && let Err(e) = self.tree.delete(&self.part)
        {
            log::warn!("Failed to discard {}: {}", self.part, e);
        }
    }
}

#[derive(Debug, Default)]
struct MemoryEntry {
    mime_type: String,
    data: Arc<Mutex<Vec<u8>>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    entries: BTreeMap<String, MemoryEntry>,
    refuse_create: bool,
}

/// In-process [`DocumentTree`]. Clones share the same contents.
#[derive(Debug, Clone, Default)]
pub struct MemoryTree {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// A tree whose provider refuses every `create`.
    pub fn refusing() -> Self {
        let tree = Self::default();
        tree.lock().refuse_create = true;
        tree
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of all entries, sorted.
    pub fn names(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }

    /// Contents of an entry.
    pub fn read(&self, name: &str) -> Option<Vec<u8>> {
        self.lock().entries.get(name).map(|entry| {
            entry
                .data
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    /// Stored MIME type of an entry.
    pub fn mime_type(&self, name: &str) -> Option<String> {
        self.lock().entries.get(name).map(|e| e.mime_type.clone())
    }

    /// Insert an entry directly, replacing any existing one.
    pub fn insert(&self, name: &str, mime_type: &str, data: &[u8]) {
        self.lock().entries.insert(
            name.to_string(),
            MemoryEntry {
                mime_type: mime_type.to_string(),
                data: Arc::new(Mutex::new(data.to_vec())),
            },
        );
    }
}

fn not_found(name: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no entry named {}", name))
}

struct MemoryWriter {
    data: Arc<Mutex<Vec<u8>>>,
}

impl Write for MemoryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl DocumentTree for MemoryTree {
    fn find(&self, name: &str) -> io::Result<Option<Document>> {
        Ok(self.lock().entries.get(name).map(|entry| Document {
            name: name.to_string(),
            mime_type: Some(entry.mime_type.clone()),
            len: entry.data.lock().unwrap_or_else(PoisonError::into_inner).len() as u64,
        }))
    }

    fn create(&self, name: &str, mime_type: &str) -> io::Result<Document> {
        let mut state = self.lock();
        if state.refuse_create {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "provider refused to create document",
            ));
        }
        if state.entries.contains_key(name) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", name),
            ));
        }
        state.entries.insert(
            name.to_string(),
            MemoryEntry {
                mime_type: mime_type.to_string(),
                data: Arc::default(),
            },
        );
        Ok(Document {
            name: name.to_string(),
            mime_type: Some(mime_type.to_string()),
            len: 0,
        })
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        self.lock()
            .entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.entries.contains_key(to) {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to),
            ));
        }
        let entry = state.entries.remove(from).ok_or_else(|| not_found(from))?;
        state.entries.insert(to.to_string(), entry);
        Ok(())
    }

    fn open_write(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let state = self.lock();
        let entry = state.entries.get(name).ok_or_else(|| not_found(name))?;
        entry
            .data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(Box::new(MemoryWriter {
            data: Arc::clone(&entry.data),
        }))
    }

    fn describe(&self) -> String {
        "memory tree".to_string()
    }
}

/// Directory-backed [`DocumentTree`].
///
/// Behaves like a document provider on top of a plain directory: `create`
/// refuses to clobber, and MIME types are not stored.
#[derive(Debug, Clone)]
pub struct FsTree {
    root: PathBuf,
}

impl FsTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }
}

impl DocumentTree for FsTree {
    fn find(&self, name: &str) -> io::Result<Option<Document>> {
        match fs::metadata(self.path(name)) {
            Ok(meta) if meta.is_file() => Ok(Some(Document {
                name: name.to_string(),
                mime_type: None,
                len: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn create(&self, name: &str, _mime_type: &str) -> io::Result<Document> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.path(name))?;
        Ok(Document {
            name: name.to_string(),
            mime_type: None,
            len: 0,
        })
    }

    fn delete(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.path(name))
    }

    fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        if self.path(to).exists() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("{} already exists", to),
            ));
        }
        fs::rename(self.path(from), self.path(to))
    }

    fn open_write(&self, name: &str) -> io::Result<Box<dyn Write + Send>> {
        let file: File = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(self.path(name))?;
        Ok(Box::new(io::BufWriter::new(file)))
    }

    fn describe(&self) -> String {
        format!("tree {}", self.root.display())
    }
}
