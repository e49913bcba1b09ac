//! Persistent descriptor storage.
//!
//! # Responsibilities
//! - Hold descriptors across processes, keyed by cache key
//! - Record the source stamps each descriptor was built from
//!
//! # Design Decisions
//! - Writes are whole-value replacements: last writer wins, no merge
//! - The file store writes to a temp file and renames it into place so a
//!   concurrent reader never sees a torn document
//! - Failures surface as `CacheError`; callers log them and rebuild locally

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::metadata::descriptor::ObjectDescriptor;
use crate::metadata::source::SourceStamp;

/// Errors raised by a persistent store.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// A stored descriptor with the stamps it was built from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedDescriptor {
    pub descriptor: ObjectDescriptor,
    pub stamps: Vec<SourceStamp>,
}

/// Shared descriptor storage.
pub trait DescriptorStore: Send + Sync + std::fmt::Debug {
    fn load(&self, key: &str) -> Result<Option<CachedDescriptor>, CacheError>;
    fn save(&self, key: &str, entry: &CachedDescriptor) -> Result<(), CacheError>;
}

/// Store that never holds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullStore;

impl DescriptorStore for NullStore {
    fn load(&self, _key: &str) -> Result<Option<CachedDescriptor>, CacheError> {
        Ok(None)
    }

    fn save(&self, _key: &str, _entry: &CachedDescriptor) -> Result<(), CacheError> {
        Ok(())
    }
}

/// In-memory store shared between threads (and between cache instances).
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<DashMap<String, CachedDescriptor>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl DescriptorStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<CachedDescriptor>, CacheError> {
        Ok(self.inner.get(key).map(|r| r.value().clone()))
    }

    fn save(&self, key: &str, entry: &CachedDescriptor) -> Result<(), CacheError> {
        self.inner.insert(key.to_string(), entry.clone());
        Ok(())
    }
}

/// One JSON document per key inside a directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Create the store, creating the directory if needed.
    pub fn new(directory: impl AsRef<Path>) -> Result<Self, CacheError> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory)?;
        Ok(Self { directory })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let file_name: String = key
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{}.json", file_name))
    }
}

impl DescriptorStore for FileStore {
    fn load(&self, key: &str) -> Result<Option<CachedDescriptor>, CacheError> {
        let path = self.path_for(key);
        let content = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_slice(&content)?))
    }

    fn save(&self, key: &str, entry: &CachedDescriptor) -> Result<(), CacheError> {
        let path = self.path_for(key);
        let (tmp_path, mut file) = tempfile_in(&self.directory)?;
        serde_json::to_writer(&mut file, entry)?;
        file.flush()?;
        drop(file);
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

/// Open a uniquely named scratch file inside `dir`.
fn tempfile_in(dir: &Path) -> std::io::Result<(PathBuf, fs::File)> {
    let path = dir.join(format!(".{}.tmp", uuid::Uuid::new_v4()));
    let file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&path)?;
    Ok((path, file))
}
