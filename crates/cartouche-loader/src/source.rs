//! Cartridge stream sources.
//!
//! The loader reads through a plain `Read + Seek` stream, but the RomFS
//! accessor hands out an *independently opened* stream so the consumer's
//! cursor cannot disturb the loader's own. [`CartSource`] captures the
//! ability to open such streams repeatedly from the same backing image.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A cartridge image that can be opened as independent seekable streams.
pub trait CartSource {
    /// Stream type produced by [`open`](CartSource::open).
    type Stream: Read + Seek;

    /// Open a fresh stream over the image, positioned at the start.
    fn open(&self) -> io::Result<Self::Stream>;
}

/// File-backed cartridge source.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Create a source for the image at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// The backing path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CartSource for FileSource {
    type Stream = File;

    fn open(&self) -> io::Result<File> {
        File::open(&self.path)
    }
}

/// In-memory cartridge source, shared cheaply between streams.
#[derive(Debug, Clone)]
pub struct MemorySource {
    data: Arc<[u8]>,
}

impl MemorySource {
    /// Wrap an in-memory image.
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

impl From<Vec<u8>> for MemorySource {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl CartSource for MemorySource {
    type Stream = Cursor<Arc<[u8]>>;

    fn open(&self) -> io::Result<Self::Stream> {
        Ok(Cursor::new(Arc::clone(&self.data)))
    }
}
