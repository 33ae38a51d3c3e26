//! Directory tree walking into file batches
//!
//! Each entry under the root becomes a `Dirent`/`Inode` pair. Inode addresses
//! are assigned in walk order starting at 1. Regular files carry a stream
//! that opens the file on first read, so queued batches do not hold file
//! descriptors.

use crate::error::Result;
use crate::record::{Dirent, EntryKind, FileBatch, FileEntry, Inode};
use chrono::{DateTime, Utc};
use std::fs::{File, Metadata};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Walks a directory tree
#[derive(Debug, Clone)]
pub struct Walker {
    root: PathBuf,
    batch_size: usize,
}

impl Walker {
    /// Walk `root`, emitting batches of at most `batch_size` entries
    pub fn new(root: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            root: root.into(),
            batch_size: batch_size.max(1),
        }
    }

    /// Call `on_batch` for every batch in walk order. Entries that can not be
    /// read are skipped with a warning. Returns the number of entries emitted.
    pub fn walk<F>(&self, mut on_batch: F) -> Result<u64>
    where
        F: FnMut(FileBatch) -> Result<()>,
    {
        if !self.root.exists() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} does not exist", self.root.display()),
            )
            .into());
        }

        let mut batch = FileBatch::new();
        let mut next_addr = 1u64;
        for item in WalkDir::new(&self.root).sort_by_file_name() {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Skipping entry without metadata");
                    continue;
                }
            };

            let addr = next_addr;
            next_addr += 1;
            batch.push(file_entry(entry.path(), &metadata, addr));
            if batch.len() >= self.batch_size {
                debug!(entries = batch.len(), "Walker batch ready");
                on_batch(std::mem::take(&mut batch))?;
            }
        }
        if !batch.is_empty() {
            on_batch(batch)?;
        }
        Ok(next_addr - 1)
    }
}

fn file_entry(path: &Path, metadata: &Metadata, addr: u64) -> FileEntry {
    let file_type = metadata.file_type();
    let kind = if file_type.is_file() {
        EntryKind::File
    } else if file_type.is_dir() {
        EntryKind::Directory
    } else if file_type.is_symlink() {
        EntryKind::Symlink
    } else {
        EntryKind::Other
    };

    let dirent = Dirent {
        path: path.display().to_string(),
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string()),
        meta_addr: addr,
        kind,
    };
    let mut inode = Inode::new(addr, if kind == EntryKind::File { metadata.len() } else { 0 });
    inode.created = metadata.created().ok().map(DateTime::<Utc>::from);
    inode.modified = metadata.modified().ok().map(DateTime::<Utc>::from);

    let entry = FileEntry::new(dirent, inode);
    if kind == EntryKind::File {
        entry.with_stream(LazyFile::new(path))
    } else {
        entry
    }
}

/// File opened on first read or seek
#[derive(Debug)]
pub struct LazyFile {
    path: PathBuf,
    file: Option<File>,
}

impl LazyFile {
    /// Stream over `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn file(&mut self) -> io::Result<&mut File> {
        if self.file.is_none() {
            self.file = Some(File::open(&self.path)?);
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "file not open"))
    }
}

impl Read for LazyFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.file()?.read(buf)
    }
}

impl Seek for LazyFile {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.file()?.seek(pos)
    }
}
