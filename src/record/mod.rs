//! Records exchanged with walkers and output sinks

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::{Read, Seek};

/// Format used when timestamps are compared against rule strings
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of directory entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Anything else
    Other,
}

/// A name in the filesystem tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dirent {
    /// Full path
    pub path: String,
    /// Final path component
    pub name: String,
    /// Address of the inode this entry points to
    pub meta_addr: u64,
    /// Entry kind
    pub kind: EntryKind,
}

/// Content type detected for a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSignature {
    /// Human-readable signature name
    pub name: String,
    /// Signature identifier
    pub id: String,
}

/// File metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inode {
    /// Address, joined against `Dirent::meta_addr`
    pub addr: u64,
    /// Size in bytes
    pub filesize: u64,
    /// Creation time, when the filesystem records one
    pub created: Option<DateTime<Utc>>,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Detected signature
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<FileSignature>,
}

impl Inode {
    /// Inode with only an address and size
    pub fn new(addr: u64, filesize: u64) -> Self {
        Self {
            addr,
            filesize,
            created: None,
            modified: None,
            signature: None,
        }
    }
}

/// Render a timestamp the way rule strings spell it
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Seekable byte stream of file content
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A file handed to the scheduler
pub struct FileEntry {
    /// Directory entry
    pub dirent: Dirent,
    /// Metadata
    pub inode: Inode,
    /// Content, absent for directories and unreadable files
    pub stream: Option<Box<dyn ReadSeek>>,
}

impl FileEntry {
    /// Entry without content
    pub fn new(dirent: Dirent, inode: Inode) -> Self {
        Self {
            dirent,
            inode,
            stream: None,
        }
    }

    /// Attach content
    pub fn with_stream(mut self, stream: impl ReadSeek + 'static) -> Self {
        self.stream = Some(Box::new(stream));
        self
    }
}

impl fmt::Debug for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileEntry")
            .field("dirent", &self.dirent)
            .field("inode", &self.inode)
            .field("stream", &self.stream.is_some())
            .finish()
    }
}

/// Entries scheduled together; their dirents and inodes are persisted as one unit
#[derive(Debug, Default)]
pub struct FileBatch {
    /// Entries in walk order
    pub entries: Vec<FileEntry>,
}

impl FileBatch {
    /// Empty batch
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&mut self, entry: FileEntry) {
        self.entries.push(entry);
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the batch is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Digests of one file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HashRecord {
    /// Inode address of the file
    #[serde(rename = "MetaAddr")]
    pub meta_addr: u64,
    /// MD5, lowercase hex
    #[serde(rename = "MD5")]
    pub md5: String,
    /// SHA-1, lowercase hex
    #[serde(rename = "SHA1")]
    pub sha1: String,
    /// SHA-256, lowercase hex
    #[serde(rename = "SHA256")]
    pub sha256: String,
    /// BLAKE3, lowercase hex
    #[serde(rename = "Blake3")]
    pub blake3: String,
    /// ssdeep fuzzy hash
    #[serde(rename = "Ssdeep")]
    pub ssdeep: String,
    /// Shannon entropy in bits per byte
    #[serde(rename = "Entropy")]
    pub entropy: f64,
}

/// A pattern match inside a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Pattern text as written in the rule
    pub pattern: String,
    /// Offset of the first matched byte
    pub start_offset: u64,
    /// Offset one past the last matched byte
    pub end_offset: u64,
    /// Identity of the owning rule
    pub rule_id: String,
    /// BLAKE3 of the file
    pub file_hash: String,
    /// Matched length in bytes
    pub length: u64,
}

/// Row of the `rules` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleRow {
    /// Rule identity
    pub id: String,
    /// Rule name
    pub name: String,
}

/// Row of the `rule_matches` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMatch {
    /// Rule identity
    pub id: String,
    /// Path of the matching file
    pub path: String,
    /// Name of the matching file
    pub name: String,
    /// Inode address of the matching file
    pub addr: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_hash_record_column_names() {
        let json = serde_json::to_value(HashRecord::default()).unwrap();
        let mut keys: Vec<_> = json.as_object().unwrap().keys().cloned().collect();
        keys.sort();
        assert_eq!(keys, vec!["Blake3", "Entropy", "MD5", "MetaAddr", "SHA1", "SHA256", "Ssdeep"]);
    }

    #[test]
    fn test_timestamp_format() {
        let ts = Utc.with_ymd_and_hms(2023, 5, 4, 13, 2, 1).unwrap();
        assert_eq!(format_timestamp(&ts), "2023-05-04 13:02:01");
    }

    #[test]
    fn test_file_entry_debug_hides_stream() {
        let entry = FileEntry::new(
            Dirent {
                path: "/a".into(),
                name: "a".into(),
                meta_addr: 1,
                kind: EntryKind::File,
            },
            Inode::new(1, 3),
        )
        .with_stream(std::io::Cursor::new(b"abc".to_vec()));
        assert!(format!("{:?}", entry).contains("stream: true"));
    }
}
