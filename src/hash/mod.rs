//! Streaming multi-algorithm file hashing
//!
//! Besides the digests, the hasher keeps a byte histogram so the Shannon
//! entropy of the whole stream (0.0 to 8.0 bits per byte) comes out with them.

use crate::record::HashRecord;
use crate::rule::HashAlgorithm;
use fuzzyhash::FuzzyHash;
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Digests of one stream, lowercase hex except for the ssdeep text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileHashes {
    /// MD5
    pub md5: String,
    /// SHA-1
    pub sha1: String,
    /// SHA-256
    pub sha256: String,
    /// BLAKE3
    pub blake3: String,
    /// ssdeep
    pub ssdeep: String,
    /// Shannon entropy in bits per byte
    pub entropy: f64,
}

impl FileHashes {
    /// Digest for a rule hash algorithm
    pub fn get(&self, alg: HashAlgorithm) -> &str {
        match alg {
            HashAlgorithm::Md5 => &self.md5,
            HashAlgorithm::Sha1 => &self.sha1,
            HashAlgorithm::Sha256 => &self.sha256,
            HashAlgorithm::Blake3 => &self.blake3,
        }
    }

    /// Row for the hash table
    pub fn to_record(&self, meta_addr: u64) -> HashRecord {
        HashRecord {
            meta_addr,
            md5: self.md5.clone(),
            sha1: self.sha1.clone(),
            sha256: self.sha256.clone(),
            blake3: self.blake3.clone(),
            ssdeep: self.ssdeep.clone(),
            entropy: self.entropy,
        }
    }
}

/// Updates every algorithm from the same chunks
pub struct FileHasher {
    md5: md5::Context,
    sha1: Sha1,
    sha256: Sha256,
    blake3: blake3::Hasher,
    fuzzy: FuzzyHash,
    histogram: [u64; 256],
    bytes: u64,
}

impl Default for FileHasher {
    fn default() -> Self {
        Self {
            md5: md5::Context::new(),
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            blake3: blake3::Hasher::new(),
            fuzzy: FuzzyHash::default(),
            histogram: [0; 256],
            bytes: 0,
        }
    }
}

impl std::fmt::Debug for FileHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileHasher")
            .field("bytes", &self.bytes)
            .finish_non_exhaustive()
    }
}

impl FileHasher {
    /// Create a hasher
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard any state from a previous stream
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Feed the next chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.md5.consume(chunk);
        self.sha1.update(chunk);
        self.sha256.update(chunk);
        self.blake3.update(chunk);
        self.fuzzy.update(chunk);
        for &b in chunk {
            self.histogram[usize::from(b)] += 1;
        }
        self.bytes += chunk.len() as u64;
    }

    /// Bytes hashed since the last reset
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Produce the digests and reset for the next stream
    pub fn finalize(&mut self) -> FileHashes {
        let done = std::mem::take(self);
        let mut fuzzy = done.fuzzy;
        fuzzy.finalize();
        FileHashes {
            md5: format!("{:x}", done.md5.compute()),
            sha1: hex::encode(done.sha1.finalize()),
            sha256: hex::encode(done.sha256.finalize()),
            blake3: done.blake3.finalize().to_hex().to_string(),
            ssdeep: fuzzy.to_string(),
            entropy: entropy(&done.histogram, done.bytes),
        }
    }
}

/// Shannon entropy of a byte histogram over `total` bytes
fn entropy(histogram: &[u64; 256], total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let total = total as f64;
    histogram
        .iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = n as f64 / total;
            -p * p.log2()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        let mut hasher = FileHasher::new();
        hasher.update(b"a");
        hasher.update(b"bc");
        assert_eq!(hasher.bytes(), 3);
        let hashes = hasher.finalize();
        assert_eq!(hashes.md5, "900150983cd24fb0d6963f7d28e17f72");
        assert_eq!(hashes.sha1, "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(
            hashes.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            hashes.blake3,
            "6437b3ac38465133ffb63b75273a8db548c558465d79db03fd359c6cd5bd9d85"
        );
        assert!(!hashes.ssdeep.is_empty());
    }

    #[test]
    fn test_entropy() {
        let mut hasher = FileHasher::new();
        hasher.update(&[0x41; 1000]);
        assert_eq!(hasher.finalize().entropy, 0.0);

        let all: Vec<u8> = (0..=255).collect();
        for chunk in all.chunks(7) {
            hasher.update(chunk);
        }
        assert!((hasher.finalize().entropy - 8.0).abs() < 1e-9);

        hasher.update(b"abab");
        assert!((hasher.finalize().entropy - 1.0).abs() < 1e-9);
        assert_eq!(hasher.finalize().entropy, 0.0);
    }

    #[test]
    fn test_finalize_resets() {
        let mut hasher = FileHasher::new();
        hasher.update(b"abc");
        let first = hasher.finalize();
        assert_eq!(hasher.bytes(), 0);
        hasher.update(b"abc");
        assert_eq!(hasher.finalize(), first);
    }

    #[test]
    fn test_record_columns() {
        let hashes = FileHashes {
            md5: "m".into(),
            sha1: "s1".into(),
            sha256: "s2".into(),
            blake3: "b".into(),
            ssdeep: "3::".into(),
            entropy: 1.5,
        };
        let record = hashes.to_record(7);
        assert_eq!(record.meta_addr, 7);
        assert_eq!(record.entropy, 1.5);
        assert_eq!(hashes.get(HashAlgorithm::Blake3), "b");
    }
}
