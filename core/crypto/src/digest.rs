//! Byte counting and content hashing for write sessions.
//!
//! The content hash is the first four bytes of a SHA-256 digest read as a
//! big-endian `i32`. It is a cheap equality signal for deduplicating
//! attachments and is far too short to serve as an integrity check.

use sha2::{Digest, Sha256};

/// Length and content hash of the bytes of one completed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentSummary {
    /// Number of bytes written.
    pub length: u64,
    /// Truncated digest of the bytes written.
    pub content_hash: i32,
}

/// Running byte count and digest.
pub struct ContentDigest {
    length: u64,
    hasher: Sha256,
}

impl ContentDigest {
    /// Start an empty digest.
    pub fn new() -> Self {
        Self {
            length: 0,
            hasher: Sha256::new(),
        }
    }

    /// Account for `bytes`.
    pub fn update(&mut self, bytes: &[u8]) {
        self.length += bytes.len() as u64;
        self.hasher.update(bytes);
    }

    /// Bytes seen so far.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Finalize into a [`ContentSummary`].
    pub fn finish(self) -> ContentSummary {
        let digest = self.hasher.finalize();
        ContentSummary {
            length: self.length,
            content_hash: fold_digest(&digest),
        }
    }
}

impl Default for ContentDigest {
    fn default() -> Self {
        Self::new()
    }
}

/// Content hash of a complete byte slice.
pub fn content_hash(bytes: &[u8]) -> i32 {
    fold_digest(&Sha256::digest(bytes))
}

fn fold_digest(digest: &[u8]) -> i32 {
    let mut head = [0u8; 4];
    head.copy_from_slice(&digest[..4]);
    i32::from_be_bytes(head)
}
