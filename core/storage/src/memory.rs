//! In-memory binary.
//!
//! Keeps the stored representation in process memory. Useful for small
//! attachments and for testing; nothing is encrypted. Protected content is
//! zeroized whenever it is replaced or cleared.

use std::io::{self, Cursor, Read, Write};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use zeroize::Zeroize;

use binvault_common::{Result, Stage};
use binvault_crypto::{content_hash, ContentSummary};

use crate::binary::{BinaryData, BinaryWriter};
use crate::codec::{GzipDecoder, GzipEncoder, DEFAULT_COMPRESSION_LEVEL};
use crate::pipeline::Pipeline;

/// Shared buffer the write sessions of a [`MemoryBinary`] land in.
#[derive(Clone, Default)]
struct SharedBuffer(Arc<RwLock<Vec<u8>>>);

impl SharedBuffer {
    fn guard(&self) -> RwLockReadGuard<'_, Vec<u8>> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn guard_mut(&self) -> RwLockWriteGuard<'_, Vec<u8>> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Attachment held in memory.
pub struct MemoryBinary {
    content: SharedBuffer,
    length: u64,
    content_hash: i32,
    compressed: bool,
    protected: bool,
    compression_level: u32,
}

impl MemoryBinary {
    /// Create an empty in-memory binary.
    pub fn new(compressed: bool, protected: bool) -> Self {
        Self {
            content: SharedBuffer::default(),
            length: 0,
            content_hash: 0,
            compressed,
            protected,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    /// Create a binary holding `data` as its (uncompressed) payload.
    pub fn from_bytes(data: Vec<u8>, protected: bool) -> Self {
        let mut binary = Self::new(false, protected);
        binary.commit(ContentSummary {
            length: data.len() as u64,
            content_hash: content_hash(&data),
        });
        *binary.content.guard_mut() = data;
        binary
    }

    fn wipe(&self, buffer: &mut Vec<u8>) {
        if self.protected {
            buffer.zeroize();
        } else {
            buffer.clear();
        }
    }

    fn transform(&mut self, mut stage: Box<dyn Stage>, compressed: bool) -> Result<()> {
        let mut rewritten = Vec::new();
        {
            let current = self.content.guard();
            stage.process(&current, &mut rewritten)?;
        }
        stage.finalize(&mut rewritten)?;

        let summary = ContentSummary {
            length: rewritten.len() as u64,
            content_hash: content_hash(&rewritten),
        };
        let mut previous = std::mem::replace(&mut *self.content.guard_mut(), rewritten);
        self.wipe(&mut previous);
        self.compressed = compressed;
        self.commit(summary);
        Ok(())
    }
}

impl Default for MemoryBinary {
    fn default() -> Self {
        Self::new(false, false)
    }
}

impl BinaryData for MemoryBinary {
    fn is_compressed(&self) -> bool {
        self.compressed
    }

    fn is_protected(&self) -> bool {
        self.protected
    }

    fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        Ok(Box::new(Cursor::new(self.content.guard().clone())))
    }

    fn open_write(&self) -> Result<BinaryWriter> {
        {
            let mut current = self.content.guard_mut();
            self.wipe(&mut current);
        }
        Ok(BinaryWriter::new(Pipeline::new(), Box::new(self.content.clone())))
    }

    fn commit(&mut self, summary: ContentSummary) {
        self.length = summary.length;
        self.content_hash = summary.content_hash;
    }

    fn size(&self) -> u64 {
        self.length
    }

    fn content_hash(&self) -> i32 {
        self.content_hash
    }

    fn exists(&self) -> bool {
        self.length > 0
    }

    fn compress(&mut self) -> Result<()> {
        if self.compressed {
            return Ok(());
        }
        if self.content.guard().is_empty() {
            self.compressed = true;
            return Ok(());
        }
        self.transform(Box::new(GzipEncoder::new(self.compression_level)), true)
    }

    fn decompress(&mut self) -> Result<()> {
        if !self.compressed {
            return Ok(());
        }
        if self.content.guard().is_empty() {
            self.compressed = false;
            return Ok(());
        }
        self.transform(Box::new(GzipDecoder::new()), false)
    }

    fn clear(&mut self) -> Result<()> {
        {
            let mut current = self.content.guard_mut();
            self.wipe(&mut current);
        }
        self.length = 0;
        self.content_hash = 0;
        Ok(())
    }

    fn compression_level(&self) -> u32 {
        self.compression_level
    }
}

impl PartialEq for MemoryBinary {
    fn eq(&self, other: &Self) -> bool {
        self.compressed == other.compressed
            && self.protected == other.protected
            && *self.content.guard() == *other.content.guard()
    }
}

impl std::fmt::Debug for MemoryBinary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBinary")
            .field("length", &self.length)
            .field("content_hash", &self.content_hash)
            .field("compressed", &self.compressed)
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}
