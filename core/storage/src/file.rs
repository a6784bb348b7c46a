//! Encrypted file-backed binary.
//!
//! The backing file lives in the session's private temporary directory and
//! holds `base64(encrypt(payload))`, where the payload is gzip-compressed
//! when the binary is flagged compressed. No header is written: the
//! compression state exists only in [`FileBinary`] and its [`BinaryRecord`].

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use binvault_common::{Error, Result, Stage};
use binvault_crypto::{CipherKeyProvider, ContentSummary, DecryptingStream, EncryptingStream};

use crate::binary::{BinaryData, BinaryWriter};
use crate::codec::{
    Base64Decoder, Base64Encoder, GzipDecoder, GzipEncoder, DEFAULT_COMPRESSION_LEVEL,
};
use crate::pipeline::{Pipeline, PipelineReader};

/// Suffix of the sibling file used while compressing or decompressing.
pub const TEMP_SUFFIX: &str = "_temp";

/// Serializable description of a [`FileBinary`].
///
/// Persisted next to the entry that owns the attachment. The cipher key is
/// never part of it, so a record is only readable within its session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryRecord {
    /// Backing file, if any.
    pub path: Option<PathBuf>,
    /// Size of the stored bytes.
    pub length: u64,
    /// Content hash of the stored bytes.
    pub content_hash: i32,
    /// Whether the stored bytes are gzip-compressed.
    pub compressed: bool,
    /// Whether the content is memory-sensitive.
    pub protected: bool,
}

/// Attachment stored encrypted in a file.
pub struct FileBinary {
    backing_file: Option<PathBuf>,
    length: u64,
    content_hash: i32,
    compressed: bool,
    protected: bool,
    compression_level: u32,
    keys: Arc<dyn CipherKeyProvider>,
}

impl FileBinary {
    /// Create an empty binary backed by `path`.
    ///
    /// # Postconditions
    /// - `size() == 0`, `content_hash() == 0`, `exists() == false`
    /// - Nothing is written until the first write session
    pub fn new(path: impl Into<PathBuf>, keys: Arc<dyn CipherKeyProvider>) -> Self {
        Self {
            backing_file: Some(path.into()),
            length: 0,
            content_hash: 0,
            compressed: false,
            protected: false,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            keys,
        }
    }

    /// Create a binary with no backing path.
    ///
    /// Reads yield nothing and writes fail with [`Error::DestinationUnknown`].
    pub fn unbacked(keys: Arc<dyn CipherKeyProvider>) -> Self {
        Self {
            backing_file: None,
            ..Self::new(PathBuf::new(), keys)
        }
    }

    /// Rebuild a binary from a persisted record.
    pub fn from_record(record: BinaryRecord, keys: Arc<dyn CipherKeyProvider>) -> Self {
        Self {
            backing_file: record.path,
            length: record.length,
            content_hash: record.content_hash,
            compressed: record.compressed,
            protected: record.protected,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            keys,
        }
    }

    /// Set the initial compression and protection flags.
    pub fn with_flags(mut self, compressed: bool, protected: bool) -> Self {
        self.compressed = compressed;
        self.protected = protected;
        self
    }

    /// Set the gzip level used by compress and payload writes.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    /// The backing file path.
    pub fn path(&self) -> Option<&Path> {
        self.backing_file.as_deref()
    }

    /// Describe this binary for persistence.
    pub fn record(&self) -> BinaryRecord {
        BinaryRecord {
            path: self.backing_file.clone(),
            length: self.length,
            content_hash: self.content_hash,
            compressed: self.compressed,
            protected: self.protected,
        }
    }

    /// Whether the backing file is present and non-empty.
    fn has_stored_bytes(&self, path: &Path) -> Result<bool> {
        match fs::metadata(path) {
            Ok(meta) => Ok(meta.len() > 0),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::io(path, e)),
        }
    }

    /// Encrypting write session targeting `path` (created or truncated).
    fn writer_for(&self, path: &Path) -> Result<BinaryWriter> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        let storage = Pipeline::new()
            .then(EncryptingStream::new(self.keys.current_key()))
            .then(Base64Encoder::new());
        Ok(BinaryWriter::new(storage, Box::new(BufWriter::new(file))))
    }

    /// Stream the stored bytes through `stage` into a sibling file, then swap
    /// it in place of the canonical file.
    ///
    /// The canonical file and the compression flag stay untouched unless the
    /// whole rewrite succeeded. The swap is a rename over the canonical path,
    /// so there is never a moment without a file under that name.
    fn rewrite(&mut self, stage: Box<dyn Stage>, compressed: bool) -> Result<()> {
        let canonical = self
            .backing_file
            .clone()
            .ok_or(Error::DestinationUnknown)?;

        if !self.has_stored_bytes(&canonical)? {
            debug!(path = %canonical.display(), compressed, "No stored bytes, flipping flag only");
            self.compressed = compressed;
            return Ok(());
        }

        let temp = temp_path(&canonical);
        let source = self.open_read()?;
        let mut writer = self.writer_for(&temp)?;

        let piped = (|| -> Result<ContentSummary> {
            let mut reader = PipelineReader::new(source, Pipeline::new().then_boxed(stage));
            io::copy(&mut reader, &mut writer).map_err(Error::from_io)?;
            writer.finish()
        })();

        let summary = match piped {
            Ok(summary) => summary,
            Err(err) => {
                discard_temp(&temp);
                return Err(err);
            }
        };

        if let Err(e) = fs::rename(&temp, &canonical) {
            discard_temp(&temp);
            return Err(Error::io(&canonical, e));
        }

        self.compressed = compressed;
        self.commit(summary);
        debug!(
            path = %canonical.display(),
            compressed,
            length = summary.length,
            "Rewrote binary"
        );
        Ok(())
    }
}

/// Sibling path used while rewriting `canonical`.
pub fn temp_path(canonical: &Path) -> PathBuf {
    let mut name = OsString::from(canonical.as_os_str());
    name.push(TEMP_SUFFIX);
    PathBuf::from(name)
}

fn discard_temp(temp: &Path) {
    match fs::remove_file(temp) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %temp.display(), error = %e, "Unable to remove temporary file"),
    }
}

impl BinaryData for FileBinary {
    fn is_compressed(&self) -> bool {
        self.compressed
    }

    fn is_protected(&self) -> bool {
        self.protected
    }

    fn open_read(&self) -> Result<Box<dyn Read + Send>> {
        let path = match &self.backing_file {
            Some(path) => path,
            None => return Ok(Box::new(io::empty())),
        };
        if !self.has_stored_bytes(path)? {
            return Ok(Box::new(io::empty()));
        }

        let file = File::open(path).map_err(|e| Error::io(path, e))?;
        let pipeline = Pipeline::new()
            .then(Base64Decoder::new())
            .then(DecryptingStream::new(self.keys.current_key()));
        Ok(Box::new(PipelineReader::new(BufReader::new(file), pipeline)))
    }

    fn open_write(&self) -> Result<BinaryWriter> {
        let path = self
            .backing_file
            .as_deref()
            .ok_or(Error::DestinationUnknown)?;
        self.writer_for(path)
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
        self.backing_file.is_some() && self.length > 0
    }

    fn compress(&mut self) -> Result<()> {
        if self.compressed {
            return Ok(());
        }
        let stage = Box::new(GzipEncoder::new(self.compression_level));
        self.rewrite(stage, true)
    }

    fn decompress(&mut self) -> Result<()> {
        if !self.compressed {
            return Ok(());
        }
        self.rewrite(Box::new(GzipDecoder::new()), false)
    }

    fn clear(&mut self) -> Result<()> {
        if let Some(path) = &self.backing_file {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Deleted binary file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::delete(path, e)),
            }
        }
        self.length = 0;
        self.content_hash = 0;
        Ok(())
    }

    fn compression_level(&self) -> u32 {
        self.compression_level
    }
}

impl PartialEq for FileBinary {
    fn eq(&self, other: &Self) -> bool {
        self.backing_file == other.backing_file
            && self.compressed == other.compressed
            && self.protected == other.protected
    }
}

impl Eq for FileBinary {}

impl fmt::Debug for FileBinary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileBinary")
            .field("backing_file", &self.backing_file)
            .field("length", &self.length)
            .field("content_hash", &self.content_hash)
            .field("compressed", &self.compressed)
            .field("protected", &self.protected)
            .finish_non_exhaustive()
    }
}
