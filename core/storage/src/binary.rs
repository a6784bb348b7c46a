//! Binary storage contract shared by every attachment backend.

use std::io::{self, Read, Write};

use binvault_common::{Error, Result, Stage};
use binvault_crypto::{ContentDigest, ContentSummary};

use crate::codec::{GzipDecoder, GzipEncoder, DEFAULT_COMPRESSION_LEVEL};
use crate::pipeline::{Pipeline, PipelineReader, PipelineWriter};

/// Write session on a binary.
///
/// Bytes flow through the optional payload stages (gzip), are counted and
/// hashed, then pass through the storage stages (encryption, encoding) into
/// the sink. [`BinaryWriter::finish`] returns the [`ContentSummary`] of the
/// counted bytes; the owning binary only adopts it through
/// [`BinaryData::commit`]. A writer dropped without `finish` leaves the
/// binary's size and hash stale.
pub struct BinaryWriter {
    payload: Pipeline,
    digest: ContentDigest,
    storage: PipelineWriter<Box<dyn Write + Send>>,
}

impl BinaryWriter {
    /// Create a writer from the storage stages and the sink they feed.
    pub fn new(storage: Pipeline, sink: Box<dyn Write + Send>) -> Self {
        Self {
            payload: Pipeline::new(),
            digest: ContentDigest::new(),
            storage: PipelineWriter::new(storage, sink),
        }
    }

    /// Add a stage applied before counting and hashing.
    pub fn with_payload_stage(mut self, stage: impl Stage + 'static) -> Self {
        self.payload = self.payload.then(stage);
        self
    }

    /// Bytes counted so far.
    pub fn written(&self) -> u64 {
        self.digest.length()
    }

    fn forward(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        self.digest.update(bytes);
        self.storage.write_all(bytes).map_err(Error::from_io)
    }

    /// Flush every stage and the sink, returning the length and hash of the
    /// bytes that reached storage.
    pub fn finish(mut self) -> Result<ContentSummary> {
        let mut tail = Vec::new();
        self.payload.finalize(&mut tail)?;
        self.forward(&tail)?;
        self.storage.finish()?;
        Ok(self.digest.finish())
    }
}

impl Write for BinaryWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.payload.is_empty() {
            self.forward(buf)?;
        } else {
            let mut out = Vec::new();
            self.payload.process(buf, &mut out)?;
            self.forward(&out)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.storage.flush()
    }
}

/// Polymorphic binary storage capability.
///
/// Implementations hold the stored representation of one attachment (the
/// gzip stream when [`BinaryData::is_compressed`] is set) and cache the size
/// and content hash of the last committed write.
///
/// # Concurrency
/// One writer at a time per instance. Mutating operations take `&mut self`;
/// read streams may be opened concurrently while no write is in flight.
pub trait BinaryData: Send + Sync {
    /// Whether the stored representation is gzip-compressed.
    fn is_compressed(&self) -> bool;

    /// Whether the content needs extra in-memory care.
    fn is_protected(&self) -> bool;

    /// Open a stream over the stored bytes, regardless of compression.
    ///
    /// A binary without content yields an empty stream.
    fn open_read(&self) -> Result<Box<dyn Read + Send>>;

    /// Start a write session replacing the stored bytes.
    ///
    /// # Errors
    /// - [`Error::DestinationUnknown`] if there is nowhere to write
    fn open_write(&self) -> Result<BinaryWriter>;

    /// Adopt the summary of a finished write session.
    fn commit(&mut self, summary: ContentSummary);

    /// Size of the stored bytes as of the last committed write.
    fn size(&self) -> u64;

    /// Content hash of the stored bytes as of the last committed write.
    ///
    /// Only an equality signal; it is not an integrity check.
    fn content_hash(&self) -> i32;

    /// Whether the binary currently holds content.
    fn exists(&self) -> bool;

    /// Rewrite the stored bytes gzip-compressed. No-op when already compressed.
    fn compress(&mut self) -> Result<()>;

    /// Rewrite the stored bytes uncompressed. No-op when not compressed.
    fn decompress(&mut self) -> Result<()>;

    /// Drop the content.
    fn clear(&mut self) -> Result<()>;

    /// Gzip level used for compressed payloads.
    fn compression_level(&self) -> u32 {
        DEFAULT_COMPRESSION_LEVEL
    }

    /// Open a stream over the attachment payload, decompressing if needed.
    fn open_read_payload(&self) -> Result<Box<dyn Read + Send>> {
        let stored = self.open_read()?;
        if !self.is_compressed() {
            return Ok(stored);
        }
        let pipeline = Pipeline::new().then(GzipDecoder::new());
        Ok(Box::new(PipelineReader::new(stored, pipeline)))
    }

    /// Start a write session taking attachment payload bytes, compressing
    /// them if the binary is compressed.
    fn open_write_payload(&self) -> Result<BinaryWriter> {
        let writer = self.open_write()?;
        if !self.is_compressed() {
            return Ok(writer);
        }
        Ok(writer.with_payload_stage(GzipEncoder::new(self.compression_level())))
    }

    /// Replace the payload with everything from `reader` and commit.
    fn write_all_from(&mut self, reader: &mut dyn Read) -> Result<ContentSummary> {
        let mut writer = self.open_write_payload()?;
        io::copy(reader, &mut writer).map_err(Error::from_io)?;
        let summary = writer.finish()?;
        self.commit(summary);
        Ok(summary)
    }

    /// Read the whole payload into memory.
    fn read_payload(&self) -> Result<Vec<u8>> {
        let mut reader = self.open_read_payload()?;
        let mut data = Vec::new();
        reader.read_to_end(&mut data).map_err(Error::from_io)?;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use binvault_crypto::content_hash;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Shared(Arc<Mutex<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_writer_counts_and_hashes_stored_bytes() {
        let sink = Shared::default();
        let mut writer = BinaryWriter::new(Pipeline::new(), Box::new(sink.clone()));
        writer.write_all(b"hello ").unwrap();
        writer.write_all(b"world").unwrap();
        assert_eq!(writer.written(), 11);

        let summary = writer.finish().unwrap();
        assert_eq!(summary.length, 11);
        assert_eq!(summary.content_hash, content_hash(b"hello world"));
        assert_eq!(&*sink.0.lock().unwrap(), b"hello world");
    }

    #[test]
    fn test_payload_stage_runs_before_digest() {
        let sink = Shared::default();
        let mut writer = BinaryWriter::new(Pipeline::new(), Box::new(sink.clone()))
            .with_payload_stage(GzipEncoder::default());
        writer.write_all(b"hello world").unwrap();
        let summary = writer.finish().unwrap();

        let stored = sink.0.lock().unwrap().clone();
        assert_eq!(summary.length, stored.len() as u64);
        assert_eq!(summary.content_hash, content_hash(&stored));
    }
}
