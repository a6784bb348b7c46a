//! Encoding and compression stages.
//!
//! Base64 is the text-safe layer wrapped around ciphertext on disk; gzip is
//! the optional compression applied to attachment payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::write::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Write;

use binvault_common::{Error, Result, Stage};

/// Default gzip level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Base64 encoding stage (standard alphabet, padded, no line wrapping).
#[derive(Debug, Default)]
pub struct Base64Encoder {
    pending: Vec<u8>,
}

impl Base64Encoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for Base64Encoder {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending.extend_from_slice(input);
        // Only whole 3-byte groups encode without padding.
        let whole = self.pending.len() / 3 * 3;
        if whole > 0 {
            out.extend_from_slice(STANDARD.encode(&self.pending[..whole]).as_bytes());
            self.pending.drain(..whole);
        }
        Ok(())
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        if !self.pending.is_empty() {
            out.extend_from_slice(STANDARD.encode(&self.pending).as_bytes());
            self.pending.clear();
        }
        Ok(())
    }
}

/// Base64 decoding stage, the inverse of [`Base64Encoder`].
///
/// ASCII whitespace is skipped so line-wrapped input also decodes.
#[derive(Debug, Default)]
pub struct Base64Decoder {
    pending: Vec<u8>,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stage for Base64Decoder {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending
            .extend(input.iter().copied().filter(|b| !b.is_ascii_whitespace()));
        let whole = self.pending.len() / 4 * 4;
        if whole > 0 {
            let decoded = STANDARD
                .decode(&self.pending[..whole])
                .map_err(|e| Error::Encoding(format!("Invalid base64: {}", e)))?;
            out.extend_from_slice(&decoded);
            self.pending.drain(..whole);
        }
        Ok(())
    }

    fn finalize(&mut self, _out: &mut Vec<u8>) -> Result<()> {
        if !self.pending.is_empty() {
            return Err(Error::Encoding(format!(
                "Truncated base64: {} dangling characters",
                self.pending.len()
            )));
        }
        Ok(())
    }
}

/// Gzip compression stage.
pub struct GzipEncoder {
    encoder: GzEncoder<Vec<u8>>,
}

impl GzipEncoder {
    /// Create an encoder with the given level (0-9).
    pub fn new(level: u32) -> Self {
        Self {
            encoder: GzEncoder::new(Vec::new(), Compression::new(level.min(9))),
        }
    }
}

impl Default for GzipEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Stage for GzipEncoder {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.encoder.write_all(input)?;
        out.append(self.encoder.get_mut());
        Ok(())
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.encoder.try_finish()?;
        out.append(self.encoder.get_mut());
        Ok(())
    }
}

/// Gzip decompression stage.
pub struct GzipDecoder {
    decoder: GzDecoder<Vec<u8>>,
}

impl GzipDecoder {
    pub fn new() -> Self {
        Self {
            decoder: GzDecoder::new(Vec::new()),
        }
    }
}

impl Default for GzipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage for GzipDecoder {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.decoder
            .write_all(input)
            .map_err(|e| Error::Encoding(format!("Invalid gzip data: {}", e)))?;
        out.append(self.decoder.get_mut());
        Ok(())
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        self.decoder
            .try_finish()
            .map_err(|e| Error::Encoding(format!("Invalid gzip data: {}", e)))?;
        out.append(self.decoder.get_mut());
        Ok(())
    }
}
