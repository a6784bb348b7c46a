//! Streaming encryption for large attachments.
//!
//! Plaintext is cut into frames of [`FRAME_SIZE`] bytes, each sealed
//! independently. The frame index is bound through the nonce and the final
//! frame is marked through the associated data, so reordering, truncation and
//! appended garbage are all detected.
//!
//! # Format
//! - Header: [`HEADER_SIZE`] random bytes drawn for every stream
//! - Frames: `[ciphertext + tag]` for each frame
//! - Every frame but the last carries exactly `FRAME_SIZE` plaintext bytes
//! - The last frame carries fewer (possibly zero) bytes
//!
//! Frame nonces are `(session IV xor header) || frame index`. The header is
//! fresh per stream, so two streams under one session key never share a
//! nonce, even when they hold the same plaintext.

use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use chacha20poly1305::XChaCha20Poly1305;

use binvault_common::{Error, Result, Stage};
use crate::aead::{cipher_for, frame_nonce, open, seal, TAG_SIZE};
use crate::keys::{CipherKey, IV_LENGTH};

/// Plaintext bytes per frame (64 KiB).
pub const FRAME_SIZE: usize = 64 * 1024;

/// Ciphertext bytes of a full frame.
pub const SEALED_FRAME_SIZE: usize = FRAME_SIZE + TAG_SIZE;

/// Random per-stream header preceding the frames.
pub const HEADER_SIZE: usize = IV_LENGTH;

const AAD_INNER: [u8; 1] = [0];
const AAD_FINAL: [u8; 1] = [1];

/// Nonce prefix of one stream.
fn stream_prefix(iv: &[u8; IV_LENGTH], header: &[u8; HEADER_SIZE]) -> [u8; IV_LENGTH] {
    let mut prefix = *iv;
    for (p, h) in prefix.iter_mut().zip(header) {
        *p ^= h;
    }
    prefix
}

/// Encrypting stage.
pub struct EncryptingStream {
    cipher: XChaCha20Poly1305,
    header: Option<[u8; HEADER_SIZE]>,
    prefix: [u8; IV_LENGTH],
    index: u64,
    pending: Vec<u8>,
    frame_size: usize,
}

impl EncryptingStream {
    /// Create an encrypting stage keyed from `key` with a fresh random header.
    pub fn new(key: &CipherKey) -> Self {
        let mut header = [0u8; HEADER_SIZE];
        OsRng.fill_bytes(&mut header);
        Self::with_header(key, header)
    }

    fn with_header(key: &CipherKey, header: [u8; HEADER_SIZE]) -> Self {
        Self {
            cipher: cipher_for(key),
            header: Some(header),
            prefix: stream_prefix(key.iv(), &header),
            index: 0,
            pending: Vec::with_capacity(FRAME_SIZE),
            frame_size: FRAME_SIZE,
        }
    }

    /// Set custom frame size.
    ///
    /// Only useful for tests; the decrypting side must use the same size.
    pub fn with_frame_size(mut self, size: usize) -> Self {
        self.frame_size = size.max(1);
        self
    }

    fn seal_frame(&mut self, plaintext: &[u8], last: bool, out: &mut Vec<u8>) -> Result<()> {
        if let Some(header) = self.header.take() {
            out.extend_from_slice(&header);
        }
        let nonce = frame_nonce(&self.prefix, self.index);
        let aad = if last { &AAD_FINAL } else { &AAD_INNER };
        let sealed = seal(&self.cipher, &nonce, aad, plaintext)?;
        out.extend_from_slice(&sealed);
        self.index += 1;
        Ok(())
    }
}

impl Stage for EncryptingStream {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending.extend_from_slice(input);

        // A full frame is never the last one, so it can be sealed right away.
        let mut consumed = 0;
        while self.pending.len() - consumed >= self.frame_size {
            let frame = self.pending[consumed..consumed + self.frame_size].to_vec();
            self.seal_frame(&frame, false, out)?;
            consumed += self.frame_size;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let last = std::mem::take(&mut self.pending);
        self.seal_frame(&last, true, out)
    }
}

/// Decrypting stage, the inverse of [`EncryptingStream`].
pub struct DecryptingStream {
    cipher: XChaCha20Poly1305,
    iv: [u8; IV_LENGTH],
    prefix: Option<[u8; IV_LENGTH]>,
    index: u64,
    pending: Vec<u8>,
    sealed_frame_size: usize,
}

impl DecryptingStream {
    /// Create a decrypting stage keyed from `key`.
    pub fn new(key: &CipherKey) -> Self {
        Self {
            cipher: cipher_for(key),
            iv: *key.iv(),
            prefix: None,
            index: 0,
            pending: Vec::with_capacity(SEALED_FRAME_SIZE),
            sealed_frame_size: SEALED_FRAME_SIZE,
        }
    }

    /// Set custom frame size (plaintext bytes per frame).
    pub fn with_frame_size(mut self, size: usize) -> Self {
        self.sealed_frame_size = size.max(1) + TAG_SIZE;
        self
    }

    /// Consume the header from `pending` once enough bytes arrived.
    fn take_header(&mut self) -> Option<[u8; IV_LENGTH]> {
        if self.prefix.is_none() && self.pending.len() >= HEADER_SIZE {
            let mut header = [0u8; HEADER_SIZE];
            header.copy_from_slice(&self.pending[..HEADER_SIZE]);
            self.pending.drain(..HEADER_SIZE);
            self.prefix = Some(stream_prefix(&self.iv, &header));
        }
        self.prefix
    }

    fn open_frame(
        &mut self,
        prefix: &[u8; IV_LENGTH],
        sealed: &[u8],
        last: bool,
        out: &mut Vec<u8>,
    ) -> Result<()> {
        let nonce = frame_nonce(prefix, self.index);
        let aad = if last { &AAD_FINAL } else { &AAD_INNER };
        let plaintext = open(&self.cipher, &nonce, aad, sealed)?;
        out.extend_from_slice(&plaintext);
        self.index += 1;
        Ok(())
    }
}

impl Stage for DecryptingStream {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        self.pending.extend_from_slice(input);
        let prefix = match self.take_header() {
            Some(prefix) => prefix,
            None => return Ok(()),
        };

        let mut consumed = 0;
        while self.pending.len() - consumed >= self.sealed_frame_size {
            let frame = self.pending[consumed..consumed + self.sealed_frame_size].to_vec();
            self.open_frame(&prefix, &frame, false, out)?;
            consumed += self.sealed_frame_size;
        }
        self.pending.drain(..consumed);
        Ok(())
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        let prefix = self
            .take_header()
            .ok_or_else(|| Error::Crypto("Truncated stream: missing header".to_string()))?;
        let last = std::mem::take(&mut self.pending);
        if last.len() < TAG_SIZE {
            return Err(Error::Crypto(format!(
                "Truncated stream: missing final frame after {} frames",
                self.index
            )));
        }
        self.open_frame(&prefix, &last, true, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CipherKey {
        CipherKey::from_parts([42u8; 32], [7u8; IV_LENGTH])
    }

    fn encrypt_bytes(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>> {
        let mut stage = EncryptingStream::new(key);
        let mut output = Vec::new();
        stage.process(data, &mut output)?;
        stage.finalize(&mut output)?;
        Ok(output)
    }

    fn decrypt_bytes(key: &CipherKey, data: &[u8]) -> Result<Vec<u8>> {
        let mut stage = DecryptingStream::new(key);
        let mut output = Vec::new();
        stage.process(data, &mut output)?;
        stage.finalize(&mut output)?;
        Ok(output)
    }

    #[test]
    fn test_stream_encrypt_decrypt_roundtrip() {
        let key = test_key();
        let plaintext = b"Hello, streaming encryption!";

        let encrypted = encrypt_bytes(&key, plaintext).unwrap();
        let decrypted = decrypt_bytes(&key, &encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_stream_multiple_frames() {
        let key = test_key();
        let plaintext = vec![0xAB; FRAME_SIZE * 3 + 1000];

        let encrypted = encrypt_bytes(&key, &plaintext).unwrap();
        assert_eq!(encrypted.len(), HEADER_SIZE + plaintext.len() + 4 * TAG_SIZE);

        let decrypted = decrypt_bytes(&key, &encrypted).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_exact_multiple_gets_empty_final_frame() {
        let key = test_key();
        let plaintext = vec![1u8; FRAME_SIZE * 2];

        let encrypted = encrypt_bytes(&key, &plaintext).unwrap();
        assert_eq!(encrypted.len(), HEADER_SIZE + 2 * SEALED_FRAME_SIZE + TAG_SIZE);
        assert_eq!(decrypt_bytes(&key, &encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_stream_empty_data() {
        let key = test_key();

        let encrypted = encrypt_bytes(&key, b"").unwrap();
        assert_eq!(encrypted.len(), HEADER_SIZE + TAG_SIZE);
        assert!(decrypt_bytes(&key, &encrypted).unwrap().is_empty());
    }

    #[test]
    fn test_chunked_input_matches_whole_input() {
        let key = test_key();
        let plaintext: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();

        let mut stage = EncryptingStream::new(&key).with_frame_size(64);
        let mut encrypted = Vec::new();
        for piece in plaintext.chunks(37) {
            stage.process(piece, &mut encrypted).unwrap();
        }
        stage.finalize(&mut encrypted).unwrap();

        let mut reader = DecryptingStream::new(&key).with_frame_size(64);
        let mut decrypted = Vec::new();
        for piece in encrypted.chunks(101) {
            reader.process(piece, &mut decrypted).unwrap();
        }
        reader.finalize(&mut decrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_stream_wrong_key_fails() {
        let key1 = CipherKey::from_parts([1u8; 32], [0u8; IV_LENGTH]);
        let key2 = CipherKey::from_parts([2u8; 32], [0u8; IV_LENGTH]);

        let encrypted = encrypt_bytes(&key1, b"Secret streaming data").unwrap();
        assert!(decrypt_bytes(&key2, &encrypted).is_err());
    }

    #[test]
    fn test_truncated_stream_fails() {
        let key = test_key();
        let plaintext = vec![9u8; FRAME_SIZE + 10];

        let encrypted = encrypt_bytes(&key, &plaintext).unwrap();
        // Drop the final frame entirely
        let truncated = &encrypted[..HEADER_SIZE + SEALED_FRAME_SIZE];

        let err = decrypt_bytes(&key, truncated).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    #[test]
    fn test_swapped_frames_fail() {
        let key = test_key();
        let plaintext = vec![5u8; FRAME_SIZE * 2 + 1];

        let encrypted = encrypt_bytes(&key, &plaintext).unwrap();
        let frames = &encrypted[HEADER_SIZE..];
        let mut swapped = encrypted[..HEADER_SIZE].to_vec();
        swapped.extend_from_slice(&frames[SEALED_FRAME_SIZE..2 * SEALED_FRAME_SIZE]);
        swapped.extend_from_slice(&frames[..SEALED_FRAME_SIZE]);
        swapped.extend_from_slice(&frames[2 * SEALED_FRAME_SIZE..]);

        assert!(decrypt_bytes(&key, &swapped).is_err());
    }

    #[test]
    fn test_same_plaintext_encrypts_differently() {
        let key = test_key();
        let plaintext = b"identical attachment bytes".repeat(10);

        let first = encrypt_bytes(&key, &plaintext).unwrap();
        let second = encrypt_bytes(&key, &plaintext).unwrap();

        assert_ne!(first[..HEADER_SIZE], second[..HEADER_SIZE]);
        assert_ne!(first[HEADER_SIZE..], second[HEADER_SIZE..]);
        assert_eq!(decrypt_bytes(&key, &first).unwrap(), plaintext);
        assert_eq!(decrypt_bytes(&key, &second).unwrap(), plaintext);
    }

    #[test]
    fn test_streams_do_not_share_keystream() {
        let key = test_key();
        let known = vec![0u8; 256];
        let secret = b"the treasury password is hunter2".repeat(8);

        let a = encrypt_bytes(&key, &known).unwrap();
        let b = encrypt_bytes(&key, &secret).unwrap();

        // With a shared keystream, a ^ b ^ known would reveal the secret
        let recovered: Vec<u8> = a[HEADER_SIZE..]
            .iter()
            .zip(&b[HEADER_SIZE..])
            .zip(&known)
            .map(|((x, y), p)| x ^ y ^ p)
            .take(secret.len())
            .collect();
        assert_ne!(recovered, secret);
    }

    #[test]
    fn test_tampered_header_fails() {
        let key = test_key();
        let mut encrypted = encrypt_bytes(&key, b"header bound").unwrap();
        encrypted[0] ^= 0x01;

        assert!(matches!(decrypt_bytes(&key, &encrypted), Err(Error::Crypto(_))));
    }

    #[test]
    fn test_header_only_stream_fails() {
        let key = test_key();
        let encrypted = encrypt_bytes(&key, b"cut short").unwrap();

        let err = decrypt_bytes(&key, &encrypted[..HEADER_SIZE]).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
        let err = decrypt_bytes(&key, &encrypted[..HEADER_SIZE - 1]).unwrap_err();
        assert!(matches!(err, Error::Crypto(_)));
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_roundtrip_any_chunking(
                data in prop::collection::vec(any::<u8>(), 0..2048),
                piece in 1usize..300,
            ) {
                let key = test_key();

                let mut stage = EncryptingStream::new(&key).with_frame_size(128);
                let mut encrypted = Vec::new();
                for chunk in data.chunks(piece) {
                    stage.process(chunk, &mut encrypted).unwrap();
                }
                stage.finalize(&mut encrypted).unwrap();

                let mut reader = DecryptingStream::new(&key).with_frame_size(128);
                let mut decrypted = Vec::new();
                reader.process(&encrypted, &mut decrypted).unwrap();
                reader.finalize(&mut decrypted).unwrap();

                prop_assert_eq!(decrypted, data);
            }
        }
    }
}
