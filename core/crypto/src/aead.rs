//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! Frames are sealed with a nonce built from a per-stream prefix and the
//! frame index, so a nonce is never reused as long as prefixes are fresh.

use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, KeyInit, Payload},
    XChaCha20Poly1305,
};

use binvault_common::{Error, Result};
use crate::keys::{CipherKey, IV_LENGTH};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Build a cipher instance from the session key.
pub fn cipher_for(key: &CipherKey) -> XChaCha20Poly1305 {
    XChaCha20Poly1305::new(GenericArray::from_slice(key.key()))
}

/// Nonce for frame `index`: prefix || index (big-endian).
pub fn frame_nonce(prefix: &[u8; IV_LENGTH], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..IV_LENGTH].copy_from_slice(prefix);
    nonce[IV_LENGTH..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// Encrypt `plaintext` with an explicit nonce and associated data.
///
/// # Postconditions
/// - Returns ciphertext || tag (plaintext length + TAG_SIZE bytes)
///
/// # Security
/// - Caller is responsible for nonce uniqueness
pub fn seal(
    cipher: &XChaCha20Poly1305,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>> {
    cipher
        .encrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))
}

/// Decrypt ciphertext sealed by [`seal`].
///
/// # Errors
/// - Returns error if ciphertext is shorter than a tag
/// - Returns error if authentication fails (wrong key, nonce, aad or tampered data)
pub fn open(
    cipher: &XChaCha20Poly1305,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>> {
    if ciphertext.len() < TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    cipher
        .decrypt(
            GenericArray::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key() -> CipherKey {
        CipherKey::from_parts([42u8; 32], [3u8; IV_LENGTH])
    }

    #[test]
    fn test_seal_open_roundtrip() {
        let key = test_key();
        let cipher = cipher_for(&key);
        let nonce = frame_nonce(key.iv(), 0);

        let sealed = seal(&cipher, &nonce, &[0], b"Hello, World!").unwrap();
        assert_eq!(sealed.len(), 13 + TAG_SIZE);

        let opened = open(&cipher, &nonce, &[0], &sealed).unwrap();
        assert_eq!(opened, b"Hello, World!");
    }

    #[test]
    fn test_frame_nonce_layout() {
        let nonce = frame_nonce(&[0xAA; IV_LENGTH], 0x0102);
        assert_eq!(&nonce[..IV_LENGTH], &[0xAA; IV_LENGTH]);
        assert_eq!(&nonce[IV_LENGTH..], &[0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = test_key();
        let cipher = cipher_for(&key);
        let nonce = frame_nonce(key.iv(), 5);

        let sealed = seal(&cipher, &nonce, &[0], b"frame").unwrap();
        assert!(open(&cipher, &nonce, &[1], &sealed).is_err());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = CipherKey::from_parts([1u8; 32], [0u8; IV_LENGTH]);
        let key2 = CipherKey::from_parts([2u8; 32], [0u8; IV_LENGTH]);
        let nonce = frame_nonce(key1.iv(), 0);

        let sealed = seal(&cipher_for(&key1), &nonce, &[], b"Secret data").unwrap();
        assert!(open(&cipher_for(&key2), &nonce, &[], &sealed).is_err());
    }

    #[test]
    fn test_short_ciphertext_fails() {
        let key = test_key();
        let nonce = frame_nonce(key.iv(), 0);
        assert!(open(&cipher_for(&key), &nonce, &[], &[0u8; TAG_SIZE - 1]).is_err());
    }
}
