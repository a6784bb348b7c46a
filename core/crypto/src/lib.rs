//! Cryptographic primitives for BinVault.
//!
//! This module provides:
//! - Session cipher keys with automatic zeroization
//! - Frame-level authenticated encryption using XChaCha20-Poly1305
//! - Streaming encryption stages for attachments of any size
//! - Byte counting and content hashing for write sessions
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged

pub mod aead;
pub mod digest;
pub mod keys;
pub mod stream;

pub use digest::{content_hash, ContentDigest, ContentSummary};
pub use keys::{CipherKey, CipherKeyProvider, SessionCipher};
pub use stream::{DecryptingStream, EncryptingStream};
