//! Session cipher keys with secure memory handling.
//!
//! The session key protects attachment bytes while they sit in private
//! temporary storage. It is generated when a database session opens, lives
//! only in memory and is zeroized on drop. It is unrelated to the database
//! master key.

use chacha20poly1305::aead::{rand_core::RngCore, OsRng};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

/// Length of the session initialization vector in bytes.
pub const IV_LENGTH: usize = 16;

/// Symmetric key and IV protecting attachments for one session.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct CipherKey {
    key: [u8; KEY_LENGTH],
    iv: [u8; IV_LENGTH],
}

impl CipherKey {
    /// Create a cipher key from raw parts.
    pub fn from_parts(key: [u8; KEY_LENGTH], iv: [u8; IV_LENGTH]) -> Self {
        Self { key, iv }
    }

    /// Generate a random key and IV from the OS RNG.
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LENGTH];
        let mut iv = [0u8; IV_LENGTH];
        OsRng.fill_bytes(&mut key);
        OsRng.fill_bytes(&mut iv);
        Self { key, iv }
    }

    /// Get the key bytes.
    ///
    /// # Security
    /// The returned slice should be used immediately and not stored.
    pub fn key(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Get the IV bytes.
    pub fn iv(&self) -> &[u8; IV_LENGTH] {
        &self.iv
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey([REDACTED])")
    }
}

/// Source of the current session's cipher key.
///
/// The key must stay the same for the whole session; every stream opened
/// during the session derives its own cipher instance from it.
pub trait CipherKeyProvider: Send + Sync {
    /// The key of the open session.
    fn current_key(&self) -> &CipherKey;
}

/// In-memory key provider for one database session.
///
/// The key is generated on construction, so a provider without a key cannot
/// exist. Dropping the session zeroizes the key.
pub struct SessionCipher {
    key: CipherKey,
}

impl SessionCipher {
    /// Open a session with a freshly generated key.
    pub fn generate() -> Self {
        Self {
            key: CipherKey::generate(),
        }
    }

    /// Open a session around an existing key.
    pub fn with_key(key: CipherKey) -> Self {
        Self { key }
    }
}

impl CipherKeyProvider for SessionCipher {
    fn current_key(&self) -> &CipherKey {
        &self.key
    }
}

impl fmt::Debug for SessionCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCipher").finish_non_exhaustive()
    }
}
