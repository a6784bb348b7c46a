//! Session-scoped attachment store.
//!
//! Owns the private temporary directory that backing files live in and the
//! session cipher protecting them. Records created by one store can only be
//! read back through the same store, since the key dies with it.
//!
//! The directory is marked with [`STORE_MARKER`] when first opened. A
//! non-empty directory without the marker is refused, so sweeping and
//! teardown only ever touch directories the store created.

use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use binvault_common::{Error, Result};
use binvault_crypto::{CipherKeyProvider, SessionCipher};

use crate::binary::BinaryData;
use crate::config::StoreConfig;
use crate::file::{BinaryRecord, FileBinary, TEMP_SUFFIX};

/// File marking a directory as owned by an attachment store.
pub const STORE_MARKER: &str = ".binvault-store";

/// Private storage for one database session's attachments.
#[derive(Debug)]
pub struct AttachmentStore {
    config: StoreConfig,
    keys: Arc<SessionCipher>,
}

impl AttachmentStore {
    /// Open the store with a fresh session key.
    ///
    /// # Postconditions
    /// - `config.root` exists
    /// - Stale temporary files are removed if `sweep_stale_on_open` is set
    ///
    /// # Errors
    /// - Invalid configuration
    /// - Root is a non-empty directory not created by a store
    /// - Root directory cannot be created
    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::open_with(config, SessionCipher::generate())
    }

    /// Open the store around an existing session cipher.
    pub fn open_with(config: StoreConfig, keys: SessionCipher) -> Result<Self> {
        config.validate()?;
        claim_root(&config.root)?;

        let store = Self {
            config,
            keys: Arc::new(keys),
        };

        if store.config.sweep_stale_on_open {
            let removed = store.sweep_stale()?;
            if removed > 0 {
                warn!(removed, "Removed stale temporary binaries");
            }
        }

        info!(root = %store.root().display(), "Opened attachment store");
        Ok(store)
    }

    /// Directory holding the backing files.
    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Store configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Key provider shared by every binary of this store.
    pub fn key_provider(&self) -> Arc<dyn CipherKeyProvider> {
        self.keys.clone()
    }

    /// Allocate an empty binary at a fresh path under the root.
    pub fn new_binary(&self, compressed: bool, protected: bool) -> FileBinary {
        let path = self.root().join(Uuid::new_v4().simple().to_string());
        debug!(path = %path.display(), "Allocated binary");
        FileBinary::new(path, self.key_provider())
            .with_flags(compressed, protected)
            .with_compression_level(self.config.compression_level)
    }

    /// Rebuild a binary from a record created by this store.
    pub fn restore(&self, record: BinaryRecord) -> FileBinary {
        FileBinary::from_record(record, self.key_provider())
            .with_compression_level(self.config.compression_level)
    }

    /// Delete a binary's backing file.
    pub fn remove(&self, mut binary: FileBinary) -> Result<()> {
        binary.clear()
    }

    /// Remove leftover `*_temp` files from interrupted rewrites.
    ///
    /// Returns the number of files removed.
    pub fn sweep_stale(&self) -> Result<usize> {
        let entries = fs::read_dir(self.root()).map_err(|e| Error::io(self.root(), e))?;

        let mut removed = 0;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(self.root(), e))?;
            let path = entry.path();
            let is_temp = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with(TEMP_SUFFIX));
            if !is_temp || !path.is_file() {
                continue;
            }
            fs::remove_file(&path).map_err(|e| Error::delete(&path, e))?;
            debug!(path = %path.display(), "Removed stale temporary binary");
            removed += 1;
        }

        Ok(removed)
    }

    /// Delete the whole directory, ending the session.
    ///
    /// Only reachable for directories carrying [`STORE_MARKER`].
    ///
    /// # Errors
    /// - The directory exists but could not be removed
    pub fn teardown(self) -> Result<()> {
        match fs::remove_dir_all(&self.config.root) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::delete(&self.config.root, e)),
        }
        info!(root = %self.config.root.display(), "Tore down attachment store");
        Ok(())
    }
}

/// Create `root` or adopt it if it is empty or already a store directory.
fn claim_root(root: &Path) -> Result<()> {
    let marker = root.join(STORE_MARKER);
    match fs::read_dir(root) {
        Ok(mut entries) => {
            if !marker.is_file() && entries.next().is_some() {
                return Err(Error::InvalidInput(format!(
                    "{} is not empty and was not created by an attachment store",
                    root.display()
                )));
            }
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(root).map_err(|e| Error::io(root, e))?;
        }
        Err(e) => return Err(Error::io(root, e)),
    }
    if !marker.is_file() {
        fs::write(&marker, b"").map_err(|e| Error::io(&marker, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::temp_path;
    use tempfile::TempDir;

    fn store_in(temp: &TempDir) -> AttachmentStore {
        AttachmentStore::open(StoreConfig::new(temp.path().join("binaries"))).unwrap()
    }

    #[test]
    fn test_open_creates_root() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        assert!(store.root().is_dir());
    }

    #[test]
    fn test_new_binaries_get_distinct_paths() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let a = store.new_binary(false, false);
        let b = store.new_binary(false, true);

        assert_ne!(a.path(), b.path());
        assert_eq!(a.path().unwrap().parent(), Some(store.root()));
        assert!(b.is_protected());
    }

    #[test]
    fn test_restore_reads_back_within_session() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut binary = store.new_binary(true, false);
        binary.write_all_from(&mut &b"entry attachment"[..]).unwrap();
        let record = binary.record();

        let restored = store.restore(record);
        assert!(restored.is_compressed());
        assert_eq!(restored.read_payload().unwrap(), b"entry attachment");
    }

    #[test]
    fn test_sweep_removes_only_temp_files() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut binary = store.new_binary(false, false);
        binary.write_all_from(&mut &b"keep"[..]).unwrap();
        let stale = temp_path(binary.path().unwrap());
        fs::write(&stale, b"leftover").unwrap();

        assert_eq!(store.sweep_stale().unwrap(), 1);
        assert!(!stale.exists());
        assert_eq!(binary.read_payload().unwrap(), b"keep");
    }

    #[test]
    fn test_open_sweeps_when_configured() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("binaries");
        fs::create_dir_all(&root).unwrap();
        fs::write(root.join(STORE_MARKER), b"").unwrap();
        fs::write(root.join("abc_temp"), b"stale").unwrap();

        let _store = AttachmentStore::open(StoreConfig::new(&root)).unwrap();
        assert!(!root.join("abc_temp").exists());
    }

    #[test]
    fn test_foreign_directory_is_left_alone() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("documents");
        fs::create_dir_all(root.join("photos")).unwrap();
        fs::write(root.join("report.txt"), b"keep me").unwrap();
        fs::write(root.join("draft_temp"), b"keep me too").unwrap();

        let err = AttachmentStore::open(StoreConfig::new(&root)).unwrap_err();

        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(fs::read(root.join("report.txt")).unwrap(), b"keep me");
        assert_eq!(fs::read(root.join("draft_temp")).unwrap(), b"keep me too");
        assert!(root.join("photos").is_dir());
        assert!(!root.join(STORE_MARKER).exists());
    }

    #[test]
    fn test_empty_existing_directory_is_adopted() {
        let temp = TempDir::new().unwrap();
        let store = AttachmentStore::open(StoreConfig::new(temp.path())).unwrap();
        assert!(temp.path().join(STORE_MARKER).is_file());
        store.teardown().unwrap();
        assert!(!temp.path().exists());
    }

    #[test]
    fn test_marked_directory_can_be_reopened() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("binaries");
        let first = AttachmentStore::open(StoreConfig::new(&root)).unwrap();
        let mut binary = first.new_binary(false, false);
        binary.write_all_from(&mut &b"left behind"[..]).unwrap();
        drop(first);

        let second = AttachmentStore::open(StoreConfig::new(&root)).unwrap();
        assert_eq!(second.root(), root.as_path());
    }

    #[test]
    fn test_remove_deletes_backing_file() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);

        let mut binary = store.new_binary(false, false);
        binary.write_all_from(&mut &b"gone soon"[..]).unwrap();
        let path = binary.path().unwrap().to_path_buf();

        store.remove(binary).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_teardown_removes_directory() {
        let temp = TempDir::new().unwrap();
        let store = store_in(&temp);
        let mut binary = store.new_binary(false, false);
        binary.write_all_from(&mut &b"session data"[..]).unwrap();
        let root = store.root().to_path_buf();

        store.teardown().unwrap();
        assert!(!root.exists());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let temp = TempDir::new().unwrap();
        let config = StoreConfig {
            compression_level: 42,
            ..StoreConfig::new(temp.path())
        };
        assert!(matches!(AttachmentStore::open(config), Err(Error::InvalidInput(_))));
    }
}
