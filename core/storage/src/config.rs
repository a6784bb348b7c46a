//! Attachment store configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use binvault_common::{Error, Result};

use crate::codec::DEFAULT_COMPRESSION_LEVEL;

/// Settings for an [`crate::AttachmentStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Private directory holding the session's backing files. Defaults to a
    /// fresh directory under the system temp dir.
    pub root: PathBuf,
    /// Gzip level (0-9) used when compressing attachments.
    pub compression_level: u32,
    /// Remove `*_temp` leftovers of interrupted rewrites when opening.
    pub sweep_stale_on_open: bool,
}

impl StoreConfig {
    /// Default settings rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::InvalidInput(format!("Invalid store config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::InvalidInput(format!("Unserializable store config: {}", e)))
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.compression_level > 9 {
            return Err(Error::InvalidInput(format!(
                "compression_level must be 0-9, got {}",
                self.compression_level
            )));
        }
        if self.root.as_os_str().is_empty() {
            return Err(Error::InvalidInput("root must not be empty".to_string()));
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join(format!("binvault-{}", Uuid::new_v4().simple())),
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            sweep_stale_on_open: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = StoreConfig::from_json(r#"{ "root": "/tmp/bins" }"#).unwrap();
        assert_eq!(config.root, PathBuf::from("/tmp/bins"));
        assert_eq!(config.compression_level, DEFAULT_COMPRESSION_LEVEL);
        assert!(config.sweep_stale_on_open);
    }

    #[test]
    fn test_json_roundtrip() {
        let config = StoreConfig {
            root: PathBuf::from("/var/tmp/x"),
            compression_level: 9,
            sweep_stale_on_open: false,
        };
        let parsed = StoreConfig::from_json(&config.to_json().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_rejects_bad_level() {
        let err = StoreConfig::from_json(r#"{ "compression_level": 12 }"#).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_default_roots_are_distinct() {
        assert_ne!(StoreConfig::default().root, StoreConfig::default().root);
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(StoreConfig::from_json("{ root: ").is_err());
    }
}
