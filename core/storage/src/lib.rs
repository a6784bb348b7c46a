//! Attachment binary storage for BinVault.
//!
//! This module provides the [`BinaryData`] contract and its backends:
//! - [`FileBinary`]: encrypted, file-backed, for attachments of any size
//! - [`MemoryBinary`]: in-memory, for small attachments and tests
//!
//! plus the session-scoped [`AttachmentStore`] that owns the private
//! directory and cipher key backing files depend on.
//!
//! # Design Principles
//! - Plaintext attachment bytes never touch disk
//! - Streams compose explicit stages (see [`pipeline`])
//! - Size and hash are committed only after a write finished
//! - Blocking I/O; use [`offload`] from async code

pub mod binary;
pub mod codec;
pub mod config;
pub mod file;
pub mod memory;
pub mod offload;
pub mod pipeline;
pub mod store;

pub use binary::{BinaryData, BinaryWriter};
pub use binvault_crypto::ContentSummary;
pub use config::StoreConfig;
pub use file::{BinaryRecord, FileBinary};
pub use memory::MemoryBinary;
pub use store::AttachmentStore;
