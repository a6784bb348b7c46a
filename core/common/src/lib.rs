//! Common utilities and types shared across BinVault modules.
//!
//! This module provides the error taxonomy, its message table, and the
//! [`Stage`] contract every byte transform implements.

pub mod error;
pub mod message;
pub mod stage;

pub use error::{Error, ErrorKind, Result};
pub use message::MessageTable;
pub use stage::Stage;
