//! Common error types for BinVault.
//!
//! Every failure raised by the binary store is a variant of [`Error`]. The
//! variants collapse onto a flat [`ErrorKind`] which carries the message key
//! used by [`crate::message`] to render user-facing text.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Top-level error type for BinVault operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A write was requested on a binary with no backing path.
    #[error("Unable to write to an undisclosed destination")]
    DestinationUnknown,

    /// Reading or writing a backing file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A file could not be removed.
    #[error("Unable to delete {}: {source}", path.display())]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Cryptographic operation failed.
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Stored bytes could not be decoded (base64 or gzip).
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A background task did not complete.
    #[error("Background task failed: {0}")]
    Background(String),

    /// I/O operation failed without path context.
    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),
}

/// Flat classification of [`Error`] used for localization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DestinationUnknown,
    Io,
    Delete,
    Crypto,
    Encoding,
    InvalidInput,
    Background,
    Stream,
}

impl ErrorKind {
    /// Key under which the localized message for this kind is stored.
    pub fn message_key(self) -> &'static str {
        match self {
            ErrorKind::DestinationUnknown => "error_unable_write_undisclosed_destination",
            ErrorKind::Io => "error_binary_io",
            ErrorKind::Delete => "error_unable_delete_file",
            ErrorKind::Crypto => "error_binary_cipher",
            ErrorKind::Encoding => "error_binary_encoding",
            ErrorKind::InvalidInput => "error_invalid_input",
            ErrorKind::Background => "error_background_task",
            ErrorKind::Stream => "error_binary_stream",
        }
    }
}

impl Error {
    /// Build an [`Error::Io`] for `path`.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Build an [`Error::Delete`] for `path`.
    pub fn delete(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Error::Delete {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Recover an [`Error`] that travelled through a `std::io` boundary.
    ///
    /// Pipelines expose `Read`/`Write`, so stage failures are wrapped into
    /// `io::Error`; this unwraps them again and keeps plain I/O failures as
    /// [`Error::Stream`].
    pub fn from_io(err: std::io::Error) -> Self {
        if !err.get_ref().is_some_and(|inner| inner.is::<Error>()) {
            return Error::Stream(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Error::Stream(std::io::Error::other(other)),
            None => Error::Stream(std::io::Error::other("stream failure")),
        }
    }

    /// The flat kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::DestinationUnknown => ErrorKind::DestinationUnknown,
            Error::Io { .. } => ErrorKind::Io,
            Error::Stream(_) => ErrorKind::Stream,
            Error::Delete { .. } => ErrorKind::Delete,
            Error::Crypto(_) => ErrorKind::Crypto,
            Error::Encoding(_) => ErrorKind::Encoding,
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::Background(_) => ErrorKind::Background,
        }
    }

    /// Message key of this error's kind.
    pub fn message_key(&self) -> &'static str {
        self.kind().message_key()
    }

    /// Positional parameters substituted into the localized message.
    pub fn params(&self) -> Vec<String> {
        match self {
            Error::DestinationUnknown => Vec::new(),
            Error::Io { path, source } | Error::Delete { path, source } => {
                vec![path.display().to_string(), source.to_string()]
            }
            Error::Stream(source) => vec![source.to_string()],
            Error::Crypto(detail)
            | Error::Encoding(detail)
            | Error::InvalidInput(detail)
            | Error::Background(detail) => vec![detail.clone()],
        }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Stream(inner) => inner,
            other => std::io::Error::other(other),
        }
    }
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
