//! Run long binary rewrites off the async executor.
//!
//! Compress and decompress stream the whole attachment and block. These
//! helpers move the binary onto tokio's blocking pool and hand it back when
//! the rewrite is over, so no second rewrite of the same instance can start
//! while one is in flight.

use std::fmt;

use binvault_common::{Error, Result};

use crate::binary::BinaryData;

/// A failed offloaded rewrite.
///
/// `binary` is handed back unless the blocking task itself was lost.
pub struct OffloadError<B> {
    pub binary: Option<B>,
    pub error: Error,
}

impl<B> fmt::Debug for OffloadError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OffloadError")
            .field("recovered", &self.binary.is_some())
            .field("error", &self.error)
            .finish()
    }
}

impl<B> fmt::Display for OffloadError<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl<B> std::error::Error for OffloadError<B> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Compress `binary` on the blocking pool.
pub async fn compress<B>(binary: B) -> std::result::Result<B, OffloadError<B>>
where
    B: BinaryData + 'static,
{
    run(binary, |b| b.compress()).await
}

/// Decompress `binary` on the blocking pool.
pub async fn decompress<B>(binary: B) -> std::result::Result<B, OffloadError<B>>
where
    B: BinaryData + 'static,
{
    run(binary, |b| b.decompress()).await
}

async fn run<B, F>(mut binary: B, op: F) -> std::result::Result<B, OffloadError<B>>
where
    B: BinaryData + 'static,
    F: FnOnce(&mut B) -> Result<()> + Send + 'static,
{
    let joined = tokio::task::spawn_blocking(move || {
        let outcome = op(&mut binary);
        (binary, outcome)
    })
    .await;

    match joined {
        Ok((binary, Ok(()))) => Ok(binary),
        Ok((binary, Err(error))) => Err(OffloadError {
            binary: Some(binary),
            error,
        }),
        Err(join) => Err(OffloadError {
            binary: None,
            error: Error::Background(join.to_string()),
        }),
    }
}
