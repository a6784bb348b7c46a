//! Uniform contract for streaming byte transforms.

use crate::Result;

/// One transform in a byte pipeline.
///
/// A stage receives input in arbitrary chunks and appends whatever output it
/// can already produce to `out`. `finalize` is called exactly once after the
/// last chunk and flushes buffered state; after it the stage must not be used
/// again.
pub trait Stage: Send {
    /// Transform `input`, appending produced bytes to `out`.
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()>;

    /// Flush remaining state into `out`.
    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()>;
}

impl<S: Stage + ?Sized> Stage for Box<S> {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        (**self).process(input, out)
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        (**self).finalize(out)
    }
}
