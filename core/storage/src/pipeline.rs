//! Explicit stage chains and their `Read`/`Write` adapters.
//!
//! A [`Pipeline`] runs bytes through an ordered list of [`Stage`]s. The
//! adapters let a pipeline sit in front of a sink ([`PipelineWriter`]) or
//! behind a source ([`PipelineReader`]) so callers only ever see plain byte
//! streams.

use std::io::{self, Read, Write};

use binvault_common::{Result, Stage};

/// Read buffer used when pulling from a source.
const READ_CHUNK: usize = 16 * 1024;

/// Ordered chain of stages.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    /// Create an empty pipeline (bytes pass through unchanged).
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Append a stage at the end of the chain.
    pub fn then(mut self, stage: impl Stage + 'static) -> Self {
        self.stages.push(Box::new(stage));
        self
    }

    /// Append an already boxed stage.
    pub fn then_boxed(mut self, stage: Box<dyn Stage>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Check if the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Stage for Pipeline {
    fn process(&mut self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        let mut data = input.to_vec();
        for stage in &mut self.stages {
            let mut next = Vec::new();
            stage.process(&data, &mut next)?;
            data = next;
            if data.is_empty() {
                return Ok(());
            }
        }
        out.extend_from_slice(&data);
        Ok(())
    }

    fn finalize(&mut self, out: &mut Vec<u8>) -> Result<()> {
        // Each stage's tail is fed to the stages after it before they finalize.
        let mut data = Vec::new();
        for stage in &mut self.stages {
            let mut next = Vec::new();
            if !data.is_empty() {
                stage.process(&data, &mut next)?;
            }
            stage.finalize(&mut next)?;
            data = next;
        }
        out.extend_from_slice(&data);
        Ok(())
    }
}

/// `Write` adapter pushing bytes through a pipeline into a sink.
///
/// [`PipelineWriter::finish`] must be called to flush the stages; dropping the
/// writer without it leaves the sink with an incomplete stream.
pub struct PipelineWriter<W: Write> {
    pipeline: Pipeline,
    sink: W,
}

impl<W: Write> PipelineWriter<W> {
    pub fn new(pipeline: Pipeline, sink: W) -> Self {
        Self { pipeline, sink }
    }

    /// Finalize every stage, flush the sink and return it.
    pub fn finish(mut self) -> Result<W> {
        let mut tail = Vec::new();
        self.pipeline.finalize(&mut tail)?;
        self.sink.write_all(&tail)?;
        self.sink.flush()?;
        Ok(self.sink)
    }
}

impl<W: Write> Write for PipelineWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut out = Vec::new();
        self.pipeline.process(buf, &mut out)?;
        self.sink.write_all(&out)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink.flush()
    }
}

/// `Read` adapter pulling bytes from a source through a pipeline.
pub struct PipelineReader<R: Read> {
    source: R,
    pipeline: Pipeline,
    ready: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> PipelineReader<R> {
    pub fn new(source: R, pipeline: Pipeline) -> Self {
        Self {
            source,
            pipeline,
            ready: Vec::new(),
            pos: 0,
            done: false,
        }
    }

    fn refill(&mut self) -> io::Result<()> {
        let mut chunk = [0u8; READ_CHUNK];
        self.ready.clear();
        self.pos = 0;
        while self.ready.is_empty() && !self.done {
            let n = match self.source.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if n == 0 {
                self.pipeline.finalize(&mut self.ready)?;
                self.done = true;
            } else {
                self.pipeline.process(&chunk[..n], &mut self.ready)?;
            }
        }
        Ok(())
    }
}

impl<R: Read> Read for PipelineReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.ready.len() {
            if self.done {
                return Ok(0);
            }
            self.refill()?;
            if self.ready.is_empty() {
                return Ok(0);
            }
        }
        let n = buf.len().min(self.ready.len() - self.pos);
        buf[..n].copy_from_slice(&self.ready[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
