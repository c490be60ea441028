use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

/// Byte-stream destination for serialized log lines.
///
/// The writer thread owns the sink exclusively and calls `write` once per
/// batch boundary with one or more complete, newline-terminated JSON
/// lines. No format negotiation takes place.
pub trait Sink: Send {
    /// Write a chunk of serialized records.
    ///
    /// **Returns**
    /// - `Ok(())` if the whole chunk was accepted.
    /// - `Err(..)` on failure. The writer retries the same chunk with
    ///   backoff a bounded number of times and then drops it.
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush any buffered bytes. Called when the writer goes idle and on
    /// shutdown. Default implementation is a no-op.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<S: Sink + ?Sized> Sink for Box<S> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Standard output, the default sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl Sink for StdoutSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::stdout().lock().write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().lock().flush()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct StderrSink;

impl Sink for StderrSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::stderr().lock().write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().lock().flush()
    }
}

/// Adapter for any [`std::io::Write`] implementation.
#[derive(Debug)]
pub struct IoSink<W> {
    inner: W,
}

impl<W: Write + Send> IoSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write + Send> Sink for IoSink<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Append-only file. No rotation.
pub type FileSink = IoSink<File>;

impl IoSink<File> {
    pub fn append(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self::new(file))
    }
}

/// In-memory sink. Clones share the same buffer, so a test can keep one
/// handle and give the other to the logger.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    buf: Arc<Mutex<Vec<u8>>>,
    writes: Arc<Mutex<usize>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far.
    pub fn contents(&self) -> Vec<u8> {
        self.buf.lock().clone()
    }

    pub fn contents_string(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock()).into_owned()
    }

    /// Written output split into lines, without the trailing newline.
    pub fn lines(&self) -> Vec<String> {
        self.contents_string().lines().map(str::to_owned).collect()
    }

    /// Number of `write` calls received.
    pub fn write_count(&self) -> usize {
        *self.writes.lock()
    }
}

impl Sink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.buf.lock().extend_from_slice(bytes);
        *self.writes.lock() += 1;
        Ok(())
    }
}
