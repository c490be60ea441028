use crate::sink::Sink;
use std::io;

/// A sink that simply drops all bytes.
///
/// Useful for measuring the overhead of the pipeline itself without any
/// I/O, and for tests that don't care about output.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl Sink for NoopSink {
    fn write(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Ok(())
    }
}
