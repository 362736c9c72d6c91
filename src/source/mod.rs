//! Byte sources.
//!
//! A [`ByteSource`] is whatever the producer reads raw bytes from: a serial port, a
//! capture file, or a scripted in-memory stream for tests. Reads are non-blocking or
//! timeout-bounded and distinguish three outcomes:
//!
//! - [`SourceRead::Data`]: some bytes arrived
//! - [`SourceRead::Idle`]: nothing arrived this time (quiet line, timeout)
//! - [`SourceRead::Closed`]: the source ended cleanly
//!
//! Hard failures come back as `Err(std::io::Error)`; the stream decoder turns them into
//! [`crate::error::DaqError::SourceFailed`].

use std::collections::VecDeque;
use std::fs::File;
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

pub mod serial;

pub use serial::SerialSource;

/// Outcome of one read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceRead {
    /// `n` bytes were written to the front of the buffer
    Data(usize),
    /// No bytes available right now
    Idle,
    /// Source ended; further reads keep returning `Closed`
    Closed,
}

/// Raw byte input owned by the producer.
pub trait ByteSource: Send {
    /// Read whatever is available into `buf`.
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<SourceRead>;

    /// Release the underlying device. Later reads return [`SourceRead::Closed`].
    fn close(&mut self) {}

    /// Name used in logs and errors.
    fn describe(&self) -> String;
}

impl<S: ByteSource + ?Sized> ByteSource for Box<S> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<SourceRead> {
        (**self).read_bytes(buf)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Timeouts and interrupted reads are not failures.
pub(crate) fn is_transient(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
    )
}

/// Adapter for any [`std::io::Read`], e.g. a recorded capture file.
///
/// A zero-length read means end of input. Reads go straight to the wrapped reader, so
/// it must be a regular file, an in-memory buffer, or a reader with its own read
/// timeout: a FIFO or tty that blocks forever keeps the producer from seeing a stop
/// request. Use [`SerialSource`] for devices.
pub struct ReaderSource<R> {
    name: String,
    reader: Option<R>,
}

impl<R: Read + Send> ReaderSource<R> {
    /// Wrap a reader.
    pub fn new(name: impl Into<String>, reader: R) -> Self {
        Self {
            name: name.into(),
            reader: Some(reader),
        }
    }
}

impl ReaderSource<File> {
    /// Open a capture file. Anything other than a regular file is rejected.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        if !file.metadata()?.is_file() {
            return Err(io::Error::new(
                ErrorKind::InvalidInput,
                format!(
                    "'{}' is not a regular file; read devices through the serial source",
                    path.display()
                ),
            ));
        }
        Ok(Self::new(path.display().to_string(), file))
    }
}

impl<R: Read + Send> ByteSource for ReaderSource<R> {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<SourceRead> {
        let Some(reader) = self.reader.as_mut() else {
            return Ok(SourceRead::Closed);
        };
        match reader.read(buf) {
            Ok(0) => {
                debug!(source = %self.name, "Reader reached end of input");
                self.reader = None;
                Ok(SourceRead::Closed)
            }
            Ok(n) => Ok(SourceRead::Data(n)),
            Err(e) if is_transient(e.kind()) => Ok(SourceRead::Idle),
            Err(e) => Err(e),
        }
    }

    fn close(&mut self) {
        self.reader = None;
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

/// One scripted read result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Deliver these bytes (split across reads if the buffer is smaller)
    Bytes(Vec<u8>),
    /// Report an idle read
    Idle,
    /// Fail with this error kind
    Fail(ErrorKind),
}

/// In-memory source that replays a script of chunks.
///
/// Once the script is exhausted it reports `Closed`, or `Idle` forever when built
/// with [`ScriptedSource::hold_open`] (a quiet but connected line).
#[derive(Debug)]
pub struct ScriptedSource {
    chunks: VecDeque<Chunk>,
    hold_open: bool,
    closed: Arc<AtomicBool>,
}

impl ScriptedSource {
    /// Script from explicit chunks.
    pub fn new(chunks: impl IntoIterator<Item = Chunk>) -> Self {
        Self {
            chunks: chunks.into_iter().collect(),
            hold_open: false,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Script delivering `bytes` in one chunk.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new([Chunk::Bytes(bytes.into())])
    }

    /// Keep returning `Idle` after the script instead of closing.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Flag that flips to `true` once `close` is called.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl ByteSource for ScriptedSource {
    fn read_bytes(&mut self, buf: &mut [u8]) -> io::Result<SourceRead> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(SourceRead::Closed);
        }
        match self.chunks.pop_front() {
            None if self.hold_open => Ok(SourceRead::Idle),
            None => Ok(SourceRead::Closed),
            Some(Chunk::Idle) => Ok(SourceRead::Idle),
            Some(Chunk::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
            Some(Chunk::Bytes(mut bytes)) => {
                let n = bytes.len().min(buf.len());
                buf[..n].copy_from_slice(&bytes[..n]);
                if n < bytes.len() {
                    self.chunks.push_front(Chunk::Bytes(bytes.split_off(n)));
                }
                Ok(SourceRead::Data(n))
            }
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reader_source_reports_eof_as_closed() {
        let mut source = ReaderSource::new("cursor", Cursor::new(vec![1u8, 2, 3]));
        let mut buf = [0u8; 8];
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Data(3));
        assert_eq!(&buf[..3], &[1, 2, 3]);
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Closed);
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Closed);
    }

    #[test]
    fn reader_source_opens_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.bin");
        std::fs::write(&path, [0xFF, 0xFF, 0x01]).unwrap();
        let mut source = ReaderSource::open(&path).unwrap();
        assert!(source.describe().ends_with("capture.bin"));
        let mut buf = [0u8; 2];
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Data(2));
    }

    #[test]
    fn reader_source_rejects_non_regular_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReaderSource::open(dir.path()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn scripted_source_splits_large_chunks() {
        let mut source = ScriptedSource::new([Chunk::Bytes(vec![1, 2, 3]), Chunk::Idle]);
        let mut buf = [0u8; 2];
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Data(2));
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Data(1));
        assert_eq!(buf[0], 3);
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Idle);
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Closed);
    }

    #[test]
    fn scripted_source_fails_and_closes_on_request() {
        let mut source = ScriptedSource::new([Chunk::Fail(ErrorKind::BrokenPipe)]).hold_open();
        let flag = source.closed_flag();
        let mut buf = [0u8; 4];
        assert_eq!(
            source.read_bytes(&mut buf).unwrap_err().kind(),
            ErrorKind::BrokenPipe
        );
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Idle);
        source.close();
        assert!(flag.load(Ordering::SeqCst));
        assert_eq!(source.read_bytes(&mut buf).unwrap(), SourceRead::Closed);
    }
}
