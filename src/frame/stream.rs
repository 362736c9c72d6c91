//! Decoder bound to a byte source.
//!
//! [`StreamDecoder`] owns its [`ByteSource`] for the whole session, reads chunks from
//! it and pushes them through a [`FrameDecoder`]. It is the piece both execution
//! models share: the synchronous inspection loops call [`StreamDecoder::next_record`]
//! directly, while the acquisition producer thread calls
//! [`StreamDecoder::read_once`] so it can check for a stop request between reads.

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{AppResult, DaqError};
use crate::frame::decoder::{DecoderState, FrameDecoder, Step};
use crate::frame::format::FrameFormat;
use crate::frame::record::SampleRecord;
use crate::source::{ByteSource, SourceRead};

/// Default bytes requested per read.
pub const DEFAULT_READ_CHUNK: usize = 256;

/// Pause taken by [`StreamDecoder::next_record`] after a read that returned nothing.
pub const IDLE_BACKOFF: Duration = Duration::from_micros(200);

/// Result of one source read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProgress {
    /// `n` bytes were decoded
    Bytes(usize),
    /// Nothing arrived; state unchanged
    Idle,
    /// Source ended and the decoder is closed
    Closed,
}

/// Frame decoder driving an owned byte source.
pub struct StreamDecoder<S> {
    source: S,
    decoder: FrameDecoder,
    buffer: Vec<u8>,
    pending: VecDeque<SampleRecord>,
    bytes_read: u64,
}

impl<S: ByteSource> StreamDecoder<S> {
    /// Take ownership of `source` and decode it with `format`.
    pub fn new(source: S, format: FrameFormat) -> Self {
        Self {
            source,
            decoder: FrameDecoder::new(format),
            buffer: vec![0; DEFAULT_READ_CHUNK],
            pending: VecDeque::new(),
            bytes_read: 0,
        }
    }

    /// Change how many bytes are requested per read.
    pub fn with_chunk_size(mut self, chunk: usize) -> Self {
        self.buffer = vec![0; chunk.max(1)];
        self
    }

    /// Inner state machine.
    pub fn decoder(&self) -> &FrameDecoder {
        &self.decoder
    }

    /// Current decoder state.
    pub fn state(&self) -> DecoderState {
        self.decoder.state()
    }

    /// The owned source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Total bytes read from the source.
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Read once and report every byte's [`Step`] to `on_step`.
    ///
    /// A source failure closes both the decoder and the source and comes back as
    /// [`DaqError::SourceFailed`].
    pub fn read_steps(&mut self, mut on_step: impl FnMut(u8, Step)) -> AppResult<ReadProgress> {
        if self.decoder.state() == DecoderState::Closed {
            return Ok(ReadProgress::Closed);
        }
        match self.source.read_bytes(&mut self.buffer) {
            // Zero-byte reads never advance the decoder.
            Ok(SourceRead::Data(0)) | Ok(SourceRead::Idle) => Ok(ReadProgress::Idle),
            Ok(SourceRead::Data(n)) => {
                self.bytes_read += n as u64;
                for &byte in &self.buffer[..n] {
                    let step = self.decoder.step(byte);
                    on_step(byte, step);
                }
                Ok(ReadProgress::Bytes(n))
            }
            Ok(SourceRead::Closed) => {
                debug!(source = %self.source.describe(), "Byte source closed");
                self.close();
                Ok(ReadProgress::Closed)
            }
            Err(e) => {
                let source_name = self.source.describe();
                warn!(source = %source_name, error = %e, "Byte source failed");
                self.close();
                Err(DaqError::SourceFailed {
                    source_name,
                    message: e.to_string(),
                })
            }
        }
    }

    /// Read once and hand completed records to `sink`.
    pub fn read_once(&mut self, mut sink: impl FnMut(SampleRecord)) -> AppResult<ReadProgress> {
        self.read_steps(|_, step| {
            if let Step::Record(record) = step {
                sink(record);
            }
        })
    }

    /// Block until the next record.
    ///
    /// `Ok(None)` is a clean end-of-stream; a partial frame at the end is dropped.
    /// Sleeps [`IDLE_BACKOFF`] between reads that return nothing.
    pub fn next_record(&mut self) -> AppResult<Option<SampleRecord>> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Ok(Some(record));
            }
            let mut batch = Vec::new();
            let progress = self.read_once(|record| batch.push(record))?;
            self.pending.extend(batch);
            match progress {
                ReadProgress::Closed if self.pending.is_empty() => return Ok(None),
                ReadProgress::Idle => thread::sleep(IDLE_BACKOFF),
                _ => {}
            }
        }
    }

    /// Close the source and the decoder.
    pub fn close(&mut self) {
        self.source.close();
        self.decoder.close();
    }

    /// Give back the source, e.g. to inspect a mock after the session.
    pub fn into_source(self) -> S {
        self.source
    }
}
