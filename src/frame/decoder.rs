//! Frame decoder state machine.
//!
//! [`FrameDecoder`] composes the synchronizer and the payload assembler into one
//! sans-IO state machine:
//!
//! ```text
//! SeekingSync --marker--> Assembling --payload complete--> SeekingSync
//!      \                      |
//!       \---- close() -------+----> Closed   (partial payload discarded)
//! ```
//!
//! It never reads from a source itself; callers push bytes in and get
//! [`SampleRecord`]s out. [`crate::frame::StreamDecoder`] wraps it around a
//! [`crate::source::ByteSource`].

use tracing::{debug, trace, warn};

use crate::frame::format::FrameFormat;
use crate::frame::record::SampleRecord;
use crate::frame::sync::FrameSynchronizer;

/// Decoder lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Dropping bytes until the marker matches
    SeekingSync,
    /// Collecting payload bytes
    Assembling,
    /// Source ended; no further records
    Closed,
}

/// What a single byte did to the decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Byte did not extend a marker match and was dropped
    Discarded,
    /// Byte extended a partial marker match
    SyncProgress {
        /// Marker bytes matched so far
        matched: usize,
        /// Marker length
        needed: usize,
    },
    /// Byte completed the marker; assembly starts with the next byte
    Synchronized,
    /// A marker completed mid-payload; the partial payload was dropped
    Resynchronized {
        /// Payload bytes thrown away
        discarded: usize,
    },
    /// Byte was stored in the payload accumulator
    Payload {
        /// Zero-based payload position
        index: usize,
    },
    /// Byte completed the payload
    Record(SampleRecord),
    /// Decoder is closed and ignores input
    Closed,
}

/// Running counts kept by the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecoderCounters {
    /// Records emitted
    pub records: u64,
    /// Markers completed mid-payload
    pub resyncs: u64,
    /// Bytes dropped while seeking the marker
    pub discarded_bytes: u64,
    /// Partial payloads dropped by `close`
    pub aborted_frames: u64,
}

/// Synchronizer + assembler for one session.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    format: FrameFormat,
    sync: FrameSynchronizer,
    state: DecoderState,
    payload: Vec<u8>,
    next_sequence: u64,
    counters: DecoderCounters,
}

impl FrameDecoder {
    /// Fresh decoder in `SeekingSync` with an empty accumulator.
    pub fn new(format: FrameFormat) -> Self {
        let sync = FrameSynchronizer::for_format(&format);
        let payload = Vec::with_capacity(format.payload_length());
        Self {
            format,
            sync,
            state: DecoderState::SeekingSync,
            payload,
            next_sequence: 0,
            counters: DecoderCounters::default(),
        }
    }

    /// Descriptor this decoder was built with.
    pub fn format(&self) -> &FrameFormat {
        &self.format
    }

    /// Current state.
    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Bytes collected for the frame in progress.
    pub fn pending_payload(&self) -> &[u8] {
        &self.payload
    }

    /// Sequence number the next record will carry.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Counters since construction.
    pub fn counters(&self) -> DecoderCounters {
        self.counters
    }

    /// Advance the state machine by one byte.
    pub fn step(&mut self, byte: u8) -> Step {
        match self.state {
            DecoderState::Closed => Step::Closed,
            DecoderState::SeekingSync => {
                if self.sync.push(byte) {
                    self.begin_payload();
                    trace!(format = self.format.name(), "Marker matched");
                    Step::Synchronized
                } else if self.sync.matched() > 0 {
                    Step::SyncProgress {
                        matched: self.sync.matched(),
                        needed: self.sync.marker_len(),
                    }
                } else {
                    self.counters.discarded_bytes += 1;
                    Step::Discarded
                }
            }
            DecoderState::Assembling => {
                if self.format.resync_in_payload() && self.sync.push(byte) {
                    let discarded = self.payload.len();
                    self.begin_payload();
                    self.counters.resyncs += 1;
                    trace!(discarded, "Marker inside payload, restarting frame");
                    return Step::Resynchronized { discarded };
                }

                self.payload.push(byte);
                if self.payload.len() < self.format.payload_length() {
                    return Step::Payload {
                        index: self.payload.len() - 1,
                    };
                }
                self.finish_payload()
            }
        }
    }

    /// Push one byte and return a record if it completed one.
    pub fn push_byte(&mut self, byte: u8) -> Option<SampleRecord> {
        match self.step(byte) {
            Step::Record(record) => Some(record),
            _ => None,
        }
    }

    /// Push a chunk, handing every completed record to `sink`.
    ///
    /// Returns the number of records emitted. An empty chunk changes nothing.
    pub fn feed(&mut self, bytes: &[u8], mut sink: impl FnMut(SampleRecord)) -> usize {
        let mut emitted = 0;
        for &byte in bytes {
            if let Some(record) = self.push_byte(byte) {
                sink(record);
                emitted += 1;
            }
        }
        emitted
    }

    /// Push a chunk and collect the records.
    pub fn decode_all(&mut self, bytes: &[u8]) -> Vec<SampleRecord> {
        let mut records = Vec::new();
        self.feed(bytes, |record| records.push(record));
        records
    }

    /// Enter `Closed`, discarding any partial payload.
    ///
    /// Returns the number of payload bytes dropped.
    pub fn close(&mut self) -> usize {
        let dropped = self.payload.len();
        if self.state == DecoderState::Assembling {
            self.counters.aborted_frames += 1;
            debug!(dropped, "Stream ended mid-frame, partial payload discarded");
        }
        self.payload.clear();
        self.sync.reset();
        self.state = DecoderState::Closed;
        dropped
    }

    /// Back to `SeekingSync` with an empty accumulator, keeping the sequence counter.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.sync.reset();
        self.state = DecoderState::SeekingSync;
    }

    fn begin_payload(&mut self) {
        self.payload.clear();
        self.sync.arm(self.format.sync_border());
        self.state = DecoderState::Assembling;
    }

    fn finish_payload(&mut self) -> Step {
        let decoded = self.format.decode_fields(&self.payload);
        self.reset();
        match decoded {
            Some(values) => {
                let record = SampleRecord::new(self.next_sequence, values);
                self.next_sequence += 1;
                self.counters.records += 1;
                Step::Record(record)
            }
            None => {
                // Unreachable for validated descriptors.
                warn!(format = self.format.name(), "Field extraction failed, frame dropped");
                Step::Discarded
            }
        }
    }
}
