//! Producer thread and its handle.
//!
//! [`start`] moves a byte source into a dedicated `frame-producer` thread that owns a
//! [`StreamDecoder`] and the sending half of the acquisition channel. The thread checks
//! a running flag before every read; reads are timeout-bounded, so [`AcquisitionHandle::stop`]
//! takes effect within one read timeout. Whatever ends the loop (stop request, record
//! limit, source close, source failure) the thread closes the source and the decoder
//! and then closes the channel, so the consumer always sees a final drain.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::acquisition::channel::{channel, OverflowPolicy, RecordReceiver, RecordSender, StreamEnd};
use crate::config::AppConfig;
use crate::error::{AppResult, DaqError};
use crate::frame::stream::{DEFAULT_READ_CHUNK, IDLE_BACKOFF};
use crate::frame::{FrameFormat, ReadProgress, StreamDecoder};
use crate::source::ByteSource;

/// Producer settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Channel overflow behaviour
    pub overflow: OverflowPolicy,
    /// Bytes requested per read
    pub read_chunk: usize,
    /// Stop after this many records
    pub max_records: Option<u64>,
    /// Stop once this much time has passed since the producer started
    pub max_duration: Option<Duration>,
    /// Pause after a read that returned nothing
    pub idle_backoff: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            overflow: OverflowPolicy::default(),
            read_chunk: DEFAULT_READ_CHUNK,
            max_records: None,
            max_duration: None,
            idle_backoff: IDLE_BACKOFF,
        }
    }
}

impl SessionOptions {
    /// Options from the `serial` and `acquisition` sections.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            overflow: config.overflow_policy(),
            read_chunk: config.serial.read_chunk,
            ..Default::default()
        }
    }

    /// Stop after `count` records.
    pub fn with_max_records(mut self, count: Option<u64>) -> Self {
        self.max_records = count;
        self
    }

    /// Stop after `duration` of acquisition.
    pub fn with_max_duration(mut self, duration: Option<Duration>) -> Self {
        self.max_duration = duration;
        self
    }
}

/// Point-in-time session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Bytes read from the source
    pub bytes_read: u64,
    /// Records handed to the channel
    pub records_decoded: u64,
    /// Records evicted by the overflow policy
    pub records_dropped: u64,
    /// Markers found mid-payload
    pub resyncs: u64,
    /// Reads that returned no data
    pub idle_reads: u64,
}

#[derive(Default)]
struct SharedStats {
    bytes_read: AtomicU64,
    records_decoded: AtomicU64,
    records_dropped: AtomicU64,
    resyncs: AtomicU64,
    idle_reads: AtomicU64,
}

impl SharedStats {
    fn snapshot(&self) -> SessionStats {
        SessionStats {
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            records_decoded: self.records_decoded.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
            resyncs: self.resyncs.load(Ordering::Relaxed),
            idle_reads: self.idle_reads.load(Ordering::Relaxed),
        }
    }
}

/// Final result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// Counters at shutdown
    pub stats: SessionStats,
    /// How the producer finished
    pub end: StreamEnd,
}

/// Handle to a running producer. Dropping it stops the producer and waits for it.
pub struct AcquisitionHandle {
    running: Arc<AtomicBool>,
    stats: Arc<SharedStats>,
    thread: Option<JoinHandle<StreamEnd>>,
    source_name: String,
}

/// Start producing records from `source`.
///
/// Returns the handle controlling the producer and the consumer half of the channel.
pub fn start<S>(
    source: S,
    format: FrameFormat,
    options: SessionOptions,
) -> AppResult<(AcquisitionHandle, RecordReceiver)>
where
    S: ByteSource + 'static,
{
    let source_name = source.describe();
    let (sender, receiver) = channel(options.overflow);
    let running = Arc::new(AtomicBool::new(true));
    let stats = Arc::new(SharedStats::default());

    info!(
        source = %source_name,
        format = format.name(),
        channels = format.channel_count(),
        max_records = ?options.max_records,
        max_duration = ?options.max_duration,
        "Starting acquisition"
    );

    let stream = StreamDecoder::new(source, format).with_chunk_size(options.read_chunk);
    let producer = Producer {
        stream,
        sender,
        running: Arc::clone(&running),
        stats: Arc::clone(&stats),
        options,
    };
    let thread = thread::Builder::new()
        .name("frame-producer".to_string())
        .spawn(move || producer.run())?;

    Ok((
        AcquisitionHandle {
            running,
            stats,
            thread: Some(thread),
            source_name,
        },
        receiver,
    ))
}

impl AcquisitionHandle {
    /// Ask the producer to stop after its current read.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!(source = %self.source_name, "Stop requested");
        }
    }

    /// Whether the producer thread is still running.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |t| !t.is_finished())
    }

    /// Live counters.
    pub fn stats(&self) -> SessionStats {
        self.stats.snapshot()
    }

    /// Name of the source being read.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    /// Wait for the producer to finish. Does not request a stop.
    pub fn join(mut self) -> AppResult<SessionSummary> {
        let end = match self.thread.take() {
            Some(thread) => thread.join().map_err(|_| DaqError::ProducerPanicked)?,
            None => StreamEnd::Clean,
        };
        let stats = self.stats.snapshot();
        info!(
            source = %self.source_name,
            bytes_read = stats.bytes_read,
            records = stats.records_decoded,
            dropped = stats.records_dropped,
            resyncs = stats.resyncs,
            "Acquisition finished"
        );
        Ok(SessionSummary { stats, end })
    }

    /// Stop and wait.
    pub fn shutdown(self) -> AppResult<SessionSummary> {
        self.stop();
        self.join()
    }
}

impl Drop for AcquisitionHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

struct Producer<S> {
    stream: StreamDecoder<S>,
    sender: RecordSender,
    running: Arc<AtomicBool>,
    stats: Arc<SharedStats>,
    options: SessionOptions,
}

impl<S: ByteSource> Producer<S> {
    fn run(mut self) -> StreamEnd {
        let end = self.read_loop();
        self.stream.close();
        self.stats
            .records_dropped
            .store(self.sender.dropped(), Ordering::Relaxed);
        debug!(?end, "Producer exiting");
        self.sender.close(end.clone());
        end
    }

    fn read_loop(&mut self) -> StreamEnd {
        let limit = self.options.max_records.unwrap_or(u64::MAX);
        let deadline = self
            .options
            .max_duration
            .and_then(|duration| Instant::now().checked_add(duration));
        let mut delivered = 0u64;

        loop {
            if !self.running.load(Ordering::Acquire) {
                return StreamEnd::Clean;
            }
            if delivered >= limit {
                debug!(delivered, "Record limit reached");
                return StreamEnd::Clean;
            }
            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                debug!(delivered, "Capture duration elapsed");
                return StreamEnd::Clean;
            }

            let sender = &self.sender;
            let mut receiver_gone = false;
            let result = self.stream.read_once(|record| {
                if delivered < limit {
                    receiver_gone |= !sender.send(record);
                    delivered += 1;
                }
            });

            self.stats.records_decoded.store(delivered, Ordering::Relaxed);
            self.stats
                .records_dropped
                .store(sender.dropped(), Ordering::Relaxed);
            self.stats
                .resyncs
                .store(self.stream.decoder().counters().resyncs, Ordering::Relaxed);

            match result {
                Ok(ReadProgress::Bytes(n)) => {
                    self.stats.bytes_read.fetch_add(n as u64, Ordering::Relaxed);
                }
                Ok(ReadProgress::Idle) => {
                    self.stats.idle_reads.fetch_add(1, Ordering::Relaxed);
                    thread::sleep(self.options.idle_backoff);
                }
                Ok(ReadProgress::Closed) => return StreamEnd::Clean,
                Err(e) => {
                    warn!(error = %e, "Acquisition stopped by source failure");
                    return StreamEnd::Failed(e.to_string());
                }
            }

            if receiver_gone {
                debug!("Consumer went away, stopping producer");
                return StreamEnd::Clean;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{Chunk, ScriptedSource};
    use std::io::ErrorKind;

    fn nibble_frames(count: u8) -> Vec<u8> {
        (0..count)
            .flat_map(|i| [0xAE, 0xBC, i, 0x00, 0x00, 0x00])
            .collect()
    }

    fn collect_all(receiver: &RecordReceiver) -> (Vec<u64>, StreamEnd) {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut sequences = Vec::new();
        loop {
            let drained = receiver.drain();
            sequences.extend(drained.records.iter().map(|r| r.sequence()));
            if let Some(end) = drained.end {
                return (sequences, end);
            }
            assert!(Instant::now() < deadline, "producer never finished");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn clean_close_delivers_everything() {
        let source = ScriptedSource::from_bytes(nibble_frames(5));
        let options = SessionOptions {
            overflow: OverflowPolicy::Unbounded,
            ..Default::default()
        };
        let (handle, receiver) = start(source, FrameFormat::ae_bc_nibble(), options).unwrap();

        let (sequences, end) = collect_all(&receiver);
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
        assert_eq!(end, StreamEnd::Clean);

        let summary = handle.join().unwrap();
        assert_eq!(summary.end, StreamEnd::Clean);
        assert_eq!(summary.stats.records_decoded, 5);
        assert_eq!(summary.stats.bytes_read, 30);
    }

    #[test]
    fn source_failure_reaches_consumer() {
        let mut bytes = nibble_frames(1);
        bytes.extend([0xAE, 0xBC, 0x01]);
        let source = ScriptedSource::new([Chunk::Bytes(bytes), Chunk::Fail(ErrorKind::BrokenPipe)]);
        let closed = source.closed_flag();
        let (handle, receiver) =
            start(source, FrameFormat::ae_bc_nibble(), SessionOptions::default()).unwrap();

        let (sequences, end) = collect_all(&receiver);
        assert_eq!(sequences, vec![0]);
        assert!(end.is_failure());

        let summary = handle.join().unwrap();
        assert!(summary.end.is_failure());
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn stop_unblocks_quiet_source() {
        let source = ScriptedSource::from_bytes(nibble_frames(2)).hold_open();
        let closed = source.closed_flag();
        let (handle, receiver) =
            start(source, FrameFormat::ae_bc_nibble(), SessionOptions::default()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while handle.stats().records_decoded < 2 {
            assert!(Instant::now() < deadline, "records never arrived");
            thread::sleep(Duration::from_millis(1));
        }
        assert!(handle.is_running());

        let summary = handle.shutdown().unwrap();
        assert_eq!(summary.end, StreamEnd::Clean);
        assert!(closed.load(Ordering::SeqCst));

        let (sequences, end) = collect_all(&receiver);
        assert_eq!(sequences, vec![0, 1]);
        assert_eq!(end, StreamEnd::Clean);
    }

    #[test]
    fn max_records_bounds_the_capture() {
        let source = ScriptedSource::from_bytes(nibble_frames(10)).hold_open();
        let options = SessionOptions::default().with_max_records(Some(3));
        let (handle, receiver) = start(source, FrameFormat::ae_bc_nibble(), options).unwrap();

        let (sequences, end) = collect_all(&receiver);
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(end, StreamEnd::Clean);
        assert_eq!(handle.join().unwrap().stats.records_decoded, 3);
    }

    #[test]
    fn max_duration_ends_quiet_session_cleanly() {
        let source = ScriptedSource::from_bytes(nibble_frames(3)).hold_open();
        let closed = source.closed_flag();
        let options = SessionOptions::default().with_max_duration(Some(Duration::from_millis(50)));
        let started = Instant::now();
        let (handle, receiver) = start(source, FrameFormat::ae_bc_nibble(), options).unwrap();

        // No stop request: only the deadline can end this session.
        let (sequences, end) = collect_all(&receiver);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert_eq!(sequences, vec![0, 1, 2]);
        assert_eq!(end, StreamEnd::Clean);

        let summary = handle.join().unwrap();
        assert_eq!(summary.end, StreamEnd::Clean);
        assert_eq!(summary.stats.records_decoded, 3);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[test]
    fn dropped_handle_stops_producer() {
        let source = ScriptedSource::new(Vec::new()).hold_open();
        let closed = source.closed_flag();
        let (handle, receiver) =
            start(source, FrameFormat::ff_ff_masked(), SessionOptions::default()).unwrap();
        drop(handle);
        assert!(closed.load(Ordering::SeqCst));
        assert!(receiver.is_finished());
    }
}
