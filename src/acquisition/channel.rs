//! Producer/consumer handoff for decoded records.
//!
//! The producer pushes [`SampleRecord`]s as they complete; the consumer drains whatever
//! has accumulated at its own cadence. Sending never blocks and never fails: under
//! [`OverflowPolicy::DropOldest`] the oldest queued record is evicted and counted, under
//! [`OverflowPolicy::Unbounded`] the queue grows.
//!
//! End-of-stream travels through the channel too. Once the producer closes (or is
//! dropped) and the queue is empty, every drain reports a [`StreamEnd`], so a consumer
//! never waits on a producer that is gone.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::frame::SampleRecord;

/// What happens when the consumer falls behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Never drop a record
    Unbounded,
    /// Keep at most `capacity` records, evicting the oldest
    DropOldest {
        /// Queue bound, at least 1
        capacity: usize,
    },
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::DropOldest { capacity: 65_536 }
    }
}

/// How the producer side finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// Source closed or a stop was requested
    Clean,
    /// Source failed; carries the failure text
    Failed(String),
}

impl StreamEnd {
    /// Whether the stream ended on a failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, StreamEnd::Failed(_))
    }
}

/// Result of one drain.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Drained {
    /// Records in production order
    pub records: Vec<SampleRecord>,
    /// Set once the producer has finished and nothing is left queued
    pub end: Option<StreamEnd>,
}

impl Drained {
    /// Whether this is the last drain that can carry records.
    pub fn is_final(&self) -> bool {
        self.end.is_some()
    }
}

struct Queue {
    records: VecDeque<SampleRecord>,
    end: Option<StreamEnd>,
}

struct Shared {
    queue: Mutex<Queue>,
    notify: Notify,
    dropped: AtomicU64,
}

/// Create a connected sender/receiver pair.
pub fn channel(policy: OverflowPolicy) -> (RecordSender, RecordReceiver) {
    let policy = match policy {
        OverflowPolicy::DropOldest { capacity } => OverflowPolicy::DropOldest {
            capacity: capacity.max(1),
        },
        other => other,
    };
    let shared = Arc::new(Shared {
        queue: Mutex::new(Queue {
            records: VecDeque::new(),
            end: None,
        }),
        notify: Notify::new(),
        dropped: AtomicU64::new(0),
    });
    (
        RecordSender {
            shared: Arc::clone(&shared),
            policy,
            closed: false,
        },
        RecordReceiver { shared },
    )
}

/// Producer half. Dropping it without [`RecordSender::close`] ends the stream as failed.
pub struct RecordSender {
    shared: Arc<Shared>,
    policy: OverflowPolicy,
    closed: bool,
}

impl RecordSender {
    /// Queue a record, applying the overflow policy.
    ///
    /// Returns `false` once the receiver has been dropped; the record is discarded.
    pub fn send(&self, record: SampleRecord) -> bool {
        if Arc::strong_count(&self.shared) < 2 {
            return false;
        }
        {
            let mut queue = self.shared.queue.lock();
            if let OverflowPolicy::DropOldest { capacity } = self.policy {
                while queue.records.len() >= capacity {
                    if let Some(evicted) = queue.records.pop_front() {
                        let dropped = self.shared.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                        trace!(sequence = evicted.sequence(), "Evicted oldest record");
                        if dropped == 1 || dropped % 10_000 == 0 {
                            warn!(dropped, capacity, "Consumer falling behind, dropping oldest records");
                        }
                    }
                }
            }
            queue.records.push_back(record);
        }
        self.shared.notify.notify_one();
        true
    }

    /// Records evicted so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Whether the receiver is still alive.
    pub fn is_connected(&self) -> bool {
        Arc::strong_count(&self.shared) > 1
    }

    /// Finish the stream with `end`.
    pub fn close(mut self, end: StreamEnd) {
        self.mark_end(end);
    }

    fn mark_end(&mut self, end: StreamEnd) {
        if self.closed {
            return;
        }
        self.closed = true;
        debug!(?end, "Record stream closed by producer");
        self.shared.queue.lock().end = Some(end);
        self.shared.notify.notify_one();
    }
}

impl Drop for RecordSender {
    fn drop(&mut self) {
        self.mark_end(StreamEnd::Failed("producer stopped without closing the stream".to_string()));
    }
}

/// Consumer half.
pub struct RecordReceiver {
    shared: Arc<Shared>,
}

impl RecordReceiver {
    /// Take everything queued without waiting.
    ///
    /// An empty result with `end == None` just means nothing arrived since the last
    /// drain.
    pub fn drain(&self) -> Drained {
        self.drain_up_to(usize::MAX)
    }

    /// Take at most `max` records without waiting.
    pub fn drain_up_to(&self, max: usize) -> Drained {
        let mut queue = self.shared.queue.lock();
        let take = queue.records.len().min(max);
        let records: Vec<SampleRecord> = queue.records.drain(..take).collect();
        let end = if queue.records.is_empty() {
            queue.end.clone()
        } else {
            None
        };
        Drained { records, end }
    }

    /// Wait until at least one record is queued or the stream has ended.
    pub async fn next_batch(&self) -> Drained {
        loop {
            let drained = self.drain();
            if !drained.records.is_empty() || drained.end.is_some() {
                return drained;
            }
            self.shared.notify.notified().await;
        }
    }

    /// Records currently queued.
    pub fn pending(&self) -> usize {
        self.shared.queue.lock().records.len()
    }

    /// Records evicted by the overflow policy so far.
    pub fn dropped(&self) -> u64 {
        self.shared.dropped.load(Ordering::Relaxed)
    }

    /// Whether the producer has finished and the queue is empty.
    pub fn is_finished(&self) -> bool {
        let queue = self.shared.queue.lock();
        queue.end.is_some() && queue.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record(sequence: u64) -> SampleRecord {
        SampleRecord::new(sequence, vec![sequence as u16])
    }

    fn sequences(drained: &Drained) -> Vec<u64> {
        drained.records.iter().map(SampleRecord::sequence).collect()
    }

    #[test]
    fn drains_in_production_order() {
        let (tx, rx) = channel(OverflowPolicy::Unbounded);
        for i in 0..5 {
            assert!(tx.send(record(i)));
        }
        assert_eq!(rx.pending(), 5);
        let drained = rx.drain();
        assert_eq!(sequences(&drained), vec![0, 1, 2, 3, 4]);
        assert_eq!(drained.end, None);
        assert!(rx.drain().records.is_empty());
    }

    #[test]
    fn drop_oldest_keeps_newest_and_counts() {
        let (tx, rx) = channel(OverflowPolicy::DropOldest { capacity: 3 });
        for i in 0..10 {
            tx.send(record(i));
        }
        assert_eq!(sequences(&rx.drain()), vec![7, 8, 9]);
        assert_eq!(rx.dropped(), 7);
        assert_eq!(tx.dropped(), 7);
    }

    #[test]
    fn end_is_reported_after_queue_empties() {
        let (tx, rx) = channel(OverflowPolicy::Unbounded);
        for i in 0..4 {
            tx.send(record(i));
        }
        tx.close(StreamEnd::Clean);

        let first = rx.drain_up_to(3);
        assert_eq!(sequences(&first), vec![0, 1, 2]);
        assert_eq!(first.end, None);

        let last = rx.drain();
        assert_eq!(sequences(&last), vec![3]);
        assert_eq!(last.end, Some(StreamEnd::Clean));
        assert!(rx.is_finished());

        let after = rx.drain();
        assert!(after.records.is_empty());
        assert!(after.is_final());
    }

    #[test]
    fn dropped_sender_ends_stream_as_failed() {
        let (tx, rx) = channel(OverflowPolicy::Unbounded);
        drop(tx);
        assert!(rx.drain().end.map_or(false, |end| end.is_failure()));
    }

    #[test]
    fn send_reports_missing_receiver() {
        let (tx, rx) = channel(OverflowPolicy::Unbounded);
        assert!(tx.is_connected());
        drop(rx);
        assert!(!tx.is_connected());
        assert!(!tx.send(record(0)));
    }

    #[tokio::test]
    async fn next_batch_wakes_on_send_and_close() {
        let (tx, rx) = channel(OverflowPolicy::Unbounded);
        let producer = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            tx.send(record(0));
            tx.send(record(1));
            std::thread::sleep(Duration::from_millis(20));
            tx.close(StreamEnd::Failed("device disconnected".to_string()));
        });

        let mut seen = Vec::new();
        let end = loop {
            let batch = tokio::time::timeout(Duration::from_secs(5), rx.next_batch())
                .await
                .expect("consumer hung");
            seen.extend(sequences(&batch));
            if let Some(end) = batch.end {
                break end;
            }
        };
        producer.join().unwrap();
        assert_eq!(seen, vec![0, 1]);
        assert_eq!(end, StreamEnd::Failed("device disconnected".to_string()));
    }
}
