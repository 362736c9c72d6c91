//! Bounded sliding-window buffer.
//!
//! Keeps the most recent `capacity` values of each channel for live display. Pushing
//! into a full window overwrites the oldest value, so `push` is O(1), never blocks and
//! never fails. The window belongs to the consumer; the producer only ever hands it
//! [`SampleRecord`]s through the acquisition channel.
//!
//! Backed by `ringbuf::HeapRb` with overwrite semantics.

use ringbuf::{HeapRb, Rb};

use crate::config::WindowConfig;
use crate::error::{AppResult, DaqError};
use crate::frame::SampleRecord;

/// Fixed-capacity window for one channel.
pub struct SlidingWindow {
    ring: HeapRb<u16>,
    capacity: usize,
    latest: Option<u16>,
}

impl std::fmt::Debug for SlidingWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindow")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl SlidingWindow {
    /// Window holding up to `capacity` values. A zero capacity is rejected.
    pub fn new(capacity: usize) -> AppResult<Self> {
        if capacity == 0 {
            return Err(DaqError::Configuration(
                "window capacity must be at least 1 sample".to_string(),
            ));
        }
        Ok(Self {
            ring: HeapRb::new(capacity),
            capacity,
            latest: None,
        })
    }

    /// Append a value, evicting the oldest one if full.
    pub fn push(&mut self, value: u16) {
        let _ = self.ring.push_overwrite(value);
        self.latest = Some(value);
    }

    /// Ordered copy of the contents, oldest first.
    pub fn snapshot(&self) -> Vec<u16> {
        self.ring.iter().copied().collect()
    }

    /// Values currently held.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Whether nothing has been pushed since construction or the last clear.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum values held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently pushed value.
    pub fn latest(&self) -> Option<u16> {
        self.latest
    }

    /// Drop all values.
    pub fn clear(&mut self) {
        self.ring = HeapRb::new(self.capacity);
        self.latest = None;
    }

    /// Length, extremes and last value of the current contents.
    pub fn summary(&self) -> Option<WindowSummary> {
        let latest = self.latest?;
        let (min, max) = self
            .ring
            .iter()
            .fold((u16::MAX, u16::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        Some(WindowSummary {
            len: self.len(),
            min,
            max,
            latest,
        })
    }
}

/// Summary statistics of one window, used by the live log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSummary {
    /// Values held
    pub len: usize,
    /// Smallest value held
    pub min: u16,
    /// Largest value held
    pub max: u16,
    /// Most recent value
    pub latest: u16,
}

/// One [`SlidingWindow`] per channel, fed whole records.
#[derive(Debug)]
pub struct ChannelWindows {
    channels: Vec<SlidingWindow>,
    records_seen: u64,
    last_sequence: Option<u64>,
}

impl ChannelWindows {
    /// `channels` windows of `capacity` values each.
    pub fn new(channels: usize, capacity: usize) -> AppResult<Self> {
        let channels = (0..channels)
            .map(|_| SlidingWindow::new(capacity))
            .collect::<AppResult<Vec<_>>>()?;
        Ok(Self {
            channels,
            records_seen: 0,
            last_sequence: None,
        })
    }

    /// Windows sized from `sample_rate * window_seconds`.
    pub fn from_config(config: &WindowConfig, channels: usize) -> AppResult<Self> {
        Self::new(channels, config.window_samples())
    }

    /// Push every channel of `record`.
    ///
    /// All channel pushes are applied before this returns; values beyond the
    /// configured channel count are ignored.
    pub fn push_record(&mut self, record: &SampleRecord) {
        for (window, &value) in self.channels.iter_mut().zip(record.values()) {
            window.push(value);
        }
        self.records_seen += 1;
        self.last_sequence = Some(record.sequence());
    }

    /// Push a batch of records in order.
    pub fn extend<'a>(&mut self, records: impl IntoIterator<Item = &'a SampleRecord>) {
        for record in records {
            self.push_record(record);
        }
    }

    /// Snapshot of one channel.
    pub fn snapshot(&self, channel: usize) -> Option<Vec<u16>> {
        self.channels.get(channel).map(SlidingWindow::snapshot)
    }

    /// Snapshots of every channel.
    pub fn snapshot_all(&self) -> Vec<Vec<u16>> {
        self.channels.iter().map(SlidingWindow::snapshot).collect()
    }

    /// A single channel's window.
    pub fn channel(&self, channel: usize) -> Option<&SlidingWindow> {
        self.channels.get(channel)
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Records pushed so far.
    pub fn records_seen(&self) -> u64 {
        self.records_seen
    }

    /// Sequence number of the last record pushed.
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_last_capacity_values() {
        let mut window = SlidingWindow::new(3).unwrap();
        for v in 1..=5 {
            window.push(v);
        }
        assert_eq!(window.snapshot(), vec![3, 4, 5]);
        assert_eq!(window.len(), 3);
        assert_eq!(window.latest(), Some(5));
    }

    #[test]
    fn partial_window_is_in_insertion_order() {
        let mut window = SlidingWindow::new(8).unwrap();
        window.push(10);
        window.push(2);
        assert_eq!(window.snapshot(), vec![10, 2]);
        assert!(!window.is_empty());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(SlidingWindow::new(0).is_err());
        assert!(ChannelWindows::new(2, 0).is_err());
    }

    #[test]
    fn summary_tracks_extremes() {
        let mut window = SlidingWindow::new(4).unwrap();
        assert_eq!(window.summary(), None);
        for v in [7, 3, 9, 4, 5] {
            window.push(v);
        }
        assert_eq!(
            window.summary(),
            Some(WindowSummary {
                len: 4,
                min: 3,
                max: 9,
                latest: 5
            })
        );
        window.clear();
        assert!(window.is_empty());
        assert_eq!(window.summary(), None);
    }

    #[test]
    fn records_fan_out_to_channels() {
        let mut windows = ChannelWindows::new(2, 2).unwrap();
        let records: Vec<SampleRecord> = (0..3)
            .map(|i| SampleRecord::new(i, vec![i as u16, 100 + i as u16]))
            .collect();
        windows.extend(&records);
        assert_eq!(windows.snapshot_all(), vec![vec![1, 2], vec![101, 102]]);
        assert_eq!(windows.records_seen(), 3);
        assert_eq!(windows.last_sequence(), Some(2));
        assert_eq!(windows.snapshot(2), None);
    }

    #[test]
    fn sized_from_sample_rate_and_duration() {
        let config = WindowConfig {
            sample_rate: 25_000.0,
            window_seconds: 0.1,
        };
        let windows = ChannelWindows::from_config(&config, 2).unwrap();
        assert_eq!(windows.channel(0).map(SlidingWindow::capacity), Some(2500));
    }
}
