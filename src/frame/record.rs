//! Decoded frame output.

use crate::frame::fields::to_signed16;

/// One decoded frame: channel values plus the decoder's sequence number.
///
/// Immutable once produced. Values are always the unsigned field values; use
/// [`SampleRecord::signed`] for a two's-complement view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SampleRecord {
    sequence: u64,
    values: Box<[u16]>,
}

impl SampleRecord {
    /// Build a record. Normally only the decoder does this.
    pub fn new(sequence: u64, values: impl Into<Box<[u16]>>) -> Self {
        Self {
            sequence,
            values: values.into(),
        }
    }

    /// Position of this record in the decoder's output, starting at 0.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Channel values in descriptor order.
    pub fn values(&self) -> &[u16] {
        &self.values
    }

    /// Value of one channel.
    pub fn channel(&self, index: usize) -> Option<u16> {
        self.values.get(index).copied()
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.values.len()
    }

    /// Two's-complement view of one channel.
    pub fn signed(&self, index: usize) -> Option<i16> {
        self.channel(index).map(to_signed16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors() {
        let record = SampleRecord::new(7, vec![0x123, 0xFFFE]);
        assert_eq!(record.sequence(), 7);
        assert_eq!(record.channel_count(), 2);
        assert_eq!(record.channel(0), Some(0x123));
        assert_eq!(record.channel(2), None);
        assert_eq!(record.signed(1), Some(-2));
        assert_eq!(record.values(), &[0x123, 0xFFFE]);
    }
}
