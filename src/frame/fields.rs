//! Field extraction rules.
//!
//! A frame payload is a handful of bytes; each [`FieldRule`] turns two of them into
//! one channel value. Two layouts exist on the wire:
//!
//! - **Masked**: big-endian 16-bit word, then a bit mask. The 12-bit ADC frames use
//!   `mask = 0x0FFF`.
//! - **Nibble**: the whole first byte shifted left by four, joined with the high
//!   nibble of the second byte. The low nibble of the second byte is dropped, which
//!   gives a 12-bit value per channel.

/// Bytes consumed by every rule.
pub const FIELD_WIDTH: usize = 2;

/// One channel extraction rule, addressed by byte offset into the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// `((payload[offset] << 8) | payload[offset + 1]) & mask`
    Masked {
        /// First byte of the big-endian word
        offset: usize,
        /// Mask applied after assembly
        mask: u16,
    },
    /// `(payload[offset] << 4) | (payload[offset + 1] >> 4)`
    Nibble {
        /// First byte of the packed pair
        offset: usize,
    },
}

impl FieldRule {
    /// Masked rule with the low `bits` bits kept.
    ///
    /// `bits` is clamped to 16.
    pub fn masked_bits(offset: usize, bits: u8) -> Self {
        let mask = if bits >= 16 {
            u16::MAX
        } else {
            (1u16 << bits) - 1
        };
        FieldRule::Masked { offset, mask }
    }

    /// Byte offset of the first byte this rule reads.
    pub fn offset(&self) -> usize {
        match *self {
            FieldRule::Masked { offset, .. } | FieldRule::Nibble { offset } => offset,
        }
    }

    /// Number of payload bytes this rule consumes.
    pub fn width(&self) -> usize {
        FIELD_WIDTH
    }

    /// Widest value this rule can produce, in bits.
    pub fn value_bits(&self) -> u32 {
        match *self {
            FieldRule::Masked { mask, .. } => u16::BITS - mask.leading_zeros(),
            FieldRule::Nibble { .. } => 12,
        }
    }

    /// Extract this rule's value from a payload.
    ///
    /// Returns `None` when the payload is too short to hold the field.
    pub fn extract(&self, payload: &[u8]) -> Option<u16> {
        let offset = self.offset();
        let hi = u16::from(*payload.get(offset)?);
        let lo = u16::from(*payload.get(offset + 1)?);
        Some(match *self {
            FieldRule::Masked { mask, .. } => ((hi << 8) | lo) & mask,
            FieldRule::Nibble { .. } => (hi << 4) | (lo >> 4),
        })
    }
}

/// Two's-complement view of a 16-bit field.
///
/// Presentation only: values above 32767 map to `value - 65536`. Stored records
/// always keep the unsigned value.
pub fn to_signed16(value: u16) -> i16 {
    value as i16
}
