//! Frame Synchronizer.
//!
//! Tracks how many bytes of the sync marker have been matched so far and reports
//! when the whole marker has been seen. Bytes that do not extend the match are simply
//! dropped; nothing here is an error.

use crate::error::{AppResult, DaqError};
use crate::frame::format::{FrameFormat, SyncPolicy};

/// Byte-at-a-time marker matcher.
#[derive(Debug, Clone)]
pub struct FrameSynchronizer {
    marker: Box<[u8]>,
    policy: SyncPolicy,
    matched: usize,
}

impl FrameSynchronizer {
    /// Matcher for an arbitrary non-empty marker.
    pub fn new(marker: &[u8], policy: SyncPolicy) -> AppResult<Self> {
        if marker.is_empty() {
            return Err(DaqError::InvalidFormat(
                "sync marker must contain at least one byte".into(),
            ));
        }
        Ok(Self {
            marker: marker.into(),
            policy,
            matched: 0,
        })
    }

    /// Matcher for a descriptor's marker and policy.
    pub fn for_format(format: &FrameFormat) -> Self {
        Self {
            marker: format.sync_bytes().into(),
            policy: format.policy(),
            matched: 0,
        }
    }

    /// Feed one byte. Returns `true` exactly when this byte completes the marker.
    ///
    /// The partial match is reset to zero after a completed marker, so three marker
    /// bytes in a row (`FF FF FF` for an `FF FF` marker) give one match and leave a
    /// one-byte partial match behind.
    pub fn push(&mut self, byte: u8) -> bool {
        if byte == self.marker[self.matched] {
            self.matched += 1;
        } else if self.policy == SyncPolicy::Restart && self.matched > 0 && byte == self.marker[0] {
            self.matched = 1;
        } else {
            self.matched = 0;
        }

        if self.matched == self.marker.len() {
            self.matched = 0;
            true
        } else {
            false
        }
    }

    /// Marker bytes matched so far.
    pub fn matched(&self) -> usize {
        self.matched
    }

    /// Marker length.
    pub fn marker_len(&self) -> usize {
        self.marker.len()
    }

    /// Drop any partial match.
    pub fn reset(&mut self) {
        self.matched = 0;
    }

    /// Pre-load a partial match of `matched` bytes.
    ///
    /// Used after a completed marker to account for the marker's own tail starting
    /// the next one. Values that are not a proper prefix length are ignored.
    pub(crate) fn arm(&mut self, matched: usize) {
        if matched < self.marker.len() {
            self.matched = matched;
        }
    }
}
