//! In-flight STREAM frames awaiting acknowledgment.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Identifies one STREAM frame: `(stream_id, offset)`.
pub type FrameKey = (u64, u64);

/// An unacknowledged STREAM frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    /// When the frame was last (re)transmitted.
    pub sent_at: Instant,
    /// The frame's payload, resent verbatim on timeout.
    pub payload: Vec<u8>,
    /// Number of timeout retransmissions so far.
    pub retransmits: u32,
}

impl PendingSend {
    /// Whether this entry has waited longer than `timeout` at `now`.
    pub fn is_expired(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.sent_at) > timeout
    }
}

/// Table of in-flight frames, at most one entry per [`FrameKey`].
#[derive(Debug, Clone, Default)]
pub struct PendingSends {
    entries: BTreeMap<FrameKey, PendingSend>,
}

impl PendingSends {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a first transmission.
    pub fn insert(&mut self, stream_id: u64, offset: u64, payload: Vec<u8>, now: Instant) {
        self.entries.insert(
            (stream_id, offset),
            PendingSend {
                sent_at: now,
                payload,
                retransmits: 0,
            },
        );
    }

    /// Match an ACK. Returns the RTT if the frame was in flight; `None` for
    /// a duplicate or unknown acknowledgment.
    pub fn acknowledge(&mut self, stream_id: u64, offset: u64, now: Instant) -> Option<(Duration, PendingSend)> {
        let entry = self.entries.remove(&(stream_id, offset))?;
        Some((now.saturating_duration_since(entry.sent_at), entry))
    }

    /// Keys of every entry older than `timeout`, in key order.
    pub fn expired(&self, now: Instant, timeout: Duration) -> Vec<FrameKey> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.is_expired(now, timeout))
            .map(|(key, _)| *key)
            .collect()
    }

    /// Restamp an entry for retransmission and return it.
    pub fn mark_resent(&mut self, key: FrameKey, now: Instant) -> Option<&PendingSend> {
        let entry = self.entries.get_mut(&key)?;
        entry.sent_at = now;
        entry.retransmits += 1;
        Some(entry)
    }

    /// Look up an entry.
    pub fn get(&self, stream_id: u64, offset: u64) -> Option<&PendingSend> {
        self.entries.get(&(stream_id, offset))
    }

    /// Frames in flight.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is in flight.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget everything. Returns how many entries were abandoned.
    pub fn clear(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }
}
