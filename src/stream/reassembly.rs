//! Per-stream in-order delivery.

use std::collections::BTreeMap;

/// Receive-side state for one stream: the next offset owed to the
/// application and any chunks that arrived ahead of it.
///
/// Bytes are released in strictly increasing offset order with no gaps and
/// no duplicates. Gaps are held indefinitely; recovery is the sender's job.
#[derive(Debug, Clone, Default)]
pub struct StreamDeliveryState {
    next_offset: u64,
    pending: BTreeMap<u64, Vec<u8>>,
}

impl StreamDeliveryState {
    /// Fresh stream expecting offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next offset the application has not yet received.
    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    /// Chunks held waiting for a gap to fill.
    pub fn buffered_chunks(&self) -> usize {
        self.pending.len()
    }

    /// Bytes held waiting for a gap to fill.
    pub fn buffered_bytes(&self) -> usize {
        self.pending.values().map(Vec::len).sum()
    }

    /// Accept a chunk and return every contiguous run it unblocks, in order.
    pub fn insert(&mut self, offset: u64, mut data: Vec<u8>) -> Vec<Vec<u8>> {
        let end = offset.saturating_add(data.len() as u64);
        if data.is_empty() || end <= self.next_offset {
            tracing::trace!(offset, len = data.len(), "duplicate chunk dropped");
            return Vec::new();
        }

        let mut offset = offset;
        if offset < self.next_offset {
            data.drain(..(self.next_offset - offset) as usize);
            offset = self.next_offset;
        }

        match self.pending.get(&offset) {
            Some(held) if held.len() >= data.len() => {}
            _ => {
                self.pending.insert(offset, data);
            }
        }

        self.release()
    }

    fn release(&mut self) -> Vec<Vec<u8>> {
        let mut released = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            let offset = *entry.key();
            if offset > self.next_offset {
                break;
            }
            let mut chunk = entry.remove();
            let end = offset + chunk.len() as u64;
            if end <= self.next_offset {
                continue;
            }
            if offset < self.next_offset {
                chunk.drain(..(self.next_offset - offset) as usize);
            }
            self.next_offset = end;
            released.push(chunk);
        }
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_passthrough() {
        let mut s = StreamDeliveryState::new();
        assert_eq!(s.insert(0, b"abc".to_vec()), vec![b"abc".to_vec()]);
        assert_eq!(s.insert(3, b"de".to_vec()), vec![b"de".to_vec()]);
        assert_eq!(s.next_offset(), 5);
    }

    #[test]
    fn test_out_of_order_held_until_gap_fills() {
        let mut s = StreamDeliveryState::new();

        assert!(s.insert(10, vec![2; 10]).is_empty());
        assert_eq!(s.next_offset(), 0);
        assert_eq!(s.buffered_chunks(), 1);
        assert_eq!(s.buffered_bytes(), 10);

        let released = s.insert(0, vec![1; 10]);
        assert_eq!(released, vec![vec![1; 10], vec![2; 10]]);
        assert_eq!(s.next_offset(), 20);
        assert_eq!(s.buffered_chunks(), 0);
    }

    #[test]
    fn test_gap_in_middle_releases_prefix_only() {
        let mut s = StreamDeliveryState::new();
        assert!(s.insert(20, b"z".to_vec()).is_empty());
        assert_eq!(s.insert(0, vec![0; 10]), vec![vec![0; 10]]);
        assert_eq!(s.next_offset(), 10);
        assert_eq!(s.buffered_chunks(), 1);
    }

    #[test]
    fn test_duplicates_ignored() {
        let mut s = StreamDeliveryState::new();
        s.insert(0, b"hello".to_vec());
        assert!(s.insert(0, b"hello".to_vec()).is_empty());

        // Duplicate of a still-buffered chunk
        assert!(s.insert(10, b"world".to_vec()).is_empty());
        assert!(s.insert(10, b"world".to_vec()).is_empty());
        assert_eq!(s.buffered_chunks(), 1);

        assert_eq!(s.insert(5, b"_____".to_vec()), vec![b"_____".to_vec(), b"world".to_vec()]);
        assert_eq!(s.next_offset(), 15);
    }

    #[test]
    fn test_straddling_chunk_trimmed() {
        let mut s = StreamDeliveryState::new();
        s.insert(0, b"abcd".to_vec());
        assert_eq!(s.insert(2, b"cdef".to_vec()), vec![b"ef".to_vec()]);
        assert_eq!(s.next_offset(), 6);
    }

    #[test]
    fn test_buffered_overlap_trimmed_on_release() {
        let mut s = StreamDeliveryState::new();
        assert!(s.insert(3, b"defg".to_vec()).is_empty());
        assert_eq!(
            s.insert(0, b"abcde".to_vec()),
            vec![b"abcde".to_vec(), b"fg".to_vec()]
        );
        assert_eq!(s.next_offset(), 7);
    }

    #[test]
    fn test_empty_chunk_is_noop() {
        let mut s = StreamDeliveryState::new();
        assert!(s.insert(0, Vec::new()).is_empty());
        assert_eq!(s.next_offset(), 0);
        assert_eq!(s.buffered_chunks(), 0);
    }
}
