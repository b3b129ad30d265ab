// UALINK MODEL — DL REPLAY
// Transmit replay buffer and receive sequence tracker. The buffer is a fixed
// 512-entry ring holding full flit copies keyed by sequence number; entries
// are contiguous in sequence order. Retirement is cumulative on Ack;
// retransmission walks the ring from the requested sequence to the newest.

use crate::dl::flit::DlFlit;
use crate::dl::{seq_covered_by_ack, seq_forward_distance, wrap_seq, SEQ_HALF_WINDOW};

/// Number of flits that can be outstanding before an Ack must retire space.
pub const REPLAY_BUFFER_SIZE: usize = 512;

struct Entry {
    seq_no: u16,
    flit: DlFlit,
    valid: bool,
}

/// Replay buffer for link-level reliability. Exclusively owns its stored
/// flits; replay hands out borrowed views.
pub struct ReplayBuffer {
    entries: Box<[Entry]>,
    head: usize,
    tail: usize,
    count: usize,
}

impl ReplayBuffer {
    pub fn new() -> Self {
        let mut entries = Vec::with_capacity(REPLAY_BUFFER_SIZE);
        for _ in 0..REPLAY_BUFFER_SIZE {
            entries.push(Entry {
                seq_no: 0,
                flit: bytemuck::Zeroable::zeroed(),
                valid: false,
            });
        }
        ReplayBuffer {
            entries: entries.into_boxed_slice(),
            head: 0,
            tail: 0,
            count: 0,
        }
    }

    /// Append a transmitted flit under its sequence number. Returns `false`
    /// when full; the caller must backpressure until an Ack retires space.
    pub fn add(&mut self, seq_no: u16, flit: &DlFlit) -> bool {
        if self.is_full() {
            log::warn!("replay buffer full, refusing seq {seq_no}");
            return false;
        }

        let entry = &mut self.entries[self.tail];
        entry.seq_no = seq_no;
        entry.flit = *flit;
        entry.valid = true;

        self.tail = (self.tail + 1) % REPLAY_BUFFER_SIZE;
        self.count += 1;
        true
    }

    /// Cumulative Ack: retire every entry with sequence <= `ack_seq` in
    /// nearest-direction modular order, from the head, stopping once the
    /// acknowledged sequence itself has been retired. Returns the number of
    /// entries retired.
    pub fn retire_through(&mut self, ack_seq: u16) -> usize {
        let mut retired = 0;

        while !self.is_empty() {
            let oldest = self.entries[self.head].seq_no;
            if !seq_covered_by_ack(oldest, ack_seq) {
                break;
            }

            self.entries[self.head].valid = false;
            self.head = (self.head + 1) % REPLAY_BUFFER_SIZE;
            self.count -= 1;
            retired += 1;

            if oldest == ack_seq {
                break;
            }
        }

        retired
    }

    /// Borrowed ordered iterator over the buffered flits from `seq` to the
    /// newest entry. A sequence not present in the buffer yields an empty
    /// iterator.
    pub fn iter_from(&self, seq: u16) -> ReplayIter<'_> {
        let mut index = self.head;
        for skipped in 0..self.count {
            if self.entries[index].valid && self.entries[index].seq_no == seq {
                return ReplayIter {
                    entries: &self.entries,
                    pos: index,
                    remaining: self.count - skipped,
                };
            }
            index = (index + 1) % REPLAY_BUFFER_SIZE;
        }
        ReplayIter {
            entries: &self.entries,
            pos: 0,
            remaining: 0,
        }
    }

    pub fn contains_seq(&self, seq: u16) -> bool {
        let mut index = self.head;
        for _ in 0..self.count {
            if self.entries[index].valid && self.entries[index].seq_no == seq {
                return true;
            }
            index = (index + 1) % REPLAY_BUFFER_SIZE;
        }
        false
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == REPLAY_BUFFER_SIZE
    }

    /// Oldest unacknowledged sequence number.
    pub fn oldest_seq(&self) -> Option<u16> {
        if self.is_empty() {
            return None;
        }
        Some(self.entries[self.head].seq_no)
    }

    /// Newest buffered sequence number.
    pub fn newest_seq(&self) -> Option<u16> {
        if self.is_empty() {
            return None;
        }
        let last = (self.tail + REPLAY_BUFFER_SIZE - 1) % REPLAY_BUFFER_SIZE;
        Some(self.entries[last].seq_no)
    }

    pub fn clear(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.valid = false;
        }
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

impl Default for ReplayBuffer {
    fn default() -> Self {
        ReplayBuffer::new()
    }
}

/// Ordered borrowed view over a replay span.
pub struct ReplayIter<'a> {
    entries: &'a [Entry],
    pos: usize,
    remaining: usize,
}

impl<'a> Iterator for ReplayIter<'a> {
    type Item = &'a DlFlit;

    fn next(&mut self) -> Option<&'a DlFlit> {
        if self.remaining == 0 {
            return None;
        }
        let flit = &self.entries[self.pos].flit;
        self.pos = (self.pos + 1) % REPLAY_BUFFER_SIZE;
        self.remaining -= 1;
        Some(flit)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

// ============================================================================
// RECEIVE SEQUENCE TRACKER
// ============================================================================

/// Tracks the next expected receive sequence number. Starts at 1 (0 is
/// reserved) and advances 1→2→…→511→1.
pub struct SeqTracker {
    expected_seq: u16,
}

impl SeqTracker {
    pub fn new() -> Self {
        SeqTracker { expected_seq: 1 }
    }

    #[inline(always)]
    pub fn is_expected(&self, seq_no: u16) -> bool {
        seq_no == self.expected_seq
    }

    /// `seq_no` lies behind the expected sequence in nearest-direction
    /// modular distance: already received.
    #[inline(always)]
    pub fn is_duplicate(&self, seq_no: u16) -> bool {
        let behind = seq_forward_distance(seq_no, self.expected_seq);
        behind >= 1 && behind <= SEQ_HALF_WINDOW
    }

    pub fn advance(&mut self) {
        self.expected_seq = wrap_seq(self.expected_seq);
    }

    pub fn expected_seq(&self) -> u16 {
        self.expected_seq
    }

    pub fn reset(&mut self) {
        self.expected_seq = 1;
    }
}

impl Default for SeqTracker {
    fn default() -> Self {
        SeqTracker::new()
    }
}
