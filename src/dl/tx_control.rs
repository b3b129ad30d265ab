// UALINK MODEL — DL TX CONTROLLER
// Transmit-side flit sequencing: sequence allocation for payload flits, NOP
// sequencing (NOPs reuse Tx_last_seq), replay-mode tracking, and the
// explicit/command alternation counter that schedules inline command flits.

use crate::dl::command::{make_ack, make_replay_request};
use crate::dl::flit::DlFlit;
use crate::dl::wrap_seq;

/// Initial value of the explicit-flit countdown.
pub const EXPLICIT_COUNT_INIT: u8 = 0x1F;

/// Transmit sequencing state.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TxState {
    /// Last transmitted sequence number; 0 until the first payload flit.
    pub last_seq: u16,
    /// Countdown to the next command-flit opportunity.
    pub explicit_count: u8,
    /// Currently replaying buffered flits.
    pub in_replay: bool,
    /// First flit of the replay sequence not yet emitted.
    pub first_replay: bool,
}

impl Default for TxState {
    fn default() -> Self {
        TxState {
            last_seq: 0,
            explicit_count: EXPLICIT_COUNT_INIT,
            in_replay: false,
            first_replay: false,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TxStats {
    pub payload_flits_sent: u64,
    pub nop_flits_sent: u64,
    pub ack_flits_sent: u64,
    pub replay_req_flits_sent: u64,
    /// Number of times replay mode was entered.
    pub replay_sequences: u64,
}

pub struct TxController {
    state: TxState,
    stats: TxStats,
}

impl TxController {
    pub fn new() -> Self {
        TxController {
            state: TxState::default(),
            stats: TxStats::default(),
        }
    }

    /// Allocate the sequence number for the next payload flit. The second
    /// element says whether the caller should add the flit to the replay
    /// buffer (replayed flits are re-emitted verbatim, never re-buffered).
    pub fn next_payload_seq(&mut self) -> (u16, bool) {
        let next_seq = wrap_seq(self.state.last_seq);
        self.state.last_seq = next_seq;
        self.stats.payload_flits_sent += 1;
        (next_seq, !self.state.in_replay)
    }

    /// NOP flits reuse Tx_last_seq and do not consume a sequence number.
    pub fn nop_seq(&mut self) -> u16 {
        self.stats.nop_flits_sent += 1;
        self.state.last_seq
    }

    pub fn start_replay(&mut self) {
        log::debug!("tx entering replay mode (last_seq {})", self.state.last_seq);
        self.state.in_replay = true;
        self.state.first_replay = true;
        self.stats.replay_sequences += 1;
    }

    pub fn finish_replay(&mut self) {
        self.state.in_replay = false;
        self.state.first_replay = false;
    }

    pub fn is_replaying(&self) -> bool {
        self.state.in_replay
    }

    /// Tick the explicit/command alternation counter. Returns `true` when the
    /// next slot is a command-flit opportunity. The first flit of a replay
    /// sequence is always an opportunity and re-arms the counter.
    pub fn tick_explicit_count(&mut self) -> bool {
        if self.state.first_replay {
            self.state.first_replay = false;
            self.state.explicit_count = EXPLICIT_COUNT_INIT;
            return true;
        }

        if self.state.explicit_count > 0 {
            self.state.explicit_count -= 1;
        }

        if self.state.explicit_count == 0 {
            self.state.explicit_count = EXPLICIT_COUNT_INIT;
            return true;
        }

        false
    }

    /// Build an Ack command flit stamped with our low transmit-sequence bits.
    pub fn make_ack(&mut self, ack_seq: u16) -> DlFlit {
        self.stats.ack_flits_sent += 1;
        make_ack(ack_seq, (self.state.last_seq & 0x7) as u8)
    }

    /// Build a Replay Request command flit stamped with our low
    /// transmit-sequence bits.
    pub fn make_replay_request(&mut self, replay_seq: u16) -> DlFlit {
        self.stats.replay_req_flits_sent += 1;
        make_replay_request(replay_seq, (self.state.last_seq & 0x7) as u8)
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn reset(&mut self) {
        self.state = TxState::default();
    }

    pub fn stats(&self) -> TxStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = TxStats::default();
    }
}

impl Default for TxController {
    fn default() -> Self {
        TxController::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dl::command::{OP_ACK, OP_REPLAY_REQUEST};
    use crate::dl::flit::decode_command_flit_header;

    #[test]
    fn payload_sequence_starts_at_one_and_wraps() {
        let mut tx = TxController::new();
        assert_eq!(tx.next_payload_seq(), (1, true));
        assert_eq!(tx.next_payload_seq(), (2, true));

        for _ in 2..511 {
            tx.next_payload_seq();
        }
        assert_eq!(tx.state().last_seq, 511);
        // 511 wraps to 1, never to the reserved 0.
        assert_eq!(tx.next_payload_seq().0, 1);
    }

    #[test]
    fn nop_reuses_last_seq() {
        let mut tx = TxController::new();
        tx.next_payload_seq();
        tx.next_payload_seq();
        assert_eq!(tx.nop_seq(), 2);
        assert_eq!(tx.state().last_seq, 2);
        assert_eq!(tx.stats().nop_flits_sent, 1);
    }

    #[test]
    fn replay_suppresses_buffering() {
        let mut tx = TxController::new();
        assert_eq!(tx.next_payload_seq().1, true);
        tx.start_replay();
        assert!(tx.is_replaying());
        assert_eq!(tx.next_payload_seq().1, false);
        tx.finish_replay();
        assert_eq!(tx.next_payload_seq().1, true);
        assert_eq!(tx.stats().replay_sequences, 1);
    }

    #[test]
    fn explicit_count_fires_every_0x1f_flits() {
        let mut tx = TxController::new();
        let mut fired = 0;
        for _ in 0..(EXPLICIT_COUNT_INIT as usize) {
            if tx.tick_explicit_count() {
                fired += 1;
            }
        }
        assert_eq!(fired, 1);
        // Counter re-arms for the next cycle.
        for _ in 0..(EXPLICIT_COUNT_INIT as usize - 1) {
            assert!(!tx.tick_explicit_count());
        }
        assert!(tx.tick_explicit_count());
    }

    #[test]
    fn first_replay_flit_is_command_opportunity() {
        let mut tx = TxController::new();
        tx.tick_explicit_count();
        tx.start_replay();
        assert!(tx.tick_explicit_count());
        // Counter was re-armed by the replay entry.
        assert!(!tx.tick_explicit_count());
        assert_eq!(tx.state().explicit_count, EXPLICIT_COUNT_INIT - 1);
    }

    #[test]
    fn command_flits_carry_low_seq_bits() {
        let mut tx = TxController::new();
        for _ in 0..13 {
            tx.next_payload_seq();
        }

        let ack = tx.make_ack(9);
        let header = decode_command_flit_header(&ack.flit_header);
        assert_eq!(header.op, OP_ACK);
        assert_eq!(header.ack_req_seq, 9);
        assert_eq!(header.flit_seq_lo, (13 & 0x7) as u8);

        let replay = tx.make_replay_request(4);
        let header = decode_command_flit_header(&replay.flit_header);
        assert_eq!(header.op, OP_REPLAY_REQUEST);
        assert_eq!(header.ack_req_seq, 4);

        assert_eq!(tx.stats().ack_flits_sent, 1);
        assert_eq!(tx.stats().replay_req_flits_sent, 1);
    }

    #[test]
    fn reset_restores_initial_state() {
        let mut tx = TxController::new();
        tx.next_payload_seq();
        tx.start_replay();
        tx.reset();
        assert_eq!(tx.state(), TxState::default());
        // Stats reset is explicit and separate.
        assert_eq!(tx.stats().payload_flits_sent, 1);
        tx.reset_stats();
        assert_eq!(tx.stats(), TxStats::default());
    }
}
