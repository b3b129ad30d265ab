// UALINK MODEL — DL COMMAND FLITS
// Ack and Replay Request command flits: factory, classification, and the
// receive-side dispatcher. Command flits carry no payload; the whole 636-byte
// covered region (mostly zeros) is still CRC-protected.

use crate::dl::flit::{
    decode_command_flit_header, encode_command_flit_header, CommandFlitHeader, DlFlit,
};
use crate::dl::replay::SeqTracker;

/// Command flit opcodes. Explicit (payload/NOP) flits use op 0b000 and are
/// not commands.
pub const OP_ACK: u8 = 0b010;
pub const OP_REPLAY_REQUEST: u8 = 0b011;

/// Build an Ack command flit. `ack_seq` is the last successfully received
/// sequence; `flit_seq_lo` carries the low 3 bits of the sender's own
/// transmit sequence.
pub fn make_ack(ack_seq: u16, flit_seq_lo: u8) -> DlFlit {
    make_command(OP_ACK, ack_seq, flit_seq_lo)
}

/// Build a Replay Request command flit. `replay_seq` is the first sequence
/// to retransmit.
pub fn make_replay_request(replay_seq: u16, flit_seq_lo: u8) -> DlFlit {
    make_command(OP_REPLAY_REQUEST, replay_seq, flit_seq_lo)
}

fn make_command(op: u8, ack_req_seq: u16, flit_seq_lo: u8) -> DlFlit {
    let header = CommandFlitHeader {
        op,
        payload: false,
        ack_req_seq: ack_req_seq & 0x1FF,
        flit_seq_lo: flit_seq_lo & 0x7,
    };

    let mut flit: DlFlit = bytemuck::Zeroable::zeroed();
    flit.flit_header = match encode_command_flit_header(&header) {
        Ok(bytes) => bytes,
        Err(_) => unreachable!(),
    };
    flit.seal();
    flit
}

/// Classification of a received flit on the command path.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CommandClass {
    /// Payload bit set or unknown opcode; hand to the payload path.
    NotCommand,
    /// A command whose CRC failed; consume and drop.
    BadCrc,
    Ack(u16),
    ReplayRequest(u16),
}

/// Decode a flit on the command path. Payload flits fall through untouched;
/// any other flit is CRC-verified before its opcode is trusted, so a
/// corrupted command is consumed rather than misread as payload.
pub fn classify_flit(flit: &DlFlit) -> CommandClass {
    let header = decode_command_flit_header(&flit.flit_header);

    if header.payload {
        return CommandClass::NotCommand;
    }

    if !flit.crc_ok() {
        return CommandClass::BadCrc;
    }

    match header.op {
        OP_ACK => CommandClass::Ack(header.ack_req_seq),
        OP_REPLAY_REQUEST => CommandClass::ReplayRequest(header.ack_req_seq),
        _ => CommandClass::NotCommand,
    }
}

// ============================================================================
// COMMAND PROCESSOR
// ============================================================================

pub type AckCallback = Box<dyn FnMut(u16)>;
pub type ReplayRequestCallback = Box<dyn FnMut(u16)>;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CmdStats {
    pub acks_received: u64,
    pub replay_requests_received: u64,
    pub command_crc_drops: u64,
}

/// Receive-side command dispatcher. Classifies each flit and fires the owned
/// callbacks; a `false` return means the flit was not a command and should be
/// handled as payload.
pub struct CmdProcessor {
    ack_callback: Option<AckCallback>,
    replay_request_callback: Option<ReplayRequestCallback>,
    stats: CmdStats,
}

impl CmdProcessor {
    pub fn new() -> Self {
        CmdProcessor {
            ack_callback: None,
            replay_request_callback: None,
            stats: CmdStats::default(),
        }
    }

    pub fn set_ack_callback(&mut self, callback: impl FnMut(u16) + 'static) {
        self.ack_callback = Some(Box::new(callback));
    }

    pub fn set_replay_request_callback(&mut self, callback: impl FnMut(u16) + 'static) {
        self.replay_request_callback = Some(Box::new(callback));
    }

    pub fn has_ack_callback(&self) -> bool {
        self.ack_callback.is_some()
    }

    pub fn has_replay_request_callback(&self) -> bool {
        self.replay_request_callback.is_some()
    }

    pub fn clear_callbacks(&mut self) {
        self.ack_callback = None;
        self.replay_request_callback = None;
    }

    /// Process a received flit. Returns `true` when the flit was consumed as
    /// a command (including CRC-dropped commands), `false` when the caller
    /// should treat it as a payload flit.
    pub fn process_flit(&mut self, flit: &DlFlit) -> bool {
        match classify_flit(flit) {
            CommandClass::NotCommand => false,
            CommandClass::BadCrc => {
                self.stats.command_crc_drops += 1;
                log::debug!("command flit dropped: crc mismatch");
                true
            }
            CommandClass::Ack(ack_seq) => {
                self.stats.acks_received += 1;
                if let Some(callback) = self.ack_callback.as_mut() {
                    callback(ack_seq);
                }
                true
            }
            CommandClass::ReplayRequest(replay_seq) => {
                self.stats.replay_requests_received += 1;
                if let Some(callback) = self.replay_request_callback.as_mut() {
                    callback(replay_seq);
                }
                true
            }
        }
    }

    pub fn stats(&self) -> CmdStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = CmdStats::default();
    }
}

impl Default for CmdProcessor {
    fn default() -> Self {
        CmdProcessor::new()
    }
}

// ============================================================================
// ACK / REPLAY-REQUEST MANAGER
// ============================================================================

/// Receive-side sequence tracking plus Ack / Replay Request synthesis.
/// `ack_every_n == 0` acks every flit; N > 0 batches acks.
pub struct AckReqManager {
    tracker: SeqTracker,
    ack_every_n: usize,
    flits_since_ack: usize,
}

impl AckReqManager {
    pub fn new() -> Self {
        AckReqManager {
            tracker: SeqTracker::new(),
            ack_every_n: 0,
            flits_since_ack: 0,
        }
    }

    /// Track one received payload sequence and synthesise the command flit to
    /// send back, if any. Expected sequences advance the tracker and may emit
    /// an Ack; duplicates are dropped silently; a gap emits a Replay Request
    /// for the expected sequence without advancing.
    pub fn process_received(&mut self, received_seq: u16, our_tx_seq_lo: u8) -> Option<DlFlit> {
        if self.tracker.is_expected(received_seq) {
            self.tracker.advance();
            self.flits_since_ack += 1;

            if self.ack_every_n == 0 || self.flits_since_ack >= self.ack_every_n {
                self.flits_since_ack = 0;
                return Some(make_ack(received_seq, our_tx_seq_lo));
            }
            return None;
        }

        if self.tracker.is_duplicate(received_seq) {
            return None;
        }

        let expected = self.tracker.expected_seq();
        log::debug!(
            "rx gap: got seq {received_seq}, expected {expected}; requesting replay"
        );
        Some(make_replay_request(expected, our_tx_seq_lo))
    }

    pub fn expected_rx_seq(&self) -> u16 {
        self.tracker.expected_seq()
    }

    pub fn set_ack_every_n(&mut self, n: usize) {
        self.ack_every_n = n;
    }

    pub fn ack_every_n(&self) -> usize {
        self.ack_every_n
    }

    pub fn reset(&mut self) {
        self.tracker.reset();
        self.flits_since_ack = 0;
    }
}

impl Default for AckReqManager {
    fn default() -> Self {
        AckReqManager::new()
    }
}
