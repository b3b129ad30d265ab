// UALINK MODEL — DATA LINK LAYER
// Canonical DL wire constants and the modulo-511 sequence space. All multi-
// byte fields on the DL wire are big-endian, MSB-first.
//
//   flit.rs       — 640-byte flit framing, segment layout, CRC coverage
//   replay.rs     — transmit replay buffer + receive sequence tracker
//   tx_control.rs — sequence allocation, replay mode, command scheduling
//   command.rs    — Ack / Replay Request command flits
//   message.rs    — DL message DWord codec
//   queue.rs      — three-class round-robin DL message arbiter
//   processor.rs  — receive-side DL message dispatch
//   pacing.rs     — tx pacing / rx rate hooks
//   inject.rs     — error injection for negative testing

pub mod command;
pub mod flit;
pub mod inject;
pub mod message;
pub mod pacing;
pub mod processor;
pub mod queue;
pub mod replay;
pub mod tx_control;

/// DL flit size on the wire.
pub const DL_FLIT_BYTES: usize = 640;
/// Payload region carried by one DL flit.
pub const DL_PAYLOAD_BYTES: usize = 628;
/// Number of payload segments per DL flit.
pub const DL_SEGMENT_COUNT: usize = 5;
/// CRC coverage: flit header (3) + segment headers (5) + payload (628).
pub const CRC_COVERED_BYTES: usize = 3 + DL_SEGMENT_COUNT + DL_PAYLOAD_BYTES;

/// Per-segment payload sizes. Segments 3 and 4 are short.
pub const SEGMENT_PAYLOAD_BYTES: [usize; DL_SEGMENT_COUNT] = [128, 128, 128, 124, 120];
/// Per-segment payload offsets within the 628-byte payload region.
pub const SEGMENT_PAYLOAD_OFFSETS: [usize; DL_SEGMENT_COUNT] = [0, 128, 256, 384, 508];

const _: () = assert!(CRC_COVERED_BYTES == 636);
const _: () = assert!(SEGMENT_PAYLOAD_OFFSETS[4] + SEGMENT_PAYLOAD_BYTES[4] == DL_PAYLOAD_BYTES);

// ============================================================================
// SEQUENCE SPACE
// ============================================================================

/// Lowest valid flit sequence number. 0 is reserved.
pub const SEQ_MIN: u16 = 1;
/// Highest valid flit sequence number; wraps back to 1.
pub const SEQ_MAX: u16 = 511;
/// Size of the valid sequence ring (1..=511).
pub const SEQ_RING: u16 = 511;
/// Half-window for nearest-direction modular comparison.
pub const SEQ_HALF_WINDOW: u16 = SEQ_RING / 2;

/// Next sequence number: 511 wraps to 1, never to the reserved 0.
#[inline(always)]
pub const fn wrap_seq(seq: u16) -> u16 {
    if seq >= SEQ_MAX {
        SEQ_MIN
    } else {
        seq + 1
    }
}

/// Forward distance from `from` to `to` on the 1..=511 ring.
/// 0 means equal; values up to `SEQ_HALF_WINDOW` mean `to` is ahead of `from`.
#[inline(always)]
pub const fn seq_forward_distance(from: u16, to: u16) -> u16 {
    (to + SEQ_RING - from) % SEQ_RING
}

/// `seq` is covered by a cumulative ack for `ack_seq` (seq <= ack_seq in
/// nearest-direction modular order).
#[inline(always)]
pub const fn seq_covered_by_ack(seq: u16, ack_seq: u16) -> bool {
    seq_forward_distance(seq, ack_seq) <= SEQ_HALF_WINDOW
}

// ============================================================================
// LINK STATE
// ============================================================================

/// DL link state. "DL Up" is a super-state; its sub-states are represented
/// explicitly for the behavioral model.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DlLinkState {
    Up = 0,
    Nop = 1,
    Idle = 2,
    Fault = 3,
}

#[inline(always)]
pub const fn is_dl_up(state: DlLinkState) -> bool {
    matches!(
        state,
        DlLinkState::Up | DlLinkState::Nop | DlLinkState::Idle | DlLinkState::Fault
    )
}
