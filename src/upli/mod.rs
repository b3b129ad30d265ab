// UALINK MODEL — UPLI ACCELERATOR PORT
// UPLI channel encodings (request / originator data / read response / write
// response / credit return), the UPLI message header codec, and credit-based
// flow control.

pub mod channel;
pub mod credit;
pub mod message;

/// Number of TDM ports multiplexed on one UPLI interface.
pub const MAX_PORTS: usize = 4;
/// One data beat on the OrigData / RdRsp channels.
pub const DATA_BEAT_BYTES: usize = 64;
/// Virtual channels per port.
pub const MAX_VIRTUAL_CHANNELS: usize = 4;
