// UALINK MODEL — CRATE ROOT
// Behavioral model of the UALink lower layers: bit-exact TL/DL/UPLI codecs
// plus the DL reliability and DL-message state machines. Pure data in, pure
// data out: the model consumes flit/DWord buffers and timestamp integers and
// never does I/O, timers, or threads of its own.
//
// Module hierarchy:
//   bits      — declarative MSB-first bit-field packing engine
//   crc       — CRC-32/IEEE-802.3 (unreflected, big-endian)
//   tl/       — Transaction Layer flit and field-dictionary codecs
//   dl/       — Data Link layer: flit framing, reliability engine,
//               DL-message codec/queue/processor, pacing, error injection
//   upli/     — UPLI accelerator-port channel, message, and credit encoding
//   security  — 96-bit security IV codec
//   endpoint  — one-link-side façade composing the DL stack

pub mod bits;
pub mod crc;
pub mod dl;
pub mod endpoint;
pub mod security;
pub mod tl;
pub mod upli;
