// UALINK MODEL — DL FLIT FRAMING
// 640-byte DL flit: 3-byte flit header, 5 one-byte segment headers, 628-byte
// payload, 4-byte CRC. The CRC covers everything before it. TL flits (64 B)
// occupy fixed slots inside the five segments; segments 3 and 4 are short and
// carry slot 0 only.

use bytemuck::{Pod, Zeroable};
use core::fmt;
use core::mem;

use crate::bits::{field, FieldError, PacketFormat};
use crate::crc::{compute_crc32, verify_crc32};
use crate::dl::inject::{ErrorInjector, ErrorKind};
use crate::dl::pacing::{PacingController, PacingDecision};
use crate::dl::{
    CRC_COVERED_BYTES, DL_FLIT_BYTES, DL_PAYLOAD_BYTES, DL_SEGMENT_COUNT, SEGMENT_PAYLOAD_BYTES,
    SEGMENT_PAYLOAD_OFFSETS,
};
use crate::tl::TL_FLIT_BYTES;

// ============================================================================
// HEADER FORMATS
// ============================================================================

pub const EXPLICIT_FLIT_HEADER_FORMAT: PacketFormat<5> = PacketFormat::new([
    field("op", 3),
    field("payload", 1),
    field("_reserved0", 3),
    field("flit_seq_no", 9),
    field("_reserved1", 8),
]);

pub const COMMAND_FLIT_HEADER_FORMAT: PacketFormat<5> = PacketFormat::new([
    field("op", 3),
    field("payload", 1),
    field("ack_req_seq", 9),
    field("flit_seq_lo", 3),
    field("_reserved1", 8),
]);

pub const SEGMENT_HEADER_FORMAT: PacketFormat<6> = PacketFormat::new([
    field("tl_flit1", 1),
    field("message1", 2),
    field("tl_flit0", 1),
    field("message0", 2),
    field("_reserved", 1),
    field("dl_alt_sector", 1),
]);

/// Opcode carried by explicit (payload/NOP) flits.
pub const OP_EXPLICIT: u8 = 0b000;

// ============================================================================
// WIRE STRUCTURES
// ============================================================================

/// One 64-byte TL flit plus the 2-bit message field carried in the owning
/// segment header slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlFlit {
    pub data: [u8; TL_FLIT_BYTES],
    pub message_field: u8,
}

impl TlFlit {
    pub const fn new(data: [u8; TL_FLIT_BYTES], message_field: u8) -> Self {
        TlFlit {
            data,
            message_field,
        }
    }
}

impl Default for TlFlit {
    fn default() -> Self {
        TlFlit {
            data: [0u8; TL_FLIT_BYTES],
            message_field: 0,
        }
    }
}

/// One DL flit as laid out on the wire. Plain bytes; `bytemuck` gives the
/// zero-copy 640-byte view the CRC is computed over.
#[repr(C)]
#[derive(Copy, Clone, PartialEq, Eq, Pod, Zeroable)]
pub struct DlFlit {
    pub flit_header: [u8; 3],
    pub segment_headers: [u8; DL_SEGMENT_COUNT],
    pub payload: [u8; DL_PAYLOAD_BYTES],
    pub crc: [u8; 4],
}

const _: () = assert!(mem::size_of::<DlFlit>() == DL_FLIT_BYTES);

impl DlFlit {
    /// The CRC-covered region: header, segment headers, payload.
    pub fn crc_region(&self) -> &[u8] {
        &bytemuck::bytes_of(self)[..CRC_COVERED_BYTES]
    }

    pub fn compute_crc(&self) -> [u8; 4] {
        compute_crc32(self.crc_region())
    }

    /// Stamp the CRC field from the current contents.
    pub fn seal(&mut self) {
        self.crc = self.compute_crc();
    }

    pub fn crc_ok(&self) -> bool {
        verify_crc32(self.crc_region(), &self.crc)
    }
}

impl fmt::Debug for DlFlit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DlFlit {{ header: {:02X?}, segments: {:02X?}, crc: {:02X?} }}",
            self.flit_header, self.segment_headers, self.crc
        )
    }
}

// ============================================================================
// HEADER FIELD RECORDS
// ============================================================================

/// Explicit (payload / NOP) flit header fields. op=0, payload=1 for payload
/// flits.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ExplicitFlitHeader {
    pub op: u8,
    pub payload: bool,
    pub flit_seq_no: u16,
}

/// Command (Ack / Replay Request) flit header fields. payload=0.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CommandFlitHeader {
    pub op: u8,
    pub payload: bool,
    pub ack_req_seq: u16,
    pub flit_seq_lo: u8,
}

/// Per-segment header fields.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentHeader {
    pub tl_flit0: bool,
    pub message0: u8,
    pub tl_flit1: bool,
    pub message1: u8,
    pub dl_alt_sector: bool,
}

pub fn encode_explicit_flit_header(h: &ExplicitFlitHeader) -> Result<[u8; 3], FieldError> {
    let mut out = [0u8; 3];
    EXPLICIT_FLIT_HEADER_FORMAT.pack(
        &[h.op as u64, h.payload as u64, 0, h.flit_seq_no as u64, 0],
        &mut out,
    )?;
    Ok(out)
}

pub fn decode_explicit_flit_header(bytes: &[u8; 3]) -> ExplicitFlitHeader {
    let v = EXPLICIT_FLIT_HEADER_FORMAT.unpack(bytes);
    ExplicitFlitHeader {
        op: v[0] as u8,
        payload: v[1] != 0,
        flit_seq_no: v[3] as u16,
    }
}

pub fn encode_command_flit_header(h: &CommandFlitHeader) -> Result<[u8; 3], FieldError> {
    let mut out = [0u8; 3];
    COMMAND_FLIT_HEADER_FORMAT.pack(
        &[
            h.op as u64,
            h.payload as u64,
            h.ack_req_seq as u64,
            h.flit_seq_lo as u64,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn decode_command_flit_header(bytes: &[u8; 3]) -> CommandFlitHeader {
    let v = COMMAND_FLIT_HEADER_FORMAT.unpack(bytes);
    CommandFlitHeader {
        op: v[0] as u8,
        payload: v[1] != 0,
        ack_req_seq: v[2] as u16,
        flit_seq_lo: v[3] as u8,
    }
}

pub fn encode_segment_header(h: &SegmentHeader) -> Result<u8, FieldError> {
    let mut out = [0u8; 1];
    SEGMENT_HEADER_FORMAT.pack(
        &[
            h.tl_flit1 as u64,
            h.message1 as u64,
            h.tl_flit0 as u64,
            h.message0 as u64,
            0,
            h.dl_alt_sector as u64,
        ],
        &mut out,
    )?;
    Ok(out[0])
}

pub fn decode_segment_header(byte: u8) -> SegmentHeader {
    let v = SEGMENT_HEADER_FORMAT.unpack(&[byte]);
    SegmentHeader {
        tl_flit1: v[0] != 0,
        message1: v[1] as u8,
        tl_flit0: v[2] != 0,
        message0: v[3] as u8,
        dl_alt_sector: v[5] != 0,
    }
}

// ============================================================================
// TL SLOT MAP
// ============================================================================

/// (segment, slot, payload offset) for each packable TL flit position, in
/// wire order. Slot 1 requires a full 128-byte segment, so the two short
/// segments contribute one slot each.
const TL_SLOTS: [(usize, usize, usize); 8] = [
    (0, 0, 0),
    (0, 1, 64),
    (1, 0, 128),
    (1, 1, 192),
    (2, 0, 256),
    (2, 1, 320),
    (3, 0, 384),
    (4, 0, 508),
];

/// Maximum TL flits one DL flit can carry.
pub const MAX_TL_FLITS_PER_DL_FLIT: usize = TL_SLOTS.len();

// ============================================================================
// PACK / UNPACK
// ============================================================================

/// Pack up to [`MAX_TL_FLITS_PER_DL_FLIT`] TL flits into a DL flit with the
/// given explicit header, stamping segment headers and CRC. Returns the flit
/// and the number of TL flits actually packed.
pub fn pack_flit(
    tl_flits: &[TlFlit],
    header: &ExplicitFlitHeader,
) -> Result<(DlFlit, usize), FieldError> {
    let mut flit = DlFlit::zeroed();
    flit.flit_header = encode_explicit_flit_header(header)?;

    let packed = tl_flits.len().min(MAX_TL_FLITS_PER_DL_FLIT);
    let mut segments = [SegmentHeader::default(); DL_SEGMENT_COUNT];

    for (tl_flit, &(segment, slot, offset)) in tl_flits.iter().zip(TL_SLOTS.iter()).take(packed) {
        flit.payload[offset..offset + TL_FLIT_BYTES].copy_from_slice(&tl_flit.data);
        let message = tl_flit.message_field & 0x3;
        if slot == 0 {
            segments[segment].tl_flit0 = true;
            segments[segment].message0 = message;
        } else {
            segments[segment].tl_flit1 = true;
            segments[segment].message1 = message;
        }
    }

    for (byte, fields) in flit.segment_headers.iter_mut().zip(segments.iter()) {
        *byte = encode_segment_header(fields)?;
    }

    flit.seal();
    Ok((flit, packed))
}

/// Lift TL flits out of a DL flit in segment/slot order. Headers are taken at
/// face value; unknown message bits are preserved verbatim. Never fails —
/// CRC verification is the sole rejection mechanism at this layer.
pub fn unpack_flit(flit: &DlFlit) -> Vec<TlFlit> {
    let mut tl_flits = Vec::new();

    for segment in 0..DL_SEGMENT_COUNT {
        let header = decode_segment_header(flit.segment_headers[segment]);
        let offset = SEGMENT_PAYLOAD_OFFSETS[segment];
        let size = SEGMENT_PAYLOAD_BYTES[segment];

        if header.tl_flit0 && size >= TL_FLIT_BYTES {
            let mut tl_flit = TlFlit::default();
            tl_flit.data.copy_from_slice(&flit.payload[offset..offset + TL_FLIT_BYTES]);
            tl_flit.message_field = header.message0;
            tl_flits.push(tl_flit);
        }

        if header.tl_flit1 && size >= 2 * TL_FLIT_BYTES {
            let start = offset + TL_FLIT_BYTES;
            let mut tl_flit = TlFlit::default();
            tl_flit.data.copy_from_slice(&flit.payload[start..start + TL_FLIT_BYTES]);
            tl_flit.message_field = header.message1;
            tl_flits.push(tl_flit);
        }
    }

    tl_flits
}

/// CRC-checked unpack. On CRC mismatch returns `None`; the caller must not
/// consume any TL flits from this DL flit.
pub fn unpack_flit_checked(flit: &DlFlit) -> Option<Vec<TlFlit>> {
    if !flit.crc_ok() {
        log::debug!(
            "dl flit rejected: crc mismatch (wire {:02X?}, computed {:02X?})",
            flit.crc,
            flit.compute_crc()
        );
        return None;
    }
    Some(unpack_flit(flit))
}

// ============================================================================
// PACED / INJECTED VARIANTS
// ============================================================================

/// Pack with a tx pacing check first. Drop and Throttle both yield an empty
/// flit with a packed count of 0; the caller accounts the drop.
pub fn pack_flit_with_pacing(
    tl_flits: &[TlFlit],
    header: &ExplicitFlitHeader,
    pacing: &mut PacingController,
) -> Result<(DlFlit, usize), FieldError> {
    let total_bytes = tl_flits.len() * TL_FLIT_BYTES;
    match pacing.check_tx(tl_flits.len(), total_bytes) {
        PacingDecision::Allow => pack_flit(tl_flits, header),
        PacingDecision::Throttle | PacingDecision::Drop => Ok((DlFlit::zeroed(), 0)),
    }
}

/// Pack with error injection on the outgoing flit. A PacketDrop decision
/// yields an empty flit with a packed count of 0; other error kinds corrupt
/// the packed flit in place.
pub fn pack_flit_with_injection(
    tl_flits: &[TlFlit],
    header: &ExplicitFlitHeader,
    injector: &mut ErrorInjector,
) -> Result<(DlFlit, usize), FieldError> {
    if injector.should_drop() {
        return Ok((DlFlit::zeroed(), 0));
    }

    let (flit, packed) = pack_flit(tl_flits, header)?;

    let error = injector.next_error();
    if error != ErrorKind::None && error != ErrorKind::PacketDrop {
        return Ok((injector.apply(&flit, error), packed));
    }

    Ok((flit, packed))
}

/// Unpack without CRC check, reporting the flit to the rx rate hook.
pub fn unpack_flit_with_pacing(flit: &DlFlit, pacing: &mut PacingController) -> Vec<TlFlit> {
    let tl_flits = unpack_flit(flit);
    pacing.notify_rx(tl_flits.len(), tl_flits.len() * TL_FLIT_BYTES, true);
    tl_flits
}

/// CRC-checked unpack, reporting the flit and CRC status to the rx rate hook.
pub fn unpack_flit_checked_with_pacing(
    flit: &DlFlit,
    pacing: &mut PacingController,
) -> Option<Vec<TlFlit>> {
    let result = unpack_flit_checked(flit);
    let count = result.as_ref().map_or(0, Vec::len);
    pacing.notify_rx(count, count * TL_FLIT_BYTES, result.is_some());
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tl(fill_start: u8, message_field: u8) -> TlFlit {
        let mut data = [0u8; TL_FLIT_BYTES];
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = fill_start.wrapping_add(i as u8);
        }
        TlFlit::new(data, message_field)
    }

    #[test]
    fn explicit_header_round_trip() {
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 1,
        };
        let bytes = encode_explicit_flit_header(&header).unwrap();
        assert_eq!(bytes, [0x10, 0x01, 0x00]);
        assert_eq!(decode_explicit_flit_header(&bytes), header);
    }

    #[test]
    fn explicit_header_rejects_wide_seq() {
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 0x200,
        };
        assert!(matches!(
            encode_explicit_flit_header(&header),
            Err(FieldError::OutOfRange { name: "flit_seq_no", .. })
        ));
    }

    #[test]
    fn command_header_round_trip() {
        let header = CommandFlitHeader {
            op: 0b010,
            payload: false,
            ack_req_seq: 0x1AB,
            flit_seq_lo: 0b101,
        };
        let bytes = encode_command_flit_header(&header).unwrap();
        assert_eq!(decode_command_flit_header(&bytes), header);
    }

    #[test]
    fn segment_header_round_trip() {
        let header = SegmentHeader {
            tl_flit0: true,
            message0: 1,
            tl_flit1: true,
            message1: 2,
            dl_alt_sector: false,
        };
        let byte = encode_segment_header(&header).unwrap();
        assert_eq!(byte, 0xD4);
        assert_eq!(decode_segment_header(byte), header);
    }

    #[test]
    fn pack_two_tl_flits() {
        let a = tl(0x10, 1);
        let b = tl(0x80, 2);
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 1,
        };

        let (flit, packed) = pack_flit(&[a, b], &header).unwrap();
        assert_eq!(packed, 2);

        let seg0 = decode_segment_header(flit.segment_headers[0]);
        assert!(seg0.tl_flit0);
        assert!(seg0.tl_flit1);
        assert_eq!(seg0.message0, 1);
        assert_eq!(seg0.message1, 2);
        assert!(!seg0.dl_alt_sector);

        let out = unpack_flit_checked(&flit).unwrap();
        assert_eq!(out, vec![a, b]);
    }

    #[test]
    fn pack_full_flit_round_trips() {
        let inputs: Vec<TlFlit> = (0..MAX_TL_FLITS_PER_DL_FLIT as u8)
            .map(|i| tl(i * 7, i & 0x3))
            .collect();
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 42,
        };

        let (flit, packed) = pack_flit(&inputs, &header).unwrap();
        assert_eq!(packed, MAX_TL_FLITS_PER_DL_FLIT);

        // Short segments carry slot 0 only.
        let seg3 = decode_segment_header(flit.segment_headers[3]);
        let seg4 = decode_segment_header(flit.segment_headers[4]);
        assert!(seg3.tl_flit0 && !seg3.tl_flit1);
        assert!(seg4.tl_flit0 && !seg4.tl_flit1);

        assert_eq!(unpack_flit_checked(&flit).unwrap(), inputs);
    }

    #[test]
    fn overfull_input_truncates() {
        let inputs: Vec<TlFlit> = (0..12u8).map(|i| tl(i, 0)).collect();
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 3,
        };
        let (flit, packed) = pack_flit(&inputs, &header).unwrap();
        assert_eq!(packed, MAX_TL_FLITS_PER_DL_FLIT);
        assert_eq!(
            unpack_flit(&flit),
            inputs[..MAX_TL_FLITS_PER_DL_FLIT].to_vec()
        );
    }

    #[test]
    fn empty_flit_round_trips() {
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 9,
        };
        let (flit, packed) = pack_flit(&[], &header).unwrap();
        assert_eq!(packed, 0);
        assert!(flit.crc_ok());
        assert!(unpack_flit_checked(&flit).unwrap().is_empty());
    }

    #[test]
    fn crc_corruption_rejects_unpack() {
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 1,
        };
        let (mut flit, _) = pack_flit(&[tl(1, 0)], &header).unwrap();
        flit.payload[100] ^= 0xFF;
        assert!(unpack_flit_checked(&flit).is_none());
        // Unchecked unpack still lifts the (corrupt) payload.
        assert_eq!(unpack_flit(&flit).len(), 1);
    }

    #[test]
    fn paced_pack_drops_and_throttles_to_empty() {
        let mut pacing = PacingController::new();
        pacing.set_tx_callback(|count, _| {
            if count > 1 {
                PacingDecision::Throttle
            } else {
                PacingDecision::Allow
            }
        });
        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 4,
        };

        let (_, packed) = pack_flit_with_pacing(&[tl(0, 0)], &header, &mut pacing).unwrap();
        assert_eq!(packed, 1);

        let (flit, packed) =
            pack_flit_with_pacing(&[tl(0, 0), tl(1, 0)], &header, &mut pacing).unwrap();
        assert_eq!(packed, 0);
        assert_eq!(flit, DlFlit::zeroed());
    }

    #[test]
    fn rx_pacing_observes_crc_status() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut pacing = PacingController::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        pacing.set_rx_callback(move |count, _, ok| sink.borrow_mut().push((count, ok)));

        let header = ExplicitFlitHeader {
            op: 0,
            payload: true,
            flit_seq_no: 1,
        };
        let (mut flit, _) = pack_flit(&[tl(3, 0)], &header).unwrap();
        assert!(unpack_flit_checked_with_pacing(&flit, &mut pacing).is_some());

        flit.payload[0] ^= 1;
        assert!(unpack_flit_checked_with_pacing(&flit, &mut pacing).is_none());
        assert_eq!(*seen.borrow(), vec![(1, true), (0, false)]);
    }

    #[test]
    fn header_seq_matters_to_crc() {
        let a = pack_flit(
            &[],
            &ExplicitFlitHeader {
                op: 0,
                payload: true,
                flit_seq_no: 1,
            },
        )
        .unwrap()
        .0;
        let b = pack_flit(
            &[],
            &ExplicitFlitHeader {
                op: 0,
                payload: true,
                flit_seq_no: 2,
            },
        )
        .unwrap()
        .0;
        assert_ne!(a.crc, b.crc);
    }
}
