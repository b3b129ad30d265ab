// UALINK MODEL — UPLI MESSAGE CODEC
// UPLI messages mirror the TL opcodes for passthrough and add priority and
// virtual-channel fields. Requests carry an 8-byte header, responses a
// 4-byte header; every message occupies one 64-byte flit.

use crate::bits::{field, FieldError, PacketFormat};
use crate::upli::DATA_BEAT_BYTES;

/// UPLI message flit: one 64-byte beat.
pub type UpliFlit = [u8; DATA_BEAT_BYTES];

/// UPLI opcodes; numbering matches the TL opcodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum UpliOpcode {
    ReadRequest = 0,
    ReadResponse = 1,
    WriteRequest = 2,
    WriteCompletion = 3,
    Message = 4,
    AtomicRequest = 5,
    AtomicResponse = 6,
    Reserved = 7,
}

impl UpliOpcode {
    pub fn from_bits(bits: u8) -> UpliOpcode {
        match bits & 0x7 {
            0 => UpliOpcode::ReadRequest,
            1 => UpliOpcode::ReadResponse,
            2 => UpliOpcode::WriteRequest,
            3 => UpliOpcode::WriteCompletion,
            4 => UpliOpcode::Message,
            5 => UpliOpcode::AtomicRequest,
            6 => UpliOpcode::AtomicResponse,
            _ => UpliOpcode::Reserved,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum UpliPriority {
    Low = 0,
    #[default]
    Medium = 1,
    High = 2,
    Critical = 3,
}

impl UpliPriority {
    pub fn from_bits(bits: u8) -> UpliPriority {
        match bits & 0x3 {
            0 => UpliPriority::Low,
            1 => UpliPriority::Medium,
            2 => UpliPriority::High,
            _ => UpliPriority::Critical,
        }
    }
}

pub const UPLI_MESSAGE_HEADER_FORMAT: PacketFormat<7> = PacketFormat::new([
    field("opcode", 3),
    field("priority", 2),
    field("vc", 2),
    field("size", 3),
    field("tag", 12),
    field("address_hi", 16),
    field("address_lo", 26),
]);

pub const UPLI_RESPONSE_HEADER_FORMAT: PacketFormat<7> = PacketFormat::new([
    field("opcode", 3),
    field("priority", 2),
    field("vc", 2),
    field("status", 4),
    field("tag", 12),
    field("data_valid", 1),
    field("_reserved", 8),
]);

const _: () = assert!(UPLI_MESSAGE_HEADER_FORMAT.total_bits() == 64);
const _: () = assert!(UPLI_RESPONSE_HEADER_FORMAT.total_bits() == 32);

/// Highest encodable message address (42 bits, split hi/lo).
pub const UPLI_ADDRESS_MAX: u64 = 0x3FF_FFFF_FFFF;

/// Payload room behind the 8-byte request header.
pub const UPLI_MAX_PAYLOAD_BYTES: usize = DATA_BEAT_BYTES - 8;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpliMessageHeader {
    pub opcode: UpliOpcode,
    pub priority: UpliPriority,
    pub vc: u8,
    pub size: u8,
    pub tag: u16,
    pub address: u64,
}

impl Default for UpliMessageHeader {
    fn default() -> Self {
        UpliMessageHeader {
            opcode: UpliOpcode::ReadRequest,
            priority: UpliPriority::Medium,
            vc: 0,
            size: 0,
            tag: 0,
            address: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpliResponseHeader {
    pub opcode: UpliOpcode,
    pub priority: UpliPriority,
    pub vc: u8,
    pub status: u8,
    pub tag: u16,
    pub data_valid: bool,
}

impl Default for UpliResponseHeader {
    fn default() -> Self {
        UpliResponseHeader {
            opcode: UpliOpcode::ReadResponse,
            priority: UpliPriority::Medium,
            vc: 0,
            status: 0,
            tag: 0,
            data_valid: false,
        }
    }
}

pub fn encode_message_header(header: &UpliMessageHeader) -> Result<[u8; 8], FieldError> {
    if header.address > UPLI_ADDRESS_MAX {
        return Err(FieldError::OutOfRange {
            name: "address",
            value: header.address,
            width: 42,
        });
    }

    let mut out = [0u8; 8];
    UPLI_MESSAGE_HEADER_FORMAT.pack(
        &[
            header.opcode as u64,
            header.priority as u64,
            header.vc as u64,
            header.size as u64,
            header.tag as u64,
            (header.address >> 26) & 0xFFFF,
            header.address & 0x3FF_FFFF,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn decode_message_header(bytes: &[u8; 8]) -> UpliMessageHeader {
    let v = UPLI_MESSAGE_HEADER_FORMAT.unpack(bytes);
    UpliMessageHeader {
        opcode: UpliOpcode::from_bits(v[0] as u8),
        priority: UpliPriority::from_bits(v[1] as u8),
        vc: v[2] as u8,
        size: v[3] as u8,
        tag: v[4] as u16,
        address: (v[5] << 26) | v[6],
    }
}

pub fn encode_response_header(header: &UpliResponseHeader) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    UPLI_RESPONSE_HEADER_FORMAT.pack(
        &[
            header.opcode as u64,
            header.priority as u64,
            header.vc as u64,
            header.status as u64,
            header.tag as u64,
            header.data_valid as u64,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn decode_response_header(bytes: &[u8; 4]) -> UpliResponseHeader {
    let v = UPLI_RESPONSE_HEADER_FORMAT.unpack(bytes);
    UpliResponseHeader {
        opcode: UpliOpcode::from_bits(v[0] as u8),
        priority: UpliPriority::from_bits(v[1] as u8),
        vc: v[2] as u8,
        status: v[3] as u8,
        tag: v[4] as u16,
        data_valid: v[5] != 0,
    }
}

// ============================================================================
// MESSAGE FLITS
// ============================================================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpliReadRequest {
    pub header: UpliMessageHeader,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpliReadResponse {
    pub header: UpliResponseHeader,
    pub data: [u8; DATA_BEAT_BYTES - 4],
}

impl Default for UpliReadResponse {
    fn default() -> Self {
        UpliReadResponse {
            header: UpliResponseHeader::default(),
            data: [0u8; DATA_BEAT_BYTES - 4],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpliWriteRequest {
    pub header: UpliMessageHeader,
    pub data: [u8; UPLI_MAX_PAYLOAD_BYTES],
}

impl Default for UpliWriteRequest {
    fn default() -> Self {
        UpliWriteRequest {
            header: UpliMessageHeader::default(),
            data: [0u8; UPLI_MAX_PAYLOAD_BYTES],
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpliWriteCompletion {
    pub header: UpliResponseHeader,
}

pub fn serialize_read_request(request: &UpliReadRequest) -> Result<UpliFlit, FieldError> {
    let mut flit = [0u8; DATA_BEAT_BYTES];
    flit[..8].copy_from_slice(&encode_message_header(&request.header)?);
    Ok(flit)
}

pub fn serialize_read_response(response: &UpliReadResponse) -> Result<UpliFlit, FieldError> {
    let mut flit = [0u8; DATA_BEAT_BYTES];
    flit[..4].copy_from_slice(&encode_response_header(&response.header)?);
    flit[4..].copy_from_slice(&response.data);
    Ok(flit)
}

pub fn serialize_write_request(request: &UpliWriteRequest) -> Result<UpliFlit, FieldError> {
    let mut flit = [0u8; DATA_BEAT_BYTES];
    flit[..8].copy_from_slice(&encode_message_header(&request.header)?);
    flit[8..].copy_from_slice(&request.data);
    Ok(flit)
}

pub fn serialize_write_completion(completion: &UpliWriteCompletion) -> Result<UpliFlit, FieldError> {
    let mut flit = [0u8; DATA_BEAT_BYTES];
    flit[..4].copy_from_slice(&encode_response_header(&completion.header)?);
    Ok(flit)
}

pub fn decode_opcode(flit: &UpliFlit) -> UpliOpcode {
    UpliOpcode::from_bits((flit[0] >> 5) & 0x7)
}

pub fn deserialize_read_request(flit: &UpliFlit) -> Option<UpliReadRequest> {
    if decode_opcode(flit) != UpliOpcode::ReadRequest {
        return None;
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&flit[..8]);
    Some(UpliReadRequest {
        header: decode_message_header(&header),
    })
}

pub fn deserialize_read_response(flit: &UpliFlit) -> Option<UpliReadResponse> {
    if decode_opcode(flit) != UpliOpcode::ReadResponse {
        return None;
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&flit[..4]);
    let mut response = UpliReadResponse {
        header: decode_response_header(&header),
        data: [0u8; DATA_BEAT_BYTES - 4],
    };
    response.data.copy_from_slice(&flit[4..]);
    Some(response)
}

pub fn deserialize_write_request(flit: &UpliFlit) -> Option<UpliWriteRequest> {
    if decode_opcode(flit) != UpliOpcode::WriteRequest {
        return None;
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&flit[..8]);
    let mut request = UpliWriteRequest {
        header: decode_message_header(&header),
        data: [0u8; UPLI_MAX_PAYLOAD_BYTES],
    };
    request.data.copy_from_slice(&flit[8..]);
    Some(request)
}

pub fn deserialize_write_completion(flit: &UpliFlit) -> Option<UpliWriteCompletion> {
    if decode_opcode(flit) != UpliOpcode::WriteCompletion {
        return None;
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&flit[..4]);
    Some(UpliWriteCompletion {
        header: decode_response_header(&header),
    })
}
