// UALINK MODEL — TL FLIT CODEC
// Request/response headers and the four transaction flit layouts. A request
// header is 8 bytes (42-bit address split hi/lo); a response header is 4
// bytes; the rest of the 64-byte flit carries data or zeros.

use crate::bits::{field, FieldError, PacketFormat};
use crate::tl::TL_FLIT_BYTES;

/// TL operation codes, 3 bits at the top of every flit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TlOpcode {
    ReadRequest = 0,
    ReadResponse = 1,
    WriteRequest = 2,
    WriteCompletion = 3,
    Message = 4,
    AtomicRequest = 5,
    AtomicResponse = 6,
    Reserved = 7,
}

impl TlOpcode {
    pub fn from_bits(bits: u8) -> TlOpcode {
        match bits & 0x7 {
            0 => TlOpcode::ReadRequest,
            1 => TlOpcode::ReadResponse,
            2 => TlOpcode::WriteRequest,
            3 => TlOpcode::WriteCompletion,
            4 => TlOpcode::Message,
            5 => TlOpcode::AtomicRequest,
            6 => TlOpcode::AtomicResponse,
            _ => TlOpcode::Reserved,
        }
    }
}

/// Values of the 2-bit message field in the owning segment header.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum TlMessageType {
    #[default]
    None = 0,
    Start = 1,
    Continue = 2,
    End = 3,
}

impl TlMessageType {
    pub fn from_field(bits: u8) -> TlMessageType {
        match bits {
            1 => TlMessageType::Start,
            2 => TlMessageType::Continue,
            3 => TlMessageType::End,
            _ => TlMessageType::None,
        }
    }
}

pub const TL_REQUEST_HEADER_FORMAT: PacketFormat<6> = PacketFormat::new([
    field("opcode", 3),
    field("half_flit", 1),
    field("size", 6),
    field("tag", 12),
    field("address_hi", 16),
    field("address_lo", 26),
]);

pub const TL_RESPONSE_HEADER_FORMAT: PacketFormat<6> = PacketFormat::new([
    field("opcode", 3),
    field("half_flit", 1),
    field("status", 4),
    field("tag", 12),
    field("data_valid", 1),
    field("_reserved", 11),
]);

/// Highest encodable request address (42 bits).
pub const TL_ADDRESS_MAX: u64 = 0x3FF_FFFF_FFFF;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlRequestHeader {
    pub opcode: TlOpcode,
    pub half_flit: bool,
    pub size: u8,
    pub tag: u16,
    pub address: u64,
}

impl Default for TlRequestHeader {
    fn default() -> Self {
        TlRequestHeader {
            opcode: TlOpcode::ReadRequest,
            half_flit: false,
            size: 0,
            tag: 0,
            address: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlResponseHeader {
    pub opcode: TlOpcode,
    pub half_flit: bool,
    pub status: u8,
    pub tag: u16,
    pub data_valid: bool,
}

impl Default for TlResponseHeader {
    fn default() -> Self {
        TlResponseHeader {
            opcode: TlOpcode::ReadResponse,
            half_flit: false,
            status: 0,
            tag: 0,
            data_valid: false,
        }
    }
}

pub fn encode_request_header(header: &TlRequestHeader) -> Result<[u8; 8], FieldError> {
    if header.address > TL_ADDRESS_MAX {
        return Err(FieldError::OutOfRange {
            name: "address",
            value: header.address,
            width: 42,
        });
    }

    let mut out = [0u8; 8];
    TL_REQUEST_HEADER_FORMAT.pack(
        &[
            header.opcode as u64,
            header.half_flit as u64,
            header.size as u64,
            header.tag as u64,
            (header.address >> 26) & 0xFFFF,
            header.address & 0x3FF_FFFF,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn decode_request_header(bytes: &[u8; 8]) -> TlRequestHeader {
    let v = TL_REQUEST_HEADER_FORMAT.unpack(bytes);
    TlRequestHeader {
        opcode: TlOpcode::from_bits(v[0] as u8),
        half_flit: v[1] != 0,
        size: v[2] as u8,
        tag: v[3] as u16,
        address: (v[4] << 26) | v[5],
    }
}

pub fn encode_response_header(header: &TlResponseHeader) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    TL_RESPONSE_HEADER_FORMAT.pack(
        &[
            header.opcode as u64,
            header.half_flit as u64,
            header.status as u64,
            header.tag as u64,
            header.data_valid as u64,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn decode_response_header(bytes: &[u8; 4]) -> TlResponseHeader {
    let v = TL_RESPONSE_HEADER_FORMAT.unpack(bytes);
    TlResponseHeader {
        opcode: TlOpcode::from_bits(v[0] as u8),
        half_flit: v[1] != 0,
        status: v[2] as u8,
        tag: v[3] as u16,
        data_valid: v[4] != 0,
    }
}

// ============================================================================
// TRANSACTION FLITS
// ============================================================================

/// Read response data: the flit minus the 4-byte response header.
pub const TL_READ_DATA_BYTES: usize = TL_FLIT_BYTES - 4;
/// Write request data: the flit minus the 8-byte request header.
pub const TL_WRITE_DATA_BYTES: usize = TL_FLIT_BYTES - 8;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlReadRequest {
    pub header: TlRequestHeader,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlReadResponse {
    pub header: TlResponseHeader,
    pub data: [u8; TL_READ_DATA_BYTES],
}

impl Default for TlReadResponse {
    fn default() -> Self {
        TlReadResponse {
            header: TlResponseHeader::default(),
            data: [0u8; TL_READ_DATA_BYTES],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TlWriteRequest {
    pub header: TlRequestHeader,
    pub data: [u8; TL_WRITE_DATA_BYTES],
}

impl Default for TlWriteRequest {
    fn default() -> Self {
        TlWriteRequest {
            header: TlRequestHeader::default(),
            data: [0u8; TL_WRITE_DATA_BYTES],
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlWriteCompletion {
    pub header: TlResponseHeader,
}

pub fn serialize_read_request(request: &TlReadRequest) -> Result<[u8; TL_FLIT_BYTES], FieldError> {
    let mut flit = [0u8; TL_FLIT_BYTES];
    flit[..8].copy_from_slice(&encode_request_header(&request.header)?);
    Ok(flit)
}

pub fn serialize_read_response(
    response: &TlReadResponse,
) -> Result<[u8; TL_FLIT_BYTES], FieldError> {
    let mut flit = [0u8; TL_FLIT_BYTES];
    flit[..4].copy_from_slice(&encode_response_header(&response.header)?);
    flit[4..].copy_from_slice(&response.data);
    Ok(flit)
}

pub fn serialize_write_request(
    request: &TlWriteRequest,
) -> Result<[u8; TL_FLIT_BYTES], FieldError> {
    let mut flit = [0u8; TL_FLIT_BYTES];
    flit[..8].copy_from_slice(&encode_request_header(&request.header)?);
    flit[8..].copy_from_slice(&request.data);
    Ok(flit)
}

pub fn serialize_write_completion(
    completion: &TlWriteCompletion,
) -> Result<[u8; TL_FLIT_BYTES], FieldError> {
    let mut flit = [0u8; TL_FLIT_BYTES];
    flit[..4].copy_from_slice(&encode_response_header(&completion.header)?);
    Ok(flit)
}

/// The opcode lives in the first 3 bits of every flit.
pub fn decode_opcode(flit: &[u8; TL_FLIT_BYTES]) -> TlOpcode {
    TlOpcode::from_bits((flit[0] >> 5) & 0x7)
}

pub fn deserialize_read_request(flit: &[u8; TL_FLIT_BYTES]) -> Option<TlReadRequest> {
    if decode_opcode(flit) != TlOpcode::ReadRequest {
        return None;
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&flit[..8]);
    Some(TlReadRequest {
        header: decode_request_header(&header),
    })
}

pub fn deserialize_read_response(flit: &[u8; TL_FLIT_BYTES]) -> Option<TlReadResponse> {
    if decode_opcode(flit) != TlOpcode::ReadResponse {
        return None;
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&flit[..4]);
    let mut response = TlReadResponse {
        header: decode_response_header(&header),
        data: [0u8; TL_READ_DATA_BYTES],
    };
    response.data.copy_from_slice(&flit[4..]);
    Some(response)
}

pub fn deserialize_write_request(flit: &[u8; TL_FLIT_BYTES]) -> Option<TlWriteRequest> {
    if decode_opcode(flit) != TlOpcode::WriteRequest {
        return None;
    }
    let mut header = [0u8; 8];
    header.copy_from_slice(&flit[..8]);
    let mut request = TlWriteRequest {
        header: decode_request_header(&header),
        data: [0u8; TL_WRITE_DATA_BYTES],
    };
    request.data.copy_from_slice(&flit[8..]);
    Some(request)
}

pub fn deserialize_write_completion(flit: &[u8; TL_FLIT_BYTES]) -> Option<TlWriteCompletion> {
    if decode_opcode(flit) != TlOpcode::WriteCompletion {
        return None;
    }
    let mut header = [0u8; 4];
    header.copy_from_slice(&flit[..4]);
    Some(TlWriteCompletion {
        header: decode_response_header(&header),
    })
}
