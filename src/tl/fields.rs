// UALINK MODEL — TL FIELD DICTIONARIES
// Chapter-5 field formats: the bit-exact control-field layouts TL flits carry
// for uncompressed/compressed requests and responses plus the flow-control
// NOP. The 4-bit ftype tag leads every field; deserializers reject a
// mismatched tag.

use crate::bits::{field, FieldError, PacketFormat};

/// 4-bit field type tags.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TlFieldType {
    FlowControlNop = 0x0,
    UncompressedRequest = 0x1,
    UncompressedResponse = 0x2,
    CompressedRequest = 0x3,
    CompressedResponseSingleBeatRead = 0x4,
    CompressedResponseWriteOrMultiBeatRead = 0x5,
}

/// Uncompressed Request Field Signals (128 bits).
pub const UNCOMPRESSED_REQUEST_FORMAT: PacketFormat<15> = PacketFormat::new([
    field("ftype", 4),     // 127:124
    field("cmd", 6),       // 123:118
    field("vchan", 2),     // 117:116
    field("asi", 2),       // 115:114
    field("tag", 11),      // 113:103
    field("pool", 1),      // 102
    field("attr", 8),      // 101:94
    field("len", 6),       // 93:88
    field("metadata", 8),  // 87:80
    field("addr", 55),     // 79:25
    field("srcaccid", 10), // 24:15
    field("dstaccid", 10), // 14:5
    field("cload", 1),     // 4
    field("cway", 2),      // 3:2
    field("numbeats", 2),  // 1:0
]);

/// Uncompressed Response Field Signals (64 bits).
pub const UNCOMPRESSED_RESPONSE_FORMAT: PacketFormat<12> = PacketFormat::new([
    field("ftype", 4),     // 63:60
    field("vchan", 2),     // 59:58
    field("tag", 11),      // 57:47
    field("pool", 1),      // 46
    field("len", 2),       // 45:44
    field("offset", 2),    // 43:42
    field("status", 4),    // 41:38
    field("rd_wr", 1),     // 37
    field("last", 1),      // 36
    field("srcaccid", 10), // 35:26
    field("dstaccid", 10), // 25:16
    field("spares", 16),   // 15:0
]);

/// Compressed Request Field Signals (64 bits).
pub const COMPRESSED_REQUEST_FORMAT: PacketFormat<12> = PacketFormat::new([
    field("ftype", 4),     // 63:60
    field("cmd", 3),       // 59:57
    field("vchan", 2),     // 56:55
    field("asi", 2),       // 54:53
    field("tag", 11),      // 52:42
    field("pool", 1),      // 41
    field("len", 2),       // 40:39
    field("metadata", 3),  // 38:36
    field("addr", 14),     // 35:22
    field("srcaccid", 10), // 21:12
    field("dstaccid", 10), // 11:2
    field("cway", 2),      // 1:0
]);

/// Compressed Response for Single Beat Read Field Signals (32 bits).
pub const COMPRESSED_SINGLE_BEAT_READ_RESPONSE_FORMAT: PacketFormat<8> = PacketFormat::new([
    field("ftype", 4),     // 31:28
    field("vchan", 2),     // 27:26
    field("tag", 11),      // 25:15
    field("pool", 1),      // 14
    field("dstaccid", 10), // 13:4
    field("offset", 2),    // 3:2
    field("last", 1),      // 1
    field("spare", 1),     // 0
]);

/// Compressed Response for Write or Multi-Beat Read Field Signals (32 bits).
pub const COMPRESSED_WRITE_OR_MULTI_BEAT_READ_RESPONSE_FORMAT: PacketFormat<8> =
    PacketFormat::new([
        field("ftype", 4),     // 31:28
        field("vchan", 2),     // 27:26
        field("tag", 11),      // 25:15
        field("pool", 1),      // 14
        field("dstaccid", 10), // 13:4
        field("len", 2),       // 3:2
        field("rd_wr", 1),     // 1
        field("spare", 1),     // 0
    ]);

/// Flow Control / NOP Field (32 bits).
pub const FLOW_CONTROL_NOP_FORMAT: PacketFormat<5> = PacketFormat::new([
    field("ftype", 4),    // 31:28
    field("req_cmd", 6),  // 27:22
    field("rsp_cmd", 6),  // 21:16
    field("req_data", 8), // 15:8
    field("rsp_data", 8), // 7:0
]);

const _: () = assert!(UNCOMPRESSED_REQUEST_FORMAT.total_bits() == 128);
const _: () = assert!(UNCOMPRESSED_RESPONSE_FORMAT.total_bits() == 64);
const _: () = assert!(COMPRESSED_REQUEST_FORMAT.total_bits() == 64);
const _: () = assert!(COMPRESSED_SINGLE_BEAT_READ_RESPONSE_FORMAT.total_bits() == 32);
const _: () = assert!(COMPRESSED_WRITE_OR_MULTI_BEAT_READ_RESPONSE_FORMAT.total_bits() == 32);
const _: () = assert!(FLOW_CONTROL_NOP_FORMAT.total_bits() == 32);

// ============================================================================
// FIELD RECORDS
// ============================================================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UncompressedRequestField {
    pub cmd: u8,
    pub vchan: u8,
    pub asi: u8,
    pub tag: u16,
    pub pool: bool,
    pub attr: u8,
    pub len: u8,
    pub metadata: u8,
    pub addr: u64, // 55 bits
    pub srcaccid: u16,
    pub dstaccid: u16,
    pub cload: bool,
    pub cway: u8,
    pub numbeats: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UncompressedResponseField {
    pub vchan: u8,
    pub tag: u16,
    pub pool: bool,
    pub len: u8,
    pub offset: u8,
    pub status: u8,
    pub rd_wr: bool,
    pub last: bool,
    pub srcaccid: u16,
    pub dstaccid: u16,
    pub spares: u16,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedRequestField {
    pub cmd: u8,
    pub vchan: u8,
    pub asi: u8,
    pub tag: u16,
    pub pool: bool,
    pub len: u8,
    pub metadata: u8,
    pub addr: u16, // 14 bits
    pub srcaccid: u16,
    pub dstaccid: u16,
    pub cway: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedSingleBeatReadResponseField {
    pub vchan: u8,
    pub tag: u16,
    pub pool: bool,
    pub dstaccid: u16,
    pub offset: u8,
    pub last: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedWriteOrMultiBeatReadResponseField {
    pub vchan: u8,
    pub tag: u16,
    pub pool: bool,
    pub dstaccid: u16,
    pub len: u8,
    pub rd_wr: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FlowControlNopField {
    pub req_cmd: u8,
    pub rsp_cmd: u8,
    pub req_data: u8,
    pub rsp_data: u8,
}

// ============================================================================
// SERIALIZE / DESERIALIZE
// ============================================================================

pub fn serialize_uncompressed_request(
    f: &UncompressedRequestField,
) -> Result<[u8; 16], FieldError> {
    let mut out = [0u8; 16];
    UNCOMPRESSED_REQUEST_FORMAT.pack(
        &[
            TlFieldType::UncompressedRequest as u64,
            f.cmd as u64,
            f.vchan as u64,
            f.asi as u64,
            f.tag as u64,
            f.pool as u64,
            f.attr as u64,
            f.len as u64,
            f.metadata as u64,
            f.addr,
            f.srcaccid as u64,
            f.dstaccid as u64,
            f.cload as u64,
            f.cway as u64,
            f.numbeats as u64,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_uncompressed_request(bytes: &[u8; 16]) -> Option<UncompressedRequestField> {
    let v = UNCOMPRESSED_REQUEST_FORMAT.unpack(bytes);
    if v[0] != TlFieldType::UncompressedRequest as u64 {
        return None;
    }
    Some(UncompressedRequestField {
        cmd: v[1] as u8,
        vchan: v[2] as u8,
        asi: v[3] as u8,
        tag: v[4] as u16,
        pool: v[5] != 0,
        attr: v[6] as u8,
        len: v[7] as u8,
        metadata: v[8] as u8,
        addr: v[9],
        srcaccid: v[10] as u16,
        dstaccid: v[11] as u16,
        cload: v[12] != 0,
        cway: v[13] as u8,
        numbeats: v[14] as u8,
    })
}

pub fn serialize_uncompressed_response(
    f: &UncompressedResponseField,
) -> Result<[u8; 8], FieldError> {
    let mut out = [0u8; 8];
    UNCOMPRESSED_RESPONSE_FORMAT.pack(
        &[
            TlFieldType::UncompressedResponse as u64,
            f.vchan as u64,
            f.tag as u64,
            f.pool as u64,
            f.len as u64,
            f.offset as u64,
            f.status as u64,
            f.rd_wr as u64,
            f.last as u64,
            f.srcaccid as u64,
            f.dstaccid as u64,
            f.spares as u64,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_uncompressed_response(bytes: &[u8; 8]) -> Option<UncompressedResponseField> {
    let v = UNCOMPRESSED_RESPONSE_FORMAT.unpack(bytes);
    if v[0] != TlFieldType::UncompressedResponse as u64 {
        return None;
    }
    Some(UncompressedResponseField {
        vchan: v[1] as u8,
        tag: v[2] as u16,
        pool: v[3] != 0,
        len: v[4] as u8,
        offset: v[5] as u8,
        status: v[6] as u8,
        rd_wr: v[7] != 0,
        last: v[8] != 0,
        srcaccid: v[9] as u16,
        dstaccid: v[10] as u16,
        spares: v[11] as u16,
    })
}

pub fn serialize_compressed_request(f: &CompressedRequestField) -> Result<[u8; 8], FieldError> {
    let mut out = [0u8; 8];
    COMPRESSED_REQUEST_FORMAT.pack(
        &[
            TlFieldType::CompressedRequest as u64,
            f.cmd as u64,
            f.vchan as u64,
            f.asi as u64,
            f.tag as u64,
            f.pool as u64,
            f.len as u64,
            f.metadata as u64,
            f.addr as u64,
            f.srcaccid as u64,
            f.dstaccid as u64,
            f.cway as u64,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_compressed_request(bytes: &[u8; 8]) -> Option<CompressedRequestField> {
    let v = COMPRESSED_REQUEST_FORMAT.unpack(bytes);
    if v[0] != TlFieldType::CompressedRequest as u64 {
        return None;
    }
    Some(CompressedRequestField {
        cmd: v[1] as u8,
        vchan: v[2] as u8,
        asi: v[3] as u8,
        tag: v[4] as u16,
        pool: v[5] != 0,
        len: v[6] as u8,
        metadata: v[7] as u8,
        addr: v[8] as u16,
        srcaccid: v[9] as u16,
        dstaccid: v[10] as u16,
        cway: v[11] as u8,
    })
}

pub fn serialize_compressed_single_beat_read_response(
    f: &CompressedSingleBeatReadResponseField,
) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    COMPRESSED_SINGLE_BEAT_READ_RESPONSE_FORMAT.pack(
        &[
            TlFieldType::CompressedResponseSingleBeatRead as u64,
            f.vchan as u64,
            f.tag as u64,
            f.pool as u64,
            f.dstaccid as u64,
            f.offset as u64,
            f.last as u64,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_compressed_single_beat_read_response(
    bytes: &[u8; 4],
) -> Option<CompressedSingleBeatReadResponseField> {
    let v = COMPRESSED_SINGLE_BEAT_READ_RESPONSE_FORMAT.unpack(bytes);
    if v[0] != TlFieldType::CompressedResponseSingleBeatRead as u64 {
        return None;
    }
    Some(CompressedSingleBeatReadResponseField {
        vchan: v[1] as u8,
        tag: v[2] as u16,
        pool: v[3] != 0,
        dstaccid: v[4] as u16,
        offset: v[5] as u8,
        last: v[6] != 0,
    })
}

pub fn serialize_compressed_write_or_multi_beat_read_response(
    f: &CompressedWriteOrMultiBeatReadResponseField,
) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    COMPRESSED_WRITE_OR_MULTI_BEAT_READ_RESPONSE_FORMAT.pack(
        &[
            TlFieldType::CompressedResponseWriteOrMultiBeatRead as u64,
            f.vchan as u64,
            f.tag as u64,
            f.pool as u64,
            f.dstaccid as u64,
            f.len as u64,
            f.rd_wr as u64,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_compressed_write_or_multi_beat_read_response(
    bytes: &[u8; 4],
) -> Option<CompressedWriteOrMultiBeatReadResponseField> {
    let v = COMPRESSED_WRITE_OR_MULTI_BEAT_READ_RESPONSE_FORMAT.unpack(bytes);
    if v[0] != TlFieldType::CompressedResponseWriteOrMultiBeatRead as u64 {
        return None;
    }
    Some(CompressedWriteOrMultiBeatReadResponseField {
        vchan: v[1] as u8,
        tag: v[2] as u16,
        pool: v[3] != 0,
        dstaccid: v[4] as u16,
        len: v[5] as u8,
        rd_wr: v[6] != 0,
    })
}

pub fn serialize_flow_control_nop(f: &FlowControlNopField) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    FLOW_CONTROL_NOP_FORMAT.pack(
        &[
            TlFieldType::FlowControlNop as u64,
            f.req_cmd as u64,
            f.rsp_cmd as u64,
            f.req_data as u64,
            f.rsp_data as u64,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_flow_control_nop(bytes: &[u8; 4]) -> Option<FlowControlNopField> {
    let v = FLOW_CONTROL_NOP_FORMAT.unpack(bytes);
    if v[0] != TlFieldType::FlowControlNop as u64 {
        return None;
    }
    Some(FlowControlNopField {
        req_cmd: v[1] as u8,
        rsp_cmd: v[2] as u8,
        req_data: v[3] as u8,
        rsp_data: v[4] as u8,
    })
}
