// UALINK MODEL — UPLI CHANNEL ENCODING
// Control-beat formats for the four UPLI channels plus the per-port credit
// return word. Control bits are MSB-first and zero-padded to the byte
// boundary; data beats ride after the control bytes where a channel carries
// payload.

use crate::bits::{field, FieldError, PacketFormat};
use crate::upli::{DATA_BEAT_BYTES, MAX_PORTS};

/// Request channel control beat. Data (if any) travels on OrigData.
pub const UPLI_REQUEST_FORMAT: PacketFormat<13> = PacketFormat::new([
    field("req_vld", 1),
    field("req_port_id", 2),
    field("req_src_phys_acc_id", 10),
    field("req_dst_phys_acc_id", 10),
    field("req_tag", 11),
    field("req_addr", 57),
    field("req_cmd", 6),
    field("req_len", 6),
    field("req_num_beats", 2),
    field("req_attr", 8),
    field("req_meta_data", 8),
    field("req_vc", 2),
    field("req_auth_tag", 64),
]);

/// Originator data channel control bits, one per beat.
pub const UPLI_ORIG_DATA_CONTROL_FORMAT: PacketFormat<4> = PacketFormat::new([
    field("orig_data_vld", 1),
    field("orig_data_port_id", 2),
    field("orig_data_error", 1),
    field("_reserved", 4),
]);

/// Read response channel control beat.
pub const UPLI_RD_RSP_FORMAT: PacketFormat<8> = PacketFormat::new([
    field("rd_rsp_vld", 1),
    field("rd_rsp_port_id", 2),
    field("rd_rsp_tag", 11),
    field("rd_rsp_status", 4),
    field("rd_rsp_attr", 8),
    field("rd_rsp_data_error", 1),
    field("rd_rsp_auth_tag", 64),
    field("_reserved", 5),
]);

/// Write response channel beat (no data payload).
pub const UPLI_WR_RSP_FORMAT: PacketFormat<7> = PacketFormat::new([
    field("wr_rsp_vld", 1),
    field("wr_rsp_port_id", 2),
    field("wr_rsp_tag", 11),
    field("wr_rsp_status", 4),
    field("wr_rsp_attr", 8),
    field("wr_rsp_auth_tag", 64),
    field("_reserved", 6),
]);

/// Per-port credit return nibble-and-a-half; replicated for each port.
pub const UPLI_CREDIT_PORT_FORMAT: PacketFormat<4> = PacketFormat::new([
    field("credit_vld", 1),
    field("credit_pool", 1),
    field("credit_vc", 2),
    field("credit_num", 2),
]);

pub const UPLI_REQUEST_BYTES: usize = UPLI_REQUEST_FORMAT.byte_len();
pub const UPLI_ORIG_DATA_CONTROL_BYTES: usize = UPLI_ORIG_DATA_CONTROL_FORMAT.byte_len();
pub const UPLI_RD_RSP_CONTROL_BYTES: usize = UPLI_RD_RSP_FORMAT.byte_len();
pub const UPLI_WR_RSP_BYTES: usize = UPLI_WR_RSP_FORMAT.byte_len();
/// Four one-byte port fields plus one byte of credit_init_done flags.
pub const UPLI_CREDIT_RETURN_BYTES: usize = MAX_PORTS + 1;

const _: () = assert!(UPLI_REQUEST_BYTES == 24);
const _: () = assert!(UPLI_RD_RSP_CONTROL_BYTES == 12);
const _: () = assert!(UPLI_WR_RSP_BYTES == 12);

// ============================================================================
// CHANNEL RECORDS
// ============================================================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpliRequestFields {
    pub req_vld: bool,
    pub req_port_id: u8,
    pub req_src_phys_acc_id: u16,
    pub req_dst_phys_acc_id: u16,
    pub req_tag: u16,
    pub req_addr: u64, // 57 bits
    pub req_cmd: u8,
    pub req_len: u8,
    pub req_num_beats: u8,
    pub req_attr: u8,
    pub req_meta_data: u8,
    pub req_vc: u8,
    pub req_auth_tag: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpliOrigDataFields {
    pub orig_data_vld: bool,
    pub orig_data_port_id: u8,
    pub orig_data_error: bool,
    pub data: [u8; DATA_BEAT_BYTES],
}

impl Default for UpliOrigDataFields {
    fn default() -> Self {
        UpliOrigDataFields {
            orig_data_vld: false,
            orig_data_port_id: 0,
            orig_data_error: false,
            data: [0u8; DATA_BEAT_BYTES],
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct UpliRdRspFields {
    pub rd_rsp_vld: bool,
    pub rd_rsp_port_id: u8,
    pub rd_rsp_tag: u16,
    pub rd_rsp_status: u8,
    pub rd_rsp_attr: u8,
    pub rd_rsp_data_error: bool,
    pub rd_rsp_auth_tag: u64,
    pub data: [u8; DATA_BEAT_BYTES],
}

impl Default for UpliRdRspFields {
    fn default() -> Self {
        UpliRdRspFields {
            rd_rsp_vld: false,
            rd_rsp_port_id: 0,
            rd_rsp_tag: 0,
            rd_rsp_status: 0,
            rd_rsp_attr: 0,
            rd_rsp_data_error: false,
            rd_rsp_auth_tag: 0,
            data: [0u8; DATA_BEAT_BYTES],
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpliWrRspFields {
    pub wr_rsp_vld: bool,
    pub wr_rsp_port_id: u8,
    pub wr_rsp_tag: u16,
    pub wr_rsp_status: u8,
    pub wr_rsp_attr: u8,
    pub wr_rsp_auth_tag: u64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpliCreditPortFields {
    pub credit_vld: bool,
    /// false = VC-specific, true = pool credit.
    pub credit_pool: bool,
    pub credit_vc: u8,
    /// 0-3 encoding; actual credits = num + 1.
    pub credit_num: u8,
}

/// Credit return for all four ports plus per-port init-done flags.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UpliCreditReturn {
    pub ports: [UpliCreditPortFields; MAX_PORTS],
    pub credit_init_done: [bool; MAX_PORTS],
}

// ============================================================================
// SERIALIZE / DESERIALIZE
// ============================================================================

pub fn serialize_request(f: &UpliRequestFields) -> Result<[u8; UPLI_REQUEST_BYTES], FieldError> {
    let mut out = [0u8; UPLI_REQUEST_BYTES];
    UPLI_REQUEST_FORMAT.pack(
        &[
            f.req_vld as u64,
            f.req_port_id as u64,
            f.req_src_phys_acc_id as u64,
            f.req_dst_phys_acc_id as u64,
            f.req_tag as u64,
            f.req_addr,
            f.req_cmd as u64,
            f.req_len as u64,
            f.req_num_beats as u64,
            f.req_attr as u64,
            f.req_meta_data as u64,
            f.req_vc as u64,
            f.req_auth_tag,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_request(bytes: &[u8; UPLI_REQUEST_BYTES]) -> UpliRequestFields {
    let v = UPLI_REQUEST_FORMAT.unpack(bytes);
    UpliRequestFields {
        req_vld: v[0] != 0,
        req_port_id: v[1] as u8,
        req_src_phys_acc_id: v[2] as u16,
        req_dst_phys_acc_id: v[3] as u16,
        req_tag: v[4] as u16,
        req_addr: v[5],
        req_cmd: v[6] as u8,
        req_len: v[7] as u8,
        req_num_beats: v[8] as u8,
        req_attr: v[9] as u8,
        req_meta_data: v[10] as u8,
        req_vc: v[11] as u8,
        req_auth_tag: v[12],
    }
}

pub fn serialize_orig_data(
    f: &UpliOrigDataFields,
) -> Result<[u8; UPLI_ORIG_DATA_CONTROL_BYTES + DATA_BEAT_BYTES], FieldError> {
    let mut out = [0u8; UPLI_ORIG_DATA_CONTROL_BYTES + DATA_BEAT_BYTES];
    UPLI_ORIG_DATA_CONTROL_FORMAT.pack(
        &[
            f.orig_data_vld as u64,
            f.orig_data_port_id as u64,
            f.orig_data_error as u64,
            0,
        ],
        &mut out[..UPLI_ORIG_DATA_CONTROL_BYTES],
    )?;
    out[UPLI_ORIG_DATA_CONTROL_BYTES..].copy_from_slice(&f.data);
    Ok(out)
}

pub fn deserialize_orig_data(
    bytes: &[u8; UPLI_ORIG_DATA_CONTROL_BYTES + DATA_BEAT_BYTES],
) -> UpliOrigDataFields {
    let v = UPLI_ORIG_DATA_CONTROL_FORMAT.unpack(&bytes[..UPLI_ORIG_DATA_CONTROL_BYTES]);
    let mut fields = UpliOrigDataFields {
        orig_data_vld: v[0] != 0,
        orig_data_port_id: v[1] as u8,
        orig_data_error: v[2] != 0,
        data: [0u8; DATA_BEAT_BYTES],
    };
    fields.data.copy_from_slice(&bytes[UPLI_ORIG_DATA_CONTROL_BYTES..]);
    fields
}

pub fn serialize_rd_rsp(
    f: &UpliRdRspFields,
) -> Result<[u8; UPLI_RD_RSP_CONTROL_BYTES + DATA_BEAT_BYTES], FieldError> {
    let mut out = [0u8; UPLI_RD_RSP_CONTROL_BYTES + DATA_BEAT_BYTES];
    UPLI_RD_RSP_FORMAT.pack(
        &[
            f.rd_rsp_vld as u64,
            f.rd_rsp_port_id as u64,
            f.rd_rsp_tag as u64,
            f.rd_rsp_status as u64,
            f.rd_rsp_attr as u64,
            f.rd_rsp_data_error as u64,
            f.rd_rsp_auth_tag,
            0,
        ],
        &mut out[..UPLI_RD_RSP_CONTROL_BYTES],
    )?;
    out[UPLI_RD_RSP_CONTROL_BYTES..].copy_from_slice(&f.data);
    Ok(out)
}

pub fn deserialize_rd_rsp(
    bytes: &[u8; UPLI_RD_RSP_CONTROL_BYTES + DATA_BEAT_BYTES],
) -> UpliRdRspFields {
    let v = UPLI_RD_RSP_FORMAT.unpack(&bytes[..UPLI_RD_RSP_CONTROL_BYTES]);
    let mut fields = UpliRdRspFields {
        rd_rsp_vld: v[0] != 0,
        rd_rsp_port_id: v[1] as u8,
        rd_rsp_tag: v[2] as u16,
        rd_rsp_status: v[3] as u8,
        rd_rsp_attr: v[4] as u8,
        rd_rsp_data_error: v[5] != 0,
        rd_rsp_auth_tag: v[6],
        data: [0u8; DATA_BEAT_BYTES],
    };
    fields.data.copy_from_slice(&bytes[UPLI_RD_RSP_CONTROL_BYTES..]);
    fields
}

pub fn serialize_wr_rsp(f: &UpliWrRspFields) -> Result<[u8; UPLI_WR_RSP_BYTES], FieldError> {
    let mut out = [0u8; UPLI_WR_RSP_BYTES];
    UPLI_WR_RSP_FORMAT.pack(
        &[
            f.wr_rsp_vld as u64,
            f.wr_rsp_port_id as u64,
            f.wr_rsp_tag as u64,
            f.wr_rsp_status as u64,
            f.wr_rsp_attr as u64,
            f.wr_rsp_auth_tag,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn deserialize_wr_rsp(bytes: &[u8; UPLI_WR_RSP_BYTES]) -> UpliWrRspFields {
    let v = UPLI_WR_RSP_FORMAT.unpack(bytes);
    UpliWrRspFields {
        wr_rsp_vld: v[0] != 0,
        wr_rsp_port_id: v[1] as u8,
        wr_rsp_tag: v[2] as u16,
        wr_rsp_status: v[3] as u8,
        wr_rsp_attr: v[4] as u8,
        wr_rsp_auth_tag: v[5],
    }
}

/// One byte per port (six control bits, zero-padded) then one byte of
/// credit_init_done flags, bit n for port n.
pub fn serialize_credit_return(
    credits: &UpliCreditReturn,
) -> Result<[u8; UPLI_CREDIT_RETURN_BYTES], FieldError> {
    let mut out = [0u8; UPLI_CREDIT_RETURN_BYTES];

    for (port_index, port) in credits.ports.iter().enumerate() {
        UPLI_CREDIT_PORT_FORMAT.pack(
            &[
                port.credit_vld as u64,
                port.credit_pool as u64,
                port.credit_vc as u64,
                port.credit_num as u64,
            ],
            &mut out[port_index..port_index + 1],
        )?;
    }

    let mut init_done_byte = 0u8;
    for (port_index, &done) in credits.credit_init_done.iter().enumerate() {
        if done {
            init_done_byte |= 1 << port_index;
        }
    }
    out[MAX_PORTS] = init_done_byte;

    Ok(out)
}

pub fn deserialize_credit_return(bytes: &[u8; UPLI_CREDIT_RETURN_BYTES]) -> UpliCreditReturn {
    let mut credits = UpliCreditReturn::default();

    for (port_index, port) in credits.ports.iter_mut().enumerate() {
        let v = UPLI_CREDIT_PORT_FORMAT.unpack(&bytes[port_index..port_index + 1]);
        port.credit_vld = v[0] != 0;
        port.credit_pool = v[1] != 0;
        port.credit_vc = v[2] as u8;
        port.credit_num = v[3] as u8;
    }

    for (port_index, done) in credits.credit_init_done.iter_mut().enumerate() {
        *done = bytes[MAX_PORTS] & (1 << port_index) != 0;
    }

    credits
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_round_trip() {
        let f = UpliRequestFields {
            req_vld: true,
            req_port_id: 2,
            req_src_phys_acc_id: 0x3AA,
            req_dst_phys_acc_id: 0x155,
            req_tag: 0x5C3,
            req_addr: 0x1FF_FFFF_FFFF_FFFF,
            req_cmd: 0x2A,
            req_len: 0x15,
            req_num_beats: 3,
            req_attr: 0xF0,
            req_meta_data: 0x0F,
            req_vc: 1,
            req_auth_tag: 0xDEAD_BEEF_CAFE_F00D,
        };
        let bytes = serialize_request(&f).unwrap();
        assert_eq!(bytes.len(), 24);
        assert_eq!(deserialize_request(&bytes), f);
    }

    #[test]
    fn request_rejects_wide_fields() {
        let f = UpliRequestFields {
            req_port_id: 4,
            ..UpliRequestFields::default()
        };
        assert!(matches!(
            serialize_request(&f),
            Err(FieldError::OutOfRange { name: "req_port_id", .. })
        ));

        let f = UpliRequestFields {
            req_addr: 1u64 << 57,
            ..UpliRequestFields::default()
        };
        assert!(serialize_request(&f).is_err());
    }

    #[test]
    fn orig_data_round_trip() {
        let mut f = UpliOrigDataFields {
            orig_data_vld: true,
            orig_data_port_id: 3,
            orig_data_error: true,
            data: [0u8; DATA_BEAT_BYTES],
        };
        for (i, byte) in f.data.iter_mut().enumerate() {
            *byte = i as u8;
        }
        let bytes = serialize_orig_data(&f).unwrap();
        assert_eq!(bytes.len(), 65);
        assert_eq!(deserialize_orig_data(&bytes), f);
    }

    #[test]
    fn rd_rsp_round_trip() {
        let mut f = UpliRdRspFields {
            rd_rsp_vld: true,
            rd_rsp_port_id: 1,
            rd_rsp_tag: 0x7FF,
            rd_rsp_status: 0x9,
            rd_rsp_attr: 0x42,
            rd_rsp_data_error: false,
            rd_rsp_auth_tag: 0x0123_4567_89AB_CDEF,
            data: [0u8; DATA_BEAT_BYTES],
        };
        f.data[63] = 0xEE;
        let bytes = serialize_rd_rsp(&f).unwrap();
        assert_eq!(bytes.len(), 76);
        assert_eq!(deserialize_rd_rsp(&bytes), f);
    }

    #[test]
    fn wr_rsp_round_trip() {
        let f = UpliWrRspFields {
            wr_rsp_vld: true,
            wr_rsp_port_id: 0,
            wr_rsp_tag: 0x400,
            wr_rsp_status: 0xF,
            wr_rsp_attr: 0x18,
            wr_rsp_auth_tag: u64::MAX,
        };
        let bytes = serialize_wr_rsp(&f).unwrap();
        assert_eq!(deserialize_wr_rsp(&bytes), f);
    }

    #[test]
    fn credit_return_round_trip() {
        let mut credits = UpliCreditReturn::default();
        credits.ports[0] = UpliCreditPortFields {
            credit_vld: true,
            credit_pool: false,
            credit_vc: 2,
            credit_num: 3,
        };
        credits.ports[3] = UpliCreditPortFields {
            credit_vld: true,
            credit_pool: true,
            credit_vc: 0,
            credit_num: 1,
        };
        credits.credit_init_done = [true, false, false, true];

        let bytes = serialize_credit_return(&credits).unwrap();
        assert_eq!(bytes.len(), UPLI_CREDIT_RETURN_BYTES);
        assert_eq!(bytes[MAX_PORTS], 0b1001);
        assert_eq!(deserialize_credit_return(&bytes), credits);
    }
}
