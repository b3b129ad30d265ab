// UALINK MODEL — DL MESSAGE CODEC
// DL messages ride in 4-byte big-endian DWords. Every header DWord shares a
// common framing in its low bits: [0] compressed (must be 0), [1] reserved,
// [5:2] mclass, [8:6] mtype. The UART Stream Transport message is the only
// multi-DWord format: a header DWord followed by 1..=32 payload DWords.

use crate::bits::{field, FieldError, PacketFormat};

// ============================================================================
// CLASS / TYPE CODES
// ============================================================================

/// 4-bit message class codes.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum DlMessageClass {
    Basic = 0b0000,
    Uart = 0b0001,
    Control = 0b1000,
}

/// 3-bit Basic message types.
pub const MTYPE_NO_OP: u8 = 0b000;
pub const MTYPE_TL_RATE: u8 = 0b100;
pub const MTYPE_DEVICE_ID: u8 = 0b101;
pub const MTYPE_PORT_ID: u8 = 0b110;

/// 3-bit Control message types.
pub const MTYPE_CHANNEL_NEGOTIATION: u8 = 0b100;

/// 3-bit UART message types.
pub const MTYPE_UART_TRANSPORT: u8 = 0b000;
pub const MTYPE_UART_CREDIT_UPDATE: u8 = 0b001;
pub const MTYPE_UART_RESET_REQUEST: u8 = 0b110;
pub const MTYPE_UART_RESET_RESPONSE: u8 = 0b111;

/// UART Stream Transport payload bounds, in DWords.
pub const UART_TRANSPORT_MIN_PAYLOAD_DWORDS: usize = 1;
pub const UART_TRANSPORT_MAX_PAYLOAD_DWORDS: usize = 32;

// ============================================================================
// DWORD FORMATS (fields MSB → LSB)
// ============================================================================

pub const NO_OP_FORMAT: PacketFormat<5> = PacketFormat::new([
    field("_reserved_hi", 23), // 31:9
    field("mtype", 3),         // 8:6
    field("mclass", 4),        // 5:2
    field("_reserved", 1),     // 1
    field("compressed", 1),    // 0
]);

pub const TL_RATE_FORMAT: PacketFormat<8> = PacketFormat::new([
    field("rate", 16),      // 31:16
    field("_reserved0", 3), // 15:13
    field("ack", 1),        // 12
    field("_reserved1", 3), // 11:9
    field("mtype", 3),      // 8:6
    field("mclass", 4),     // 5:2
    field("_reserved2", 1), // 1
    field("compressed", 1), // 0
]);

pub const DEVICE_ID_FORMAT: PacketFormat<11> = PacketFormat::new([
    field("valid", 1),      // 31
    field("type", 2),       // 30:29
    field("_reserved0", 3), // 28:26
    field("id", 10),        // 25:16
    field("_reserved1", 3), // 15:13
    field("ack", 1),        // 12
    field("_reserved2", 3), // 11:9
    field("mtype", 3),      // 8:6
    field("mclass", 4),     // 5:2
    field("_reserved3", 1), // 1
    field("compressed", 1), // 0
]);

pub const PORT_ID_FORMAT: PacketFormat<10> = PacketFormat::new([
    field("valid", 1),        // 31
    field("_reserved0", 3),   // 30:28
    field("port_number", 12), // 27:16
    field("_reserved1", 3),   // 15:13
    field("ack", 1),          // 12
    field("_reserved2", 3),   // 11:9
    field("mtype", 3),        // 8:6
    field("mclass", 4),       // 5:2
    field("_reserved3", 1),   // 1
    field("compressed", 1),   // 0
]);

pub const CHANNEL_NEGOTIATION_FORMAT: PacketFormat<9> = PacketFormat::new([
    field("_reserved0", 4),       // 31:28
    field("channel_response", 4), // 27:24
    field("channel_command", 4),  // 23:20
    field("channel_target", 4),   // 19:16
    field("_reserved1", 7),       // 15:9
    field("mtype", 3),            // 8:6
    field("mclass", 4),           // 5:2
    field("_reserved2", 1),       // 1
    field("compressed", 1),       // 0
]);

pub const UART_RESET_REQUEST_FORMAT: PacketFormat<7> = PacketFormat::new([
    field("_reserved_hi", 19), // 31:13
    field("all_streams", 1),   // 12
    field("stream_id", 3),     // 11:9
    field("mtype", 3),         // 8:6
    field("mclass", 4),        // 5:2
    field("_reserved", 1),     // 1
    field("compressed", 1),    // 0
]);

pub const UART_RESET_RESPONSE_FORMAT: PacketFormat<8> = PacketFormat::new([
    field("_reserved_hi", 16), // 31:16
    field("status", 3),        // 15:13
    field("all_streams", 1),   // 12
    field("stream_id", 3),     // 11:9
    field("mtype", 3),         // 8:6
    field("mclass", 4),        // 5:2
    field("_reserved", 1),     // 1
    field("compressed", 1),    // 0
]);

/// Header DWord of the multi-DWord Stream Transport; `length` encodes
/// payload DWords − 1.
pub const UART_TRANSPORT_HEADER_FORMAT: PacketFormat<7> = PacketFormat::new([
    field("length", 5),        // 31:27
    field("_reserved_hi", 15), // 26:12
    field("stream_id", 3),     // 11:9
    field("mtype", 3),         // 8:6
    field("mclass", 4),        // 5:2
    field("_reserved", 1),     // 1
    field("compressed", 1),    // 0
]);

pub const UART_CREDIT_UPDATE_FORMAT: PacketFormat<7> = PacketFormat::new([
    field("data_fc_seq", 12), // 31:20
    field("_reserved_hi", 8), // 19:12
    field("stream_id", 3),    // 11:9
    field("mtype", 3),        // 8:6
    field("mclass", 4),       // 5:2
    field("_reserved", 1),    // 1
    field("compressed", 1),   // 0
]);

/// Vendor Defined Packet Type Length TL DWord.
pub const VENDOR_DEFINED_FORMAT: PacketFormat<3> = PacketFormat::new([
    field("vendor_id", 16), // 31:16
    field("type", 8),       // 15:8
    field("length", 8),     // 7:0
]);

// ============================================================================
// MESSAGE RECORDS
// ============================================================================

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct TlRateNotification {
    pub rate: u16,
    pub ack: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceIdMessage {
    pub valid: bool,
    pub device_type: u8,
    pub id: u16,
    pub ack: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct PortIdMessage {
    pub valid: bool,
    pub port_number: u16,
    pub ack: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelNegotiation {
    pub response: u8,
    pub command: u8,
    pub target: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UartStreamResetRequest {
    pub all_streams: bool,
    pub stream_id: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UartStreamResetResponse {
    pub status: u8,
    pub all_streams: bool,
    pub stream_id: u8,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct UartStreamTransport {
    pub stream_id: u8,
    /// 1..=32 payload DWords, each big-endian on the wire.
    pub payload_dwords: Vec<u32>,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct UartStreamCreditUpdate {
    pub data_fc_seq: u16,
    pub stream_id: u8,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct VendorDefinedTypeLength {
    pub vendor_id: u16,
    pub packet_type: u8,
    pub length: u8,
}

/// Every DL message as one tagged union.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DlMessage {
    NoOp,
    TlRate(TlRateNotification),
    DeviceId(DeviceIdMessage),
    PortId(PortIdMessage),
    ChannelNego(ChannelNegotiation),
    UartResetReq(UartStreamResetRequest),
    UartResetRsp(UartStreamResetResponse),
    UartTransport(UartStreamTransport),
    UartCredit(UartStreamCreditUpdate),
}

// ============================================================================
// SERIALIZE
// ============================================================================

fn mclass(class: DlMessageClass) -> u64 {
    class as u64
}

pub fn serialize_no_op() -> [u8; 4] {
    let mut out = [0u8; 4];
    let values = [
        0,
        MTYPE_NO_OP as u64,
        mclass(DlMessageClass::Basic),
        0,
        0,
    ];
    match NO_OP_FORMAT.pack(&values, &mut out) {
        Ok(()) => out,
        Err(_) => unreachable!(),
    }
}

pub fn serialize_tl_rate(msg: &TlRateNotification) -> [u8; 4] {
    let mut out = [0u8; 4];
    let values = [
        msg.rate as u64,
        0,
        msg.ack as u64,
        0,
        MTYPE_TL_RATE as u64,
        mclass(DlMessageClass::Basic),
        0,
        0,
    ];
    match TL_RATE_FORMAT.pack(&values, &mut out) {
        Ok(()) => out,
        Err(_) => unreachable!(),
    }
}

pub fn serialize_device_id(msg: &DeviceIdMessage) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    DEVICE_ID_FORMAT.pack(
        &[
            msg.valid as u64,
            msg.device_type as u64,
            0,
            msg.id as u64,
            0,
            msg.ack as u64,
            0,
            MTYPE_DEVICE_ID as u64,
            mclass(DlMessageClass::Basic),
            0,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn serialize_port_id(msg: &PortIdMessage) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    PORT_ID_FORMAT.pack(
        &[
            msg.valid as u64,
            0,
            msg.port_number as u64,
            0,
            msg.ack as u64,
            0,
            MTYPE_PORT_ID as u64,
            mclass(DlMessageClass::Basic),
            0,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn serialize_channel_negotiation(msg: &ChannelNegotiation) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    CHANNEL_NEGOTIATION_FORMAT.pack(
        &[
            0,
            msg.response as u64,
            msg.command as u64,
            msg.target as u64,
            0,
            MTYPE_CHANNEL_NEGOTIATION as u64,
            mclass(DlMessageClass::Control),
            0,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn serialize_uart_reset_request(msg: &UartStreamResetRequest) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    UART_RESET_REQUEST_FORMAT.pack(
        &[
            0,
            msg.all_streams as u64,
            msg.stream_id as u64,
            MTYPE_UART_RESET_REQUEST as u64,
            mclass(DlMessageClass::Uart),
            0,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn serialize_uart_reset_response(
    msg: &UartStreamResetResponse,
) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    UART_RESET_RESPONSE_FORMAT.pack(
        &[
            0,
            msg.status as u64,
            msg.all_streams as u64,
            msg.stream_id as u64,
            MTYPE_UART_RESET_RESPONSE as u64,
            mclass(DlMessageClass::Uart),
            0,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

/// Serialize the multi-DWord Stream Transport: header DWord followed by each
/// payload DWord big-endian. Frame size is always a multiple of 4, minimum
/// 8 bytes.
pub fn serialize_uart_transport(msg: &UartStreamTransport) -> Result<Vec<u8>, FieldError> {
    if msg.payload_dwords.len() < UART_TRANSPORT_MIN_PAYLOAD_DWORDS
        || msg.payload_dwords.len() > UART_TRANSPORT_MAX_PAYLOAD_DWORDS
    {
        return Err(FieldError::OutOfRange {
            name: "length",
            value: msg.payload_dwords.len() as u64,
            width: 5,
        });
    }

    let length = (msg.payload_dwords.len() - 1) as u64;
    let mut out = vec![0u8; (1 + msg.payload_dwords.len()) * 4];

    UART_TRANSPORT_HEADER_FORMAT.pack(
        &[
            length,
            0,
            msg.stream_id as u64,
            MTYPE_UART_TRANSPORT as u64,
            mclass(DlMessageClass::Uart),
            0,
            0,
        ],
        &mut out[..4],
    )?;

    for (i, dword) in msg.payload_dwords.iter().enumerate() {
        out[(1 + i) * 4..(2 + i) * 4].copy_from_slice(&dword.to_be_bytes());
    }

    Ok(out)
}

pub fn serialize_uart_credit_update(
    msg: &UartStreamCreditUpdate,
) -> Result<[u8; 4], FieldError> {
    let mut out = [0u8; 4];
    UART_CREDIT_UPDATE_FORMAT.pack(
        &[
            msg.data_fc_seq as u64,
            0,
            msg.stream_id as u64,
            MTYPE_UART_CREDIT_UPDATE as u64,
            mclass(DlMessageClass::Uart),
            0,
            0,
        ],
        &mut out,
    )?;
    Ok(out)
}

pub fn serialize_vendor_defined(msg: &VendorDefinedTypeLength) -> [u8; 4] {
    let mut out = [0u8; 4];
    let values = [
        msg.vendor_id as u64,
        msg.packet_type as u64,
        msg.length as u64,
    ];
    match VENDOR_DEFINED_FORMAT.pack(&values, &mut out) {
        Ok(()) => out,
        Err(_) => unreachable!(),
    }
}

// ============================================================================
// DESERIALIZE
// Every deserializer returns None when the compressed bit is set.
// ============================================================================

pub fn deserialize_no_op(bytes: &[u8; 4]) -> Option<()> {
    let v = NO_OP_FORMAT.unpack(bytes);
    if v[4] != 0 {
        return None;
    }
    Some(())
}

pub fn deserialize_tl_rate(bytes: &[u8; 4]) -> Option<TlRateNotification> {
    let v = TL_RATE_FORMAT.unpack(bytes);
    if v[7] != 0 {
        return None;
    }
    Some(TlRateNotification {
        rate: v[0] as u16,
        ack: v[2] != 0,
    })
}

pub fn deserialize_device_id(bytes: &[u8; 4]) -> Option<DeviceIdMessage> {
    let v = DEVICE_ID_FORMAT.unpack(bytes);
    if v[10] != 0 {
        return None;
    }
    Some(DeviceIdMessage {
        valid: v[0] != 0,
        device_type: v[1] as u8,
        id: v[3] as u16,
        ack: v[5] != 0,
    })
}

pub fn deserialize_port_id(bytes: &[u8; 4]) -> Option<PortIdMessage> {
    let v = PORT_ID_FORMAT.unpack(bytes);
    if v[9] != 0 {
        return None;
    }
    Some(PortIdMessage {
        valid: v[0] != 0,
        port_number: v[2] as u16,
        ack: v[4] != 0,
    })
}

pub fn deserialize_channel_negotiation(bytes: &[u8; 4]) -> Option<ChannelNegotiation> {
    let v = CHANNEL_NEGOTIATION_FORMAT.unpack(bytes);
    if v[8] != 0 {
        return None;
    }
    Some(ChannelNegotiation {
        response: v[1] as u8,
        command: v[2] as u8,
        target: v[3] as u8,
    })
}

pub fn deserialize_uart_reset_request(bytes: &[u8; 4]) -> Option<UartStreamResetRequest> {
    let v = UART_RESET_REQUEST_FORMAT.unpack(bytes);
    if v[6] != 0 {
        return None;
    }
    Some(UartStreamResetRequest {
        all_streams: v[1] != 0,
        stream_id: v[2] as u8,
    })
}

pub fn deserialize_uart_reset_response(bytes: &[u8; 4]) -> Option<UartStreamResetResponse> {
    let v = UART_RESET_RESPONSE_FORMAT.unpack(bytes);
    if v[7] != 0 {
        return None;
    }
    Some(UartStreamResetResponse {
        status: v[1] as u8,
        all_streams: v[2] != 0,
        stream_id: v[3] as u8,
    })
}

/// Decode only the transport header DWord: (stream_id, payload DWord count).
pub fn deserialize_uart_transport_header(bytes: &[u8; 4]) -> Option<(u8, usize)> {
    let v = UART_TRANSPORT_HEADER_FORMAT.unpack(bytes);
    if v[6] != 0 {
        return None;
    }
    Some((v[2] as u8, v[0] as usize + 1))
}

/// Decode a complete Stream Transport frame (header + payload DWords).
pub fn deserialize_uart_transport(bytes: &[u8]) -> Option<UartStreamTransport> {
    if bytes.len() < 8 || bytes.len() % 4 != 0 {
        return None;
    }

    let mut header = [0u8; 4];
    header.copy_from_slice(&bytes[..4]);
    let (stream_id, payload_dwords) = deserialize_uart_transport_header(&header)?;

    if bytes.len() < (1 + payload_dwords) * 4 {
        return None;
    }

    let mut payload = Vec::with_capacity(payload_dwords);
    for i in 0..payload_dwords {
        let mut dword = [0u8; 4];
        dword.copy_from_slice(&bytes[(1 + i) * 4..(2 + i) * 4]);
        payload.push(u32::from_be_bytes(dword));
    }

    Some(UartStreamTransport {
        stream_id,
        payload_dwords: payload,
    })
}

pub fn deserialize_uart_credit_update(bytes: &[u8; 4]) -> Option<UartStreamCreditUpdate> {
    let v = UART_CREDIT_UPDATE_FORMAT.unpack(bytes);
    if v[6] != 0 {
        return None;
    }
    Some(UartStreamCreditUpdate {
        data_fc_seq: v[0] as u16,
        stream_id: v[2] as u8,
    })
}

pub fn deserialize_vendor_defined(bytes: &[u8; 4]) -> VendorDefinedTypeLength {
    let v = VENDOR_DEFINED_FORMAT.unpack(bytes);
    VendorDefinedTypeLength {
        vendor_id: v[0] as u16,
        packet_type: v[1] as u8,
        length: v[2] as u8,
    }
}

/// Serialize any DL message into its DWord sequence. Single-DWord messages
/// yield one entry; the UART Stream Transport yields 1 + payload entries.
pub fn serialize_message(msg: &DlMessage) -> Result<Vec<[u8; 4]>, FieldError> {
    match msg {
        DlMessage::NoOp => Ok(vec![serialize_no_op()]),
        DlMessage::TlRate(m) => Ok(vec![serialize_tl_rate(m)]),
        DlMessage::DeviceId(m) => Ok(vec![serialize_device_id(m)?]),
        DlMessage::PortId(m) => Ok(vec![serialize_port_id(m)?]),
        DlMessage::ChannelNego(m) => Ok(vec![serialize_channel_negotiation(m)?]),
        DlMessage::UartResetReq(m) => Ok(vec![serialize_uart_reset_request(m)?]),
        DlMessage::UartResetRsp(m) => Ok(vec![serialize_uart_reset_response(m)?]),
        DlMessage::UartCredit(m) => Ok(vec![serialize_uart_credit_update(m)?]),
        DlMessage::UartTransport(m) => {
            let bytes = serialize_uart_transport(m)?;
            let mut dwords = Vec::with_capacity(bytes.len() / 4);
            for chunk in bytes.chunks_exact(4) {
                let mut dword = [0u8; 4];
                dword.copy_from_slice(chunk);
                dwords.push(dword);
            }
            Ok(dwords)
        }
    }
}
