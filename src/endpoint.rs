// UALINK MODEL — ENDPOINT FAÇADE
// One link side: TL request/response encoding over DL framing with replay
// buffering, Ack / Replay Request handling, and the optional pacing and
// error-injection hooks. Everything runs synchronously inside the caller;
// outgoing flits leave through the transmit callback.

use thiserror::Error;

use crate::bits::FieldError;
use crate::dl::command::{classify_flit, AckReqManager, CommandClass, OP_ACK};
use crate::dl::flit::{
    decode_command_flit_header, decode_explicit_flit_header, pack_flit, DlFlit,
    ExplicitFlitHeader, TlFlit, OP_EXPLICIT,
};
use crate::dl::inject::{ErrorInjector, ErrorKind};
use crate::dl::pacing::{PacingController, PacingDecision};
use crate::dl::replay::ReplayBuffer;
use crate::dl::tx_control::TxController;
use crate::tl::flit::{
    decode_opcode, deserialize_read_response, deserialize_write_completion,
    serialize_read_request, serialize_write_request, TlOpcode, TlReadRequest, TlRequestHeader,
    TlWriteRequest,
};
use crate::tl::TL_FLIT_BYTES;

/// Transaction tags wrap in a 12-bit space.
pub const TAG_SPACE_MASK: u16 = 0xFFF;

pub type TransmitCallback = Box<dyn FnMut(&DlFlit)>;
pub type ReadCompletionCallback = Box<dyn FnMut(u16, u8, &[u8])>;
pub type WriteCompletionCallback = Box<dyn FnMut(u16, u8)>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("transmit callback not set")]
    TransmitUnset,
    #[error("replay buffer full; caller must wait for an ack")]
    ReplayBufferFull,
    #[error("write data of {len} bytes exceeds the {max}-byte flit payload")]
    DataTooLarge { len: usize, max: usize },
    #[error(transparent)]
    Field(#[from] FieldError),
}

/// Endpoint construction knobs.
#[derive(Copy, Clone, Debug)]
pub struct EndpointConfig {
    /// Verify CRC on receive; failures are counted and the flit dropped.
    pub enable_crc_check: bool,
    /// Run the Ack / Replay Request machinery on both directions.
    pub enable_ack_req: bool,
    /// 0 acks every received flit; N batches acks.
    pub ack_every_n_flits: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        EndpointConfig {
            enable_crc_check: true,
            enable_ack_req: true,
            ack_every_n_flits: 0,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointStats {
    pub tx_read_requests: u64,
    pub tx_write_requests: u64,
    pub tx_dl_flits: u64,
    pub tx_dropped_by_pacing: u64,
    pub tx_dropped_by_error_injection: u64,
    pub tx_acks_sent: u64,
    pub tx_replay_requests_sent: u64,

    pub rx_read_responses: u64,
    pub rx_write_completions: u64,
    pub rx_dl_flits: u64,
    pub rx_crc_errors: u64,
    pub rx_acks_received: u64,
    pub rx_replay_requests_received: u64,

    pub replay_buffer_size: usize,
    pub retransmissions: u64,
    pub replay_misses: u64,
}

pub struct Endpoint {
    tx: TxController,
    next_tag: u16,

    replay_buffer: ReplayBuffer,
    pacing: PacingController,
    injector: ErrorInjector,
    ack_req: AckReqManager,

    enable_crc_check: bool,
    enable_ack_req: bool,

    transmit_callback: Option<TransmitCallback>,
    read_completion_callback: Option<ReadCompletionCallback>,
    write_completion_callback: Option<WriteCompletionCallback>,

    stats: EndpointStats,
}

impl Endpoint {
    pub fn new(config: EndpointConfig) -> Self {
        let mut ack_req = AckReqManager::new();
        ack_req.set_ack_every_n(config.ack_every_n_flits);

        Endpoint {
            tx: TxController::new(),
            next_tag: 0,
            replay_buffer: ReplayBuffer::new(),
            pacing: PacingController::new(),
            injector: ErrorInjector::new(),
            ack_req,
            enable_crc_check: config.enable_crc_check,
            enable_ack_req: config.enable_ack_req,
            transmit_callback: None,
            read_completion_callback: None,
            write_completion_callback: None,
            stats: EndpointStats::default(),
        }
    }

    // ------------------------------------------------------------------
    // Callback wiring
    // ------------------------------------------------------------------

    pub fn set_transmit_callback(&mut self, callback: impl FnMut(&DlFlit) + 'static) {
        self.transmit_callback = Some(Box::new(callback));
    }

    pub fn set_read_completion_callback(
        &mut self,
        callback: impl FnMut(u16, u8, &[u8]) + 'static,
    ) {
        self.read_completion_callback = Some(Box::new(callback));
    }

    pub fn set_write_completion_callback(&mut self, callback: impl FnMut(u16, u8) + 'static) {
        self.write_completion_callback = Some(Box::new(callback));
    }

    // ------------------------------------------------------------------
    // Pacing / error-injection control
    // ------------------------------------------------------------------

    pub fn set_tx_pacing_callback(
        &mut self,
        callback: impl FnMut(usize, usize) -> PacingDecision + 'static,
    ) {
        self.pacing.set_tx_callback(callback);
    }

    pub fn set_rx_rate_callback(&mut self, callback: impl FnMut(usize, usize, bool) + 'static) {
        self.pacing.set_rx_callback(callback);
    }

    pub fn clear_pacing_callbacks(&mut self) {
        self.pacing.clear_callbacks();
    }

    pub fn enable_error_injection(&mut self) {
        self.injector.enable();
    }

    pub fn disable_error_injection(&mut self) {
        self.injector.disable();
    }

    pub fn set_error_policy(&mut self, policy: impl FnMut() -> ErrorKind + 'static) {
        self.injector.set_policy(policy);
    }

    // ------------------------------------------------------------------
    // Transmit API
    // ------------------------------------------------------------------

    /// Issue a read request; returns the transaction tag for matching the
    /// completion.
    pub fn send_read_request(&mut self, address: u64, size: u8) -> Result<u16, EndpointError> {
        if self.transmit_callback.is_none() {
            return Err(EndpointError::TransmitUnset);
        }

        let tag = self.allocate_tag();
        let request = TlReadRequest {
            header: TlRequestHeader {
                opcode: TlOpcode::ReadRequest,
                half_flit: false,
                size,
                tag,
                address,
            },
        };
        let data = serialize_read_request(&request)?;

        self.transmit_tl_flits(&[TlFlit::new(data, 0)])?;
        self.stats.tx_read_requests += 1;
        Ok(tag)
    }

    /// Issue a write request carrying up to 56 bytes of data.
    pub fn send_write_request(
        &mut self,
        address: u64,
        size: u8,
        data: &[u8],
    ) -> Result<u16, EndpointError> {
        if self.transmit_callback.is_none() {
            return Err(EndpointError::TransmitUnset);
        }

        let mut request = TlWriteRequest::default();
        if data.len() > request.data.len() {
            return Err(EndpointError::DataTooLarge {
                len: data.len(),
                max: request.data.len(),
            });
        }

        let tag = self.allocate_tag();
        request.header = TlRequestHeader {
            opcode: TlOpcode::WriteRequest,
            half_flit: false,
            size,
            tag,
            address,
        };
        request.data[..data.len()].copy_from_slice(data);
        let flit_data = serialize_write_request(&request)?;

        self.transmit_tl_flits(&[TlFlit::new(flit_data, 0)])?;
        self.stats.tx_write_requests += 1;
        Ok(tag)
    }

    fn transmit_tl_flits(&mut self, tl_flits: &[TlFlit]) -> Result<(), EndpointError> {
        // Pacing and drop-injection run before a sequence number is spent.
        if self.pacing.has_tx_callback() {
            let total_bytes = tl_flits.len() * TL_FLIT_BYTES;
            match self.pacing.check_tx(tl_flits.len(), total_bytes) {
                PacingDecision::Allow => {}
                PacingDecision::Throttle | PacingDecision::Drop => {
                    self.stats.tx_dropped_by_pacing += 1;
                    return Ok(());
                }
            }
        }

        if self.injector.is_enabled() && self.injector.should_drop() {
            self.stats.tx_dropped_by_error_injection += 1;
            return Ok(());
        }

        if self.replay_buffer.is_full() {
            return Err(EndpointError::ReplayBufferFull);
        }

        let (seq, should_buffer) = self.tx.next_payload_seq();
        let header = ExplicitFlitHeader {
            op: OP_EXPLICIT,
            payload: true,
            flit_seq_no: seq,
        };
        let (clean, _packed) = pack_flit(tl_flits, &header)?;

        if should_buffer {
            let added = self.replay_buffer.add(seq, &clean);
            debug_assert!(added);
            self.stats.replay_buffer_size = self.replay_buffer.len();
        }

        // Fault the wire copy only; the buffered flit stays clean so replay
        // can recover the link.
        let mut wire = clean;
        if self.injector.is_enabled() {
            let error = self.injector.next_error();
            match error {
                ErrorKind::SequenceDup | ErrorKind::SequenceSkip => {
                    let wire_seq = self.injector.modify_sequence(seq, error);
                    let mutated_header = ExplicitFlitHeader {
                        flit_seq_no: wire_seq,
                        ..header
                    };
                    wire = pack_flit(tl_flits, &mutated_header)?.0;
                }
                ErrorKind::CrcCorruption => {
                    wire = self.injector.apply(&clean, error);
                }
                ErrorKind::None | ErrorKind::PacketDrop => {
                    self.injector.modify_sequence(seq, ErrorKind::None);
                }
            }
        }

        let Some(callback) = self.transmit_callback.as_mut() else {
            return Err(EndpointError::TransmitUnset);
        };
        callback(&wire);
        self.stats.tx_dl_flits += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Receive API
    // ------------------------------------------------------------------

    /// Consume one DL flit from the wire: commands retire or replay, payload
    /// flits are CRC-checked, acknowledged, and their TL flits dispatched to
    /// the completion callbacks.
    pub fn receive_flit(&mut self, flit: &DlFlit) -> Result<(), EndpointError> {
        self.stats.rx_dl_flits += 1;

        if self.enable_ack_req {
            match classify_flit(flit) {
                CommandClass::Ack(ack_seq) => {
                    self.stats.rx_acks_received += 1;
                    self.process_ack(ack_seq);
                    return Ok(());
                }
                CommandClass::ReplayRequest(replay_seq) => {
                    self.stats.rx_replay_requests_received += 1;
                    self.stats.retransmissions += 1;
                    self.replay_from(replay_seq)?;
                    return Ok(());
                }
                CommandClass::BadCrc => {
                    self.stats.rx_crc_errors += 1;
                    return Ok(());
                }
                CommandClass::NotCommand => {}
            }
        }

        let received_seq = decode_explicit_flit_header(&flit.flit_header).flit_seq_no;

        let tl_flits = if self.enable_crc_check {
            let result = if self.pacing.has_rx_callback() {
                crate::dl::flit::unpack_flit_checked_with_pacing(flit, &mut self.pacing)
            } else {
                crate::dl::flit::unpack_flit_checked(flit)
            };
            match result {
                Some(tl_flits) => tl_flits,
                None => {
                    self.stats.rx_crc_errors += 1;
                    return Ok(());
                }
            }
        } else if self.pacing.has_rx_callback() {
            crate::dl::flit::unpack_flit_with_pacing(flit, &mut self.pacing)
        } else {
            crate::dl::flit::unpack_flit(flit)
        };

        if self.enable_ack_req && self.transmit_callback.is_some() {
            let our_tx_seq_lo = (self.tx.state().last_seq & 0x7) as u8;
            if let Some(command) = self.ack_req.process_received(received_seq, our_tx_seq_lo) {
                let op = decode_command_flit_header(&command.flit_header).op;
                if op == OP_ACK {
                    self.stats.tx_acks_sent += 1;
                } else {
                    self.stats.tx_replay_requests_sent += 1;
                }
                if let Some(callback) = self.transmit_callback.as_mut() {
                    callback(&command);
                }
            }
        }

        for tl_flit in &tl_flits {
            self.handle_tl_flit(tl_flit);
        }
        Ok(())
    }

    /// Cumulative ack: retire acknowledged flits from the replay buffer.
    pub fn process_ack(&mut self, ack_seq: u16) {
        self.replay_buffer.retire_through(ack_seq);
        self.stats.replay_buffer_size = self.replay_buffer.len();
    }

    /// Re-emit buffered flits verbatim from `seq` to the newest. An unknown
    /// sequence replays nothing and is counted.
    pub fn replay_from(&mut self, seq: u16) -> Result<usize, EndpointError> {
        if self.transmit_callback.is_none() {
            return Err(EndpointError::TransmitUnset);
        }

        if !self.replay_buffer.contains_seq(seq) {
            self.stats.replay_misses += 1;
            log::warn!("replay request for seq {seq} not in buffer");
            return Ok(0);
        }

        self.tx.start_replay();
        let mut replayed = 0;
        {
            let Some(callback) = self.transmit_callback.as_mut() else {
                return Err(EndpointError::TransmitUnset);
            };
            for flit in self.replay_buffer.iter_from(seq) {
                callback(flit);
                replayed += 1;
            }
        }
        self.tx.finish_replay();
        Ok(replayed)
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    pub fn tx_seq(&self) -> u16 {
        self.tx.state().last_seq
    }

    pub fn expected_rx_seq(&self) -> u16 {
        self.ack_req.expected_rx_seq()
    }

    pub fn stats(&self) -> EndpointStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = EndpointStats::default();
    }

    fn handle_tl_flit(&mut self, tl_flit: &TlFlit) {
        match decode_opcode(&tl_flit.data) {
            TlOpcode::ReadResponse => {
                if let Some(response) = deserialize_read_response(&tl_flit.data) {
                    self.stats.rx_read_responses += 1;
                    if let Some(callback) = self.read_completion_callback.as_mut() {
                        callback(response.header.tag, response.header.status, &response.data);
                    }
                }
            }
            TlOpcode::WriteCompletion => {
                if let Some(completion) = deserialize_write_completion(&tl_flit.data) {
                    self.stats.rx_write_completions += 1;
                    if let Some(callback) = self.write_completion_callback.as_mut() {
                        callback(completion.header.tag, completion.header.status);
                    }
                }
            }
            // Requests arriving at this endpoint are a responder concern.
            _ => {}
        }
    }

    fn allocate_tag(&mut self) -> u16 {
        let tag = self.next_tag;
        self.next_tag = (self.next_tag + 1) & TAG_SPACE_MASK;
        tag
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Endpoint::new(EndpointConfig::default())
    }
}
