// UALINK MODEL — DL MESSAGE QUEUE
// Outbound DL-message arbitration: one FIFO per message group (Basic /
// Control / UART), round-robin selection, one 4-byte DWord per pop. A
// multi-DWord UART Stream Transport locks the arbiter until its last payload
// DWord has been emitted; other groups queue behind it.

use std::collections::VecDeque;

use crate::bits::FieldError;
use crate::dl::message::{serialize_message, DlMessage};

/// The three arbitration groups.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MessageGroup {
    Basic,
    Control,
    Uart,
}

/// Fixed round-robin service order.
const GROUP_ORDER: [MessageGroup; 3] = [
    MessageGroup::Basic,
    MessageGroup::Control,
    MessageGroup::Uart,
];

impl DlMessage {
    /// Which arbitration group a message belongs to.
    pub fn group(&self) -> MessageGroup {
        match self {
            DlMessage::NoOp
            | DlMessage::TlRate(_)
            | DlMessage::DeviceId(_)
            | DlMessage::PortId(_) => MessageGroup::Basic,
            DlMessage::ChannelNego(_) => MessageGroup::Control,
            DlMessage::UartResetReq(_)
            | DlMessage::UartResetRsp(_)
            | DlMessage::UartTransport(_)
            | DlMessage::UartCredit(_) => MessageGroup::Uart,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub basic_enqueued: u64,
    pub control_enqueued: u64,
    pub uart_enqueued: u64,
    pub basic_sent: u64,
    pub control_sent: u64,
    pub uart_sent: u64,
    pub uart_multi_dword_count: u64,
}

pub struct DlMessageQueue {
    basic: VecDeque<DlMessage>,
    control: VecDeque<DlMessage>,
    uart: VecDeque<DlMessage>,
    last_served: Option<MessageGroup>,
    uart_pending_dwords: VecDeque<u32>,
    uart_multi_progress: bool,
    stats: QueueStats,
}

impl DlMessageQueue {
    pub fn new() -> Self {
        DlMessageQueue {
            basic: VecDeque::new(),
            control: VecDeque::new(),
            uart: VecDeque::new(),
            last_served: None,
            uart_pending_dwords: VecDeque::new(),
            uart_multi_progress: false,
            stats: QueueStats::default(),
        }
    }

    /// Enqueue a message onto its group FIFO. The message is validated by a
    /// trial serialization so an out-of-range field surfaces here rather than
    /// at pop time.
    pub fn enqueue(&mut self, msg: DlMessage) -> Result<(), FieldError> {
        serialize_message(&msg)?;
        match msg.group() {
            MessageGroup::Basic => {
                self.basic.push_back(msg);
                self.stats.basic_enqueued += 1;
            }
            MessageGroup::Control => {
                self.control.push_back(msg);
                self.stats.control_enqueued += 1;
            }
            MessageGroup::Uart => {
                self.uart.push_back(msg);
                self.stats.uart_enqueued += 1;
            }
        }
        Ok(())
    }

    /// Emit the next DWord: a pending UART transport payload DWord if the
    /// lock is held, otherwise the front of the round-robin-selected group.
    pub fn pop_next_dword(&mut self) -> Option<[u8; 4]> {
        if self.uart_multi_progress {
            if let Some(dword) = self.uart_pending_dwords.pop_front() {
                if self.uart_pending_dwords.is_empty() {
                    self.uart_multi_progress = false;
                }
                return Some(dword.to_be_bytes());
            }
            // Lock held with nothing pending: clear and fall through.
            self.uart_multi_progress = false;
        }

        let group = self.select_next_group()?;
        let msg = self.pop_from_group(group)?;

        let dwords = match serialize_message(&msg) {
            Ok(dwords) => dwords,
            // Messages are validated at enqueue time.
            Err(_) => unreachable!(),
        };

        if dwords.len() > 1 {
            for dword in &dwords[1..] {
                self.uart_pending_dwords.push_back(u32::from_be_bytes(*dword));
            }
            self.uart_multi_progress = true;
            self.stats.uart_multi_dword_count += 1;
        }

        match group {
            MessageGroup::Basic => self.stats.basic_sent += 1,
            MessageGroup::Control => self.stats.control_sent += 1,
            MessageGroup::Uart => self.stats.uart_sent += 1,
        }
        self.last_served = Some(group);

        Some(dwords[0])
    }

    pub fn has_pending(&self) -> bool {
        !self.basic.is_empty()
            || !self.control.is_empty()
            || !self.uart.is_empty()
            || self.uart_multi_progress
    }

    pub fn stats(&self) -> QueueStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = QueueStats::default();
    }

    fn group_len(&self, group: MessageGroup) -> usize {
        match group {
            MessageGroup::Basic => self.basic.len(),
            MessageGroup::Control => self.control.len(),
            MessageGroup::Uart => self.uart.len(),
        }
    }

    /// Round-robin selection: start one position after the last served group
    /// and take the first non-empty queue.
    fn select_next_group(&self) -> Option<MessageGroup> {
        let start = match self.last_served {
            Some(last) => {
                let pos = GROUP_ORDER.iter().position(|&g| g == last).unwrap_or(0);
                (pos + 1) % GROUP_ORDER.len()
            }
            None => 0,
        };

        for i in 0..GROUP_ORDER.len() {
            let group = GROUP_ORDER[(start + i) % GROUP_ORDER.len()];
            if self.group_len(group) > 0 {
                return Some(group);
            }
        }
        None
    }

    fn pop_from_group(&mut self, group: MessageGroup) -> Option<DlMessage> {
        match group {
            MessageGroup::Basic => self.basic.pop_front(),
            MessageGroup::Control => self.control.pop_front(),
            MessageGroup::Uart => self.uart.pop_front(),
        }
    }
}

impl Default for DlMessageQueue {
    fn default() -> Self {
        DlMessageQueue::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dl::message::{
        deserialize_uart_transport_header, serialize_no_op, ChannelNegotiation,
        TlRateNotification, UartStreamCreditUpdate, UartStreamTransport,
    };

    fn nego() -> DlMessage {
        DlMessage::ChannelNego(ChannelNegotiation::default())
    }

    fn credit(seq: u16) -> DlMessage {
        DlMessage::UartCredit(UartStreamCreditUpdate {
            data_fc_seq: seq,
            stream_id: 0,
        })
    }

    #[test]
    fn empty_queue_yields_none() {
        let mut queue = DlMessageQueue::new();
        assert!(!queue.has_pending());
        assert_eq!(queue.pop_next_dword(), None);
    }

    #[test]
    fn fifo_within_group() {
        let mut queue = DlMessageQueue::new();
        queue
            .enqueue(DlMessage::TlRate(TlRateNotification {
                rate: 1,
                ack: false,
            }))
            .unwrap();
        queue
            .enqueue(DlMessage::TlRate(TlRateNotification {
                rate: 2,
                ack: false,
            }))
            .unwrap();

        let first = queue.pop_next_dword().unwrap();
        let second = queue.pop_next_dword().unwrap();
        assert_eq!(first[1], 1);
        assert_eq!(second[1], 2);
    }

    #[test]
    fn round_robin_across_groups() {
        let mut queue = DlMessageQueue::new();
        // Two of each group; expect B C U B C U.
        for _ in 0..2 {
            queue.enqueue(DlMessage::NoOp).unwrap();
            queue.enqueue(nego()).unwrap();
            queue.enqueue(credit(1)).unwrap();
        }

        let mut served = Vec::new();
        while queue.pop_next_dword().is_some() {
            served.push(queue.stats());
        }
        let final_stats = queue.stats();
        assert_eq!(final_stats.basic_sent, 2);
        assert_eq!(final_stats.control_sent, 2);
        assert_eq!(final_stats.uart_sent, 2);

        // Every window of 3 consecutive pops served each group exactly once.
        assert_eq!(served[2].basic_sent, 1);
        assert_eq!(served[2].control_sent, 1);
        assert_eq!(served[2].uart_sent, 1);
    }

    #[test]
    fn idle_groups_yield_their_slot() {
        let mut queue = DlMessageQueue::new();
        queue.enqueue(DlMessage::NoOp).unwrap();
        queue.enqueue(DlMessage::NoOp).unwrap();

        assert!(queue.pop_next_dword().is_some());
        assert!(queue.pop_next_dword().is_some());
        assert_eq!(queue.stats().basic_sent, 2);
    }

    #[test]
    fn uart_transport_locks_arbiter() {
        let mut queue = DlMessageQueue::new();
        queue
            .enqueue(DlMessage::UartTransport(UartStreamTransport {
                stream_id: 2,
                payload_dwords: vec![0x1111_1111, 0x2222_2222, 0x3333_3333],
            }))
            .unwrap();
        queue.enqueue(DlMessage::NoOp).unwrap();

        // Header first.
        let header = queue.pop_next_dword().unwrap();
        assert_eq!(deserialize_uart_transport_header(&header), Some((2, 3)));

        // Then the three payload DWords, in order, before anything else.
        assert_eq!(queue.pop_next_dword().unwrap(), 0x1111_1111u32.to_be_bytes());
        assert_eq!(queue.pop_next_dword().unwrap(), 0x2222_2222u32.to_be_bytes());
        assert_eq!(queue.pop_next_dword().unwrap(), 0x3333_3333u32.to_be_bytes());

        // Only the fifth pop reaches the NoOp.
        assert_eq!(queue.pop_next_dword().unwrap(), serialize_no_op());
        assert_eq!(queue.pop_next_dword(), None);
        assert_eq!(queue.stats().uart_multi_dword_count, 1);
    }

    #[test]
    fn second_transport_queues_behind_first() {
        let mut queue = DlMessageQueue::new();
        for tag in [0xAAAA_AAAAu32, 0xBBBB_BBBB] {
            queue
                .enqueue(DlMessage::UartTransport(UartStreamTransport {
                    stream_id: 0,
                    payload_dwords: vec![tag],
                }))
                .unwrap();
        }

        queue.pop_next_dword().unwrap(); // first header
        assert_eq!(queue.pop_next_dword().unwrap(), 0xAAAA_AAAAu32.to_be_bytes());
        queue.pop_next_dword().unwrap(); // second header
        assert_eq!(queue.pop_next_dword().unwrap(), 0xBBBB_BBBBu32.to_be_bytes());
    }

    #[test]
    fn enqueue_rejects_out_of_range_message() {
        let mut queue = DlMessageQueue::new();
        let bad = DlMessage::UartTransport(UartStreamTransport {
            stream_id: 0,
            payload_dwords: vec![],
        });
        assert!(queue.enqueue(bad).is_err());
        assert!(!queue.has_pending());
    }
}
