//! Outbound pipeline: the bounded outbox and the wire serializer with its
//! transmit retry policy.

use std::sync::Mutex;
use std::time::Duration;

use bytes::{BufMut, BytesMut};
use taskbus_transport::{TxPort, TxStatus};

use crate::error::{FrameError, Result};
use crate::message::{Message, MessageStack, MAX_PAYLOAD};
use crate::protocol::FRAME_TAG;
use crate::sync::{lock_within, LOCK_TIMEOUT};

/// Capacity of the outbound frame queue.
pub const OUTBOX_CAPACITY: usize = 4;

/// Transmit hand-off attempts before the sender gives up on a busy link.
pub const SEND_RETRY_LIMIT: u32 = 5;

/// Bounded outbox of response frames.
///
/// Retrieval is most-recently-pushed-first, matching the inbox discipline.
/// Push and pop may be called from any task context; every access is
/// serialized through a bounded-wait mutex.
pub struct Outbox {
    slots: Mutex<MessageStack<OUTBOX_CAPACITY>>,
    lock_timeout: Duration,
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Outbox {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(MessageStack::new()),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// Queue a message for transmission.
    pub fn push(&self, msg: &Message) -> Result<()> {
        lock_within(&self.slots, self.lock_timeout)?.push(msg)
    }

    /// Remove and return the most recently queued message, zeroing its slot.
    pub fn pop(&self) -> Result<Option<Message>> {
        Ok(lock_within(&self.slots, self.lock_timeout)?.pop())
    }

    pub fn len(&self) -> usize {
        match lock_within(&self.slots, self.lock_timeout) {
            Ok(slots) => slots.len(),
            Err(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Serializes messages to the wire format and hands them to the link.
///
/// Wire format, device→bus:
/// ```text
/// [0xFF][len: u8][payload: len bytes][crc_hi][crc_lo]
/// ```
/// Only the sender loop calls [`send`](FrameSender::send).
pub struct FrameSender<T> {
    port: T,
    retries: u32,
    buf: BytesMut,
}

impl<T: TxPort> FrameSender<T> {
    pub fn new(port: T) -> Self {
        Self {
            port,
            retries: SEND_RETRY_LIMIT,
            buf: BytesMut::with_capacity(MAX_PAYLOAD + 4),
        }
    }

    /// Override the retry limit.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Serialize `msg` and hand it to the link, retrying a transient-busy
    /// hand-off up to the retry limit.
    pub fn send(&mut self, msg: &Message) -> Result<()> {
        self.buf.clear();
        self.buf.put_u8(FRAME_TAG);
        self.buf.put_u8(msg.len() as u8);
        self.buf.put_slice(msg.payload());
        self.buf.put_u16(msg.checksum());

        let mut status = TxStatus::Busy;
        for _ in 0..self.retries {
            status = self.port.transmit(&self.buf);
            if status != TxStatus::Busy {
                break;
            }
        }
        match status {
            TxStatus::Accepted => Ok(()),
            TxStatus::Busy => Err(FrameError::LinkBusy {
                retries: self.retries,
            }),
            TxStatus::Rejected => Err(FrameError::LinkRejected),
        }
    }

    /// Hand a pre-framed buffer (debug text) straight to the link.
    pub fn transmit_raw(&self, bytes: &[u8]) -> TxStatus {
        self.port.transmit(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crc16::crc16_modbus;
    use taskbus_transport::LoopbackLink;

    #[test]
    fn outbox_is_lifo_and_bounded() {
        let outbox = Outbox::new();
        for i in 0..OUTBOX_CAPACITY as u8 {
            outbox.push(&Message::from_payload(&[i]).unwrap()).unwrap();
        }
        let err = outbox
            .push(&Message::from_payload(&[9]).unwrap())
            .unwrap_err();
        assert!(matches!(err, FrameError::QueueFull { .. }));

        let newest = outbox.pop().unwrap().unwrap();
        assert_eq!(newest.payload(), &[OUTBOX_CAPACITY as u8 - 1]);
    }

    #[test]
    fn pop_empty_returns_none() {
        let outbox = Outbox::new();
        assert!(outbox.pop().unwrap().is_none());
    }

    #[test]
    fn send_serializes_wire_format() {
        let link = LoopbackLink::new(16);
        let mut sender = FrameSender::new(link.clone());

        let mut msg = Message::from_payload(&[0x10, 0x20, 0x30]).unwrap();
        msg.set_checksum();
        sender.send(&msg).unwrap();

        let crc = crc16_modbus(&[0x10, 0x20, 0x30]).to_be_bytes();
        assert_eq!(
            link.drain_tx(),
            vec![FRAME_TAG, 3, 0x10, 0x20, 0x30, crc[0], crc[1]]
        );
    }

    #[test]
    fn send_retries_through_transient_busy() {
        let link = LoopbackLink::new(16);
        link.set_busy(SEND_RETRY_LIMIT - 1);
        let mut sender = FrameSender::new(link.clone());

        let mut msg = Message::from_payload(&[1]).unwrap();
        msg.set_checksum();
        sender.send(&msg).unwrap();
        assert!(!link.drain_tx().is_empty());
    }

    #[test]
    fn send_gives_up_after_retry_limit() {
        let link = LoopbackLink::new(16);
        link.set_busy(SEND_RETRY_LIMIT);
        let mut sender = FrameSender::new(link.clone());

        let mut msg = Message::from_payload(&[1]).unwrap();
        msg.set_checksum();
        let err = sender.send(&msg).unwrap_err();
        assert!(matches!(err, FrameError::LinkBusy { .. }));
        assert!(link.drain_tx().is_empty());
    }

    #[test]
    fn send_surfaces_rejection() {
        let link = LoopbackLink::new(16);
        link.reject_next();
        let mut sender = FrameSender::new(link);

        let mut msg = Message::from_payload(&[1]).unwrap();
        msg.set_checksum();
        let err = sender.send(&msg).unwrap_err();
        assert!(matches!(err, FrameError::LinkRejected));
    }
}
