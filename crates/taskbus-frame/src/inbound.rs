//! Inbound pipeline: polls the hardware receive ring, extracts idle-gap
//! delimited frames, validates them and stages them in the bounded inbox.

use std::sync::{Mutex, MutexGuard};

use taskbus_transport::RxTap;

use crate::error::Result;
use crate::message::{Message, MessageStack, MAX_PAYLOAD};
use crate::protocol::FaultCode;

/// Capacity of the inbound frame queue.
pub const INBOX_CAPACITY: usize = 4;

/// Safety multiplier for the hardware receive ring; the ring holds
/// `(MAX_PAYLOAD + 4) * RX_RING_MULTIPLIER` bytes. If the ring still
/// overflows, polling is too slow for the link rate.
pub const RX_RING_MULTIPLIER: usize = 2;

/// Recommended hardware receive ring capacity.
pub const RX_RING_CAPACITY: usize = (MAX_PAYLOAD + 4) * RX_RING_MULTIPLIER;

// Minimum burst: length byte + empty payload + two checksum bytes, with the
// type tag already stripped by the transport.
const MIN_BURST: usize = 4;

/// Bounded inbox of validated frames.
///
/// Single producer (the frame poller) and single consumer (the dispatcher).
/// Retrieval is most-recently-pushed-first; on overflow the *new* frame is
/// discarded, never an older one. Critical sections are slot copies only.
pub struct Inbox {
    slots: Mutex<MessageStack<INBOX_CAPACITY>>,
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Inbox {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(MessageStack::new()),
        }
    }

    fn slots(&self) -> MutexGuard<'_, MessageStack<INBOX_CAPACITY>> {
        match self.slots.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stage one validated frame. Fails with [`FrameError::QueueFull`] when
    /// saturated; the caller drops the frame.
    pub fn push(&self, msg: &Message) -> Result<()> {
        self.slots().push(msg)
    }

    /// Remove and return the most recently staged frame.
    pub fn pop(&self) -> Option<Message> {
        self.slots().pop()
    }

    pub fn len(&self) -> usize {
        self.slots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots().is_empty()
    }
}

/// What one poll of the receive ring produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No bytes arrived since the last poll (or this was the baseline poll).
    NoData,
    /// A well-formed frame was staged in the inbox.
    Accepted,
    /// The burst was malformed; a diagnostic record was staged instead.
    Rejected(FaultCode),
    /// The frame was valid but the inbox is saturated; it was discarded.
    Dropped,
}

/// Extracts frames from an [`RxTap`] ring.
///
/// One burst per poll: the transport's idle-gap detection guarantees that all
/// bytes between two polls belong to at most one frame. The first poll after
/// construction only establishes the position baseline.
pub struct FramePoller<R> {
    tap: R,
    last_pos: Option<usize>,
}

impl<R: RxTap> FramePoller<R> {
    pub fn new(tap: R) -> Self {
        Self {
            tap,
            last_pos: None,
        }
    }

    /// Poll the ring once, staging at most one frame or diagnostic record.
    pub fn poll(&mut self, inbox: &Inbox) -> PollOutcome {
        let capacity = self.tap.capacity();
        let current = self.tap.write_pos();

        let last = match self.last_pos {
            Some(last) => last,
            None => {
                // No baseline yet; nothing can be framed.
                self.last_pos = Some(current);
                return PollOutcome::NoData;
            }
        };
        if current == last {
            return PollOutcome::NoData;
        }
        self.last_pos = Some(current);

        let delta = (current + capacity - last) % capacity;
        match self.extract(last, delta, capacity) {
            Ok(msg) => match inbox.push(&msg) {
                Ok(()) => PollOutcome::Accepted,
                Err(_) => {
                    tracing::warn!(len = msg.len(), "inbox saturated, inbound frame dropped");
                    PollOutcome::Dropped
                }
            },
            Err(fault) => {
                tracing::debug!(?fault, delta, "malformed inbound burst");
                self.stage_diagnostic(inbox, fault);
                PollOutcome::Rejected(fault)
            }
        }
    }

    fn extract(
        &self,
        start: usize,
        delta: usize,
        capacity: usize,
    ) -> std::result::Result<Message, FaultCode> {
        if delta < MIN_BURST {
            return Err(FaultCode::Idle);
        }

        let declared = usize::from(self.read_byte(start)?);
        if declared != delta - 3 {
            return Err(FaultCode::DataLen);
        }
        if declared > MAX_PAYLOAD {
            return Err(FaultCode::TooBig);
        }

        let mut payload = [0u8; MAX_PAYLOAD];
        self.read_wrapped(
            (start + 1) % capacity,
            &mut payload[..declared],
            capacity,
        )?;

        let crc_hi = self.read_byte((start + 1 + declared) % capacity)?;
        let crc_lo = self.read_byte((start + 2 + declared) % capacity)?;

        let mut msg = Message::from_payload(&payload[..declared]).map_err(|e| e.fault_code())?;
        msg.load_checksum(u16::from_be_bytes([crc_hi, crc_lo]));
        msg.validate().map_err(|e| e.fault_code())?;
        Ok(msg)
    }

    fn read_byte(&self, pos: usize) -> std::result::Result<u8, FaultCode> {
        let mut byte = [0u8; 1];
        self.tap
            .copy_from(pos, &mut byte)
            .map_err(|_| FaultCode::Other)?;
        Ok(byte[0])
    }

    fn read_wrapped(
        &self,
        start: usize,
        dst: &mut [u8],
        capacity: usize,
    ) -> std::result::Result<(), FaultCode> {
        let first = dst.len().min(capacity - start);
        self.tap
            .copy_from(start, &mut dst[..first])
            .map_err(|_| FaultCode::Other)?;
        if first < dst.len() {
            self.tap
                .copy_from(0, &mut dst[first..])
                .map_err(|_| FaultCode::Other)?;
        }
        Ok(())
    }

    fn stage_diagnostic(&self, inbox: &Inbox, fault: FaultCode) {
        if inbox.push(&Message::diagnostic(fault)).is_err() {
            tracing::warn!(?fault, "inbox saturated, diagnostic record dropped");
        }
    }
}
