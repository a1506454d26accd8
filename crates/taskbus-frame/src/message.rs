use crate::crc16::crc16_modbus;
use crate::error::{FrameError, Result};
use crate::protocol::{Command, FaultCode};

/// Maximum payload length of one frame.
pub const MAX_PAYLOAD: usize = 64;

/// One framed payload: length, payload bytes and a CRC-16/MODBUS checksum
/// over `payload[0..len]`.
///
/// A message is owned exclusively by whichever queue slot currently holds it;
/// crossing a queue boundary is always a copy, never aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message {
    len: u8,
    data: [u8; MAX_PAYLOAD],
    checksum: u16,
}

impl Default for Message {
    fn default() -> Self {
        Self::new()
    }
}

impl Message {
    /// An empty message.
    pub fn new() -> Self {
        Self {
            len: 0,
            data: [0; MAX_PAYLOAD],
            checksum: 0,
        }
    }

    /// Build a message from a complete payload.
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        let mut msg = Self::new();
        msg.append_slice(payload)?;
        Ok(msg)
    }

    /// A two-byte diagnostic record `[RECEIVE_ERROR, fault]` for a malformed
    /// inbound frame. Travels through the inbox like any other frame.
    pub fn diagnostic(fault: FaultCode) -> Self {
        let mut msg = Self::new();
        msg.data[0] = Command::ReceiveError as u8;
        msg.data[1] = fault as u8;
        msg.len = 2;
        msg
    }

    /// Zero length, checksum and payload.
    pub fn reset(&mut self) {
        self.len = 0;
        self.checksum = 0;
        self.data = [0; MAX_PAYLOAD];
    }

    /// Significant payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Stored checksum (set by [`set_checksum`](Message::set_checksum) or
    /// loaded from the wire).
    pub fn checksum(&self) -> u16 {
        self.checksum
    }

    /// Load a checksum received off the wire, for later validation.
    pub fn load_checksum(&mut self, checksum: u16) {
        self.checksum = checksum;
    }

    /// Append one byte.
    pub fn append(&mut self, byte: u8) -> Result<()> {
        if self.len as usize >= MAX_PAYLOAD {
            return Err(FrameError::MessageFull { len: MAX_PAYLOAD });
        }
        self.data[self.len as usize] = byte;
        self.len += 1;
        Ok(())
    }

    /// Append a slice. Exactly filling the remaining capacity succeeds.
    pub fn append_slice(&mut self, bytes: &[u8]) -> Result<()> {
        let remaining = MAX_PAYLOAD - self.len as usize;
        if bytes.len() > remaining {
            return Err(FrameError::PayloadTooLarge {
                requested: bytes.len(),
                remaining,
            });
        }
        self.data[self.len as usize..self.len as usize + bytes.len()].copy_from_slice(bytes);
        self.len += bytes.len() as u8;
        Ok(())
    }

    /// Compute and store the checksum over the current payload.
    /// No-op on an empty message.
    pub fn set_checksum(&mut self) {
        if self.len == 0 {
            return;
        }
        self.checksum = crc16_modbus(self.payload());
    }

    /// Recompute the checksum and compare against the stored one.
    pub fn validate(&self) -> Result<()> {
        let computed = crc16_modbus(self.payload());
        if computed == self.checksum {
            Ok(())
        } else {
            Err(FrameError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            })
        }
    }
}

/// Bounded stack of message slots.
///
/// Retrieval is deliberately most-recently-pushed-first (LIFO), matching the
/// protocol's queue discipline — do not "fix" this into FIFO.
#[derive(Debug)]
pub(crate) struct MessageStack<const N: usize> {
    slots: [Message; N],
    count: usize,
}

impl<const N: usize> MessageStack<N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: [Message::new(); N],
            count: 0,
        }
    }

    pub(crate) fn push(&mut self, msg: &Message) -> Result<()> {
        if self.count == N {
            return Err(FrameError::QueueFull { capacity: N });
        }
        self.slots[self.count] = *msg;
        self.count += 1;
        Ok(())
    }

    /// Remove and return the most recently pushed message, zeroing its slot.
    pub(crate) fn pop(&mut self) -> Option<Message> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        let msg = self.slots[self.count];
        self.slots[self.count].reset();
        Some(msg)
    }

    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.count == 0
    }
}
