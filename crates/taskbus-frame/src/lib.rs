//! Byte-level framing and validation for the taskbus serial protocol.
//!
//! Every inbound frame is `[len][payload…][crc_hi][crc_lo]` (the transport
//! strips the leading type tag); every outbound frame is
//! `[0xFF][len][payload…][crc_hi][crc_lo]`. The checksum is CRC-16/MODBUS over
//! the payload only. Frames are staged in bounded, deliberately LIFO queues —
//! see [`inbound::Inbox`] and [`outbound::Outbox`] for the contract.

pub mod crc16;
pub mod debug;
pub mod error;
pub mod inbound;
pub mod message;
pub mod outbound;
pub mod protocol;
pub mod ring;
pub mod sync;

pub use crc16::crc16_modbus;
pub use debug::DebugBuffer;
pub use error::{FrameError, Result};
pub use inbound::{
    FramePoller, Inbox, PollOutcome, INBOX_CAPACITY, RX_RING_CAPACITY, RX_RING_MULTIPLIER,
};
pub use message::{Message, MAX_PAYLOAD};
pub use outbound::{FrameSender, Outbox, OUTBOX_CAPACITY, SEND_RETRY_LIMIT};
pub use protocol::{Command, FaultCode, ResultCode, Signal};
pub use ring::{RingBuffer, RingError};
pub use sync::{lock_within, LOCK_TIMEOUT};
