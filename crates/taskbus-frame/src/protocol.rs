//! Wire vocabulary: command bytes, lifecycle signal bytes, result and fault
//! codes, frame delimiters and status-byte packing.

/// Type tag prefixed to every device→bus protocol frame.
pub const FRAME_TAG: u8 = 0xFF;

/// Start-of-text delimiter for debug ASCII output.
pub const TEXT_START: u8 = 0x02;
/// End-of-text delimiter for debug ASCII output.
pub const TEXT_END: u8 = 0x03;

/// Task id sentinel: unused registry slot.
pub const TASK_ID_NONE: u8 = 0x00;
/// Highest assignable task id.
pub const TASK_ID_LAST: u8 = 0x20;
/// Task id reserved for bench testing; exempt from range checks.
pub const TASK_ID_TEST: u8 = 0xFF;

/// Command type byte — first payload byte of every controller frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Enumerate every registry entry with its packed status.
    GetStatus = 0x01,
    /// Register a task and send it the start signal.
    Start = 0x02,
    /// Remove a finished task from the registry.
    Delete = 0x03,
    /// Forward raw bytes to a task's inbound queue.
    SendData = 0x04,
    /// Reserved; not enforced by the orchestrator.
    Pause = 0x05,
    /// Reserved; not enforced by the orchestrator.
    Resume = 0x06,
    /// A task pushed a payload to the bus on its own.
    DataFromTask = 0x07,
    /// Diagnostic record for a malformed inbound frame.
    ReceiveError = 0xFE,
    /// Reserved extension point.
    EmergencyStop = 0xFF,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            0x01 => Ok(Command::GetStatus),
            0x02 => Ok(Command::Start),
            0x03 => Ok(Command::Delete),
            0x04 => Ok(Command::SendData),
            0x05 => Ok(Command::Pause),
            0x06 => Ok(Command::Resume),
            0x07 => Ok(Command::DataFromTask),
            0xFE => Ok(Command::ReceiveError),
            0xFF => Ok(Command::EmergencyStop),
            other => Err(other),
        }
    }
}

/// Single-byte lifecycle signals delivered to a task's private queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Signal {
    /// Releases a task waiting for start.
    Start = 0xAA,
    /// Acknowledges a finished cycle; releases a task waiting for ack.
    Ack = 0xBB,
    /// Announces incoming data; currently unused.
    SendData = 0xCC,
    /// Reserved.
    Stop = 0xDD,
    /// Reserved.
    Resume = 0xEE,
}

/// Result byte appended to a dispatcher response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    Ok = 0x00,
    Added = 0x01,
    NotFinished = 0x02,
    NotFound = 0x03,
    Deleted = 0x04,
    TimedOut = 0x05,
    Overflow = 0x06,
    IdAlreadyUsed = 0x07,
    IdOutOfRange = 0x08,
    CantReceiveData = 0x09,
    IdDisabledTask = 0x0A,
    Error = 0xFF,
}

/// Fault byte carried in a `RECEIVE_ERROR` diagnostic frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    BufferFull = 1,
    BufferEmpty = 2,
    Checksum = 3,
    Idle = 4,
    DataLen = 5,
    Busy = 6,
    Timeout = 7,
    TooBig = 8,
    Other = 255,
}

/// Pack a task's coarse phase (3 bits) and private detail (5 bits) into the
/// status byte a GET_STATUS response carries per task.
pub fn status_byte(phase: u8, detail: u8) -> u8 {
    (phase << 5) | (detail & 0x1F)
}
