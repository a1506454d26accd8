use crate::protocol::FaultCode;

/// Errors that can occur while building, validating or moving frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// Appending one more byte would exceed the message capacity.
    #[error("message full ({len} bytes)")]
    MessageFull { len: usize },

    /// Appending a slice would exceed the message capacity.
    #[error("payload too large ({requested} bytes into {remaining} remaining)")]
    PayloadTooLarge { requested: usize, remaining: usize },

    /// Stored checksum does not match the payload.
    #[error("checksum mismatch (stored {stored:#06x}, computed {computed:#06x})")]
    ChecksumMismatch { stored: u16, computed: u16 },

    /// A bounded message queue is saturated; the new frame was discarded.
    #[error("message queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The link stayed busy through every transmit retry.
    #[error("link busy after {retries} transmit attempts")]
    LinkBusy { retries: u32 },

    /// The link rejected the transmit hand-off.
    #[error("link rejected transmit")]
    LinkRejected,

    /// A bounded mutex acquisition ran out of time.
    #[error("lock acquisition timed out")]
    LockTimeout,
}

impl FrameError {
    /// The fault code this error travels as in a diagnostic frame.
    pub fn fault_code(&self) -> FaultCode {
        match self {
            FrameError::ChecksumMismatch { .. } => FaultCode::Checksum,
            FrameError::QueueFull { .. } => FaultCode::BufferFull,
            FrameError::LinkBusy { .. } => FaultCode::Busy,
            FrameError::LockTimeout => FaultCode::Timeout,
            FrameError::PayloadTooLarge { .. } => FaultCode::TooBig,
            _ => FaultCode::Other,
        }
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
