use taskbus_frame::ResultCode;

/// Errors from command registry operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The id is already present among the active entries.
    #[error("task id {0} already registered")]
    IdAlreadyUsed(u8),

    /// The registry is at capacity.
    #[error("registry full")]
    Overflow,

    /// The id is outside the valid task-id range.
    #[error("task id {0} out of range")]
    IdOutOfRange(u8),

    /// No active entry carries this id.
    #[error("task id {0} not registered")]
    NotFound(u8),

    /// The task has not been acknowledged yet; the entry was left untouched.
    #[error("task id {0} not finished")]
    NotFinished(u8),

    /// The registry mutex could not be acquired within the bounded wait.
    #[error("registry lock timed out")]
    TimedOut,
}

impl RegistryError {
    /// The result byte this error travels as in a dispatcher response.
    pub fn result_code(&self) -> ResultCode {
        match self {
            RegistryError::IdAlreadyUsed(_) => ResultCode::IdAlreadyUsed,
            RegistryError::Overflow => ResultCode::Overflow,
            RegistryError::IdOutOfRange(_) => ResultCode::IdOutOfRange,
            RegistryError::NotFound(_) => ResultCode::NotFound,
            RegistryError::NotFinished(_) => ResultCode::NotFinished,
            RegistryError::TimedOut => ResultCode::TimedOut,
        }
    }
}

/// Errors from task lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum TaskError {
    /// The task's bounded signal queue is full; nothing was enqueued.
    #[error("signal queue of task {id} is full")]
    QueueFull { id: u8 },

    /// The task thread is gone and its queue receiver dropped.
    #[error("signal channel of task {id} closed")]
    ChannelClosed { id: u8 },

    /// A wait-for-start was released by a byte other than the start signal.
    /// The phase stays at waiting-for-start; the caller retries the wait.
    #[error("unexpected signal byte {byte:#04x} while waiting for start")]
    UnexpectedSignal { byte: u8 },

    /// Forwarding to the outbox failed.
    #[error(transparent)]
    Frame(#[from] taskbus_frame::FrameError),
}
