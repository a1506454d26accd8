use std::fmt;

use taskbus_engine::RegistryError;
use taskbus_frame::FrameError;

// Exit code constants follow the conventional sysexits-ish split the rest of
// our tooling uses.
pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::ChecksumMismatch { .. }
        | FrameError::PayloadTooLarge { .. }
        | FrameError::MessageFull { .. } => DATA_INVALID,
        FrameError::LockTimeout => TIMEOUT,
        FrameError::QueueFull { .. } | FrameError::LinkBusy { .. } | FrameError::LinkRejected => {
            FAILURE
        }
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn registry_error(context: &str, err: RegistryError) -> CliError {
    let code = match err {
        RegistryError::TimedOut => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}
