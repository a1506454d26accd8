//! Serial task orchestration for small devices.
//!
//! taskbus frames commands over a byte link with CRC-16/MODBUS checking and
//! drives a registry of long-running tasks through a start / status / delete
//! lifecycle.
//!
//! # Crate Structure
//!
//! - [`transport`] — Link abstraction: transmit port, receive-ring tap and an
//!   in-memory loopback double
//! - [`frame`] — Wire format, checksums, the bounded inbox/outbox and the
//!   frame poller and sender
//! - [`engine`] — Command registry, task lifecycle and the orchestrator loops

/// Re-export transport types.
pub mod transport {
    pub use taskbus_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use taskbus_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use taskbus_engine::*;
}
