//! Serial-link contracts consumed by the taskbus core.
//!
//! The physical transport (UART peripheral, interrupt/DMA byte delivery) lives
//! outside this workspace. The core only ever sees two seams:
//! - [`RxTap`]: a fixed-capacity hardware receive ring whose write position is
//!   queried, never pushed ("bytes arrived at position P").
//! - [`TxPort`]: a transmit hand-off that may report busy ("transmit buffer B").
//!
//! [`LoopbackLink`] implements both in memory for tests and the CLI simulator.

pub mod error;
pub mod loopback;
pub mod traits;

pub use error::{LinkError, Result};
pub use loopback::LoopbackLink;
pub use traits::{RxTap, TxPort, TxStatus};
