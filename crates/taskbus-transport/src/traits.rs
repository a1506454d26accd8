use crate::error::Result;

/// Outcome of handing one serialized frame to the link hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// The link accepted the buffer for transmission.
    Accepted,
    /// The link is mid-transfer; the hand-off may be retried.
    Busy,
    /// The link rejected the buffer.
    Rejected,
}

/// Transmit side of the serial link.
///
/// One hand-off per call; the implementation owns pacing and completion.
pub trait TxPort: Send + Sync {
    /// Hand a complete wire buffer to the link.
    fn transmit(&self, buf: &[u8]) -> TxStatus;
}

/// Receive side of the serial link: a fixed-capacity ring the hardware writes
/// into on its own schedule.
///
/// The consumer polls [`write_pos`](RxTap::write_pos) and computes how many
/// bytes arrived since its last poll. The position wraps at
/// [`capacity`](RxTap::capacity); a reported position is always `< capacity`.
/// Reads are linear — callers split a wrapped range into two copies.
pub trait RxTap: Send + Sync {
    /// Total capacity of the hardware receive ring.
    fn capacity(&self) -> usize;

    /// Current hardware write position.
    fn write_pos(&self) -> usize;

    /// Copy `dst.len()` bytes starting at `pos`, without wrapping.
    fn copy_from(&self, pos: usize, dst: &mut [u8]) -> Result<()>;
}
