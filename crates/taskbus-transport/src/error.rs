/// Errors that can occur at the link boundary.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// A linear copy was requested past the receive ring's capacity.
    #[error("rx ring read out of bounds (pos {pos} + len {len}, capacity {capacity})")]
    OutOfBounds {
        pos: usize,
        len: usize,
        capacity: usize,
    },

    /// The link rejected the transmit hand-off permanently.
    #[error("transmit rejected by link")]
    TransmitFailed,
}

pub type Result<T> = std::result::Result<T, LinkError>;
