//! Bus-visible debug text, staged in a ring buffer and flushed by the sender
//! loop only while no protocol frame is waiting.

use std::sync::{Mutex, MutexGuard};

use crate::protocol::{TEXT_END, TEXT_START};
use crate::ring::RingBuffer;

/// Default capacity of the debug text ring.
pub const DEBUG_RING_CAPACITY: usize = 1024;

/// Shared staging area for ASCII debug output.
///
/// Wire format: `[0x02][ASCII bytes…][0x03]`. Text that does not fit in the
/// remaining ring space is dropped rather than truncated mid-line.
pub struct DebugBuffer {
    ring: Mutex<RingBuffer>,
}

impl Default for DebugBuffer {
    fn default() -> Self {
        Self::new(DEBUG_RING_CAPACITY)
    }
}

impl DebugBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(RingBuffer::new(capacity)),
        }
    }

    fn ring(&self) -> MutexGuard<'_, RingBuffer> {
        match self.ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stage one line of debug text. Returns false if it was dropped.
    pub fn push_text(&self, text: &str) -> bool {
        let staged = self.ring().write(text.as_bytes()).is_ok();
        if !staged {
            tracing::debug!(len = text.len(), "debug ring full, text dropped");
        }
        staged
    }

    /// Drain all staged text, framed with the text delimiters.
    /// Returns `None` when nothing is staged.
    pub fn drain_framed(&self) -> Option<Vec<u8>> {
        let mut ring = self.ring();
        let mut scratch = vec![0u8; ring.capacity()];
        let n = ring.read_all(&mut scratch).ok()?;

        let mut framed = Vec::with_capacity(n + 2);
        framed.push(TEXT_START);
        framed.extend_from_slice(&scratch[..n]);
        framed.push(TEXT_END);
        Some(framed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_framed_text() {
        let debug = DebugBuffer::new(64);
        assert!(debug.push_text("task 2 armed\n"));
        assert!(debug.push_text("tick\n"));

        let framed = debug.drain_framed().unwrap();
        assert_eq!(framed[0], TEXT_START);
        assert_eq!(*framed.last().unwrap(), TEXT_END);
        assert_eq!(&framed[1..framed.len() - 1], b"task 2 armed\ntick\n");

        assert!(debug.drain_framed().is_none());
    }

    #[test]
    fn oversized_text_is_dropped_whole() {
        let debug = DebugBuffer::new(8);
        assert!(debug.push_text("12345678"));
        assert!(!debug.push_text("x"));

        let framed = debug.drain_framed().unwrap();
        assert_eq!(&framed[1..framed.len() - 1], b"12345678");
    }
}
