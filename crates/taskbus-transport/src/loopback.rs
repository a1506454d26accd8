use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{LinkError, Result};
use crate::traits::{RxTap, TxPort, TxStatus};

/// In-memory serial link: one end plays the external controller, the other is
/// handed to the orchestration layer as [`RxTap`] + [`TxPort`].
///
/// Each [`inject`](LoopbackLink::inject) call models one idle-gap-delimited
/// burst deposited into the receive ring by the hardware. Transmitted buffers
/// accumulate verbatim and are collected with
/// [`drain_tx`](LoopbackLink::drain_tx).
#[derive(Clone)]
pub struct LoopbackLink {
    shared: Arc<Mutex<LinkState>>,
    capacity: usize,
}

struct LinkState {
    rx: Vec<u8>,
    write_pos: usize,
    tx: Vec<u8>,
    busy_left: u32,
    reject_next: bool,
}

impl LoopbackLink {
    /// Create a link whose receive ring holds `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(LinkState {
                rx: vec![0; capacity],
                write_pos: 0,
                tx: Vec::new(),
                busy_left: 0,
                reject_next: false,
            })),
            capacity,
        }
    }

    fn state(&self) -> MutexGuard<'_, LinkState> {
        match self.shared.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Deposit one inbound burst into the receive ring, wrapping at capacity.
    pub fn inject(&self, bytes: &[u8]) {
        let mut state = self.state();
        let mut pos = state.write_pos;
        for &b in bytes {
            state.rx[pos] = b;
            pos = (pos + 1) % self.capacity;
        }
        state.write_pos = pos;
        tracing::trace!(len = bytes.len(), pos, "loopback burst injected");
    }

    /// Collect everything the device has transmitted so far.
    pub fn drain_tx(&self) -> Vec<u8> {
        std::mem::take(&mut self.state().tx)
    }

    /// Force the next `n` transmit hand-offs to report [`TxStatus::Busy`].
    pub fn set_busy(&self, n: u32) {
        self.state().busy_left = n;
    }

    /// Force the next transmit hand-off to be rejected outright.
    pub fn reject_next(&self) {
        self.state().reject_next = true;
    }
}

impl RxTap for LoopbackLink {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn write_pos(&self) -> usize {
        self.state().write_pos
    }

    fn copy_from(&self, pos: usize, dst: &mut [u8]) -> Result<()> {
        if pos + dst.len() > self.capacity {
            return Err(LinkError::OutOfBounds {
                pos,
                len: dst.len(),
                capacity: self.capacity,
            });
        }
        let state = self.state();
        dst.copy_from_slice(&state.rx[pos..pos + dst.len()]);
        Ok(())
    }
}

impl TxPort for LoopbackLink {
    fn transmit(&self, buf: &[u8]) -> TxStatus {
        let mut state = self.state();
        if state.busy_left > 0 {
            state.busy_left -= 1;
            return TxStatus::Busy;
        }
        if state.reject_next {
            state.reject_next = false;
            return TxStatus::Rejected;
        }
        state.tx.extend_from_slice(buf);
        TxStatus::Accepted
    }
}
