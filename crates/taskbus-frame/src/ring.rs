//! Wrap-around byte store used to stage debug text.

/// Fixed-capacity ring buffer over logical read/write cursors.
///
/// `read == write` is ambiguous between empty and full; the `full` flag is the
/// single source of truth and must never be replaced by cursor comparison.
#[derive(Debug)]
pub struct RingBuffer {
    buf: Vec<u8>,
    read: usize,
    write: usize,
    full: bool,
}

/// Outcome of a rejected ring operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingError {
    /// The requested write exceeds the currently available space.
    NoSpace,
    /// The buffer is already full.
    Full,
    /// Nothing to read.
    Empty,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0; capacity],
            read: 0,
            write: 0,
            full: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Unwritten capacity: forward distance from the write cursor to the read
    /// cursor, wraparound-aware.
    fn available(&self) -> usize {
        if self.full {
            0
        } else if self.write >= self.read {
            // Includes write == read, which with !full means empty.
            self.buf.len() - (self.write - self.read)
        } else {
            self.read - self.write
        }
    }

    /// Readable bytes: forward distance from the read cursor to the write
    /// cursor, wraparound-aware.
    fn pending(&self) -> usize {
        self.buf.len() - self.available()
    }

    /// Write `bytes`, rejecting the whole request if it does not fit.
    /// Exactly filling the remaining space succeeds and marks the buffer full.
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), RingError> {
        if self.full {
            return Err(RingError::Full);
        }
        let available = self.available();
        if bytes.len() > available {
            return Err(RingError::NoSpace);
        }
        if bytes.len() == available {
            self.full = true;
        }
        for &b in bytes {
            self.buf[self.write] = b;
            self.write = (self.write + 1) % self.buf.len();
        }
        Ok(())
    }

    /// Drain everything into `dst`, returning how many bytes were read.
    ///
    /// Consumed bytes are zeroed, the full flag cleared and the read cursor
    /// advanced to the write cursor. `dst` must hold at least
    /// [`capacity`](RingBuffer::capacity) bytes.
    pub fn read_all(&mut self, dst: &mut [u8]) -> Result<usize, RingError> {
        let pending = self.pending();
        if pending == 0 {
            return Err(RingError::Empty);
        }

        // A wrapped region splits into two linear copies.
        let first = pending.min(self.buf.len() - self.read);
        dst[..first].copy_from_slice(&self.buf[self.read..self.read + first]);
        self.buf[self.read..self.read + first].fill(0);

        let second = pending - first;
        if second > 0 {
            dst[first..pending].copy_from_slice(&self.buf[..second]);
            self.buf[..second].fill(0);
        }

        self.read = self.write;
        self.full = false;
        Ok(pending)
    }
}
