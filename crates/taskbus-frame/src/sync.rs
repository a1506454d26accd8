//! Bounded mutex acquisition.
//!
//! Registry and outbox operations never block indefinitely on contention;
//! they report a timeout to the caller instead.

use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::{Duration, Instant};

use crate::error::{FrameError, Result};

/// Default bounded wait for shared-structure mutexes.
pub const LOCK_TIMEOUT: Duration = Duration::from_millis(100);

const RETRY_SLEEP: Duration = Duration::from_micros(200);

/// Acquire `mutex` within `timeout`, or fail with [`FrameError::LockTimeout`].
///
/// A poisoned mutex is recovered: the protected structures stay valid across
/// a panicking holder (plain byte copies only).
pub fn lock_within<T>(mutex: &Mutex<T>, timeout: Duration) -> Result<MutexGuard<'_, T>> {
    let deadline = Instant::now() + timeout;
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                if Instant::now() >= deadline {
                    return Err(FrameError::LockTimeout);
                }
                std::thread::sleep(RETRY_SLEEP);
            }
        }
    }
}
