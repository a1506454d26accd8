use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use taskbus_engine::{Phase, TaskHandle};
use taskbus_frame::DebugBuffer;

/// Task id of the continuous LED blinker.
pub const BLINKER_ID: u8 = 2;

/// A continuous task: toggles an imaginary LED, reports the level through its
/// detail bit and narrates over the debug channel. Bytes sent to it over the
/// bus retune the blink interval in 10 ms units.
pub fn spawn(
    handle: TaskHandle,
    debug: Arc<DebugBuffer>,
    running: Arc<AtomicBool>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        handle.set_phase(Phase::Running);
        let mut interval = interval;
        let mut lit = false;

        while running.load(Ordering::SeqCst) {
            while let Some(byte) = handle.try_recv_byte() {
                if byte != 0 {
                    interval = Duration::from_millis(u64::from(byte) * 10);
                    let _ = debug.push_text(&format!("blinker retuned to {interval:?}\n"));
                }
            }

            lit = !lit;
            handle.set_detail(lit as u8);
            let _ = debug.push_text(if lit { "led on\n" } else { "led off\n" });
            thread::sleep(interval);
        }
        handle.set_phase(Phase::Stopped);
    })
}
