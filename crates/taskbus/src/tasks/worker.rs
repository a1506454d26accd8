use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use taskbus_engine::{Phase, TaskError, TaskHandle};
use taskbus_frame::{DebugBuffer, Outbox};

/// Task id of the one-shot worker.
pub const WORKER_ID: u8 = 5;

/// Work steps per cycle; the detail field counts them up.
pub const WORK_STEPS: u8 = 4;

/// A one-shot task: armed by a start command, walks its detail counter
/// through [`WORK_STEPS`] steps while accumulating any data bytes it was
/// sent, reports the sum over the bus and parks until acknowledged.
pub fn spawn(
    handle: TaskHandle,
    outbox: Arc<Outbox>,
    debug: Arc<DebugBuffer>,
    running: Arc<AtomicBool>,
    pace: Duration,
) -> JoinHandle<()> {
    thread::spawn(move || {
        while running.load(Ordering::SeqCst) {
            match handle.wait_for_start() {
                Ok(()) => {}
                Err(TaskError::ChannelClosed { .. }) => break,
                // A stray byte or the shutdown nudge; re-check and re-arm.
                Err(_) => continue,
            }

            let mut sum: u8 = 0;
            for step in 1..=WORK_STEPS {
                while let Some(byte) = handle.try_recv_byte() {
                    sum = sum.wrapping_add(byte);
                }
                handle.set_detail(step);
                thread::sleep(pace);
            }

            let _ = handle.send_to_bus(&outbox, &[WORK_STEPS, sum]);
            let _ = debug.push_text("worker cycle complete\n");

            if handle.wait_for_ack().is_err() {
                break;
            }
        }
        handle.set_phase(Phase::Stopped);
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;
    use taskbus_engine::{TaskMode, TaskRecord};
    use taskbus_frame::{Command, Signal};

    fn wait_for(record: &Arc<TaskRecord>, phase: Phase) {
        let started = Instant::now();
        while record.phase() != phase {
            assert!(
                started.elapsed() < Duration::from_secs(2),
                "stuck at {:?}",
                record.phase()
            );
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn worker_runs_one_cycle_and_reports() {
        let (record, handle) = TaskRecord::new(WORKER_ID, TaskMode::OneShot);
        let outbox = Arc::new(Outbox::new());
        let debug = Arc::new(DebugBuffer::new(256));
        let running = Arc::new(AtomicBool::new(true));

        let thread = spawn(
            handle,
            Arc::clone(&outbox),
            Arc::clone(&debug),
            Arc::clone(&running),
            Duration::from_millis(1),
        );

        wait_for(&record, Phase::WaitingForStart);
        record.send_signal(Signal::Start).unwrap();
        record.send_data(&[3, 4]).unwrap();

        wait_for(&record, Phase::WaitingForAck);
        let report = outbox.pop().unwrap().expect("worker reported");
        assert_eq!(
            report.payload(),
            &[Command::DataFromTask as u8, WORKER_ID, WORK_STEPS, 7]
        );
        assert_eq!(record.detail(), WORK_STEPS);

        running.store(false, Ordering::SeqCst);
        record.send_signal(Signal::Ack).unwrap();
        // The loop re-checks the flag after the ack and exits.
        let _ = record.send_signal(Signal::Stop);
        thread.join().unwrap();
        assert_eq!(record.phase(), Phase::Stopped);
    }
}
