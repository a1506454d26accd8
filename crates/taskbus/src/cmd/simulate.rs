use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskbus_engine::{
    CommandRegistry, EngineConfig, Orchestrator, Phase, Services, TaskMode, TaskRecord, TaskSet,
};
use taskbus_frame::{crc16_modbus, Command, FramePoller, FrameSender, Signal, RX_RING_CAPACITY};
use taskbus_transport::LoopbackLink;

use crate::cmd::SimulateArgs;
use crate::exit::{registry_error, CliError, CliResult, INTERNAL, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_event, OutputFormat, WireDecoder};
use crate::tasks::{blinker, worker};

const PHASE_DEADLINE: Duration = Duration::from_secs(5);

pub fn run(args: SimulateArgs, format: OutputFormat) -> CliResult<i32> {
    let tick = parse_duration(&args.tick)?;
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let link = LoopbackLink::new(RX_RING_CAPACITY);
    let (blinker_record, blinker_handle) =
        TaskRecord::new(blinker::BLINKER_ID, TaskMode::Continuous);
    let (worker_record, worker_handle) = TaskRecord::new(worker::WORKER_ID, TaskMode::OneShot);

    let services = Services::new(TaskSet::new(vec![
        blinker_record,
        Arc::clone(&worker_record),
    ]))
    .map_err(|err| registry_error("device boot failed", err))?;
    let registry = Arc::clone(&services.registry);
    let debug = Arc::clone(&services.debug);
    let outbox = Arc::clone(&services.outbox);

    let blinker_thread = blinker::spawn(
        blinker_handle,
        Arc::clone(&debug),
        Arc::clone(&running),
        Duration::from_millis(u64::from(args.blink.max(1)) * 10),
    );
    let worker_thread = worker::spawn(
        worker_handle,
        outbox,
        debug,
        Arc::clone(&running),
        tick,
    );

    let config = EngineConfig {
        dispatch_idle: tick,
        status_tick: tick,
        send_gap: tick,
    };
    let device = Orchestrator::new(services, config).spawn(
        FramePoller::new(link.clone()),
        FrameSender::new(link.clone()),
    );

    let mut session = Session {
        link: &link,
        decoder: WireDecoder::new(),
        format,
        tick,
        running: &running,
    };
    let outcome = drive(&args, &mut session, &worker_record, &registry);

    // Tear-down: stop the flag, nudge the worker out of its blocking wait,
    // then join everything.
    running.store(false, Ordering::SeqCst);
    let _ = worker_record.send_signal(Signal::Stop);
    if worker_thread.join().is_err() || blinker_thread.join().is_err() {
        tracing::error!("a task thread panicked during shutdown");
    }
    device.stop();

    outcome?;
    Ok(SUCCESS)
}

struct Session<'a> {
    link: &'a LoopbackLink,
    decoder: WireDecoder,
    format: OutputFormat,
    tick: Duration,
    running: &'a AtomicBool,
}

impl Session<'_> {
    /// Queue one controller command on the device's receive ring.
    fn inject(&self, payload: &[u8]) {
        let mut wire = vec![payload.len() as u8];
        wire.extend_from_slice(payload);
        wire.extend_from_slice(&crc16_modbus(payload).to_be_bytes());
        self.link.inject(&wire);
    }

    /// Print everything the device transmits for roughly `span`.
    fn pump(&mut self, span: Duration) {
        let started = Instant::now();
        while started.elapsed() < span && self.running.load(Ordering::SeqCst) {
            for event in self.decoder.feed(&self.link.drain_tx()) {
                print_event(&event, self.format);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn interrupted(&self) -> bool {
        !self.running.load(Ordering::SeqCst)
    }
}

fn drive(
    args: &SimulateArgs,
    session: &mut Session<'_>,
    worker_record: &Arc<TaskRecord>,
    registry: &CommandRegistry,
) -> CliResult<()> {
    // Let the poller take its position baseline before the first command.
    session.pump(session.tick * 4);

    // Retune the continuous blinker over the bus.
    session.inject(&[
        Command::SendData as u8,
        blinker::BLINKER_ID,
        args.blink,
    ]);
    session.pump(session.tick * 4);

    for cycle in 1..=args.cycles {
        if session.interrupted() {
            break;
        }
        tracing::info!(cycle, "starting worker cycle");

        wait_until(session, || {
            worker_record.phase() == Phase::WaitingForStart
        })?;
        session.inject(&[Command::Start as u8, worker::WORKER_ID]);
        session.pump(session.tick * 4);

        // Feed the worker while it runs; the bytes show up in its report.
        session.inject(&[Command::SendData as u8, worker::WORKER_ID, cycle as u8]);

        wait_until(session, || {
            registry
                .get_by_id(worker::WORKER_ID)
                .map(|entry| entry.phase == Phase::WaitingForAck)
                .unwrap_or(false)
        })?;
        session.inject(&[Command::GetStatus as u8]);
        session.pump(session.tick * 4);

        session.inject(&[Command::Delete as u8, worker::WORKER_ID]);
        session.pump(session.tick * 4);
    }

    // Drain whatever debug text is still in flight.
    session.pump(session.tick * 8);
    Ok(())
}

/// Poll `done` until it holds, pumping bus traffic while waiting.
fn wait_until(session: &mut Session<'_>, done: impl Fn() -> bool) -> CliResult<()> {
    let started = Instant::now();
    while !done() {
        if session.interrupted() {
            return Ok(());
        }
        if started.elapsed() > PHASE_DEADLINE {
            return Err(CliError::new(TIMEOUT, "simulated device stopped responding"));
        }
        session.pump(Duration::from_millis(1));
    }
    Ok(())
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "ms")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        _ => Err(CliError::new(
            USAGE,
            format!("unsupported duration unit: {unit}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_millis_and_seconds() {
        assert_eq!(parse_duration("5ms").unwrap(), Duration::from_millis(5));
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("7").unwrap(), Duration::from_millis(7));
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("0ms").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("").is_err());
    }
}
