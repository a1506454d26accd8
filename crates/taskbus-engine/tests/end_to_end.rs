//! Full-stack scenarios: controller frames injected into a loopback link,
//! consumed by the spawned loops, responses decoded off the transmit side.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use taskbus_engine::{
    EngineConfig, Orchestrator, Phase, Services, TaskMode, TaskRecord, TaskSet,
};
use taskbus_frame::{
    crc16_modbus, Command, FramePoller, FrameSender, ResultCode, RX_RING_CAPACITY,
};
use taskbus_frame::protocol::FRAME_TAG;
use taskbus_transport::LoopbackLink;

fn fast_config() -> EngineConfig {
    EngineConfig {
        dispatch_idle: Duration::from_millis(1),
        status_tick: Duration::from_millis(1),
        send_gap: Duration::from_millis(1),
    }
}

/// Controller→device wire bytes for one command payload.
fn controller_burst(payload: &[u8]) -> Vec<u8> {
    let crc = crc16_modbus(payload);
    let mut bytes = vec![payload.len() as u8];
    bytes.extend_from_slice(payload);
    bytes.extend_from_slice(&crc.to_be_bytes());
    bytes
}

/// Collect transmit bytes until one complete device→bus frame is present,
/// then return its payload.
fn await_response(link: &LoopbackLink, deadline: Duration) -> Vec<u8> {
    let started = Instant::now();
    let mut wire = Vec::new();
    while started.elapsed() < deadline {
        wire.extend(link.drain_tx());
        if wire.len() >= 2 && wire[0] == FRAME_TAG {
            let len = wire[1] as usize;
            if wire.len() >= len + 4 {
                let payload = wire[2..2 + len].to_vec();
                let stored = u16::from_be_bytes([wire[2 + len], wire[3 + len]]);
                assert_eq!(stored, crc16_modbus(&payload), "response checksum");
                return payload;
            }
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("no response frame within {deadline:?}; collected {wire:02x?}");
}

fn await_phase(record: &Arc<TaskRecord>, phase: Phase, deadline: Duration) {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if record.phase() == phase {
            return;
        }
        thread::sleep(Duration::from_millis(1));
    }
    panic!("task never reached {phase:?}, stuck at {:?}", record.phase());
}

const DEADLINE: Duration = Duration::from_secs(2);

#[test]
fn start_of_disabled_id_is_refused_without_side_effects() {
    let link = LoopbackLink::new(RX_RING_CAPACITY);
    let (record, _handle) = TaskRecord::new(5, TaskMode::OneShot);
    let services = Services::new(TaskSet::new(vec![record])).unwrap();
    let registry = Arc::clone(&services.registry);

    let handle = Orchestrator::new(services, fast_config()).spawn(
        FramePoller::new(link.clone()),
        FrameSender::new(link.clone()),
    );

    // Let the poller take its baseline before the first burst lands.
    thread::sleep(Duration::from_millis(20));
    link.inject(&controller_burst(&[Command::Start as u8, 9]));

    let response = await_response(&link, DEADLINE);
    assert_eq!(
        response,
        vec![Command::Start as u8, 9, ResultCode::IdDisabledTask as u8]
    );
    assert_eq!(registry.active_count().unwrap(), 0);

    handle.stop();
}

#[test]
fn one_shot_task_runs_a_full_start_delete_cycle() {
    let link = LoopbackLink::new(RX_RING_CAPACITY);
    let (record, task_handle) = TaskRecord::new(5, TaskMode::OneShot);
    let services = Services::new(TaskSet::new(vec![Arc::clone(&record)])).unwrap();
    let registry = Arc::clone(&services.registry);

    // A minimal one-shot body: arm, pretend to work, wait to be acknowledged.
    let task_thread = thread::spawn(move || {
        task_handle.wait_for_start()?;
        task_handle.set_detail(7);
        task_handle.wait_for_ack()?;
        task_handle.set_phase(Phase::Stopped);
        Ok::<(), taskbus_engine::TaskError>(())
    });

    let handle = Orchestrator::new(services, fast_config()).spawn(
        FramePoller::new(link.clone()),
        FrameSender::new(link.clone()),
    );

    await_phase(&record, Phase::WaitingForStart, DEADLINE);
    link.inject(&controller_burst(&[Command::Start as u8, 5]));
    assert_eq!(
        await_response(&link, DEADLINE),
        vec![Command::Start as u8, 5, ResultCode::Added as u8]
    );

    // The body finishes instantly and parks at the ack rendezvous; the sync
    // loop propagates that into the registry.
    await_phase(&record, Phase::WaitingForAck, DEADLINE);
    let started = Instant::now();
    while registry.get_by_id(5).unwrap().phase != Phase::WaitingForAck {
        assert!(started.elapsed() < DEADLINE, "status never synced");
        thread::sleep(Duration::from_millis(1));
    }

    link.inject(&controller_burst(&[Command::GetStatus as u8]));
    assert_eq!(
        await_response(&link, DEADLINE),
        vec![
            Command::GetStatus as u8,
            5,
            (Phase::WaitingForAck.as_byte() << 5) | 7,
        ]
    );

    link.inject(&controller_burst(&[Command::Delete as u8, 5]));
    assert_eq!(
        await_response(&link, DEADLINE),
        vec![Command::Delete as u8, 5, ResultCode::Deleted as u8]
    );
    assert_eq!(registry.active_count().unwrap(), 0);

    task_thread.join().unwrap().unwrap();
    assert_eq!(record.phase(), Phase::Stopped);
    handle.stop();
}

#[test]
fn corrupted_controller_frame_comes_back_as_a_fault_report() {
    let link = LoopbackLink::new(RX_RING_CAPACITY);
    let (record, _handle) = TaskRecord::new(5, TaskMode::OneShot);
    let services = Services::new(TaskSet::new(vec![record])).unwrap();

    let handle = Orchestrator::new(services, fast_config()).spawn(
        FramePoller::new(link.clone()),
        FrameSender::new(link.clone()),
    );

    thread::sleep(Duration::from_millis(20));
    let mut bytes = controller_burst(&[Command::GetStatus as u8]);
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    link.inject(&bytes);

    let response = await_response(&link, DEADLINE);
    assert_eq!(response[0], Command::ReceiveError as u8);

    handle.stop();
}

#[test]
fn data_from_task_reaches_the_bus_unprompted() {
    let link = LoopbackLink::new(RX_RING_CAPACITY);
    let (record, task_handle) = TaskRecord::new(7, TaskMode::Continuous);
    let services = Services::new(TaskSet::new(vec![Arc::clone(&record)])).unwrap();
    let outbox = Arc::clone(&services.outbox);

    let handle = Orchestrator::new(services, fast_config()).spawn(
        FramePoller::new(link.clone()),
        FrameSender::new(link.clone()),
    );

    task_handle.send_to_bus(&outbox, &[0x42, 0x43]).unwrap();
    assert_eq!(
        await_response(&link, DEADLINE),
        vec![Command::DataFromTask as u8, 7, 0x42, 0x43]
    );

    // Continuous tasks are listed from boot without any start command.
    link.inject(&controller_burst(&[Command::GetStatus as u8]));
    let response = await_response(&link, DEADLINE);
    assert_eq!(response[0], Command::GetStatus as u8);
    assert_eq!(response[1], record.id());

    handle.stop();
}

#[test]
fn start_signal_actually_releases_the_waiting_task() {
    let link = LoopbackLink::new(RX_RING_CAPACITY);
    let (record, task_handle) = TaskRecord::new(5, TaskMode::OneShot);
    let services = Services::new(TaskSet::new(vec![Arc::clone(&record)])).unwrap();

    let task_thread = thread::spawn(move || {
        task_handle.wait_for_start().map(|()| task_handle.id())
    });

    let handle = Orchestrator::new(services, fast_config()).spawn(
        FramePoller::new(link.clone()),
        FrameSender::new(link.clone()),
    );

    await_phase(&record, Phase::WaitingForStart, DEADLINE);
    link.inject(&controller_burst(&[Command::Start as u8, 5]));
    assert_eq!(
        await_response(&link, DEADLINE),
        vec![Command::Start as u8, 5, ResultCode::Added as u8]
    );

    assert_eq!(task_thread.join().unwrap().unwrap(), 5);
    assert_eq!(record.phase(), Phase::Running);
    handle.stop();
}
