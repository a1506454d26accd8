//! Task lifecycle: per-task records, signal queues and the rendezvous
//! protocol between the orchestrator and each task thread.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};

use taskbus_frame::{Command, Message, Outbox, Signal};

use crate::error::TaskError;

/// Capacity of each task's private inbound signal queue.
pub const SIGNAL_QUEUE_CAPACITY: usize = 4;

/// Coarse lifecycle state of a task. The numeric values are shared vocabulary
/// with the registry's packed status byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    /// Before the task's first wait; think of it as init.
    Setup = 0,
    /// Doing its job.
    Running = 1,
    /// Blocked until the start signal arrives.
    WaitingForStart = 2,
    /// Finished a cycle; blocked until the controller acknowledges.
    WaitingForAck = 3,
    /// Blocked on a rendezvous with a sibling task.
    WaitingForInnerSignal = 4,
    /// Stopped by the orchestrator.
    Stopped = 5,
    /// Terminal until externally cleared by a new start cycle.
    Error = 6,
}

impl Phase {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

/// Scheduling mode of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskMode {
    /// Cycles Start → Running → Ack, blocking between cycles.
    OneShot,
    /// Loops Running indefinitely once armed; never waits for signals.
    Continuous,
}

#[derive(Debug)]
struct SharedState {
    phase: Phase,
    detail: u8,
}

/// The orchestrator-facing half of a task: shared status fields plus the
/// sending side of the signal queue.
///
/// Created once at startup and never deallocated; phases re-arm it.
pub struct TaskRecord {
    id: u8,
    mode: TaskMode,
    state: Mutex<SharedState>,
    signal_tx: SyncSender<u8>,
}

impl TaskRecord {
    /// Create a record and the matching [`TaskHandle`] for the task thread.
    pub fn new(id: u8, mode: TaskMode) -> (Arc<Self>, TaskHandle) {
        let (signal_tx, signal_rx) = sync_channel(SIGNAL_QUEUE_CAPACITY);
        let record = Arc::new(Self {
            id,
            mode,
            state: Mutex::new(SharedState {
                phase: Phase::Setup,
                detail: 0,
            }),
            signal_tx,
        });
        let handle = TaskHandle {
            record: Arc::clone(&record),
            signals: signal_rx,
        };
        (record, handle)
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn mode(&self) -> TaskMode {
        self.mode
    }

    fn state(&self) -> MutexGuard<'_, SharedState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Task-private detail code, 0..=31, opaque to the orchestrator.
    pub fn detail(&self) -> u8 {
        self.state().detail
    }

    /// Phase and detail read under one lock acquisition.
    pub fn status(&self) -> (Phase, u8) {
        let state = self.state();
        (state.phase, state.detail)
    }

    pub fn set_phase(&self, phase: Phase) {
        self.state().phase = phase;
    }

    pub fn set_detail(&self, detail: u8) {
        self.state().detail = detail & 0x1F;
    }

    pub fn set_phase_and_detail(&self, phase: Phase, detail: u8) {
        let mut state = self.state();
        state.phase = phase;
        state.detail = detail & 0x1F;
    }

    /// Deliver one lifecycle signal without blocking.
    ///
    /// A full queue is surfaced instead of waiting; the dispatcher must never
    /// deadlock on a stuck task.
    pub fn send_signal(&self, signal: Signal) -> Result<(), TaskError> {
        self.send_byte(signal as u8)
    }

    /// Forward raw data bytes to the task's queue, one byte per slot.
    ///
    /// Delivery stops at the first full-queue failure; bytes enqueued before
    /// it stay enqueued.
    pub fn send_data(&self, data: &[u8]) -> Result<(), TaskError> {
        for &byte in data {
            self.send_byte(byte)?;
        }
        Ok(())
    }

    fn send_byte(&self, byte: u8) -> Result<(), TaskError> {
        match self.signal_tx.try_send(byte) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TaskError::QueueFull { id: self.id }),
            Err(TrySendError::Disconnected(_)) => Err(TaskError::ChannelClosed { id: self.id }),
        }
    }
}

impl std::fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (phase, detail) = self.status();
        f.debug_struct("TaskRecord")
            .field("id", &self.id)
            .field("mode", &self.mode)
            .field("phase", &phase)
            .field("detail", &detail)
            .finish()
    }
}

/// The task-thread-facing half: owns the receiving side of the signal queue.
///
/// A task body drives its cycle with [`wait_for_start`](TaskHandle::wait_for_start)
/// and [`wait_for_ack`](TaskHandle::wait_for_ack) at its boundaries.
pub struct TaskHandle {
    record: Arc<TaskRecord>,
    signals: Receiver<u8>,
}

impl TaskHandle {
    pub fn record(&self) -> &Arc<TaskRecord> {
        &self.record
    }

    pub fn id(&self) -> u8 {
        self.record.id
    }

    /// Enter waiting-for-start and block until a signal byte arrives.
    ///
    /// Only the start signal transitions to Running. Any other byte returns
    /// an error *without* changing the phase back — the caller retries.
    pub fn wait_for_start(&self) -> Result<(), TaskError> {
        self.record.set_phase(Phase::WaitingForStart);
        let byte = self
            .signals
            .recv()
            .map_err(|_| TaskError::ChannelClosed { id: self.record.id })?;
        if byte == Signal::Start as u8 {
            self.record.set_phase(Phase::Running);
            Ok(())
        } else {
            Err(TaskError::UnexpectedSignal { byte })
        }
    }

    /// Enter waiting-for-ack and block, discarding bytes, until the ack
    /// signal is observed. The next loop pass calls
    /// [`wait_for_start`](TaskHandle::wait_for_start) again.
    pub fn wait_for_ack(&self) -> Result<(), TaskError> {
        self.record.set_phase(Phase::WaitingForAck);
        loop {
            let byte = self
                .signals
                .recv()
                .map_err(|_| TaskError::ChannelClosed { id: self.record.id })?;
            if byte == Signal::Ack as u8 {
                return Ok(());
            }
        }
    }

    /// Blocking receive of one data byte.
    pub fn recv_byte(&self) -> Result<u8, TaskError> {
        self.signals
            .recv()
            .map_err(|_| TaskError::ChannelClosed { id: self.record.id })
    }

    /// Non-blocking receive of one data byte.
    pub fn try_recv_byte(&self) -> Option<u8> {
        self.signals.try_recv().ok()
    }

    pub fn set_phase(&self, phase: Phase) {
        self.record.set_phase(phase);
    }

    pub fn set_detail(&self, detail: u8) {
        self.record.set_detail(detail);
    }

    pub fn set_phase_and_detail(&self, phase: Phase, detail: u8) {
        self.record.set_phase_and_detail(phase, detail);
    }

    /// Push a payload to the bus directly, prefixed
    /// `[DATA_FROM_TASK, task_id]` and checksummed.
    pub fn send_to_bus(&self, outbox: &Outbox, data: &[u8]) -> Result<(), TaskError> {
        let mut msg = Message::new();
        msg.append(Command::DataFromTask as u8)?;
        msg.append(self.record.id)?;
        msg.append_slice(data)?;
        msg.set_checksum();
        outbox.push(&msg)?;
        Ok(())
    }
}
