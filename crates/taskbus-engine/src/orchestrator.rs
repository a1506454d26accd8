//! The three control loops: dispatcher, status sync and sender.
//!
//! The dispatcher is the single consumer of the inbox and the only code that
//! commands the registry on the controller's behalf. The status-sync loop is
//! the registry's only status writer. The sender drains the outbox and, when
//! it is empty, flushes staged debug text.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use taskbus_frame::{
    Command, DebugBuffer, FramePoller, FrameSender, Inbox, Message, Outbox, ResultCode, Signal,
};
use taskbus_transport::{RxTap, TxPort, TxStatus};

use crate::error::{RegistryError, TaskError};
use crate::registry::CommandRegistry;
use crate::task::Phase;
use crate::taskset::TaskSet;

/// Tick intervals of the control loops.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Pause between dispatcher passes when the inbox stays empty.
    pub dispatch_idle: Duration,
    /// Interval between registry status refreshes.
    pub status_tick: Duration,
    /// Pause between sender passes.
    pub send_gap: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dispatch_idle: Duration::from_millis(100),
            status_tick: Duration::from_secs(1),
            send_gap: Duration::from_millis(10),
        }
    }
}

/// The shared service objects every loop works against.
///
/// Cloning is cheap; all fields are reference counted.
#[derive(Clone)]
pub struct Services {
    pub inbox: Arc<Inbox>,
    pub outbox: Arc<Outbox>,
    pub registry: Arc<CommandRegistry>,
    pub tasks: Arc<TaskSet>,
    pub debug: Arc<DebugBuffer>,
}

impl Services {
    /// Fresh queues and an empty registry sized to the task set. Continuous
    /// tasks are registered immediately so status responses list them.
    pub fn new(tasks: TaskSet) -> Result<Self, RegistryError> {
        let registry = CommandRegistry::new(tasks.len().max(1));
        tasks.seed_continuous(&registry)?;
        Ok(Self {
            inbox: Arc::new(Inbox::new()),
            outbox: Arc::new(Outbox::new()),
            registry: Arc::new(registry),
            tasks: Arc::new(tasks),
            debug: Arc::new(DebugBuffer::default()),
        })
    }
}

/// Drives the protocol: consumes controller frames, commands the registry and
/// the tasks, and queues the responses.
pub struct Orchestrator {
    services: Services,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(services: Services, config: EngineConfig) -> Self {
        Self { services, config }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Spawn the three loops. The returned handle stops and joins them.
    pub fn spawn<R, T>(self, poller: FramePoller<R>, sender: FrameSender<T>) -> OrchestratorHandle
    where
        R: RxTap + Send + 'static,
        T: TxPort + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let orchestrator = Arc::new(self);

        let dispatcher = {
            let orchestrator = Arc::clone(&orchestrator);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || orchestrator.run_dispatcher(poller, &shutdown))
        };
        let status_sync = {
            let orchestrator = Arc::clone(&orchestrator);
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || orchestrator.run_status_sync(&shutdown))
        };
        let sender_loop = {
            let shutdown = Arc::clone(&shutdown);
            thread::spawn(move || orchestrator.run_sender(sender, &shutdown))
        };

        OrchestratorHandle {
            shutdown,
            threads: vec![dispatcher, status_sync, sender_loop],
        }
    }

    /// One controller frame in, at most one response frame out.
    pub fn dispatch_frame(&self, msg: &Message) {
        let payload = msg.payload();
        let Some((&cmd_byte, args)) = payload.split_first() else {
            tracing::warn!("empty frame reached the dispatcher");
            return;
        };

        match Command::try_from(cmd_byte) {
            Ok(Command::GetStatus) => self.handle_get_status(),
            Ok(Command::Start) => self.handle_start(args),
            Ok(Command::Delete) => self.handle_delete(args),
            Ok(Command::SendData) => self.handle_send_data(args),
            Ok(Command::ReceiveError) => self.handle_receive_error(args),
            Ok(Command::EmergencyStop) => {
                tracing::warn!("emergency stop received; no handler is wired up");
            }
            Ok(cmd @ (Command::Pause | Command::Resume | Command::DataFromTask)) => {
                tracing::debug!(?cmd, "command has no inbound handling");
            }
            Err(byte) => {
                tracing::warn!(byte, "unknown command byte");
            }
        }
    }

    /// `[GET_STATUS, (id, status)…]` over every active entry, in registration
    /// order. The statuses are whatever the last sync pass recorded.
    fn handle_get_status(&self) {
        let mut response = Message::new();
        let mut build = || -> Result<(), TaskError> {
            response.append(Command::GetStatus as u8)?;
            match self.services.registry.snapshot() {
                Ok(entries) => {
                    for entry in entries {
                        response.append(entry.id)?;
                        response.append(entry.status_byte())?;
                    }
                }
                Err(err) => {
                    tracing::warn!(%err, "status snapshot failed");
                    response.append(err.result_code() as u8)?;
                }
            }
            Ok(())
        };
        if let Err(err) = build() {
            tracing::warn!(%err, "status response does not fit a frame");
            return;
        }
        self.queue_response(response);
    }

    /// Register the task, then release it if it is waiting for start.
    ///
    /// A task that exists but is mid-cycle keeps its fresh registry entry and
    /// the controller is told `NOT_FINISHED`; a later status poll shows the
    /// real phase.
    fn handle_start(&self, args: &[u8]) {
        let Some(&id) = args.first() else {
            self.respond(Command::Start, &[ResultCode::Error as u8]);
            return;
        };

        let Some(task) = self.services.tasks.get(id) else {
            tracing::debug!(id, "start refused, task not compiled in");
            self.respond(Command::Start, &[id, ResultCode::IdDisabledTask as u8]);
            return;
        };

        if let Err(err) = self.services.registry.append(id) {
            self.respond(Command::Start, &[id, err.result_code() as u8]);
            return;
        }

        let result = if task.phase() == Phase::WaitingForStart {
            match task.send_signal(Signal::Start) {
                Ok(()) => ResultCode::Added,
                Err(err) => {
                    tracing::warn!(id, %err, "start signal not delivered");
                    ResultCode::Error
                }
            }
        } else {
            ResultCode::NotFinished
        };
        self.respond(Command::Start, &[id, result as u8]);
    }

    /// Remove the entry and acknowledge the task so it can re-arm.
    fn handle_delete(&self, args: &[u8]) {
        let Some(&id) = args.first() else {
            self.respond(Command::Delete, &[ResultCode::Error as u8]);
            return;
        };

        let result = match self.services.registry.remove_by_id(id) {
            Ok(()) => {
                if let Some(task) = self.services.tasks.get(id) {
                    // The task is waiting for exactly this; a full queue here
                    // means it already has the ack pending.
                    if let Err(err) = task.send_signal(Signal::Ack) {
                        tracing::debug!(id, %err, "ack signal not delivered");
                    }
                }
                ResultCode::Deleted
            }
            Err(err) => err.result_code(),
        };
        self.respond(Command::Delete, &[id, result as u8]);
    }

    /// Forward the payload tail to the task's signal queue, byte by byte.
    fn handle_send_data(&self, args: &[u8]) {
        let Some((&id, data)) = args.split_first() else {
            self.respond(Command::SendData, &[ResultCode::Error as u8]);
            return;
        };

        let Some(task) = self.services.tasks.get(id) else {
            self.respond(Command::SendData, &[id, ResultCode::IdOutOfRange as u8]);
            return;
        };
        if matches!(
            task.phase(),
            Phase::WaitingForStart | Phase::WaitingForAck
        ) {
            // Data bytes would be misread as lifecycle signals.
            self.respond(Command::SendData, &[id, ResultCode::CantReceiveData as u8]);
            return;
        }

        let result = match task.send_data(data) {
            Ok(()) => ResultCode::Ok,
            Err(TaskError::QueueFull { .. }) => ResultCode::Overflow,
            Err(err) => {
                tracing::warn!(id, %err, "data forwarding failed");
                ResultCode::Error
            }
        };
        self.respond(Command::SendData, &[id, result as u8]);
    }

    /// Echo a receive-fault diagnostic back to the controller.
    fn handle_receive_error(&self, args: &[u8]) {
        let fault = args.first().copied().unwrap_or(0);
        tracing::debug!(fault, "reporting inbound receive fault");
        self.respond(Command::ReceiveError, &[fault]);
    }

    fn respond(&self, cmd: Command, tail: &[u8]) {
        let mut response = Message::new();
        let built = response
            .append(cmd as u8)
            .and_then(|()| response.append_slice(tail));
        if let Err(err) = built {
            tracing::warn!(%err, "response does not fit a frame");
            return;
        }
        self.queue_response(response);
    }

    fn queue_response(&self, mut response: Message) {
        response.set_checksum();
        if let Err(err) = self.services.outbox.push(&response) {
            tracing::warn!(%err, "outbox saturated, response dropped");
        }
    }

    /// Dispatcher loop: poll the receive ring, handle one staged frame per
    /// iteration, idle-sleep only while the inbox stays empty.
    fn run_dispatcher<R: RxTap>(&self, mut poller: FramePoller<R>, shutdown: &AtomicBool) {
        tracing::debug!("dispatcher loop up");
        while !shutdown.load(Ordering::Relaxed) {
            poller.poll(&self.services.inbox);
            match self.services.inbox.pop() {
                Some(msg) => self.dispatch_frame(&msg),
                None => thread::sleep(self.config.dispatch_idle),
            }
        }
        tracing::debug!("dispatcher loop down");
    }

    /// Status-sync loop: copy each task's live phase and detail into its
    /// registry entry. Tasks are read, never written.
    fn run_status_sync(&self, shutdown: &AtomicBool) {
        tracing::debug!("status sync loop up");
        while !shutdown.load(Ordering::Relaxed) {
            let tasks = &self.services.tasks;
            if let Err(err) = self
                .services
                .registry
                .sync_statuses(|id| tasks.get(id).map(|t| t.status()))
            {
                tracing::warn!(%err, "status sync pass skipped");
            }
            thread::sleep(self.config.status_tick);
        }
        tracing::debug!("status sync loop down");
    }

    /// Sender loop: each pass drains the whole outbox; debug text is flushed
    /// only once no protocol frame is waiting.
    fn run_sender<T: TxPort>(&self, mut sender: FrameSender<T>, shutdown: &AtomicBool) {
        tracing::debug!("sender loop up");
        while !shutdown.load(Ordering::Relaxed) {
            self.drain_outbox_once(&mut sender);
            thread::sleep(self.config.send_gap);
        }
        tracing::debug!("sender loop down");
    }

    fn drain_outbox_once<T: TxPort>(&self, sender: &mut FrameSender<T>) {
        loop {
            match self.services.outbox.pop() {
                Ok(Some(msg)) => {
                    if let Err(err) = sender.send(&msg) {
                        tracing::warn!(%err, "transmit failed, frame re-queued");
                        // Retried next pass; the outbox had room a moment ago.
                        if self.services.outbox.push(&msg).is_err() {
                            tracing::warn!("outbox refilled meanwhile, frame dropped");
                        }
                        return;
                    }
                }
                Ok(None) => {
                    if let Some(framed) = self.services.debug.drain_framed() {
                        if sender.transmit_raw(&framed) != TxStatus::Accepted {
                            tracing::debug!(len = framed.len(), "debug text flush refused");
                        }
                    }
                    return;
                }
                Err(err) => {
                    tracing::warn!(%err, "outbox unavailable this pass");
                    return;
                }
            }
        }
    }
}

/// Stops and joins the spawned loops.
pub struct OrchestratorHandle {
    shutdown: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl OrchestratorHandle {
    /// Signal all loops to stop and wait for them to exit.
    pub fn stop(self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for thread in self.threads {
            if thread.join().is_err() {
                tracing::error!("orchestrator loop panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{TaskMode, TaskRecord};
    use taskbus_frame::crc16_modbus;

    fn frame(payload: &[u8]) -> Message {
        let mut msg = Message::from_payload(payload).unwrap();
        msg.set_checksum();
        msg
    }

    fn engine_with_one_shot(id: u8) -> (Orchestrator, crate::task::TaskHandle) {
        let (record, handle) = TaskRecord::new(id, TaskMode::OneShot);
        let services = Services::new(TaskSet::new(vec![record])).unwrap();
        (
            Orchestrator::new(services, EngineConfig::default()),
            handle,
        )
    }

    fn pop_response(orchestrator: &Orchestrator) -> Vec<u8> {
        let msg = orchestrator.services.outbox.pop().unwrap().unwrap();
        msg.validate().unwrap();
        msg.payload().to_vec()
    }

    #[test]
    fn start_of_disabled_id_mutates_nothing() {
        let (orchestrator, _handle) = engine_with_one_shot(5);

        orchestrator.dispatch_frame(&frame(&[Command::Start as u8, 9]));

        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::Start as u8, 9, ResultCode::IdDisabledTask as u8]
        );
        assert_eq!(orchestrator.services.registry.active_count().unwrap(), 0);
    }

    #[test]
    fn start_of_waiting_task_registers_and_signals() {
        let (orchestrator, handle) = engine_with_one_shot(5);
        handle.set_phase(Phase::WaitingForStart);

        orchestrator.dispatch_frame(&frame(&[Command::Start as u8, 5]));

        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::Start as u8, 5, ResultCode::Added as u8]
        );
        let entry = orchestrator.services.registry.get_by_id(5).unwrap();
        assert_eq!(entry.status_byte(), 0);
        assert_eq!(handle.try_recv_byte(), Some(Signal::Start as u8));
    }

    #[test]
    fn start_of_busy_task_keeps_entry_and_reports_not_finished() {
        let (orchestrator, handle) = engine_with_one_shot(5);
        handle.set_phase(Phase::Running);

        orchestrator.dispatch_frame(&frame(&[Command::Start as u8, 5]));

        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::Start as u8, 5, ResultCode::NotFinished as u8]
        );
        assert!(orchestrator.services.registry.get_by_id(5).is_ok());
        assert_eq!(handle.try_recv_byte(), None);
    }

    #[test]
    fn delete_requires_acknowledgeable_phase_then_acks() {
        let (orchestrator, handle) = engine_with_one_shot(5);
        handle.set_phase(Phase::WaitingForStart);
        orchestrator.dispatch_frame(&frame(&[Command::Start as u8, 5]));
        let _ = pop_response(&orchestrator);

        // Still synced as Setup; deletion is refused.
        orchestrator.dispatch_frame(&frame(&[Command::Delete as u8, 5]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::Delete as u8, 5, ResultCode::NotFinished as u8]
        );

        handle.set_phase(Phase::WaitingForAck);
        orchestrator
            .services
            .registry
            .sync_statuses(|id| orchestrator.services.tasks.get(id).map(|t| t.status()))
            .unwrap();

        orchestrator.dispatch_frame(&frame(&[Command::Delete as u8, 5]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::Delete as u8, 5, ResultCode::Deleted as u8]
        );
        assert_eq!(orchestrator.services.registry.active_count().unwrap(), 0);
        // Start signal from registration, then the ack.
        assert_eq!(handle.try_recv_byte(), Some(Signal::Start as u8));
        assert_eq!(handle.try_recv_byte(), Some(Signal::Ack as u8));
    }

    #[test]
    fn delete_of_absent_id_reports_not_found() {
        let (orchestrator, _handle) = engine_with_one_shot(5);

        orchestrator.dispatch_frame(&frame(&[Command::Delete as u8, 5]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::Delete as u8, 5, ResultCode::NotFound as u8]
        );
    }

    #[test]
    fn get_status_lists_entries_in_registration_order() {
        let (blinker, _bh) = TaskRecord::new(2, TaskMode::Continuous);
        let (worker, wh) = TaskRecord::new(5, TaskMode::OneShot);
        let services = Services::new(TaskSet::new(vec![blinker, worker])).unwrap();
        let orchestrator = Orchestrator::new(services, EngineConfig::default());

        wh.set_phase(Phase::WaitingForStart);
        orchestrator.dispatch_frame(&frame(&[Command::Start as u8, 5]));
        let _ = pop_response(&orchestrator);

        wh.set_phase_and_detail(Phase::Running, 3);
        orchestrator
            .services
            .registry
            .sync_statuses(|id| orchestrator.services.tasks.get(id).map(|t| t.status()))
            .unwrap();

        orchestrator.dispatch_frame(&frame(&[Command::GetStatus as u8]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![
                Command::GetStatus as u8,
                2,
                0, // continuous task still in Setup
                5,
                (Phase::Running.as_byte() << 5) | 3,
            ]
        );
    }

    #[test]
    fn send_data_is_refused_at_the_rendezvous_phases() {
        let (orchestrator, handle) = engine_with_one_shot(5);
        handle.set_phase(Phase::WaitingForStart);

        orchestrator.dispatch_frame(&frame(&[Command::SendData as u8, 5, 0x11]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::SendData as u8, 5, ResultCode::CantReceiveData as u8]
        );
        assert_eq!(handle.try_recv_byte(), None);
    }

    #[test]
    fn send_data_forwards_bytes_to_a_running_task() {
        let (orchestrator, handle) = engine_with_one_shot(5);
        handle.set_phase(Phase::Running);

        orchestrator.dispatch_frame(&frame(&[Command::SendData as u8, 5, 0x11, 0x22]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::SendData as u8, 5, ResultCode::Ok as u8]
        );
        assert_eq!(handle.try_recv_byte(), Some(0x11));
        assert_eq!(handle.try_recv_byte(), Some(0x22));
    }

    #[test]
    fn receive_fault_is_echoed_to_the_controller() {
        let (orchestrator, _handle) = engine_with_one_shot(5);

        orchestrator.dispatch_frame(&frame(&[Command::ReceiveError as u8, 3]));
        assert_eq!(
            pop_response(&orchestrator),
            vec![Command::ReceiveError as u8, 3]
        );
    }

    #[test]
    fn responses_carry_a_valid_checksum() {
        let (orchestrator, _handle) = engine_with_one_shot(5);
        orchestrator.dispatch_frame(&frame(&[Command::GetStatus as u8]));

        let msg = orchestrator.services.outbox.pop().unwrap().unwrap();
        assert_eq!(msg.checksum(), crc16_modbus(msg.payload()));
    }
}
