//! Task orchestration over the framed serial protocol.
//!
//! The engine owns three concerns:
//! - the [`registry::CommandRegistry`]: the controller-visible table of active
//!   tasks and their packed statuses,
//! - the [`task`] lifecycle: per-task records, signal queues and the
//!   wait-for-start / wait-for-ack rendezvous,
//! - the [`orchestrator::Orchestrator`]: the dispatcher, status-sync and
//!   sender loops tying the frame pipelines to the registry and the tasks.
//!
//! All shared structures are owned service objects created at startup and
//! passed by `Arc` — there are no ambient statics.

pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod task;
pub mod taskset;

pub use error::{RegistryError, TaskError};
pub use orchestrator::{EngineConfig, Orchestrator, OrchestratorHandle, Services};
pub use registry::{CommandEntry, CommandRegistry};
pub use task::{Phase, TaskHandle, TaskMode, TaskRecord, SIGNAL_QUEUE_CAPACITY};
pub use taskset::TaskSet;
