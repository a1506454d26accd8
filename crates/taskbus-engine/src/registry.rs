//! The controller-visible table of active tasks.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use taskbus_frame::protocol::{status_byte, TASK_ID_LAST, TASK_ID_NONE, TASK_ID_TEST};
use taskbus_frame::{lock_within, LOCK_TIMEOUT};

use crate::error::RegistryError;
use crate::task::Phase;

/// One active command: a task id and the last synced status of its task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub id: u8,
    pub phase: Phase,
    pub detail: u8,
}

impl CommandEntry {
    fn cleared() -> Self {
        Self {
            id: TASK_ID_NONE,
            phase: Phase::Setup,
            detail: 0,
        }
    }

    /// The packed `(phase << 5) | detail` byte a GET_STATUS response carries.
    pub fn status_byte(&self) -> u8 {
        status_byte(self.phase.as_byte(), self.detail)
    }
}

struct Entries {
    slots: Vec<CommandEntry>,
    count: usize,
}

/// Bounded registry mapping task id → packed status.
///
/// The active entries form a dense prefix of length `count`; no duplicate
/// non-sentinel id appears among them. Every operation acquires the registry
/// mutex with a bounded wait and reports [`RegistryError::TimedOut`] on
/// acquisition failure.
pub struct CommandRegistry {
    entries: Mutex<Entries>,
    lock_timeout: Duration,
}

impl CommandRegistry {
    /// An empty registry with room for `capacity` active entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(Entries {
                slots: vec![CommandEntry::cleared(); capacity],
                count: 0,
            }),
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Entries>, RegistryError> {
        lock_within(&self.entries, self.lock_timeout).map_err(|_| RegistryError::TimedOut)
    }

    /// Register a task id with a zeroed status.
    pub fn append(&self, id: u8) -> Result<(), RegistryError> {
        let mut entries = self.lock()?;

        if entries.slots[..entries.count].iter().any(|e| e.id == id) {
            return Err(RegistryError::IdAlreadyUsed(id));
        }
        if entries.count >= entries.slots.len() {
            return Err(RegistryError::Overflow);
        }
        // Valid ids are 1..=TASK_ID_LAST; the reserved test id bypasses the
        // range check.
        if id != TASK_ID_TEST && (id == TASK_ID_NONE || id > TASK_ID_LAST) {
            return Err(RegistryError::IdOutOfRange(id));
        }

        let count = entries.count;
        entries.slots[count] = CommandEntry {
            id,
            phase: Phase::Setup,
            detail: 0,
        };
        entries.count += 1;
        tracing::debug!(id, active = entries.count, "command registered");
        Ok(())
    }

    /// Remove a task's entry, compacting the dense prefix.
    ///
    /// Refused with [`RegistryError::NotFinished`] while the task's result has
    /// not been acknowledged (phase is anything but waiting-for-ack).
    pub fn remove_by_id(&self, id: u8) -> Result<(), RegistryError> {
        let mut entries = self.lock()?;

        let index = entries.slots[..entries.count]
            .iter()
            .position(|e| e.id == id)
            .ok_or(RegistryError::NotFound(id))?;
        if entries.slots[index].phase != Phase::WaitingForAck {
            return Err(RegistryError::NotFinished(id));
        }

        let count = entries.count;
        entries.slots.copy_within(index + 1..count, index);
        entries.slots[count - 1] = CommandEntry::cleared();
        entries.count -= 1;
        tracing::debug!(id, active = entries.count, "command removed");
        Ok(())
    }

    /// Position of an active entry.
    pub fn index_of(&self, id: u8) -> Result<usize, RegistryError> {
        let entries = self.lock()?;
        entries.slots[..entries.count]
            .iter()
            .position(|e| e.id == id)
            .ok_or(RegistryError::NotFound(id))
    }

    /// Copy of an active entry.
    pub fn get_by_id(&self, id: u8) -> Result<CommandEntry, RegistryError> {
        let entries = self.lock()?;
        entries.slots[..entries.count]
            .iter()
            .find(|e| e.id == id)
            .copied()
            .ok_or(RegistryError::NotFound(id))
    }

    /// Number of active entries.
    pub fn active_count(&self) -> Result<usize, RegistryError> {
        Ok(self.lock()?.count)
    }

    /// Copy of the dense active prefix, in registration order.
    pub fn snapshot(&self) -> Result<Vec<CommandEntry>, RegistryError> {
        let entries = self.lock()?;
        Ok(entries.slots[..entries.count].to_vec())
    }

    /// Overwrite each active entry's status from `status_of(id)` under one
    /// lock acquisition. The status-sync loop is the only caller.
    pub fn sync_statuses<F>(&self, status_of: F) -> Result<(), RegistryError>
    where
        F: Fn(u8) -> Option<(Phase, u8)>,
    {
        let mut entries = self.lock()?;
        let count = entries.count;
        for entry in &mut entries.slots[..count] {
            if let Some((phase, detail)) = status_of(entry.id) {
                entry.phase = phase;
                entry.detail = detail;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(phases: &[(u8, Phase)]) -> CommandRegistry {
        let registry = CommandRegistry::new(4);
        for &(id, _) in phases {
            registry.append(id).unwrap();
        }
        registry
            .sync_statuses(|id| phases.iter().find(|&&(i, _)| i == id).map(|&(_, p)| (p, 0)))
            .unwrap();
        registry
    }

    #[test]
    fn append_then_get_returns_entry() {
        let registry = CommandRegistry::new(4);
        registry.append(5).unwrap();

        let entry = registry.get_by_id(5).unwrap();
        assert_eq!(entry.id, 5);
        assert_eq!(entry.phase, Phase::Setup);
        assert_eq!(entry.detail, 0);
        assert_eq!(registry.index_of(5).unwrap(), 0);
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let registry = CommandRegistry::new(4);
        registry.append(5).unwrap();
        assert_eq!(registry.append(5), Err(RegistryError::IdAlreadyUsed(5)));
        assert_eq!(registry.active_count().unwrap(), 1);
    }

    #[test]
    fn capacity_overflow_is_rejected() {
        let registry = CommandRegistry::new(2);
        registry.append(1).unwrap();
        registry.append(2).unwrap();
        assert_eq!(registry.append(3), Err(RegistryError::Overflow));
    }

    #[test]
    fn out_of_range_ids_are_rejected_but_test_id_is_exempt() {
        let registry = CommandRegistry::new(4);
        assert_eq!(
            registry.append(TASK_ID_NONE),
            Err(RegistryError::IdOutOfRange(TASK_ID_NONE))
        );
        assert_eq!(
            registry.append(TASK_ID_LAST + 1),
            Err(RegistryError::IdOutOfRange(TASK_ID_LAST + 1))
        );
        registry.append(TASK_ID_LAST).unwrap();
        registry.append(TASK_ID_TEST).unwrap();
    }

    #[test]
    fn remove_requires_waiting_for_ack() {
        let registry = registry_with(&[(5, Phase::Running)]);
        assert_eq!(registry.remove_by_id(5), Err(RegistryError::NotFinished(5)));
        assert_eq!(registry.active_count().unwrap(), 1);

        registry
            .sync_statuses(|_| Some((Phase::WaitingForAck, 0)))
            .unwrap();
        registry.remove_by_id(5).unwrap();
        assert_eq!(registry.get_by_id(5), Err(RegistryError::NotFound(5)));
    }

    #[test]
    fn remove_compacts_the_dense_prefix() {
        let registry = registry_with(&[
            (1, Phase::WaitingForAck),
            (2, Phase::Running),
            (3, Phase::Running),
        ]);
        registry.remove_by_id(1).unwrap();

        let snapshot = registry.snapshot().unwrap();
        let ids: Vec<u8> = snapshot.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(registry.index_of(2).unwrap(), 0);
    }

    #[test]
    fn remove_absent_id_is_idempotent() {
        let registry = CommandRegistry::new(4);
        assert_eq!(registry.remove_by_id(9), Err(RegistryError::NotFound(9)));
        assert_eq!(registry.remove_by_id(9), Err(RegistryError::NotFound(9)));
        assert_eq!(registry.active_count().unwrap(), 0);
    }

    #[test]
    fn status_byte_packs_synced_fields() {
        let registry = CommandRegistry::new(4);
        registry.append(5).unwrap();
        registry
            .sync_statuses(|_| Some((Phase::WaitingForAck, 4)))
            .unwrap();

        let entry = registry.get_by_id(5).unwrap();
        assert_eq!(entry.status_byte(), (3 << 5) | 4);
    }
}
