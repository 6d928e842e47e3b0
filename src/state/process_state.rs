use crate::error::{Error, Result};
use log::debug;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Book keeping for every external process spawned through the
/// [`ProcessManager`](crate::services::process_manager::ProcessManager).
///
/// The pid set and the spawn lock flag live behind the same mutex so that
/// checking the flag, spawning and registering the new pid is one atomic
/// step with respect to `lock_spawning`.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    pids: HashSet<u32>,
    spawn_locked: bool,
    released: u64,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        // A panic while holding the lock can't leave the set half updated,
        // so the data is still usable after poisoning.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `spawn` while holding the registry lock and registers the pid it
    /// returns. Fails with [`Error::SpawnLocked`] without calling `spawn` when
    /// spawning is locked.
    pub fn spawn_tracked<T, F>(&self, spawn: F) -> Result<T>
    where
        F: FnOnce() -> Result<(u32, T)>,
    {
        let mut inner = self.lock();
        if inner.spawn_locked {
            return Err(Error::SpawnLocked);
        }
        let (pid, spawned) = spawn()?;
        inner.pids.insert(pid);
        debug!("Tracking process {pid} ({} in flight)", inner.pids.len());
        Ok(spawned)
    }

    pub fn add(&self, pid: u32) {
        self.lock().pids.insert(pid);
    }

    /// Removes `pid` from the in-flight set. Returns false when it was not
    /// tracked, in which case the release counter is left alone.
    pub fn release(&self, pid: u32) -> bool {
        let mut inner = self.lock();
        let removed = inner.pids.remove(&pid);
        if removed {
            inner.released += 1;
            debug!("Released process {pid} ({} in flight)", inner.pids.len());
        }
        removed
    }

    pub fn lock_spawning(&self) {
        self.lock().spawn_locked = true;
    }

    pub fn unlock_spawning(&self) {
        self.lock().spawn_locked = false;
    }

    pub fn is_spawning_locked(&self) -> bool {
        self.lock().spawn_locked
    }

    pub fn in_flight(&self) -> usize {
        self.lock().pids.len()
    }

    pub fn contains(&self, pid: u32) -> bool {
        self.lock().pids.contains(&pid)
    }

    pub fn pids(&self) -> Vec<u32> {
        let mut pids: Vec<u32> = self.lock().pids.iter().copied().collect();
        pids.sort_unstable();
        pids
    }

    /// Total number of successful releases since the registry was created.
    pub fn released_count(&self) -> u64 {
        self.lock().released
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_counts_only_tracked_pids() {
        let registry = ProcessRegistry::new();
        registry.add(42);
        assert_eq!(registry.in_flight(), 1);

        assert!(registry.release(42));
        assert!(!registry.release(42));
        assert!(!registry.release(7));

        assert_eq!(registry.in_flight(), 0);
        assert_eq!(registry.released_count(), 1);
    }

    #[test]
    fn test_spawn_tracked_registers_pid() {
        let registry = ProcessRegistry::new();
        let value = registry.spawn_tracked(|| Ok((10, "child"))).unwrap();
        assert_eq!(value, "child");
        assert!(registry.contains(10));
        assert_eq!(registry.pids(), vec![10]);
    }

    #[test]
    fn test_spawn_tracked_refuses_while_locked() {
        let registry = ProcessRegistry::new();
        registry.lock_spawning();
        let mut called = false;
        let result = registry.spawn_tracked(|| {
            called = true;
            Ok((1, ()))
        });
        assert!(matches!(result, Err(Error::SpawnLocked)));
        assert!(!called);
        assert_eq!(registry.in_flight(), 0);

        registry.unlock_spawning();
        assert!(!registry.is_spawning_locked());
        assert!(registry.spawn_tracked(|| Ok((1, ()))).is_ok());
    }

    #[test]
    fn test_spawn_error_registers_nothing() {
        let registry = ProcessRegistry::new();
        let result: Result<()> = registry.spawn_tracked(|| Err(Error::tool_not_found("nope")));
        assert!(matches!(result, Err(Error::ToolNotFound { .. })));
        assert_eq!(registry.in_flight(), 0);
    }
}
