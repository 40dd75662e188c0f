//! Hotplug lock discipline
//!
//! Two lock levels protect a hotplug transition:
//! - the global lock, guarding the "user hotplug in progress" flag
//! - one lock per core, guarding that core's state transition
//!
//! The locks are never held together. What matters is the order of the flag
//! and the per-core lock: the flag is set before any per-core lock is taken
//! and cleared only after it is released. [`HotplugClaim`] is the only way to
//! reach a per-core lock and every [`CoreGuard`] borrows the claim, so the
//! order holds by construction:
//!
//! ```compile_fail
//! use ferro_cpuhp::core::hotplug::{CoreId, CoreStateTable, GlobalHotplugLock};
//!
//! let global = GlobalHotplugLock::new();
//! let table: CoreStateTable<4> = CoreStateTable::new();
//! let claim = global.try_claim(&table).unwrap();
//! let guard = claim.lock_core(CoreId::new(1)).unwrap();
//! drop(claim); // flag cannot be cleared while the core lock is held
//! drop(guard);
//! ```

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

use super::{CoreHotplugState, CoreId};
use crate::core::sync::{SpinLock, SpinLockGuard};

/// One core's lock and its lock-free readable state
struct CoreSlot {
    lock: SpinLock<()>,
    state: AtomicU8,
}

impl CoreSlot {
    fn new(state: CoreHotplugState) -> Self {
        Self {
            lock: SpinLock::new(()),
            state: AtomicU8::new(state.raw()),
        }
    }

    fn load(&self) -> CoreHotplugState {
        // Only valid encodings are ever stored
        CoreHotplugState::from_raw(self.state.load(Ordering::Acquire))
            .unwrap_or(CoreHotplugState::Offline)
    }

    fn store(&self, state: CoreHotplugState) {
        self.state.store(state.raw(), Ordering::Release);
    }
}

/// Per-core lock array and state store
pub struct CoreStateTable<const N: usize> {
    slots: [CoreSlot; N],
    acquisitions: AtomicU64,
}

impl<const N: usize> CoreStateTable<N> {
    /// Create a table with the boot core online and every other core offline
    pub fn new() -> Self {
        Self {
            slots: core::array::from_fn(|i| {
                CoreSlot::new(if i == 0 {
                    CoreHotplugState::Online
                } else {
                    CoreHotplugState::Offline
                })
            }),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Number of cores in the table
    pub const fn len(&self) -> usize {
        N
    }

    /// Check if `core` is in range
    pub fn contains(&self, core: CoreId) -> bool {
        core.index() < N
    }

    /// Unsynchronized read, for informational queries only
    pub fn load(&self, core: CoreId) -> Option<CoreHotplugState> {
        self.slots.get(core.index()).map(CoreSlot::load)
    }

    /// Store a boot-time state under the core's lock
    ///
    /// Used by initialization only, before any request can be in flight.
    pub fn seed(&self, core: CoreId, state: CoreHotplugState) -> bool {
        let Some(slot) = self.slots.get(core.index()) else {
            return false;
        };
        let _guard = self.lock_slot(slot);
        slot.store(state);
        true
    }

    /// Record that `core` is already off, without waiting for its lock
    ///
    /// If the lock is held, the holder is mid-transition and will commit the
    /// final state itself, so the store is skipped.
    pub fn try_sync_offline(&self, core: CoreId) -> bool {
        let Some(slot) = self.slots.get(core.index()) else {
            return false;
        };
        match slot.lock.try_lock() {
            Some(_guard) => {
                self.acquisitions.fetch_add(1, Ordering::Relaxed);
                slot.store(CoreHotplugState::Offline);
                true
            }
            None => false,
        }
    }

    /// Number of per-core lock acquisitions so far
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn lock_slot<'a>(&'a self, slot: &'a CoreSlot) -> SpinLockGuard<'a, ()> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        slot.lock.lock()
    }
}

impl<const N: usize> Default for CoreStateTable<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Global hotplug lock and in-progress flag
pub struct GlobalHotplugLock {
    lock: SpinLock<()>,
    in_progress: AtomicBool,
    acquisitions: AtomicU64,
}

impl GlobalHotplugLock {
    /// Create an unclaimed lock
    pub const fn new() -> Self {
        Self {
            lock: SpinLock::new(()),
            in_progress: AtomicBool::new(false),
            acquisitions: AtomicU64::new(0),
        }
    }

    /// Lock-free read of the flag
    ///
    /// Advisory: the answer can be stale by the time the caller acts on it.
    pub fn in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Test-and-set the flag under the global lock
    ///
    /// Returns `None` if another request already owns it. The global lock is
    /// released before returning either way.
    pub fn try_claim<'a, const N: usize>(
        &'a self,
        table: &'a CoreStateTable<N>,
    ) -> Option<HotplugClaim<'a, N>> {
        let _guard = self.acquire();
        if self.in_progress.load(Ordering::Acquire) {
            return None;
        }
        self.in_progress.store(true, Ordering::Release);
        Some(HotplugClaim { global: self, table })
    }

    /// Number of global lock acquisitions so far
    pub fn acquisitions(&self) -> u64 {
        self.acquisitions.load(Ordering::Relaxed)
    }

    fn acquire(&self) -> SpinLockGuard<'_, ()> {
        self.acquisitions.fetch_add(1, Ordering::Relaxed);
        self.lock.lock()
    }

    fn release_claim(&self) {
        let _guard = self.acquire();
        self.in_progress.store(false, Ordering::Release);
    }
}

impl Default for GlobalHotplugLock {
    fn default() -> Self {
        Self::new()
    }
}

/// Ownership of the global in-progress flag
///
/// Dropping the claim takes the global lock again and clears the flag, so
/// every exit path of a request clears it.
pub struct HotplugClaim<'a, const N: usize> {
    global: &'a GlobalHotplugLock,
    table: &'a CoreStateTable<N>,
}

impl<'a, const N: usize> HotplugClaim<'a, N> {
    /// Take the per-core lock of `core`, spinning until it is free
    pub fn lock_core(&self, core: CoreId) -> Option<CoreGuard<'_>> {
        let slot = self.table.slots.get(core.index())?;
        let lock = self.table.lock_slot(slot);
        Some(CoreGuard {
            core,
            state: &slot.state,
            _lock: lock,
        })
    }
}

impl<'a, const N: usize> Drop for HotplugClaim<'a, N> {
    fn drop(&mut self) {
        self.global.release_claim();
    }
}

/// Exclusive access to one core's hotplug state
pub struct CoreGuard<'c> {
    core: CoreId,
    state: &'c AtomicU8,
    _lock: SpinLockGuard<'c, ()>,
}

impl<'c> CoreGuard<'c> {
    /// Core this guard protects
    pub fn core(&self) -> CoreId {
        self.core
    }

    /// Current stored state
    pub fn state(&self) -> CoreHotplugState {
        CoreHotplugState::from_raw(self.state.load(Ordering::Acquire))
            .unwrap_or(CoreHotplugState::Offline)
    }

    /// Store a new state
    pub fn set_state(&mut self, state: CoreHotplugState) {
        log::trace!("Hotplug: {} state {} -> {}", self.core, self.state(), state);
        self.state.store(state.raw(), Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table_boot_core_online() {
        let table: CoreStateTable<4> = CoreStateTable::new();
        assert_eq!(table.len(), 4);
        assert_eq!(table.load(CoreId::BOOT), Some(CoreHotplugState::Online));
        assert_eq!(table.load(CoreId::new(3)), Some(CoreHotplugState::Offline));
        assert_eq!(table.load(CoreId::new(4)), None);
    }

    #[test]
    fn test_claim_is_exclusive_until_dropped() {
        let global = GlobalHotplugLock::new();
        let table: CoreStateTable<4> = CoreStateTable::new();

        let claim = global.try_claim(&table);
        assert!(claim.is_some());
        assert!(global.in_progress());
        assert!(global.try_claim(&table).is_none());

        drop(claim);
        assert!(!global.in_progress());
        assert!(global.try_claim(&table).is_some());
    }

    #[test]
    fn test_claim_counts_global_acquisitions() {
        let global = GlobalHotplugLock::new();
        let table: CoreStateTable<2> = CoreStateTable::new();

        drop(global.try_claim(&table));
        // One acquisition to set the flag, one to clear it
        assert_eq!(global.acquisitions(), 2);
    }

    #[test]
    fn test_core_guard_writes_state() {
        let global = GlobalHotplugLock::new();
        let table: CoreStateTable<4> = CoreStateTable::new();
        table.seed(CoreId::new(2), CoreHotplugState::Online);

        let claim = global.try_claim(&table).unwrap();
        {
            let mut guard = claim.lock_core(CoreId::new(2)).unwrap();
            assert_eq!(guard.core(), CoreId::new(2));
            assert_eq!(guard.state(), CoreHotplugState::Online);
            guard.set_state(CoreHotplugState::HotplugInProgress);
            assert_eq!(table.load(CoreId::new(2)), Some(CoreHotplugState::HotplugInProgress));
        }
        assert!(claim.lock_core(CoreId::new(9)).is_none());
        drop(claim);

        // seed + lock_core
        assert_eq!(table.acquisitions(), 2);
    }

    #[test]
    fn test_try_sync_offline_skips_held_lock() {
        let global = GlobalHotplugLock::new();
        let table: CoreStateTable<4> = CoreStateTable::new();
        table.seed(CoreId::new(1), CoreHotplugState::Online);

        let claim = global.try_claim(&table).unwrap();
        let guard = claim.lock_core(CoreId::new(1)).unwrap();
        assert!(!table.try_sync_offline(CoreId::new(1)));
        assert_eq!(table.load(CoreId::new(1)), Some(CoreHotplugState::Online));

        drop(guard);
        assert!(table.try_sync_offline(CoreId::new(1)));
        assert_eq!(table.load(CoreId::new(1)), Some(CoreHotplugState::Offline));
    }
}
