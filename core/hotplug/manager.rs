//! CPU hotplug manager
//!
//! Owns the per-core state table and the global in-progress flag, and drives
//! the offline state machine:
//!
//! ```text
//! Online / WakeFromSleep --request_offline--> HotplugInProgress --ok--> Offline
//!                                                     |
//!                                                     +--error--> <hardware state>
//! ```

use core::sync::atomic::{AtomicU64, Ordering};

use super::lock::{CoreGuard, CoreStateTable, GlobalHotplugLock};
use super::notify::{HotplugEvent, HotplugEvents, HotplugNotifier, NotifierChain};
use super::{CoreHotplugState, CoreId, HotplugStats};
use crate::arch::{ArchCpuOps, HardwareState};
use crate::config::MAX_NOTIFIERS;
use crate::core::sched::SchedulerOps;
use crate::{Error, Result};

/// Counters not already tracked by the lock types
#[derive(Default)]
struct Counters {
    offline_requests: AtomicU64,
    offline_completed: AtomicU64,
    offline_failed: AtomicU64,
    already_offline: AtomicU64,
    migrations: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// CPU hotplug manager for `N` cores
pub struct HotplugManager<'a, const N: usize> {
    /// Board/CPU operations
    arch: &'a dyn ArchCpuOps,
    /// Scheduler operations
    sched: &'a dyn SchedulerOps,
    /// Per-core locks and states
    cores: CoreStateTable<N>,
    /// Global lock and in-progress flag
    global: GlobalHotplugLock,
    /// Hotplug notifiers
    notifiers: NotifierChain<'a, MAX_NOTIFIERS>,
    counters: Counters,
}

impl<'a, const N: usize> HotplugManager<'a, N> {
    /// Create a manager; call [`init`](Self::init) before serving requests
    pub fn new(arch: &'a dyn ArchCpuOps, sched: &'a dyn SchedulerOps) -> Self {
        Self {
            arch,
            sched,
            cores: CoreStateTable::new(),
            global: GlobalHotplugLock::new(),
            notifiers: NotifierChain::new(),
            counters: Counters::default(),
        }
    }

    /// Seed every core's state from hardware
    ///
    /// The boot core is forced online whatever the hardware reports.
    pub fn init(&self) -> Result<()> {
        log::info!("Hotplug: Initializing with {} CPUs", N);

        for index in 0..N {
            let core = CoreId::new(index);
            let hardware = self.arch.core_state(core);
            let state = if core.is_boot() {
                if hardware != HardwareState::Running {
                    log::debug!("Hotplug: {} reports {:?}, forcing online", core, hardware);
                }
                CoreHotplugState::Online
            } else {
                hardware.into()
            };
            self.cores.seed(core, state);
            log::info!("Hotplug: {} is {}", core, state);
        }

        log::info!("Hotplug: Initialized ({} online)", self.online_count());
        Ok(())
    }

    /// Stored state of `core`
    pub fn get_state(&self, core: CoreId) -> Result<CoreHotplugState> {
        self.cores.load(core).ok_or(Error::InvalidCore)
    }

    /// Advisory check whether `core` can be taken offline right now
    ///
    /// Lock-free; `request_offline` repeats the check under the core's lock.
    pub fn is_available(&self, core: CoreId) -> bool {
        if core.is_boot() {
            return false;
        }
        self.cores
            .load(core)
            .is_some_and(CoreHotplugState::is_hotpluggable)
    }

    /// Check if a hotplug request is currently being serviced
    pub fn in_progress(&self) -> bool {
        self.global.in_progress()
    }

    /// Number of cores currently online or waking from sleep
    pub fn online_count(&self) -> usize {
        (0..N)
            .filter_map(|index| self.cores.load(CoreId::new(index)))
            .filter(|state| state.is_hotpluggable())
            .count()
    }

    /// Register a notifier for the events in `interest`
    pub fn register_notifier(
        &self,
        interest: HotplugEvents,
        notifier: &'a dyn HotplugNotifier,
    ) -> Result<()> {
        self.notifiers.register(interest, notifier)
    }

    /// Get CPU hotplug statistics
    pub fn stats(&self) -> HotplugStats {
        let c = &self.counters;
        HotplugStats {
            offline_requests: c.offline_requests.load(Ordering::Relaxed),
            offline_completed: c.offline_completed.load(Ordering::Relaxed),
            offline_failed: c.offline_failed.load(Ordering::Relaxed),
            already_offline: c.already_offline.load(Ordering::Relaxed),
            migrations: c.migrations.load(Ordering::Relaxed),
            global_lock_acquisitions: self.global.acquisitions(),
            core_lock_acquisitions: self.cores.acquisitions(),
        }
    }

    /// Bring `core` online
    ///
    /// The architecture layer has no safe wake-up primitive yet, so this
    /// always fails.
    pub fn request_online(&self, core: CoreId) -> Result<()> {
        log::warn!("Hotplug: online request for {} not supported", core);
        Err(Error::NotImplemented)
    }

    /// Take `core` offline
    ///
    /// Fails fast with [`Error::AlreadyInProgress`] instead of waiting for
    /// another request. On error the stored state matches what the hardware
    /// reports and the in-progress flag is clear.
    pub fn request_offline(&self, core: CoreId) -> Result<()> {
        bump(&self.counters.offline_requests);
        log::info!("Hotplug: Taking {} offline", core);

        let result = self.offline(core);
        if let Err(err) = result {
            bump(&self.counters.offline_failed);
            log::warn!("Hotplug: {} offline failed: {}", core, err);
            self.notifiers.notify(HotplugEvent::OfflineFailed(core, err));
        }
        result
    }

    fn offline(&self, core: CoreId) -> Result<()> {
        if self.global.in_progress() {
            return Err(Error::AlreadyInProgress);
        }

        if core.is_boot() || !self.cores.contains(core) {
            return Err(Error::InvalidCore);
        }

        if self.arch.core_state(core) == HardwareState::Offline {
            self.cores.try_sync_offline(core);
            bump(&self.counters.already_offline);
            log::info!("Hotplug: {} already offline", core);
            return Ok(());
        }

        if self.arch.current_core() == core {
            return Err(Error::CannotOfflineSelf);
        }

        // Another caller may have won the flag since the fast-path check
        let claim = self
            .global
            .try_claim(&self.cores)
            .ok_or(Error::AlreadyInProgress)?;

        let migrated = {
            let mut guard = claim.lock_core(core).ok_or(Error::InvalidCore)?;
            self.offline_locked(&mut guard)?
        };
        drop(claim);

        if migrated {
            self.notifiers.notify(HotplugEvent::TasksMigrated(core));
        }
        bump(&self.counters.offline_completed);
        log::info!("Hotplug: {} is now offline", core);
        self.notifiers.notify(HotplugEvent::Offline(core));
        Ok(())
    }

    /// Steps run with the claim and the core's lock held
    ///
    /// Returns whether tasks were evacuated.
    fn offline_locked(&self, guard: &mut CoreGuard<'_>) -> Result<bool> {
        let core = guard.core();

        if !guard.state().is_hotpluggable() {
            log::warn!("Hotplug: {} busy ({})", core, guard.state());
            self.restore_from_hardware(guard);
            return Err(Error::Busy);
        }

        guard.set_state(CoreHotplugState::HotplugInProgress);

        let running = self.arch.core_state(core) == HardwareState::Running;
        if running {
            self.sched.suspend_preemption();

            if let Err(err) = self.sched.migrate_tasks(core) {
                self.restore_from_hardware(guard);
                self.sched.resume_preemption();
                return Err(Error::MigrationFailed(err));
            }
            bump(&self.counters.migrations);
            log::debug!("Hotplug: {} evacuated", core);

            let powered = self.arch.power_down(core);
            self.sched.resume_preemption();
            if let Err(err) = powered {
                self.restore_from_hardware(guard);
                return Err(Error::PowerDownFailed(err));
            }
        } else if let Err(err) = self.arch.power_down(core) {
            self.restore_from_hardware(guard);
            return Err(Error::PowerDownFailed(err));
        }

        guard.set_state(CoreHotplugState::Offline);
        Ok(running)
    }

    fn restore_from_hardware(&self, guard: &mut CoreGuard<'_>) {
        let state = self.arch.core_state(guard.core()).into();
        guard.set_state(state);
    }
}
