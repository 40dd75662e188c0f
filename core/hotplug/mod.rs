//! CPU hotplug
//!
//! Takes individual cores out of scheduling participation while the rest of
//! the system keeps running:
//! - per-core and global locking discipline
//! - per-core hotplug state machine
//! - task evacuation through the scheduler before power-down
//!
//! ## Offline Flow
//! 1. Reject if a hotplug request is already in flight
//! 2. Validate the target (never core 0, never the calling core)
//! 3. Claim the global in-progress flag
//! 4. Take the target's per-core lock and mark it in progress
//! 5. If the core is running tasks: suspend preemption, migrate, power down,
//!    resume preemption; otherwise power down directly
//! 6. Commit `Offline`, release the per-core lock, clear the flag
//!
//! Bringing a core back online is not supported yet.

pub mod api;
pub mod lock;
pub mod manager;
pub mod notify;

pub use lock::{CoreGuard, CoreStateTable, GlobalHotplugLock, HotplugClaim};
pub use manager::HotplugManager;
pub use notify::{HotplugEvent, HotplugEvents, HotplugNotifier, NotifierChain};

use core::fmt;

/// Identifier of a physical core, `[0, N)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CoreId(usize);

impl CoreId {
    /// The boot core; never eligible for hotplug
    pub const BOOT: CoreId = CoreId(0);

    /// Create from a raw core index
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Convert a syscall argument, rejecting negative values
    pub fn from_raw(raw: i32) -> Option<Self> {
        usize::try_from(raw).ok().map(Self)
    }

    /// Raw core index
    pub const fn index(self) -> usize {
        self.0
    }

    /// Check if this is the boot core
    pub const fn is_boot(self) -> bool {
        self.0 == 0
    }

    /// Bit for this core in a 64-bit core mask
    pub fn mask(self) -> u64 {
        1u64.checked_shl(self.0 as u32).unwrap_or(0)
    }
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu{}", self.0)
    }
}

/// Per-core hotplug state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreHotplugState {
    /// Core is executing the scheduler and may run tasks
    Online = 0,
    /// A transition is being performed on this core
    HotplugInProgress = 1,
    /// Core is powered or clocked down
    Offline = 2,
    /// Core is online and has just returned from a sleep state
    WakeFromSleep = 3,
}

impl CoreHotplugState {
    /// Create from raw value
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Online),
            1 => Some(Self::HotplugInProgress),
            2 => Some(Self::Offline),
            3 => Some(Self::WakeFromSleep),
            _ => None,
        }
    }

    /// Get raw value
    pub fn raw(self) -> u8 {
        self as u8
    }

    /// Check if a core in this state may be taken offline
    pub fn is_hotpluggable(self) -> bool {
        matches!(self, Self::Online | Self::WakeFromSleep)
    }
}

impl fmt::Display for CoreHotplugState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Online => "online",
            Self::HotplugInProgress => "hotplug-in-progress",
            Self::Offline => "offline",
            Self::WakeFromSleep => "wake-from-sleep",
        };
        f.write_str(name)
    }
}

/// CPU hotplug statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HotplugStats {
    /// Calls to `request_offline`
    pub offline_requests: u64,
    /// Requests that powered a core down
    pub offline_completed: u64,
    /// Requests that returned an error
    pub offline_failed: u64,
    /// Requests short-circuited because the core was already off
    pub already_offline: u64,
    /// Successful task evacuations
    pub migrations: u64,
    /// Acquisitions of the global hotplug lock
    pub global_lock_acquisitions: u64,
    /// Acquisitions of any per-core hotplug lock
    pub core_lock_acquisitions: u64,
}
