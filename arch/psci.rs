//! PSCI firmware interface
//!
//! Function IDs, return code decoding and the per-core activity word used by
//! the AArch64 backend. No inline assembly here; the firmware calls live in
//! `arch::arm64`.
//!
//! Reference: ARM DEN 0022D - Power State Coordination Interface

use core::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use super::{Error, HardwareState};
use crate::core::hotplug::CoreId;

/// PSCI 0.2 function IDs
pub mod fn_id {
    /// CPU_OFF
    pub const CPU_OFF: u32 = 0x8400_0002;
    /// AFFINITY_INFO, SMC64 calling convention
    pub const AFFINITY_INFO_64: u32 = 0xC400_0004;
}

/// PSCI return codes
pub mod ret {
    pub const SUCCESS: i32 = 0;
    pub const NOT_SUPPORTED: i32 = -1;
    pub const INVALID_PARAMS: i32 = -2;
    pub const DENIED: i32 = -3;
    pub const ALREADY_ON: i32 = -4;
    pub const ON_PENDING: i32 = -5;
    pub const INTERNAL_FAILURE: i32 = -6;
    pub const NOT_PRESENT: i32 = -7;
    pub const DISABLED: i32 = -8;
    pub const INVALID_ADDRESS: i32 = -9;
}

/// Split a raw `x0` into a value or an error
///
/// PSCI return codes are 32-bit signed even on the SMC64 convention.
pub fn check(x0: u64) -> Result<u32, Error> {
    let code = x0 as u32 as i32;
    if code >= 0 {
        return Ok(code as u32);
    }
    Err(match code {
        ret::NOT_SUPPORTED => Error::NotSupported,
        ret::INVALID_PARAMS | ret::INVALID_ADDRESS | ret::NOT_PRESENT => {
            Error::InvalidParameters
        }
        ret::DENIED | ret::DISABLED => Error::Denied,
        other => Error::Firmware(other),
    })
}

/// AFFINITY_INFO result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum AffinityState {
    /// At least one core in the node is on
    On = 0,
    /// Every core in the node is off
    Off = 1,
    /// Power-on in progress
    OnPending = 2,
}

impl AffinityState {
    /// Decode a raw AFFINITY_INFO return value
    pub fn from_ret(x0: u64) -> Result<Self, Error> {
        match check(x0)? {
            0 => Ok(Self::On),
            1 => Ok(Self::Off),
            2 => Ok(Self::OnPending),
            other => Err(Error::Firmware(other as i32)),
        }
    }
}

/// What a powered core is doing, as published by its own idle loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CoreActivity {
    /// Executing tasks
    Running = 0,
    /// Sitting in the idle loop
    Idle = 1,
    /// Left WFI/WFE and has not yet picked up work
    WakeFromSleep = 2,
}

impl CoreActivity {
    fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Running,
            2 => Self::WakeFromSleep,
            _ => Self::Idle,
        }
    }
}

impl From<CoreActivity> for HardwareState {
    fn from(activity: CoreActivity) -> Self {
        match activity {
            CoreActivity::Running => HardwareState::Running,
            CoreActivity::Idle => HardwareState::Idle,
            CoreActivity::WakeFromSleep => HardwareState::WakeFromSleep,
        }
    }
}

/// Atomic [`CoreActivity`] cell
pub struct ActivityWord(AtomicU8);

impl ActivityWord {
    /// Create a word in the given state
    pub const fn new(activity: CoreActivity) -> Self {
        Self(AtomicU8::new(activity as u8))
    }

    /// Current activity
    pub fn get(&self) -> CoreActivity {
        CoreActivity::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Publish a new activity
    pub fn set(&self, activity: CoreActivity) {
        self.0.store(activity as u8, Ordering::Release);
    }
}

const NO_PARK: AtomicBool = AtomicBool::new(false);

/// Per-core park mailbox
///
/// A core cannot be switched off from outside, so the requester posts here
/// and the target consumes the request from its own idle loop or tick path.
pub struct ParkRequests<const N: usize> {
    slots: [AtomicBool; N],
}

impl<const N: usize> ParkRequests<N> {
    /// Create an empty mailbox
    pub const fn new() -> Self {
        Self {
            slots: [NO_PARK; N],
        }
    }

    /// Ask `core` to park, returns false if `core` is out of range
    pub fn post(&self, core: CoreId) -> bool {
        match self.slots.get(core.index()) {
            Some(slot) => {
                slot.store(true, Ordering::Release);
                true
            }
            None => false,
        }
    }

    /// Cancel a request that was not consumed in time
    pub fn withdraw(&self, core: CoreId) {
        if let Some(slot) = self.slots.get(core.index()) {
            slot.store(false, Ordering::Release);
        }
    }

    /// Check for a pending request without consuming it
    pub fn pending(&self, core: CoreId) -> bool {
        self.slots
            .get(core.index())
            .is_some_and(|slot| slot.load(Ordering::Acquire))
    }

    /// Consume a pending request; true at most once per post
    pub fn take(&self, core: CoreId) -> bool {
        self.slots
            .get(core.index())
            .is_some_and(|slot| slot.swap(false, Ordering::AcqRel))
    }
}

impl<const N: usize> Default for ParkRequests<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Combine firmware and idle-loop views into one hardware state
pub fn hardware_state(affinity: AffinityState, activity: CoreActivity) -> HardwareState {
    match affinity {
        AffinityState::Off => HardwareState::Offline,
        // Still booting, nothing scheduled yet
        AffinityState::OnPending => HardwareState::Idle,
        AffinityState::On => activity.into(),
    }
}
