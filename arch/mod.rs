//! Architecture support
//!
//! The hotplug manager never touches hardware directly. Board and CPU
//! specific code implements [`ArchCpuOps`] and hands it to the manager.

use core::fmt;

use crate::core::hotplug::{CoreHotplugState, CoreId};

pub mod psci;

cfg_if::cfg_if! {
    if #[cfg(all(target_arch = "aarch64", target_os = "none", feature = "arch_arm64"))] {
        pub mod arm64;

        /// CPU operations for the architecture this image targets
        pub use arm64::PsciCpuOps as PlatformCpuOps;
    }
}

/// Architecture error type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Firmware does not implement the requested call
    NotSupported,
    /// Firmware rejected the call's parameters
    InvalidParameters,
    /// Firmware refused the operation
    Denied,
    /// The core did not reach the requested state in time
    Timeout,
    /// Unclassified firmware failure, carries the raw return code
    Firmware(i32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::NotSupported => f.write_str("not supported by firmware"),
            Error::InvalidParameters => f.write_str("invalid firmware parameters"),
            Error::Denied => f.write_str("denied by firmware"),
            Error::Timeout => f.write_str("core did not power down in time"),
            Error::Firmware(code) => write!(f, "firmware error {}", code),
        }
    }
}

/// Hardware-observed run state of a core
///
/// This is what the architecture layer reports. It is deliberately a
/// different type from [`CoreHotplugState`]: the transient in-progress
/// marker only exists on the manager side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareState {
    /// Core is executing tasks
    Running,
    /// Core is online with nothing runnable
    Idle,
    /// Core is online and has just left a low-power state
    WakeFromSleep,
    /// Core is powered or clocked down
    Offline,
}

impl HardwareState {
    /// Whether the core is executing kernel code at all
    pub fn is_online(self) -> bool {
        !matches!(self, Self::Offline)
    }
}

impl From<HardwareState> for CoreHotplugState {
    fn from(state: HardwareState) -> Self {
        match state {
            HardwareState::Running | HardwareState::Idle => CoreHotplugState::Online,
            HardwareState::WakeFromSleep => CoreHotplugState::WakeFromSleep,
            HardwareState::Offline => CoreHotplugState::Offline,
        }
    }
}

/// Board/CPU specific operations consumed by the hotplug manager
///
/// Implementations must be callable from any core without holding any
/// hotplug lock.
pub trait ArchCpuOps: Sync {
    /// Identifier of the core executing the call
    fn current_core(&self) -> CoreId;

    /// Hardware-observed run state of `core`
    fn core_state(&self, core: CoreId) -> HardwareState;

    /// Power `core` down and remove it from interrupt routing
    ///
    /// Irreversible until an online path exists.
    fn power_down(&self, core: CoreId) -> Result<(), Error>;
}
