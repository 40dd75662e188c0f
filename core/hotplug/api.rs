//! Kernel-facing hotplug API
//!
//! One [`HotplugManager`] per image, installed once by board code. Core
//! numbers arrive as raw `i32` from callers; results are `0` or a negative
//! errno (see [`crate::errno`]).

use spin::Once;

use super::{CoreId, HotplugManager};
use crate::arch::ArchCpuOps;
use crate::config::SMP_NCPUS;
use crate::core::sched::SchedulerOps;
use crate::{Error, Result};

/// Manager type used by the kernel
pub type KernelHotplug = HotplugManager<'static, SMP_NCPUS>;

static HOTPLUG: Once<KernelHotplug> = Once::new();

/// Register the architecture and scheduler backends
///
/// Only the first call has an effect; later calls return false.
pub fn install(arch: &'static dyn ArchCpuOps, sched: &'static dyn SchedulerOps) -> bool {
    let mut installed = false;
    HOTPLUG.call_once(|| {
        installed = true;
        HotplugManager::new(arch, sched)
    });
    installed
}

/// The installed manager
pub fn manager() -> Result<&'static KernelHotplug> {
    HOTPLUG.get().ok_or(Error::NotInitialized)
}

fn status(result: Result<()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => -err.errno(),
    }
}

fn core_arg(core: i32) -> Result<CoreId> {
    CoreId::from_raw(core).ok_or(Error::InvalidCore)
}

/// Seed per-core states from hardware
pub fn hotplug_init() -> i32 {
    status(manager().and_then(|m| m.init()))
}

/// Take `core` offline
pub fn hotplug_offline(core: i32) -> i32 {
    status(manager().and_then(|m| m.request_offline(core_arg(core)?)))
}

/// Bring `core` online; always `-ENOSYS`
pub fn hotplug_online(core: i32) -> i32 {
    let result = match (manager(), CoreId::from_raw(core)) {
        (Ok(m), Some(core)) => m.request_online(core),
        _ => Err(Error::NotImplemented),
    };
    status(result)
}

/// Advisory availability check; false when not installed or out of range
pub fn hotplug_is_available(core: i32) -> bool {
    match (manager(), CoreId::from_raw(core)) {
        (Ok(m), Some(core)) => m.is_available(core),
        _ => false,
    }
}

/// Raw [`CoreHotplugState`](super::CoreHotplugState) code of `core`, or a negative errno
pub fn hotplug_get_state(core: i32) -> i32 {
    match manager().and_then(|m| m.get_state(core_arg(core)?)) {
        Ok(state) => i32::from(state.raw()),
        Err(err) => -err.errno(),
    }
}

/// Check if a hotplug request is being serviced
pub fn hotplug_in_progress() -> bool {
    manager().is_ok_and(|m| m.in_progress())
}
