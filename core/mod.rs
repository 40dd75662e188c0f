//! Kernel core
//!
//! CPU hotplug together with the scheduler and synchronization primitives it
//! is built on.

pub mod hotplug;
pub mod sched;
pub mod sync;
