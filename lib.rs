//! Ferrovisor CPU hotplug
//!
//! Takes cores of an SMP kernel offline at runtime: evacuates their runnable
//! tasks onto the remaining cores and powers them down, under a two-level
//! locking discipline that keeps concurrent requests from interfering.
//!
//! The manager is driven through the kernel-facing functions in
//! [`core::hotplug::api`], which report results as negative errno values.

#![cfg_attr(not(test), no_std)]

// Core modules
pub mod utils;
pub mod config;

// Architecture-specific code
pub mod arch;

// Hotplug, scheduling and synchronization
pub mod core;

use ::core::fmt;

use crate::core::sched::MigrateError;

pub use crate::core::hotplug::{CoreHotplugState, CoreId, HotplugManager};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Errno values reported by the kernel-facing API
pub mod errno {
    /// Operation not permitted
    pub const EPERM: i32 = 1;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Try again
    pub const EAGAIN: i32 = 11;
    /// Device or resource busy
    pub const EBUSY: i32 = 16;
    /// No such device
    pub const ENODEV: i32 = 19;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// No space left
    pub const ENOSPC: i32 = 28;
    /// Function not implemented
    pub const ENOSYS: i32 = 38;
    /// Operation now in progress
    pub const EINPROGRESS: i32 = 115;
}

/// Common error type for CPU hotplug
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Core 0 or out of range
    InvalidCore,
    /// Another hotplug request is being serviced
    AlreadyInProgress,
    /// Target is the calling core
    CannotOfflineSelf,
    /// Core is not in a hotpluggable state
    Busy,
    /// Task evacuation failed
    MigrationFailed(MigrateError),
    /// Power-down failed
    PowerDownFailed(arch::Error),
    /// Operation not supported yet
    NotImplemented,
    /// Manager has not been installed
    NotInitialized,
    /// No free notifier slot
    NotifierTableFull,
}

impl Error {
    /// Positive errno for this error; the API returns it negated
    pub fn errno(&self) -> i32 {
        match self {
            Error::InvalidCore => errno::EINVAL,
            Error::AlreadyInProgress => errno::EINPROGRESS,
            Error::CannotOfflineSelf => errno::EPERM,
            Error::Busy => errno::EBUSY,
            Error::MigrationFailed(_) => errno::EAGAIN,
            Error::PowerDownFailed(_) => errno::EIO,
            Error::NotImplemented => errno::ENOSYS,
            Error::NotInitialized => errno::ENODEV,
            Error::NotifierTableFull => errno::ENOSPC,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidCore => f.write_str("invalid core"),
            Error::AlreadyInProgress => f.write_str("hotplug already in progress"),
            Error::CannotOfflineSelf => f.write_str("cannot offline the calling core"),
            Error::Busy => f.write_str("core busy"),
            Error::MigrationFailed(err) => write!(f, "task migration failed: {}", err),
            Error::PowerDownFailed(err) => write!(f, "power down failed: {}", err),
            Error::NotImplemented => f.write_str("not implemented"),
            Error::NotInitialized => f.write_str("hotplug not initialized"),
            Error::NotifierTableFull => f.write_str("notifier table full"),
        }
    }
}

impl From<MigrateError> for Error {
    fn from(err: MigrateError) -> Self {
        Error::MigrationFailed(err)
    }
}

impl From<arch::Error> for Error {
    fn from(err: arch::Error) -> Self {
        Error::PowerDownFailed(err)
    }
}

/// Result type alias
pub type Result<T> = ::core::result::Result<T, Error>;
