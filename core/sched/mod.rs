//! Scheduler module
//!
//! The hotplug manager only needs three things from the scheduler: stop task
//! switching everywhere, move a core's runnable tasks elsewhere, and resume.
//! [`SchedulerOps`] is that contract; [`scheduler::Scheduler`] is the
//! per-core ready-queue implementation shipped with the kernel.

use core::fmt;

use crate::config::{RUN_QUEUE_DEPTH, SMP_NCPUS};
use crate::core::hotplug::CoreId;

pub mod scheduler;

pub use scheduler::{RunQueue, Scheduler};

/// Scheduler sized by the build configuration
pub type KernelScheduler = Scheduler<SMP_NCPUS, RUN_QUEUE_DEPTH>;

/// Task ID type
pub type TaskId = u32;

/// Task priority levels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    /// Idle priority (lowest)
    Idle = 0,
    /// Low priority
    Low = 1,
    /// Normal priority
    #[default]
    Normal = 2,
    /// High priority
    High = 3,
    /// Real-time priority (highest)
    RealTime = 4,
}

/// A runnable task as seen by the ready queues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Task {
    /// Unique task ID
    pub id: TaskId,
    /// Task priority
    pub priority: Priority,
    /// CPU affinity mask, bit `n` allows core `n`
    pub affinity: u64,
}

impl Task {
    /// Create a task that may run on any core
    pub const fn new(id: TaskId, priority: Priority) -> Self {
        Self {
            id,
            priority,
            affinity: u64::MAX,
        }
    }

    /// Restrict the task to the cores in `mask`
    pub const fn with_affinity(mut self, mask: u64) -> Self {
        self.affinity = mask;
        self
    }

    /// Check if the task may run on `core`
    pub fn allows(&self, core: CoreId) -> bool {
        self.affinity & core.mask() != 0
    }
}

/// Why a migration could not be completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateError {
    /// Preemption was not suspended by the caller
    PreemptionEnabled,
    /// No online core can accept this task
    NoDestination(TaskId),
    /// Source core is out of range
    InvalidCore,
}

impl fmt::Display for MigrateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MigrateError::PreemptionEnabled => f.write_str("preemption not suspended"),
            MigrateError::NoDestination(id) => write!(f, "no destination core for task {}", id),
            MigrateError::InvalidCore => f.write_str("invalid source core"),
        }
    }
}

/// Why a task could not be queued
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Core is out of range
    InvalidCore,
    /// Core is not accepting work
    CoreOffline,
    /// Task affinity excludes the core
    AffinityMismatch,
    /// Ready queue is full
    QueueFull,
}

/// Scheduler operations consumed by the hotplug manager
pub trait SchedulerOps: Sync {
    /// Disable task switching on every core
    ///
    /// Not assumed to nest; the manager calls it once per evacuation.
    fn suspend_preemption(&self);

    /// Re-enable task switching on every core
    fn resume_preemption(&self);

    /// Move every task queued on `core` onto other online cores
    ///
    /// Precondition: preemption is suspended. Task priority and eligibility
    /// are preserved. Fails if some task has no destination.
    fn migrate_tasks(&self, core: CoreId) -> Result<(), MigrateError>;
}
