//! Main scheduler implementation
//!
//! Per-core bounded ready queues plus the kernel-wide preemption switch used
//! by CPU hotplug to evacuate a core.

use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use heapless::Vec;

use super::{MigrateError, SchedError, SchedulerOps, Task};
use crate::core::hotplug::CoreId;
use crate::core::sync::{SpinLock, SpinLockGuard};

/// Ready queue for one core, highest priority first
#[derive(Debug, Default)]
pub struct RunQueue<const Q: usize> {
    tasks: Vec<Task, Q>,
}

impl<const Q: usize> RunQueue<Q> {
    /// Create an empty queue
    pub const fn new() -> Self {
        Self { tasks: Vec::new() }
    }

    /// Queue a task behind every task of equal or higher priority
    pub fn push(&mut self, task: Task) -> Result<(), Task> {
        let pos = self
            .tasks
            .iter()
            .position(|queued| queued.priority < task.priority)
            .unwrap_or(self.tasks.len());
        self.tasks.insert(pos, task)
    }

    /// Remove and return the highest priority task
    pub fn pop(&mut self) -> Option<Task> {
        if self.tasks.is_empty() {
            None
        } else {
            Some(self.tasks.remove(0))
        }
    }

    /// Number of queued tasks
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check if the queue is full
    pub fn is_full(&self) -> bool {
        self.tasks.is_full()
    }

    /// Queued tasks in dispatch order
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    fn take_all(&mut self) -> Vec<Task, Q> {
        core::mem::take(&mut self.tasks)
    }
}

/// Per-core scheduler state for `N` cores with queues of depth `Q`
pub struct Scheduler<const N: usize, const Q: usize> {
    /// Ready queue per core
    queues: [SpinLock<RunQueue<Q>>; N],
    /// Cores accepting work, bit `n` for core `n`
    online: AtomicU64,
    /// Preemption suspension depth
    preempt_depth: AtomicUsize,
}

impl<const N: usize, const Q: usize> Scheduler<N, Q> {
    /// Create a scheduler with only the boot core accepting work
    pub fn new() -> Self {
        Self {
            queues: core::array::from_fn(|_| SpinLock::new(RunQueue::new())),
            online: AtomicU64::new(CoreId::BOOT.mask()),
            preempt_depth: AtomicUsize::new(0),
        }
    }

    /// Start or stop accepting work on `core`
    pub fn set_core_online(&self, core: CoreId, online: bool) -> Result<(), SchedError> {
        let queue = self.queues.get(core.index()).ok_or(SchedError::InvalidCore)?;
        let _guard = queue.lock();
        if online {
            self.online.fetch_or(core.mask(), Ordering::AcqRel);
        } else {
            self.online.fetch_and(!core.mask(), Ordering::AcqRel);
        }
        log::debug!("Sched: {} {}", core, if online { "accepting work" } else { "closed" });
        Ok(())
    }

    /// Check if `core` is accepting work
    pub fn is_core_online(&self, core: CoreId) -> bool {
        self.online.load(Ordering::Acquire) & core.mask() != 0
    }

    /// Queue `task` on `core`
    ///
    /// The online bit is checked under the queue lock; `migrate_tasks` clears
    /// it while holding every queue lock, so nothing lands on a drained core.
    pub fn enqueue(&self, core: CoreId, task: Task) -> Result<(), SchedError> {
        let queue = self.queues.get(core.index()).ok_or(SchedError::InvalidCore)?;
        if !task.allows(core) {
            return Err(SchedError::AffinityMismatch);
        }
        let mut queue = queue.lock();
        if !self.is_core_online(core) {
            return Err(SchedError::CoreOffline);
        }
        queue.push(task).map_err(|_| SchedError::QueueFull)
    }

    /// Dequeue the next task to run on `core`
    pub fn pick_next(&self, core: CoreId) -> Option<Task> {
        self.queues.get(core.index())?.lock().pop()
    }

    /// Number of tasks queued on `core`
    pub fn queued(&self, core: CoreId) -> usize {
        self.queues
            .get(core.index())
            .map_or(0, |queue| queue.lock().len())
    }

    /// Check if preemption is currently suspended
    pub fn preemption_suspended(&self) -> bool {
        self.preempt_depth.load(Ordering::Acquire) > 0
    }
}

impl<const N: usize, const Q: usize> Default for Scheduler<N, Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize, const Q: usize> SchedulerOps for Scheduler<N, Q> {
    fn suspend_preemption(&self) {
        let depth = self.preempt_depth.fetch_add(1, Ordering::AcqRel);
        log::trace!("Sched: preemption suspended (depth {})", depth + 1);
    }

    fn resume_preemption(&self) {
        let prev = self
            .preempt_depth
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| depth.checked_sub(1));
        match prev {
            Ok(depth) => log::trace!("Sched: preemption resumed (depth {})", depth - 1),
            Err(_) => log::warn!("Sched: resume_preemption without matching suspend"),
        }
    }

    fn migrate_tasks(&self, core: CoreId) -> Result<(), MigrateError> {
        if !self.preemption_suspended() {
            return Err(MigrateError::PreemptionEnabled);
        }
        let src = core.index();
        if src >= N {
            return Err(MigrateError::InvalidCore);
        }

        // Every queue stays locked until the move is complete; always taken in index order
        let mut queues: Vec<SpinLockGuard<'_, RunQueue<Q>>, N> =
            self.queues.iter().map(SpinLock::lock).collect();

        let targets = self.online.load(Ordering::Acquire) & !core.mask();
        let mut load: [usize; N] = core::array::from_fn(|i| queues[i].len());
        let mut plan = [0usize; Q];

        for (dest_slot, task) in plan.iter_mut().zip(queues[src].iter()) {
            let dest = (0..N)
                .filter(|&c| c != src)
                .filter(|&c| targets & CoreId::new(c).mask() != 0)
                .filter(|&c| task.allows(CoreId::new(c)) && load[c] < Q)
                .min_by_key(|&c| load[c])
                .ok_or(MigrateError::NoDestination(task.id))?;
            load[dest] += 1;
            *dest_slot = dest;
        }

        let moving = queues[src].take_all();
        let count = moving.len();
        for (task, &dest) in moving.into_iter().zip(plan.iter()) {
            let pushed = queues[dest].push(task);
            debug_assert!(pushed.is_ok(), "capacity reserved during planning");
        }

        self.online.fetch_and(!core.mask(), Ordering::AcqRel);
        log::info!("Sched: migrated {} tasks off {}", count, core);
        Ok(())
    }
}
