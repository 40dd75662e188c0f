//! AArch64 CPU operations over PSCI
//!
//! Cores are numbered by `MPIDR_EL1.Aff0` within cluster 0.
//!
//! PSCI `CPU_OFF` only acts on the calling core, so one core cannot switch
//! another off directly. [`PsciCpuOps::power_down`] posts a park request,
//! wakes the target with SEV and polls `AFFINITY_INFO` until firmware reports
//! it off.
//!
//! The target consumes the request through [`PsciCpuOps::park_if_requested`],
//! which must be called from two places:
//! - the idle loop, after WFI/WFE returns
//! - the timer tick, on every core, including while preemption is suspended
//!
//! The tick path is what reaches a core that is busy with a task when the
//! request arrives: suspending preemption stops task switches, not the tick.
//! Before parking from the tick, the scheduler must hand the interrupted task
//! back to a ready queue on another core; [`PsciCpuOps::park_pending`] tells
//! it when that is needed.
//!
//! ## References
//! - [ARM PSCI Specification](https://developer.arm.com/documentation/den0022/latest/)
//! - [SMC Calling Convention](https://developer.arm.com/documentation/den0028/latest/)

use core::hint::spin_loop;

use aarch64_cpu::asm;
use aarch64_cpu::registers::MPIDR_EL1;
use tock_registers::interfaces::Readable;

use super::psci::{self, fn_id, ActivityWord, AffinityState, CoreActivity, ParkRequests};
use super::{ArchCpuOps, Error, HardwareState};
use crate::config::SMP_NCPUS;
use crate::core::hotplug::CoreId;

/// Default number of `AFFINITY_INFO` polls before a power-down times out
pub const DEFAULT_POLL_LIMIT: usize = 100_000;

/// Instruction used to reach PSCI firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conduit {
    /// Secure monitor call, firmware at EL3
    Smc,
    /// Hypervisor call, firmware emulated at EL2
    Hvc,
}

impl Conduit {
    /// Issue a PSCI call and return `x0`
    fn call(self, function: u32, arg0: u64, arg1: u64, arg2: u64) -> u64 {
        let mut x0 = function as u64;
        // SAFETY: SMCCC call; x0-x3 carry the arguments and results and the
        // remaining caller-saved registers are declared clobbered.
        unsafe {
            match self {
                Conduit::Smc => core::arch::asm!(
                    "smc #0",
                    inlateout("x0") x0,
                    inlateout("x1") arg0 => _,
                    inlateout("x2") arg1 => _,
                    inlateout("x3") arg2 => _,
                    clobber_abi("system")
                ),
                Conduit::Hvc => core::arch::asm!(
                    "hvc #0",
                    inlateout("x0") x0,
                    inlateout("x1") arg0 => _,
                    inlateout("x2") arg1 => _,
                    inlateout("x3") arg2 => _,
                    clobber_abi("system")
                ),
            }
        }
        x0
    }
}

const IDLE: ActivityWord = ActivityWord::new(CoreActivity::Idle);

/// PSCI implementation of [`ArchCpuOps`]
pub struct PsciCpuOps {
    conduit: Conduit,
    poll_limit: usize,
    /// Published by each core's idle loop
    activity: [ActivityWord; SMP_NCPUS],
    /// Pending park requests
    park: ParkRequests<SMP_NCPUS>,
}

impl PsciCpuOps {
    /// Create the backend for the given conduit
    pub const fn new(conduit: Conduit) -> Self {
        Self {
            conduit,
            poll_limit: DEFAULT_POLL_LIMIT,
            activity: [IDLE; SMP_NCPUS],
            park: ParkRequests::new(),
        }
    }

    /// Override the power-down poll budget
    pub const fn with_poll_limit(mut self, poll_limit: usize) -> Self {
        self.poll_limit = poll_limit;
        self
    }

    /// Called by the scheduler when the current core picks up a task
    pub fn mark_running(&self) {
        self.publish(CoreActivity::Running);
    }

    /// Called by the idle loop before waiting for work
    pub fn mark_idle(&self) {
        self.publish(CoreActivity::Idle);
    }

    /// Called by the idle loop right after WFI/WFE returns
    pub fn mark_woken(&self) {
        self.publish(CoreActivity::WakeFromSleep);
    }

    /// Check if the current core has been asked to park
    pub fn park_pending(&self) -> bool {
        self.park.pending(self.current_core())
    }

    /// Power the current core off if another core asked for it
    ///
    /// Call from the idle loop and from the timer tick. Returns `Ok(())` when
    /// no request is pending. On success `CPU_OFF` does not return.
    pub fn park_if_requested(&self) -> Result<(), Error> {
        let core = self.current_core();
        if !self.park.take(core) {
            return Ok(());
        }

        log::info!("PSCI: {} parking", core);
        let x0 = self.conduit.call(fn_id::CPU_OFF, 0, 0, 0);

        // CPU_OFF only comes back on failure
        let err = match psci::check(x0) {
            Err(err) => err,
            Ok(_) => Error::Denied,
        };
        log::error!("PSCI: {} CPU_OFF failed: {}", core, err);
        Err(err)
    }

    fn publish(&self, activity: CoreActivity) {
        if let Some(word) = self.activity.get(self.current_core().index()) {
            word.set(activity);
        }
    }

    fn affinity_info(&self, core: CoreId) -> Result<AffinityState, Error> {
        let x0 = self
            .conduit
            .call(fn_id::AFFINITY_INFO_64, core.index() as u64, 0, 0);
        AffinityState::from_ret(x0)
    }

    fn wait_off(&self, core: CoreId) -> Result<(), Error> {
        for _ in 0..self.poll_limit {
            if self.affinity_info(core)? == AffinityState::Off {
                return Ok(());
            }
            spin_loop();
        }
        Err(Error::Timeout)
    }
}

impl ArchCpuOps for PsciCpuOps {
    fn current_core(&self) -> CoreId {
        CoreId::new((MPIDR_EL1.get() & 0xFF) as usize)
    }

    fn core_state(&self, core: CoreId) -> HardwareState {
        let Some(activity) = self.activity.get(core.index()) else {
            return HardwareState::Offline;
        };
        match self.affinity_info(core) {
            Ok(affinity) => psci::hardware_state(affinity, activity.get()),
            Err(err) => {
                log::warn!("PSCI: AFFINITY_INFO for {} failed: {}", core, err);
                activity.get().into()
            }
        }
    }

    fn power_down(&self, core: CoreId) -> Result<(), Error> {
        if !self.park.post(core) {
            return Err(Error::InvalidParameters);
        }
        // Wakes an idle target; a busy one sees the request on its next tick
        asm::sev();

        let result = self.wait_off(core);
        match result {
            Ok(()) => log::debug!("PSCI: {} reports off", core),
            Err(err) => {
                // The core may still consume a late request
                self.park.withdraw(core);
                log::warn!("PSCI: {} did not power down: {}", core, err);
            }
        }
        result
    }
}
