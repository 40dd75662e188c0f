//! Configuration management
//!
//! Compile-time constants are generated by `build.rs`; [`KernelConfig`]
//! exposes them together with the feature switches at runtime.

include!(concat!(env!("OUT_DIR"), "/config.rs"));

/// Global hotplug configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KernelConfig {
    /// Number of cores managed by the hotplug subsystem
    pub ncpus: usize,
    /// Capacity of the hotplug notifier table
    pub max_notifiers: usize,
    /// Depth of each per-core ready queue
    pub run_queue_depth: usize,
    /// Enable debug output
    pub debug_enabled: bool,
    /// Enable verbose logging
    pub verbose_enabled: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            ncpus: SMP_NCPUS,
            max_notifiers: MAX_NOTIFIERS,
            run_queue_depth: RUN_QUEUE_DEPTH,
            debug_enabled: cfg!(feature = "debug"),
            verbose_enabled: cfg!(feature = "verbose"),
        }
    }
}

impl KernelConfig {
    /// Maximum log level implied by the feature switches
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose_enabled {
            log::LevelFilter::Trace
        } else if self.debug_enabled {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}
