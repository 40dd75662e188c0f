//! Kernel logging backend
//!
//! Routes the `log` facade to a console sink registered by the board code.
//! Lines have the form `[LEVEL target] message`.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};
use spin::Once;

use crate::config::KernelConfig;

/// Console output callback
pub type Sink = fn(fmt::Arguments<'_>);

/// `log::Log` implementation writing to a console sink
pub struct KernelLogger {
    sink: Once<Sink>,
    /// `LevelFilter` as usize
    level: AtomicUsize,
}

static LOGGER: KernelLogger = KernelLogger::new();

impl KernelLogger {
    /// Create a logger without a sink; records are dropped until one is set
    pub const fn new() -> Self {
        Self {
            sink: Once::new(),
            level: AtomicUsize::new(LevelFilter::Trace as usize),
        }
    }

    /// Most verbose level this logger emits
    pub fn level(&self) -> LevelFilter {
        match self.level.load(Ordering::Relaxed) {
            0 => LevelFilter::Off,
            1 => LevelFilter::Error,
            2 => LevelFilter::Warn,
            3 => LevelFilter::Info,
            4 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    /// Change the level this logger emits
    pub fn set_level(&self, level: LevelFilter) {
        self.level.store(level as usize, Ordering::Relaxed);
    }

    /// Set the console sink, returns false if one was already set
    pub fn set_sink(&self, sink: Sink) -> bool {
        let mut installed = false;
        self.sink.call_once(|| {
            installed = true;
            sink
        });
        installed
    }
}

impl Default for KernelLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = self.sink.get() {
            sink(format_args!(
                "[{:<5} {}] {}\n",
                record.level(),
                record.target(),
                record.args()
            ));
        }
    }

    fn flush(&self) {}
}

/// Install the kernel logger with the level selected by the build features
pub fn init(sink: Sink) -> Result<(), SetLoggerError> {
    let level = KernelConfig::default().log_level();
    LOGGER.set_sink(sink);
    LOGGER.set_level(level);
    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::{Level, LevelFilter};
    use std::fmt::Write;
    use std::sync::Mutex;

    static CAPTURED: Mutex<String> = Mutex::new(String::new());

    fn capture(args: fmt::Arguments<'_>) {
        let _ = CAPTURED.lock().unwrap().write_fmt(args);
    }

    #[test]
    fn test_record_format_and_filtering() {
        let logger = KernelLogger::new();
        assert!(logger.set_sink(capture));
        assert!(!logger.set_sink(capture));
        logger.set_level(LevelFilter::Info);
        assert_eq!(logger.level(), LevelFilter::Info);

        logger.log(
            &Record::builder()
                .level(Level::Warn)
                .target("ferro_cpuhp::core::hotplug")
                .args(format_args!("{} busy", "cpu2"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Trace)
                .target("ferro_cpuhp")
                .args(format_args!("dropped"))
                .build(),
        );

        let captured = CAPTURED.lock().unwrap();
        assert_eq!(*captured, "[WARN  ferro_cpuhp::core::hotplug] cpu2 busy\n");
    }

    #[test]
    fn test_level_is_per_logger() {
        let logger = KernelLogger::new();
        logger.set_level(LevelFilter::Warn);

        let warn = Metadata::builder().level(Level::Warn).build();
        let debug = Metadata::builder().level(Level::Debug).build();
        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&debug));

        logger.set_level(LevelFilter::Off);
        assert!(!logger.enabled(&warn));
    }

    #[test]
    fn test_init_installs_once() {
        fn discard(_: fmt::Arguments<'_>) {}

        assert!(init(discard).is_ok());
        assert!(init(discard).is_err());
    }

    #[test]
    fn test_without_sink_records_are_dropped() {
        let logger = KernelLogger::default();
        logger.log(&Record::builder().level(Level::Error).args(format_args!("x")).build());
        logger.flush();
    }
}
