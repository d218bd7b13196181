//! Logging without global state.
//!
//! Components that want to report progress take a `&dyn Logger` from their
//! owner. [`NoopLogger`] is the default everywhere; hosts that use the `log`
//! facade can pass a [`LogCrateLogger`].

use core::fmt;

/// Severity of a log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<Level> for log::Level {
    fn from(level: Level) -> Self {
        match level {
            Level::Error => log::Level::Error,
            Level::Warn => log::Level::Warn,
            Level::Info => log::Level::Info,
            Level::Debug => log::Level::Debug,
            Level::Trace => log::Level::Trace,
        }
    }
}

pub trait Logger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>);

    fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args)
    }

    fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args)
    }

    fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args)
    }

    fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args)
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLogger;

impl Logger for NoopLogger {
    fn log(&self, _level: Level, _args: fmt::Arguments<'_>) {}
}

/// Forwards to whatever logger is installed behind the `log` facade.
#[derive(Debug, Clone, Copy)]
pub struct LogCrateLogger {
    target: &'static str,
}

impl LogCrateLogger {
    pub const DEFAULT_TARGET: &'static str = "taproot_assets";

    pub const fn new(target: &'static str) -> Self {
        LogCrateLogger { target }
    }
}

impl Default for LogCrateLogger {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TARGET)
    }
}

impl Logger for LogCrateLogger {
    fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        log::log!(target: self.target, log::Level::from(level), "{}", args);
    }
}
