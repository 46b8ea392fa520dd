//! Per-instance log gate on top of the `log` facade.
//!
//! The loader, the map and the body creator each carry a [`Logger`] instead
//! of sharing a process-wide filter, so two maps can be loaded with
//! different verbosity.

use log::{Level, LevelFilter};
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Logger {
    pub filter: LevelFilter,
}

impl Logger {
    pub const fn new(filter: LevelFilter) -> Self {
        Self { filter }
    }

    pub const fn silent() -> Self {
        Self::new(LevelFilter::Off)
    }

    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        level <= self.filter
    }
}

impl Default for Logger {
    /// Errors only.
    fn default() -> Self {
        Self::new(LevelFilter::Error)
    }
}

/// `emit!(logger, Warn, "fmt", args..)` forwards to `log::log!` when the
/// logger lets that level through.
macro_rules! emit {
    ($logger:expr, $level:ident, $($arg:tt)+) => {
        if $logger.enabled(::log::Level::$level) {
            ::log::log!(target: "macroquad_tmx", ::log::Level::$level, $($arg)+);
        }
    };
}

pub(crate) use emit;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_lets_only_errors_through() {
        let logger = Logger::default();
        assert!(logger.enabled(Level::Error));
        assert!(!logger.enabled(Level::Warn));
        assert!(!logger.enabled(Level::Info));
    }

    #[test]
    fn silent_blocks_everything() {
        assert!(!Logger::silent().enabled(Level::Error));
    }
}
