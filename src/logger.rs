//! Logging infrastructure for CrabSD
//!
//! This module provides logging via the `log` crate, writing each record to a
//! console sink supplied by the platform with a millisecond timestamp taken
//! from the platform [`Clock`].

use core::fmt::{self, Write};

use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use spin::Once;

use crate::time::Clock;

/// Byte sink the log output goes to (UART, semihosting, ...)
pub trait Console: Sync {
    fn write_str(&self, s: &str);
}

struct ConsoleWriter<'a>(&'a dyn Console);

impl Write for ConsoleWriter<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Console::write_str(self.0, s);
        Ok(())
    }
}

struct Sink {
    console: &'static dyn Console,
    clock: &'static dyn Clock,
}

static SINK: Once<Sink> = Once::new();

/// Console logger
struct ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = SINK.get() {
            let mut writer = ConsoleWriter(sink.console);
            let _ = write_record(&mut writer, sink.clock.now_ms(), record.level(), *record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

/// Format one record as `[  timestamp] [LEVEL] message`
fn write_record(
    w: &mut dyn Write,
    timestamp_ms: u64,
    level: Level,
    args: fmt::Arguments<'_>,
) -> fmt::Result {
    let level_str = match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    };
    writeln!(w, "[{:>10}] [{}] {}", timestamp_ms, level_str, args)
}

/// Initialize the logging subsystem
///
/// Fails if another logger was installed first.
pub fn init(
    console: &'static dyn Console,
    clock: &'static dyn Clock,
) -> Result<(), SetLoggerError> {
    SINK.call_once(|| Sink { console, clock });
    log::set_logger(&LOGGER).map(|()| log::set_max_level(LevelFilter::Debug))
}

/// Set the maximum log level
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}
