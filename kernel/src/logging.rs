//! Wires the `log` facade to the console sink that `printf!` writes
//! through, with a real level filter driven by the `log-debug` cargo
//! feature.

use crate::console;
use core::fmt::Write;
use log::{Level, Metadata, Record};

struct ConsoleLogger;

static LOGGER: ConsoleLogger = ConsoleLogger;

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if cfg!(feature = "log-debug") {
            metadata.level() <= Level::Debug
        } else {
            metadata.level() <= Level::Info
        }
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut guard = console::writer();
        let _ = write!(guard, "[{:>5}] {}\n", record.level(), record.args());
    }

    fn flush(&self) {}
}

/// Installs the global logger. Must run once, before any other hart could
/// plausibly call `log::*!` - in practice that means "first thing kmain on
/// hart 0 does after the console is up."
pub fn init() {
    log::set_logger(&LOGGER)
        .map(|()| {
            log::set_max_level(if cfg!(feature = "log-debug") {
                log::LevelFilter::Debug
            } else {
                log::LevelFilter::Info
            })
        })
        .expect("logger already installed");
}
