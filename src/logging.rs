//! Log output through the DOS console.

#![cfg(target_arch = "x86")]

use core::fmt::Write;
use log::{Level, Metadata, Record};

/// Global instance of the loader's logger.
static LOGGER: ConsoleLog = ConsoleLog {};

pub fn initialize_console_log() {
    log::set_logger(&LOGGER)
        .map(|()| log::set_max_level(log::LevelFilter::Debug))
        .unwrap();
}

struct ConsoleLog;

impl log::Log for ConsoleLog {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let mut writer = ConsoleWriter {};
            writeln!(&mut writer, "{}", record.args()).unwrap();
        }
    }

    fn flush(&self) {}
}

struct ConsoleWriter;

impl core::fmt::Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> core::fmt::Result {
        for c in s.bytes() {
            // DOS wants the carriage return spelled out.
            if c == b'\n' {
                crate::hal::x86::console_putc(b'\r');
            }
            crate::hal::x86::console_putc(c);
        }
        Ok(())
    }
}
