//! Console device: line discipline over the UART.
//!
//! A real interrupt-driven console appends incoming bytes to a ring buffer
//! from its ISR and wakes a sleeping reader. Claudia's cooperative scheduler
//! has no interrupt-driven wakeup path into a blocked read, so `read`
//! instead yields in a loop polling `uart::getc` directly, and there is no
//! separate input ring buffer to manage - `intr` below only exists to drain
//! and discard characters that arrive while nobody is reading, same as a
//! real terminal's overrun behavior.

use crate::errno::KResult;
use crate::proc::r#yield;
use crate::spinlock::Spinlock;
use crate::uart;
use core::fmt::{self, Write};

static PRINT_LOCK: Spinlock = Spinlock::new("console");

pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for b in s.bytes() {
            putc(b);
        }
        Ok(())
    }
}

/// Acquires the console print lock and returns a `core::fmt::Write` sink.
/// Used by `printf!` and by `logging::ConsoleLogger` so interleaved writers
/// don't garble each other's lines.
pub fn writer() -> ConsoleWriterGuard {
    PRINT_LOCK.acquire();
    ConsoleWriterGuard
}

pub struct ConsoleWriterGuard;

impl Write for ConsoleWriterGuard {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        ConsoleWriter.write_str(s)
    }
}

impl Drop for ConsoleWriterGuard {
    fn drop(&mut self) {
        PRINT_LOCK.release();
    }
}

const BACKSPACE: u8 = 0x7f;

fn putc(c: u8) {
    if c == BACKSPACE {
        uart::putc(0x08);
        uart::putc(b' ');
        uart::putc(0x08);
    } else {
        uart::putc(c);
    }
}

/// Reads up to `buf.len()` bytes, stopping at (and including) the first
/// newline - a line-at-a-time contract. Yields between polls so other
/// runnable processes get the hart.
pub fn read(buf: &mut [u8]) -> KResult<usize> {
    if buf.is_empty() {
        return Ok(0);
    }
    let mut n = 0;
    loop {
        match uart::getc() {
            Some(c) => {
                let c = if c == b'\r' { b'\n' } else { c };
                putc(c); // echo
                buf[n] = c;
                n += 1;
                if c == b'\n' || n == buf.len() {
                    return Ok(n);
                }
            }
            None => r#yield(),
        }
    }
}

pub fn write(buf: &[u8]) -> KResult<usize> {
    for &b in buf {
        putc(b);
    }
    Ok(buf.len())
}

/// Drains (and discards) anything waiting in the UART FIFO. Called from the
/// PLIC external-interrupt path so an unread byte doesn't keep re-raising
/// IRQ 10.
pub fn intr() {
    uart::intr();
}

pub fn init() {
    uart::init();
}
