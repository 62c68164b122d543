//! Timekeeping and the sleep queue.
//!
//! Built on top of `riscv::r_time` (the `time` CSR) and `sbi::set_timer`: a
//! fixed frequency constant converts cycles to seconds/nanoseconds. QEMU's
//! `virt` machine publishes a 10 MHz timebase in its generated device tree;
//! that's the conventional default assumed here since there is no DTB
//! parser in scope to read it back.

use crate::param::{NPROC, TICKS_HZ};
use crate::proc::{self, myproc};
use crate::riscv::r_time;
use crate::sbi;
use crate::spinlock::Spinlock;
use core::sync::atomic::{AtomicU64, Ordering};

/// QEMU `virt`'s CLINT timebase frequency, in Hz.
pub const CLOCK_FREQ_HZ: u64 = 10_000_000;

static BOOT_CYCLES: AtomicU64 = AtomicU64::new(0);

fn cycles() -> u64 {
    r_time()
}

fn cycles_per_tick() -> u64 {
    CLOCK_FREQ_HZ / TICKS_HZ
}

fn nanos_to_cycles(nanos: u64) -> u64 {
    // nanos * CLOCK_FREQ_HZ / 1e9, reordered to avoid overflow for the
    // sleep durations this kernel plausibly sees (up to a few seconds).
    (nanos / 1000) * (CLOCK_FREQ_HZ / 1_000_000)
}

fn cycles_to_nanos(cycles: u64) -> u64 {
    (cycles / (CLOCK_FREQ_HZ / 1_000_000)) * 1000
}

/// Arms the first S-timer interrupt and records the boot cycle count.
/// Must run once, before interrupts are enabled.
pub fn init() {
    BOOT_CYCLES.store(cycles(), Ordering::Relaxed);
    sbi::set_timer(cycles() + cycles_per_tick());
}

/// Re-arms the next S-timer interrupt. Called from `trap::kernel_trap`/
/// `trap::user_trap` on every S-timer cause.
pub fn rearm() {
    sbi::set_timer(cycles() + cycles_per_tick());
}

/// Seconds+nanoseconds elapsed since boot, for `clock_gettime`.
pub fn clock_gettime() -> (u64, u64) {
    let elapsed = cycles() - BOOT_CYCLES.load(Ordering::Relaxed);
    let nanos = cycles_to_nanos(elapsed);
    (nanos / 1_000_000_000, nanos % 1_000_000_000)
}

struct SleepEntry {
    chan: usize,
    wake_cycles: u64,
}

static SLEEP_LOCK: Spinlock = Spinlock::new("sleep_list");
static mut SLEEP_LIST: [Option<SleepEntry>; NPROC] = [const { None }; NPROC];

fn insert_sleeper(chan: usize, wake_cycles: u64) {
    SLEEP_LOCK.acquire();
    unsafe {
        let slot = SLEEP_LIST.iter_mut().find(|e| e.is_none()).expect("timer: sleep list full");
        *slot = Some(SleepEntry { chan, wake_cycles });
    }
    SLEEP_LOCK.release();
}

fn remove_sleeper(chan: usize) {
    SLEEP_LOCK.acquire();
    unsafe {
        for e in SLEEP_LIST.iter_mut() {
            if e.as_ref().map(|s| s.chan) == Some(chan) {
                *e = None;
            }
        }
    }
    SLEEP_LOCK.release();
}

/// Scans the sleep list for expired entries and wakes their processes.
/// Called from `tick` below, itself invoked by the trap handler.
fn wake_expired() {
    let now = cycles();
    SLEEP_LOCK.acquire();
    let expired: [Option<usize>; NPROC] = unsafe {
        let mut out: [Option<usize>; NPROC] = [None; NPROC];
        for (i, e) in SLEEP_LIST.iter_mut().enumerate() {
            if let Some(s) = e {
                if s.wake_cycles <= now {
                    out[i] = Some(s.chan);
                    *e = None;
                }
            }
        }
        out
    };
    SLEEP_LOCK.release();
    for chan in expired.into_iter().flatten() {
        proc::wakeup(chan);
    }
}

/// Re-arms the timer, advances the tick counter (waking `TICKS`-chan
/// sleepers via `proc::tick`), and wakes any expired `nanosleep`s. Yielding
/// back to the scheduler is left to the caller.
pub fn tick() {
    rearm();
    proc::tick();
    wake_expired();
}

pub struct SleepOutcome {
    pub interrupted: bool,
    pub rem_sec: u64,
    pub rem_nsec: u64,
}

/// Blocks the calling process until `req_sec`/`req_nsec` have elapsed, or it
/// is killed first. There is no signal delivery in this kernel, so "early
/// wake" in practice only happens via `kill`.
pub fn nanosleep(req_sec: u64, req_nsec: u64) -> SleepOutcome {
    let wake = cycles() + nanos_to_cycles(req_sec * 1_000_000_000 + req_nsec);
    let chan = myproc() as *const _ as usize;
    insert_sleeper(chan, wake);

    SLEEP_LOCK.acquire();
    proc::sleep(chan, &SLEEP_LOCK);
    SLEEP_LOCK.release();

    remove_sleeper(chan);

    let now = cycles();
    if now >= wake {
        SleepOutcome {
            interrupted: false,
            rem_sec: 0,
            rem_nsec: 0,
        }
    } else {
        let rem_nanos = cycles_to_nanos(wake - now);
        SleepOutcome {
            interrupted: true,
            rem_sec: rem_nanos / 1_000_000_000,
            rem_nsec: rem_nanos % 1_000_000_000,
        }
    }
}
