//! Mutual exclusion lock.
//!
//! Claudia runs a single hart with a cooperative, non-reentrant scheduler -
//! no locks are needed because nothing preempts the running process except
//! a trap. A spinning `acquire` would therefore never actually contend -
//! but interrupts still happen (the timer, the UART), and a handler running
//! on top of code that's mid-update to shared state is the same hazard SMP
//! locking guards against. `Spinlock` is kept for that: `acquire`/`release`
//! bracket a critical section by disabling interrupts, the same
//! `push_off`/`pop_off` nesting discipline a multi-hart kernel uses, just
//! without the `amoswap` contention loop since there is provably only one
//! hart to contend with.

use crate::riscv::{intr_get, intr_off, intr_on};
use core::cell::Cell;
use core::sync::atomic::{AtomicBool, Ordering};

/// Nesting depth of `push_off` calls on this (the only) hart, and whether
/// interrupts were enabled before the first one.
struct IntrState {
    depth: Cell<usize>,
    were_enabled: Cell<bool>,
}

// SAFETY: single hart, and only ever touched with interrupts masked around
// the mutation (push_off/pop_off themselves toggle sstatus.SIE).
unsafe impl Sync for IntrState {}

static INTR_STATE: IntrState = IntrState {
    depth: Cell::new(0),
    were_enabled: Cell::new(false),
};

/// Disables interrupts, recording the previous state on first entry.
/// Nested calls only increment the depth counter.
pub fn push_off() {
    let were_enabled = intr_get();
    intr_off();
    if INTR_STATE.depth.get() == 0 {
        INTR_STATE.were_enabled.set(were_enabled);
    }
    INTR_STATE.depth.set(INTR_STATE.depth.get() + 1);
}

/// Undoes one `push_off`. Only re-enables interrupts once the outermost
/// `push_off` is matched.
pub fn pop_off() {
    if intr_get() {
        panic!("pop_off: interruptible");
    }
    let depth = INTR_STATE.depth.get();
    if depth == 0 {
        panic!("pop_off: not held");
    }
    INTR_STATE.depth.set(depth - 1);
    if depth - 1 == 0 && INTR_STATE.were_enabled.get() {
        intr_on();
    }
}

pub struct Spinlock {
    locked: AtomicBool,
    name: &'static str,
}

impl Spinlock {
    pub const fn new(name: &'static str) -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            name,
        }
    }

    pub fn acquire(&self) {
        push_off();
        if self.locked.swap(true, Ordering::Acquire) {
            panic!("Spinlock::acquire: already held: {}", self.name);
        }
    }

    pub fn release(&self) {
        if !self.locked.swap(false, Ordering::Release) {
            panic!("Spinlock::release: not held: {}", self.name);
        }
        pop_off();
    }

    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}
