//! Platform-Level Interrupt Controller routing.
//!
//! Claudia has no block device, so UART0_IRQ (10) is the only external
//! interrupt source routed.

use crate::memlayout::UART0_IRQ;
use crate::proc::cpuid;
use crate::{PLIC_SCLAIM, PLIC_SENABLE, PLIC_SPRIORITY};
use core::ptr::{read_volatile, write_volatile};

/// Global init: give the UART's interrupt source a non-zero priority (the
/// PLIC disables priority-0 sources unconditionally).
pub fn init() {
    let uart_priority = (crate::memlayout::PLIC + UART0_IRQ * 4) as *mut u32;
    unsafe { write_volatile(uart_priority, 1) };
}

/// Per-hart init: enable the UART source for this hart's S-mode context and
/// drop the priority threshold to 0 so nothing is masked.
pub fn init_hart() {
    let hart = cpuid();
    unsafe {
        write_volatile(PLIC_SENABLE!(hart) as *mut u32, 1 << UART0_IRQ);
        write_volatile(PLIC_SPRIORITY!(hart) as *mut u32, 0);
    }
}

/// Asks the PLIC which interrupt to service next.
pub fn claim() -> u32 {
    let hart = cpuid();
    unsafe { read_volatile(PLIC_SCLAIM!(hart) as *const u32) }
}

/// Tells the PLIC this IRQ has been handled.
pub fn complete(irq: u32) {
    let hart = cpuid();
    unsafe { write_volatile(PLIC_SCLAIM!(hart) as *mut u32, irq) };
}
