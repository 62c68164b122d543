//! QEMU `virt` test/poweroff finisher device.
//!
//! A magic `u32` store at `memlayout::TEST0` shuts the machine down or
//! reboots it. Claudia uses it both ways: as the kernel's own power
//! syscalls, and - gated behind `std-test` - as the exit path for the
//! hosted test harness.

use crate::memlayout::{TEST0, TEST0_REBOOT, TEST0_SHUTDOWN};
use core::ptr::write_volatile;

/// Halts the virtual machine. Never returns.
pub fn poweroff() -> ! {
    unsafe {
        write_volatile(TEST0 as *mut u32, TEST0_SHUTDOWN);
    }
    // SBI console ecall shutdown is the fallback if the finisher device
    // isn't actually mapped (e.g. a different virt revision).
    crate::sbi::shutdown()
}

/// Resets the virtual machine. Never returns.
pub fn reboot() -> ! {
    unsafe {
        write_volatile(TEST0 as *mut u32, TEST0_REBOOT);
    }
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    // Nothing to unit test here - this module's only effect is an MMIO
    // write that halts QEMU.
}
