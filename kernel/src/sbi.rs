//! SBI (Supervisor Binary Interface) ecalls into OpenSBI, running at a
//! higher privilege level underneath the kernel.
//!
//! Claudia boots straight into S-mode, so the legacy SBI extensions stand
//! in for the handful of M-mode-only facilities a firmware-free kernel
//! would otherwise reach for directly: console I/O as a debug fallback,
//! and rearming the timer.

#[cfg(target_arch = "riscv64")]
use core::arch::asm;

const SBI_EXT_CONSOLE_PUTCHAR: usize = 0x01;
const SBI_EXT_CONSOLE_GETCHAR: usize = 0x02;
const SBI_EXT_SET_TIMER: usize = 0x00;
const SBI_EXT_SHUTDOWN: usize = 0x08;

#[cfg(target_arch = "riscv64")]
#[inline(always)]
fn ecall(ext: usize, fid: usize, arg0: usize, arg1: usize) -> (usize, usize) {
    let (error, value);
    unsafe {
        asm!(
            "ecall",
            in("a7") ext,
            in("a6") fid,
            inlateout("a0") arg0 => error,
            inlateout("a1") arg1 => value);
    }
    (error, value)
}

#[cfg(not(target_arch = "riscv64"))]
fn ecall(_ext: usize, _fid: usize, _arg0: usize, _arg1: usize) -> (usize, usize) {
    (0, 0)
}

/// Writes a single byte to the legacy SBI console, bypassing the 16550 UART
/// entirely. Used by the panic handler, where the ordinary uart.rs driver
/// might itself be the thing that's broken.
pub fn console_putchar(c: u8) {
    ecall(SBI_EXT_CONSOLE_PUTCHAR, 0, c as usize, 0);
}

/// Polls the legacy SBI console. Returns `None` if no byte is waiting.
/// -1 on an empty queue is the legacy extension's documented convention.
pub fn console_getchar() -> Option<u8> {
    let (value, _) = ecall(SBI_EXT_CONSOLE_GETCHAR, 0, 0, 0);
    if value as isize == -1 {
        None
    } else {
        Some(value as u8)
    }
}

/// Requests the next timer interrupt fire when the `time` CSR reaches
/// `stime_value`. Supersedes writing CLINT mtimecmp directly, which is an
/// M-mode-only register the kernel can no longer reach from S-mode.
pub fn set_timer(stime_value: u64) {
    ecall(SBI_EXT_SET_TIMER, 0, stime_value as usize, (stime_value >> 32) as usize);
}

/// Legacy shutdown ecall. Used as a fallback on platforms without the
/// `TEST0` test-finisher mapping; `testdevice::poweroff` is otherwise
/// preferred because it also serves the hosted test harness's exit path.
pub fn shutdown() -> ! {
    ecall(SBI_EXT_SHUTDOWN, 0, 0, 0);
    loop {
        #[cfg(target_arch = "riscv64")]
        unsafe {
            asm!("wfi")
        }
        #[cfg(not(target_arch = "riscv64"))]
        core::hint::spin_loop();
    }
}
