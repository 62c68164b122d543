//! Trap vector dispatch and the supervisor-mode trap handler.
//!
//! `trapinithart` installs `kernelvec`, `usertrapret` rebuilds the
//! trapframe's kernel-return fields and jumps through `trampoline.S`'s
//! `userret`. What's filled in here is the `scause` demux: interrupt vs.
//! exception, S-timer tick vs. S-external PLIC claim, U-mode ecall vs.
//! fatal fault.

use crate::memlayout::TRAMPOLINE;
use crate::proc::{myproc, NOPROC};
use crate::riscv::{
    intr_off, r_satp, r_scause, r_sepc, r_stval, r_sstatus, r_tp, w_sepc, w_sstatus, w_stvec, PGSIZE, SSTATUS_SPIE,
    SSTATUS_SPP,
};
use crate::spinlock::Spinlock;
use crate::{proc, syscall, timer, MAKE_SATP};

#[cfg(not(any(feature = "std-test", feature = "kernel_as_a_lib")))]
extern "C" {
    static kernelvec: u8;
    static trampoline: u8;
    static uservec: u8;
    static userret: u8;
}
// `init_hart`/`user_trap_ret` (the only readers) are never exercised
// host-side; see DESIGN.md's "Known limitations".
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static kernelvec: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static trampoline: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static uservec: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static userret: u8 = 0;

static TICKS_LOCK: Spinlock = Spinlock::new("ticks");

/// Cause codes this module switches on.
const INTR_BIT: u64 = 1 << 63;
const IRQ_S_SOFT: u64 = 1;
const IRQ_S_TIMER: u64 = 5;
const IRQ_S_EXT: u64 = 9;
const EXC_ECALL_U: u64 = 8;

pub fn init() {
    // Nothing to build ahead of time; kept as a named entry point to mirror
    // the trapinit/trapinithart split.
}

/// Installs `kernelvec` into `stvec`: while the kernel itself is running,
/// traps go here rather than to `uservec`.
pub fn init_hart() {
    w_stvec((unsafe { &kernelvec } as *const u8) as usize);
}

fn trampoline_addr() -> usize {
    unsafe { &trampoline as *const u8 as usize }
}

/// Entered from `trampoline.S`'s `uservec` on every trap taken while a user
/// program was running: syscalls, faults, and interrupts alike.
#[no_mangle]
pub extern "C" fn user_trap() {
    assert_eq!(r_sstatus() as u64 & SSTATUS_SPP, 0, "user_trap: not from user mode");

    // Traps while in the kernel go to kernelvec from here on ("we're about
    // to switch the destination of traps... until we're back in user
    // space").
    let kernelvec_addr = (unsafe { &kernelvec } as *const u8) as usize;
    w_stvec(kernelvec_addr);

    let p = myproc();
    let scause = r_scause();

    unsafe {
        (*p.trapframe).epc = r_sepc() as u64;
    }

    if scause == INTR_BIT | EXC_ECALL_U {
        if p.killed {
            proc::exit(-1);
        }
        // advance past the ecall instruction before dispatch, so a
        // restarted syscall (there are none in this kernel) or the
        // fork-child's resumed pc lands just after it.
        unsafe {
            (*p.trapframe).epc += 4;
        }
        crate::riscv::intr_on();
        syscall::dispatch();
    } else if let Some(dev) = device_interrupt(scause) {
        if dev == Device::Timer {
            proc::r#yield();
        }
    } else {
        fatal_user_fault(scause);
    }

    if p.killed {
        proc::exit(-1);
    }

    user_trap_ret();
}

/// Terminates the current process on a fault that isn't an ecall: user-space
/// faults kill the process with exit status encoding the cause; the kernel
/// continues.
fn fatal_user_fault(scause: u64) {
    let p = myproc();
    crate::printf!(
        "pid {} ({}): trap scause={:#x} stval={:#x} - killing process\n",
        p.pid,
        core::str::from_utf8(&p.name).unwrap_or("?"),
        scause,
        r_stval()
    );
    p.killed = true;
}

/// Returns to user mode: rebuilds the trapframe's kernel-return fields and
/// jumps through `trampoline.S`'s `userret`, restored verbatim on return
/// with sret.
pub fn user_trap_ret() {
    let p = myproc();

    // Interrupts stay off until we're actually back in user space, where
    // user_trap (not kernel_trap) is again the correct handler.
    intr_off();

    let trampoline_base = trampoline_addr();
    let uservec_addr = (unsafe { &uservec } as *const u8) as usize;
    let trampoline_uservec = TRAMPOLINE + (uservec_addr - trampoline_base);
    w_stvec(trampoline_uservec);

    unsafe {
        (*p.trapframe).kernel_satp = r_satp() as u64;
        (*p.trapframe).kernel_sp = (p.kstack + crate::param::KSTACK_PAGES * PGSIZE) as u64;
        (*p.trapframe).kernel_trap = user_trap as usize as u64;
        (*p.trapframe).kernel_hartid = r_tp();
    }

    let mut x = r_sstatus();
    x &= !SSTATUS_SPP; // SPP=0: sret drops to user mode
    x |= SSTATUS_SPIE; // SPIE=1: interrupts resume once back in user mode
    w_sstatus(x);

    w_sepc(unsafe { (*p.trapframe).epc } as usize);

    let satp = MAKE_SATP!(p.pagetable as usize);

    let userret_addr = (unsafe { &userret } as *const u8) as usize;
    let trampoline_userret = TRAMPOLINE + (userret_addr - trampoline_base);

    unsafe {
        let func: extern "C" fn(usize) = core::mem::transmute(trampoline_userret);
        func(satp);
    }
}

#[derive(PartialEq, Eq)]
enum Device {
    Timer,
    External,
    Software,
}

/// Interrupt half of the `scause` demux, shared by `user_trap` and
/// `kernel_trap`. Returns `None` for anything that isn't a recognized
/// device interrupt (i.e. an exception).
fn device_interrupt(scause: u64) -> Option<Device> {
    if scause & INTR_BIT == 0 {
        return None;
    }
    match scause & !INTR_BIT {
        IRQ_S_EXT => {
            let irq = crate::plic::claim();
            if irq as usize == crate::memlayout::UART0_IRQ {
                crate::console::intr();
            }
            if irq != 0 {
                crate::plic::complete(irq);
            }
            Some(Device::External)
        }
        IRQ_S_TIMER => {
            if proc::cpuid() == 0 {
                TICKS_LOCK.acquire();
                timer::tick();
                TICKS_LOCK.release();
            } else {
                timer::rearm();
            }
            Some(Device::Timer)
        }
        IRQ_S_SOFT => Some(Device::Software),
        _ => None,
    }
}

/// Entered from `kernelvec.S` on every trap taken while the kernel itself
/// was running. Faults taken in supervisor mode other than from ecall are
/// fatal to the whole system.
#[no_mangle]
pub extern "C" fn kernel_trap() {
    let sepc = r_sepc();
    let sstatus = r_sstatus();
    let scause = r_scause();

    assert_ne!(sstatus as u64 & SSTATUS_SPP, 0, "kernel_trap: not from supervisor mode");
    assert!(!crate::riscv::intr_get(), "kernel_trap: interrupts enabled");

    match device_interrupt(scause) {
        Some(Device::Timer) => {
            // A timer tick landing while kernel code is running: yield at
            // this safe point if there's a process to hand the hart back
            // to (cooperative preemption at a safe point); the scheduler
            // itself has no current process to yield.
            if proc::current() != NOPROC {
                proc::r#yield();
            }
        }
        Some(_) => {}
        None => {
            crate::printf!("kernel_trap: unexpected scause={:#x} stval={:#x}\n", scause, r_stval());
            panic!("kernel_trap");
        }
    }

    // kernelvec.S restores the saved registers verbatim and sret's; sepc
    // and sstatus must be put back exactly as they were found, since a
    // yield above may have run other code that changed them.
    w_sepc(sepc);
    w_sstatus(sstatus);
}
