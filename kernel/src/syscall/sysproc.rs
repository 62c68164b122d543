//! Process/time/memory syscall handlers.
//!
//! Thin wrappers around `proc.rs` primitives that fetch their arguments
//! through `syscall::mod`'s helpers and return `KResult<isize>`, so
//! `dispatch` has one place that turns a `KernelError` into the ABI's
//! negative-errno convention.

use super::argaddr;
use crate::errno::{KResult, KernelError};
use crate::proc;
use crate::riscv::{PGSIZE, PTE_R, PTE_W};
use crate::timer;
use crate::uaccess;
use crate::vm;
use crate::PGROUNDUP;

#[repr(C)]
struct Timespec {
    tv_sec: i64,
    tv_nsec: i64,
}

fn timespec_bytes(ts: &Timespec) -> &[u8] {
    unsafe { core::slice::from_raw_parts(ts as *const Timespec as *const u8, core::mem::size_of::<Timespec>()) }
}

pub(super) fn sys_fork() -> KResult<isize> {
    proc::fork().map(|pid| pid as isize)
}

pub(super) fn sys_wait4() -> KResult<isize> {
    let status_addr = argaddr(1);
    let mut status = 0i32;
    let pid = proc::wait(&mut status)?;
    if status_addr != 0 {
        uaccess::copyout(status_addr, &(status as u32).to_le_bytes())?;
    }
    Ok(pid as isize)
}

pub(super) fn sys_getpid() -> KResult<isize> {
    Ok(proc::myproc().pid as isize)
}

pub(super) fn sys_getppid() -> KResult<isize> {
    Ok(proc::parent_pid() as isize)
}

pub(super) fn sys_sched_yield() -> KResult<isize> {
    proc::r#yield();
    Ok(0)
}

pub(super) fn sys_clock_gettime() -> KResult<isize> {
    let tp = argaddr(1);
    let (sec, nsec) = timer::clock_gettime();
    let ts = Timespec {
        tv_sec: sec as i64,
        tv_nsec: nsec as i64,
    };
    uaccess::copyout(tp, timespec_bytes(&ts))?;
    Ok(0)
}

/// `nanosleep`: on an early wake (only possible here via `kill`, since
/// there's no signal delivery), writes the remaining time to `rem` and
/// reports `EINTR`.
pub(super) fn sys_nanosleep() -> KResult<isize> {
    let req = argaddr(0);
    let rem = argaddr(1);
    let mut buf = [0u8; 16];
    uaccess::copyin(&mut buf, req)?;
    let req_sec = u64::from_le_bytes(buf[0..8].try_into().unwrap());
    let req_nsec = u64::from_le_bytes(buf[8..16].try_into().unwrap());

    let outcome = timer::nanosleep(req_sec, req_nsec);
    if outcome.interrupted {
        if rem != 0 {
            let ts = Timespec {
                tv_sec: outcome.rem_sec as i64,
                tv_nsec: outcome.rem_nsec as i64,
            };
            uaccess::copyout(rem, timespec_bytes(&ts))?;
        }
        return Err(KernelError::Eintr);
    }
    Ok(0)
}

/// `brk`: growing maps fresh zeroed frames via `vm::uvmalloc`; shrinking
/// unmaps whole pages above the new break. Passing 0 queries the current
/// break without changing it, matching glibc's usage.
pub(super) fn sys_brk() -> KResult<isize> {
    let p = proc::myproc();
    let new_size = argaddr(0);
    let old_sz = p.sz;

    if new_size == 0 {
        return Ok(old_sz as isize);
    }
    if new_size > old_sz {
        let sz = vm::uvmalloc(p.pagetable, old_sz, new_size, PTE_R | PTE_W).map_err(|_| KernelError::Enomem)?;
        p.sz = sz;
    } else if new_size < old_sz {
        let old_top = PGROUNDUP!(old_sz);
        let new_top = PGROUNDUP!(new_size);
        if new_top < old_top {
            vm::unmap(p.pagetable, new_top, (old_top - new_top) / PGSIZE, true);
        }
        p.sz = new_size;
    }
    Ok(p.sz as isize)
}
