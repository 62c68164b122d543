//! User/kernel copy primitives.
//!
//! All user pointers are virtual addresses in the *currently active* user
//! page table, not identity-mapped kernel addresses - so `copyin`/`copyout`
//! walk `myproc().pagetable` explicitly via `vm::walk_perm` one page at a
//! time, rather than assuming the kernel can dereference a user pointer
//! directly.

use crate::errno::{KResult, KernelError};
use crate::proc::myproc;
use crate::riscv::{PageTable, PGSIZE, PTE_R, PTE_U, PTE_V, PTE_W};
use crate::vm;
use crate::PGROUNDDOWN;
use alloc::vec::Vec;

fn user_pagetable() -> *mut PageTable {
    myproc().pagetable
}

/// Checks that `len` bytes starting at `va` are mapped V|U, and (for writes)
/// W, without doing any copying - used to validate a buffer up front so a
/// partially-invalid range never produces a partial copy.
fn check_range(pt: *mut PageTable, va: usize, len: usize, need_write: bool) -> KResult<()> {
    if len == 0 {
        return Ok(());
    }
    let start = PGROUNDDOWN!(va);
    let end = PGROUNDDOWN!(va + len - 1);
    let mut a = start;
    loop {
        let flags = vm::walk_perm(pt, a).ok_or(KernelError::Efault)?;
        let required = PTE_V | PTE_U | PTE_R | if need_write { PTE_W } else { 0 };
        if flags & required != required {
            return Err(KernelError::Efault);
        }
        if a == end {
            return Ok(());
        }
        a += PGSIZE;
    }
}

/// Copies `dst.len()` bytes from user address `user_src` into `dst`.
pub fn copyin(dst: &mut [u8], user_src: usize) -> KResult<()> {
    let pt = user_pagetable();
    check_range(pt, user_src, dst.len(), false)?;
    let mut off = 0;
    while off < dst.len() {
        let va = user_src + off;
        let page_base = PGROUNDDOWN!(va);
        let pa_base = vm::walkaddr(pt, page_base).ok_or(KernelError::Efault)?;
        let page_off = va - page_base;
        let n = (PGSIZE - page_off).min(dst.len() - off);
        unsafe {
            core::ptr::copy_nonoverlapping((pa_base + page_off) as *const u8, dst.as_mut_ptr().add(off), n);
        }
        off += n;
    }
    Ok(())
}

/// Copies `src` into user address `user_dst`.
pub fn copyout(user_dst: usize, src: &[u8]) -> KResult<()> {
    let pt = user_pagetable();
    check_range(pt, user_dst, src.len(), true)?;
    let mut off = 0;
    while off < src.len() {
        let va = user_dst + off;
        let page_base = PGROUNDDOWN!(va);
        let pa_base = vm::walkaddr(pt, page_base).ok_or(KernelError::Efault)?;
        let page_off = va - page_base;
        let n = (PGSIZE - page_off).min(src.len() - off);
        unsafe {
            core::ptr::copy_nonoverlapping(src.as_ptr().add(off), (pa_base + page_off) as *mut u8, n);
        }
        off += n;
    }
    Ok(())
}

/// Copies a NUL-terminated string from user address `user_src`, stopping at
/// the first NUL or once `max` bytes have been read without finding one
/// (returns `Enametoolong`).
pub fn copyinstr(user_src: usize, max: usize) -> KResult<Vec<u8>> {
    let pt = user_pagetable();
    let mut out = Vec::with_capacity(max.min(256));
    let mut va = user_src;
    loop {
        if out.len() >= max {
            return Err(KernelError::Enametoolong);
        }
        let page_base = PGROUNDDOWN!(va);
        let pa_base = vm::walkaddr(pt, page_base).ok_or(KernelError::Efault)?;
        let page_off = va - page_base;
        let c = unsafe { core::ptr::read((pa_base + page_off) as *const u8) };
        if c == 0 {
            return Ok(out);
        }
        out.push(c);
        va += 1;
    }
}
