//! Sv39 page tables.
//!
//! Same three-level walk and the same `kvmmap`/`mappages`/`walk`/`freewalk`
//! shape as a classic xv6 port, but
//! - typed `Result<_, VmError>` instead of `-1`/`panic!`, naming the cases
//!   (`Misaligned`, `OutOfMemory`),
//! - frames come from `frame::alloc`/`frame::free` (the bitmap allocator)
//!   instead of a freelist `KMem`,
//! - VIRTIO0 is dropped from the kernel-global mapping set; `TEST0` is added,
//! - `clone_user_space` walks `src`'s U-accessible leaves, allocates a new
//!   frame per page, copies content, and maps it at the same vaddr in `dst`
//!   with identical permissions, replacing `uvmcopy`, which was never
//!   finished upstream.

use crate::frame;
use crate::memlayout::{CLINT, CLINT_MAP_SIZE, KERNBASE, PHYSTOP, PLIC, PLIC_MAP_SIZE, TEST0, TRAMPOLINE, UART0};
use crate::riscv::{sfence_vma, w_satp, MAXVA, PageTable, Pte, PGSIZE, PTE_R, PTE_SIZE, PTE_U, PTE_V, PTE_W, PTE_X};
use crate::string::{memmove, memset};
use crate::{MAKE_SATP, PA2PTE, PGROUNDDOWN, PGROUNDUP, PTE2PA, PTE_FLAGS, PX};

#[cfg(not(any(feature = "std-test", feature = "kernel_as_a_lib")))]
extern "C" {
    static etext: u8;
    static trampoline: u8;
}
// No linker-provided symbols on a host build (see DESIGN.md's "Known
// limitations"); `build_kernel_global_mappings` is never exercised by the
// host-side unit tests below, only linked.
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static etext: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static trampoline: u8 = 0;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VmError {
    Misaligned,
    OutOfMemory,
}

pub type VmResult<T> = Result<T, VmError>;

pub static mut KERNEL_PAGETABLE: *mut PageTable = core::ptr::null_mut();

/// Allocates a zeroed root frame and returns it as a page table.
pub fn init() -> VmResult<*mut PageTable> {
    let frame = frame::alloc().ok_or(VmError::OutOfMemory)?;
    memset(frame as *mut u8, 0, PGSIZE);
    Ok(frame as *mut PageTable)
}

/// Walks `pagetable` down to the PTE for `va`, allocating intermediate
/// tables along the way when `alloc` is true.
fn walk(pagetable: *mut PageTable, va: usize, alloc: bool) -> Option<*mut Pte> {
    if va >= MAXVA {
        return None;
    }
    let mut pt = pagetable;
    for level in (1..3).rev() {
        let pte: *mut Pte = unsafe { &mut (*pt).0[PX!(level, va)] as *mut Pte };
        let val = unsafe { (*pte).0 };
        if val & PTE_V != 0 {
            pt = PTE2PA!(val) as *mut PageTable;
        } else {
            if !alloc {
                return None;
            }
            let child = frame::alloc()?;
            memset(child as *mut u8, 0, PGSIZE);
            unsafe { (*pte) = Pte(PA2PTE!(child) | PTE_V) };
            pt = child as *mut PageTable;
        }
    }
    Some(unsafe { &mut (*pt).0[PX!(0, va)] as *mut Pte })
}

/// Maps `size` bytes starting at `va` to physical frames starting at `pa`,
/// with permission bits `perm` (V is added automatically). `va`/`pa` must
/// already be page-aligned; this asserts rather than silently rounding.
pub fn map(pagetable: *mut PageTable, va: usize, pa: usize, size: usize, perm: usize) -> VmResult<()> {
    if va % PGSIZE != 0 || pa % PGSIZE != 0 {
        return Err(VmError::Misaligned);
    }
    if size == 0 {
        return Ok(());
    }
    let mut a = PGROUNDDOWN!(va);
    let last = PGROUNDDOWN!(va + size - 1);
    let mut p = pa;
    loop {
        let pte = walk(pagetable, a, true).ok_or(VmError::OutOfMemory)?;
        if unsafe { (*pte).0 } & PTE_V != 0 {
            panic!("vm::map: remap at {:#x}", a);
        }
        unsafe { *pte = Pte(PA2PTE!(p) | perm | PTE_V) };
        if a == last {
            return Ok(());
        }
        a += PGSIZE;
        p += PGSIZE;
    }
}

/// Translates a virtual address to its physical frame base, or `None` if
/// any level along the walk lacks V.
pub fn translate(pagetable: *mut PageTable, va: usize) -> Option<usize> {
    let pte = walk(pagetable, PGROUNDDOWN!(va), false)?;
    let val = unsafe { (*pte).0 };
    if val & PTE_V == 0 {
        return None;
    }
    Some(PTE2PA!(val))
}

/// Same as `translate`, but returns the exact byte address rather than the
/// containing frame's base - used by `uaccess` to resolve a user pointer
/// that isn't page-aligned.
pub fn walkaddr(pagetable: *mut PageTable, va: usize) -> Option<usize> {
    let pte = walk(pagetable, PGROUNDDOWN!(va), false)?;
    let val = unsafe { (*pte).0 };
    if val & PTE_V == 0 || val & PTE_U == 0 {
        return None;
    }
    Some(PTE2PA!(val) + (va % PGSIZE))
}

/// Returns the leaf PTE's permission bits for `va`, or `None` if unmapped -
/// used by `uaccess` to check V|U|R (and W for copyout) precisely rather than
/// just presence.
pub fn walk_perm(pagetable: *mut PageTable, va: usize) -> Option<usize> {
    let pte = walk(pagetable, PGROUNDDOWN!(va), false)?;
    let val = unsafe { (*pte).0 };
    if val & PTE_V == 0 {
        return None;
    }
    Some(PTE_FLAGS!(val))
}

/// Unmaps `npages` pages starting at `va`, optionally freeing the backing
/// frames.
pub fn unmap(pagetable: *mut PageTable, va: usize, npages: usize, do_free: bool) {
    assert_eq!(va % PGSIZE, 0, "vm::unmap: unaligned va");
    for i in 0..npages {
        let a = va + i * PGSIZE;
        let pte = match walk(pagetable, a, false) {
            Some(pte) => pte,
            None => continue,
        };
        let val = unsafe { (*pte).0 };
        if val & PTE_V == 0 {
            continue;
        }
        if PTE_FLAGS!(val) == PTE_V {
            panic!("vm::unmap: {:#x} is not a leaf", a);
        }
        if do_free {
            frame::free(PTE2PA!(val));
        }
        unsafe { *pte = Pte(0) };
    }
}

/// Recursively frees every child table below `pagetable`, then the root.
/// All leaf mappings must already have been unmapped.
fn freewalk(pagetable: *mut PageTable) {
    for i in 0..PTE_SIZE {
        let pte = unsafe { &mut (*pagetable).0[i] as *mut Pte };
        let val = unsafe { (*pte).0 };
        if val & PTE_V != 0 && val & (PTE_R | PTE_W | PTE_X) == 0 {
            freewalk(PTE2PA!(val) as *mut PageTable);
            unsafe { *pte = Pte(0) };
        }
    }
    frame::free(pagetable as usize);
}

/// Tears down an address space: unmaps `sz` bytes of user mappings, frees
/// their frames, then frees every page-table page.
pub fn deinit(pagetable: *mut PageTable, sz: usize) {
    if sz > 0 {
        unmap(pagetable, 0, PGROUNDUP!(sz) / PGSIZE, true);
    }
    freewalk(pagetable);
}

/// Populates `pt` with the mappings every address space must share
/// identically: kernel text/data/heap identity, MMIO, and per-process kernel
/// stacks. All flagged `G` by OR'ing the caller-visible permission bits
/// below with `PTE_G` here rather than at each call site.
pub fn build_kernel_global_mappings(pt: *mut PageTable) -> VmResult<()> {
    use crate::riscv::PTE_G;

    map(pt, UART0, UART0, PGSIZE, PTE_R | PTE_W | PTE_G)?;
    map(pt, CLINT, CLINT, CLINT_MAP_SIZE, PTE_R | PTE_W | PTE_G)?;
    map(pt, PLIC, PLIC, PLIC_MAP_SIZE, PTE_R | PTE_W | PTE_G)?;
    map(pt, TEST0, TEST0, PGSIZE, PTE_R | PTE_W | PTE_G)?;

    let etext_addr = unsafe { &etext as *const u8 as usize };
    map(pt, KERNBASE, KERNBASE, etext_addr - KERNBASE, PTE_R | PTE_X | PTE_G)?;
    map(pt, etext_addr, etext_addr, PHYSTOP - etext_addr, PTE_R | PTE_W | PTE_G)?;

    let trampoline_addr = unsafe { &trampoline as *const u8 as usize };
    map(pt, TRAMPOLINE, trampoline_addr, PGSIZE, PTE_R | PTE_X | PTE_G)?;

    crate::proc::map_kernel_stacks(pt)?;
    Ok(())
}

/// Installs `pt` as the live kernel page table and turns on paging. Must
/// only run once `pt` has been fully built and self-translation-tested.
pub fn enable(pt: *mut PageTable) {
    sfence_vma();
    unsafe { KERNEL_PAGETABLE = pt };
    w_satp(MAKE_SATP!(pt as usize));
    sfence_vma();
}

/// Allocates an empty user page table.
pub fn uvmcreate() -> VmResult<*mut PageTable> {
    init()
}

/// Copies `src` (a page-table's worth of U-accessible leaves) into a fresh
/// frame per page and maps it at the identical vaddr/permission in `dst`.
pub fn clone_user_space(src: *mut PageTable, dst: *mut PageTable, sz: usize) -> VmResult<()> {
    let mut copied = 0usize;
    while copied < sz {
        let pte = walk(src, copied, false).ok_or(VmError::OutOfMemory)?;
        let val = unsafe { (*pte).0 };
        if val & PTE_V == 0 {
            panic!("vm::clone_user_space: {:#x} not mapped", copied);
        }
        let pa = PTE2PA!(val);
        let flags = PTE_FLAGS!(val);
        let new_frame = match frame::alloc() {
            Some(f) => f,
            None => {
                unmap(dst, 0, copied / PGSIZE, true);
                return Err(VmError::OutOfMemory);
            }
        };
        memmove(new_frame as *mut u8, pa as *const u8, PGSIZE);
        if let Err(e) = map(dst, copied, new_frame, PGSIZE, flags) {
            frame::free(new_frame);
            unmap(dst, 0, copied / PGSIZE, true);
            return Err(e);
        }
        copied += PGSIZE;
    }
    Ok(())
}

/// Grows a user address space from `old_sz` to `new_sz`, allocating and
/// mapping frames for the new region with the given permission bits.
pub fn uvmalloc(pagetable: *mut PageTable, old_sz: usize, new_sz: usize, perm: usize) -> VmResult<usize> {
    if new_sz < old_sz {
        return Ok(old_sz);
    }
    let old_sz = PGROUNDUP!(old_sz);
    let mut a = old_sz;
    while a < new_sz {
        let frame = match frame::alloc() {
            Some(f) => f,
            None => {
                unmap(pagetable, old_sz, (a - old_sz) / PGSIZE, true);
                return Err(VmError::OutOfMemory);
            }
        };
        memset(frame as *mut u8, 0, PGSIZE);
        if let Err(e) = map(pagetable, a, frame, PGSIZE, perm | PTE_U) {
            frame::free(frame);
            unmap(pagetable, old_sz, (a - old_sz) / PGSIZE, true);
            return Err(e);
        }
        a += PGSIZE;
    }
    Ok(new_sz)
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;

    #[test]
    fn map_then_translate_roundtrips() {
        crate::frame::init(0x9000_0000);
        let pt = init().unwrap();
        let frame = crate::frame::alloc().unwrap();
        map(pt, 0x1000, frame, PGSIZE, PTE_R | PTE_W).unwrap();
        assert_eq!(translate(pt, 0x1000), Some(frame));
        assert_eq!(translate(pt, 0x2000), None);
    }

    #[test]
    fn map_rejects_misaligned_addresses() {
        crate::frame::init(0x9100_0000);
        let pt = init().unwrap();
        let frame = crate::frame::alloc().unwrap();
        assert_eq!(map(pt, 0x1001, frame, PGSIZE, PTE_R).unwrap_err(), VmError::Misaligned);
    }
}
