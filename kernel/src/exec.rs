//! Program image replacement.
//!
//! Claudia has neither inodes nor a disk, so the image lookup here is a
//! short-name registry over the embedded `_user_*` blobs, falling back to a
//! VFS path read for anything else, and the address-space build writes
//! directly through physical addresses returned by `vm::translate`/`vm::map`
//! rather than through `uaccess` (there is no "current" page table yet for
//! the address space under construction).

use crate::elf::{ElfHeader, ProgramHeader, ELF_PROG_FLAG_EXEC, ELF_PROG_FLAG_WRITE, ELF_PROG_LOAD};
use crate::errno::{KResult, KernelError};
use crate::frame;
use crate::memlayout::{TRAMPOLINE, TRAPFRAME};
use crate::param::{MAXARG, USER_STACK_SIZE};
use crate::proc::{myproc, Trapframe};
use crate::riscv::{PageTable, PGSIZE, PTE_R, PTE_U, PTE_W, PTE_X};
use crate::string::memset;
use crate::vfs::{self, VNodeKind};
use crate::vm;
use crate::{PGROUNDDOWN, PGROUNDUP};
use alloc::vec;
use alloc::vec::Vec;

const ELF_TYPE_EXEC: u16 = 2;

#[cfg(not(any(feature = "std-test", feature = "kernel_as_a_lib")))]
extern "C" {
    static _user_init_start: u8;
    static _user_init_end: u8;
    static _user_shell_start: u8;
    static _user_shell_end: u8;
}
// Same zero-length stand-ins as `vm`/`proc`/`trap` under a host build -
// `load_image`'s "shell"/"init" short names are only exercised by the
// no_std kernel binary; the host-side test below only exercises the
// VFS-lookup fallback path. See DESIGN.md's "Known limitations".
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static _user_init_start: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static _user_init_end: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static _user_shell_start: u8 = 0;
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static _user_shell_end: u8 = 0;

fn embedded_span(start: *const u8, end: *const u8) -> &'static [u8] {
    let len = end as usize - start as usize;
    unsafe { core::slice::from_raw_parts(start, len) }
}

fn embedded_init() -> &'static [u8] {
    embedded_span(unsafe { &_user_init_start }, unsafe { &_user_init_end })
}

fn embedded_shell() -> &'static [u8] {
    embedded_span(unsafe { &_user_shell_start }, unsafe { &_user_shell_end })
}

/// The embedded `init` ELF image, exposed so `proc::user_init` can build the
/// very first process's address space without going through a path lookup
/// (the short-name registry already treats "init" as a guaranteed embedded
/// target, same as "shell").
pub fn init_image() -> &'static [u8] {
    embedded_init()
}

enum Image {
    Embedded(&'static [u8]),
    Owned(Vec<u8>),
}

impl Image {
    fn bytes(&self) -> &[u8] {
        match self {
            Image::Embedded(b) => b,
            Image::Owned(v) => v,
        }
    }
}

/// Resolves `path` to an ELF image: the embedded shell/init blobs by their
/// short name (the only guaranteed targets), or a VFS-backed regular file
/// otherwise.
fn load_image(path: &str) -> KResult<Image> {
    let base = path.rsplit('/').next().unwrap_or(path);
    match base {
        "shell" | "sh" => return Ok(Image::Embedded(embedded_shell())),
        "init" => return Ok(Image::Embedded(embedded_init())),
        _ => {}
    }
    let p = myproc();
    let v = vfs::resolve_path(path, p.cwd)?;
    if vfs::kind(v) != VNodeKind::Regular {
        return Err(KernelError::Enoent);
    }
    let size = vfs::size(v);
    let mut buf = vec![0u8; size];
    vfs::read(v, 0, &mut buf)?;
    Ok(Image::Owned(buf))
}

fn read_header(image: &[u8]) -> KResult<ElfHeader> {
    if image.len() < core::mem::size_of::<ElfHeader>() {
        return Err(KernelError::Einval);
    }
    let hdr = unsafe { core::ptr::read_unaligned(image.as_ptr() as *const ElfHeader) };
    if !hdr.is_valid() || hdr.hdr_type != ELF_TYPE_EXEC {
        return Err(KernelError::Einval);
    }
    Ok(hdr)
}

fn read_program_header(image: &[u8], hdr: &ElfHeader, i: usize) -> KResult<ProgramHeader> {
    let off = hdr.phoff as usize + i * hdr.phentsize as usize;
    let end = off + core::mem::size_of::<ProgramHeader>();
    if end > image.len() {
        return Err(KernelError::Einval);
    }
    Ok(unsafe { core::ptr::read_unaligned(image[off..end].as_ptr() as *const ProgramHeader) })
}

/// Ensures every page in `[va, va+memsz)` is mapped in `pt` (allocating and
/// zeroing fresh frames for any that aren't yet - segments may legitimately
/// share a page at their boundary), then copies `filesz` bytes from
/// `image[off..]` into it.
fn load_segment(
    pt: *mut PageTable,
    va: usize,
    memsz: usize,
    filesz: usize,
    off: usize,
    perm: usize,
    image: &[u8],
) -> KResult<()> {
    let start = PGROUNDDOWN!(va);
    let end = PGROUNDUP!(va + memsz);
    let mut a = start;
    while a < end {
        if vm::translate(pt, a).is_none() {
            let f = frame::alloc().ok_or(KernelError::Enomem)?;
            memset(f as *mut u8, 0, PGSIZE);
            vm::map(pt, a, f, PGSIZE, perm | PTE_U).map_err(|_| KernelError::Enomem)?;
        }
        a += PGSIZE;
    }
    write_to_va(pt, va, &image[off..off + filesz])
}

/// Copies `data` into the user address space under construction, crossing
/// page boundaries as needed. Safe to call before the process's own satp is
/// live: `pt`'s mapped frames are ordinary physical RAM, identity-accessible
/// from the kernel.
fn write_to_va(pt: *mut PageTable, va: usize, data: &[u8]) -> KResult<()> {
    let mut off = 0;
    while off < data.len() {
        let cur = va + off;
        let page_base = PGROUNDDOWN!(cur);
        let pa = vm::translate(pt, page_base).ok_or(KernelError::Efault)?;
        let page_off = cur - page_base;
        let n = (PGSIZE - page_off).min(data.len() - off);
        unsafe {
            core::ptr::copy_nonoverlapping(data[off..].as_ptr(), (pa + page_off) as *mut u8, n);
        }
        off += n;
    }
    Ok(())
}

/// Pushes `argv` onto the top of the (already-mapped) user stack, xv6-style:
/// each string, then a NUL-terminated pointer array, 16-byte aligned at the
/// end. Returns the final sp and the address of the pointer array (a1).
fn push_args(pt: *mut PageTable, stack_top: usize, argv: &[Vec<u8>]) -> KResult<(usize, usize)> {
    if argv.len() > MAXARG {
        return Err(KernelError::Einval);
    }
    let mut sp = stack_top;
    let mut ptrs = Vec::with_capacity(argv.len() + 1);
    for arg in argv {
        sp -= arg.len() + 1;
        sp &= !0x7;
        write_to_va(pt, sp, arg)?;
        write_to_va(pt, sp + arg.len(), &[0u8])?;
        ptrs.push(sp as u64);
    }
    ptrs.push(0);

    sp -= ptrs.len() * 8;
    sp &= !0xF;
    let argv_va = sp;
    for (i, p) in ptrs.iter().enumerate() {
        write_to_va(pt, sp + i * 8, &p.to_le_bytes())?;
    }
    Ok((sp, argv_va))
}

/// Builds a fresh address space for `path`/`argv`, transactionally: any
/// failure along the way tears down everything allocated so far and leaves
/// the caller's current address space untouched.
fn build_address_space(path: &str, argv: &[Vec<u8>]) -> KResult<(*mut PageTable, usize, usize, usize, usize)> {
    let image_holder = load_image(path)?;
    let trapframe = myproc().trapframe;
    build_address_space_from_bytes(image_holder.bytes(), trapframe, argv)
}

/// The transactional ELF-to-address-space builder shared by `exec` (looks
/// its image up by path against the current process) and
/// `proc::user_init` (has no current process yet - the embedded `init`
/// image and a fresh trapframe are passed in directly).
pub(crate) fn build_address_space_from_bytes(
    image: &[u8],
    trapframe: *mut Trapframe,
    argv: &[Vec<u8>],
) -> KResult<(*mut PageTable, usize, usize, usize, usize)> {
    let hdr = read_header(image)?;

    let pt = crate::proc::new_pagetable(trapframe).map_err(|_| KernelError::Enomem)?;

    let mut sz = 0usize;
    for i in 0..hdr.phnum as usize {
        let ph = match read_program_header(image, &hdr, i) {
            Ok(ph) => ph,
            Err(e) => {
                vm::deinit(pt, sz);
                return Err(e);
            }
        };
        if ph.hdr_type != ELF_PROG_LOAD {
            continue;
        }
        let va = ph.vaddr as usize;
        let memsz = ph.memsz as usize;
        let filesz = ph.filesz as usize;
        let mut perm = PTE_R;
        if ph.flags & ELF_PROG_FLAG_WRITE != 0 {
            perm |= PTE_W;
        }
        if ph.flags & ELF_PROG_FLAG_EXEC != 0 {
            perm |= PTE_X;
        }
        if let Err(e) = load_segment(pt, va, memsz, filesz, ph.off as usize, perm, image) {
            vm::deinit(pt, sz);
            return Err(e);
        }
        sz = sz.max(PGROUNDUP!(va + memsz));
    }

    if sz == 0 {
        vm::deinit(pt, 0);
        return Err(KernelError::Einval);
    }

    let guard_base = TRAPFRAME - PGSIZE;
    let stack_base = guard_base - USER_STACK_SIZE;
    let mut a = stack_base;
    while a < guard_base {
        let f = match frame::alloc() {
            Some(f) => f,
            None => {
                vm::unmap(pt, stack_base, (a - stack_base) / PGSIZE, true);
                vm::deinit(pt, sz);
                return Err(KernelError::Enomem);
            }
        };
        memset(f as *mut u8, 0, PGSIZE);
        if vm::map(pt, a, f, PGSIZE, PTE_R | PTE_W | PTE_U).is_err() {
            frame::free(f);
            vm::unmap(pt, stack_base, (a - stack_base) / PGSIZE, true);
            vm::deinit(pt, sz);
            return Err(KernelError::Enomem);
        }
        a += PGSIZE;
    }

    let (sp, argv_va) = match push_args(pt, guard_base, argv) {
        Ok(r) => r,
        Err(e) => {
            vm::unmap(pt, stack_base, USER_STACK_SIZE / PGSIZE, true);
            vm::deinit(pt, sz);
            return Err(e);
        }
    };

    Ok((pt, sz, sp, argv_va, hdr.entry as usize))
}

/// Replaces the calling process's program image.
/// On success, the current process's trapframe is rewritten so the next
/// `trap::user_trap_ret` resumes at the new entry point with a fresh stack.
pub fn exec(path: &str, argv: &[Vec<u8>]) -> KResult<()> {
    let (new_pt, new_sz, sp, argv_va, entry) = build_address_space(path, argv)?;

    let p = myproc();
    let old_pt = p.pagetable;
    let old_sz = p.sz;

    vm::unmap(old_pt, TRAMPOLINE, 1, false);
    vm::unmap(old_pt, TRAPFRAME, 1, false);
    vm::deinit(old_pt, old_sz);

    p.pagetable = new_pt;
    p.sz = new_sz;

    let base = path.rsplit('/').next().unwrap_or(path);
    let name_bytes = base.as_bytes();
    let n = name_bytes.len().min(p.name.len());
    p.name = [0; crate::param::MAXNAME];
    p.name[..n].copy_from_slice(&name_bytes[..n]);

    let tf: &mut Trapframe = unsafe { &mut *p.trapframe };
    tf.epc = entry as u64;
    tf.sp = sp as u64;
    tf.a0 = argv.len() as u64;
    tf.a1 = argv_va as u64;

    Ok(())
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;

    #[test]
    fn unknown_path_is_enoent() {
        vfs::init();
        let r = load_image("/does/not/exist");
        assert!(matches!(r, Err(KernelError::Enoent)));
    }
}
