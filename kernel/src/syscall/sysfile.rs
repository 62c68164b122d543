//! File and path syscall handlers.
//!
//! Path and flag arguments are fetched through `syscall::mod`'s helpers,
//! then handed to `vfs.rs`/`fd.rs` instead of an inode-based lookup.

use super::{argaddr, argint, arglong, argstr};
use crate::errno::{KResult, KernelError};
use crate::fd::{FileKind, Stat};
use crate::param::{AT_FDCWD, MAXARG, MAXPATH, MAX_FILE_SIZE};
use crate::proc::myproc;
use crate::uaccess;
use crate::vfs::{self, VNodeKind, VNodeRef};
use alloc::vec::Vec;

/// Open flags (User ABI).
pub const O_RDONLY: i32 = 0;
pub const O_WRONLY: i32 = 1;
pub const O_RDWR: i32 = 2;
pub const O_CREAT: i32 = 64;
pub const O_EXCL: i32 = 128;
pub const O_TRUNC: i32 = 512;
pub const O_APPEND: i32 = 1024;
pub const O_DIRECTORY: i32 = 65536;
pub const O_CLOEXEC: i32 = 524288;

const AT_REMOVEDIR: i32 = 0x200;

/// Resolves a `dirfd` argument (an open fd, or `AT_FDCWD`) to the directory
/// it names, for the `*at` family.
fn resolve_dirfd(dirfd: i32) -> KResult<VNodeRef> {
    if dirfd as isize == AT_FDCWD {
        return Ok(myproc().cwd);
    }
    if dirfd < 0 {
        return Err(KernelError::Ebadf);
    }
    match myproc().files.kind_of(dirfd as usize)? {
        FileKind::Vnode(v) if vfs::kind(v) == VNodeKind::Directory => Ok(v),
        FileKind::Vnode(_) => Err(KernelError::Enotdir),
        FileKind::Console => Err(KernelError::Enotdir),
    }
}

pub(super) fn sys_openat() -> KResult<isize> {
    let dirfd = argint(0);
    let path = argstr(1)?;
    let flags = argint(2);
    let base = resolve_dirfd(dirfd)?;

    let v = if flags & O_CREAT != 0 {
        match vfs::create_file(&path, base) {
            Ok(v) => v,
            Err(KernelError::Eexist) => {
                if flags & O_EXCL != 0 {
                    return Err(KernelError::Eexist);
                }
                vfs::resolve_path(&path, base)?
            }
            Err(e) => return Err(e),
        }
    } else {
        vfs::resolve_path(&path, base)?
    };

    if flags & O_DIRECTORY != 0 && vfs::kind(v) != VNodeKind::Directory {
        return Err(KernelError::Enotdir);
    }

    let writable = flags & (O_WRONLY | O_RDWR) != 0;
    if vfs::kind(v) == VNodeKind::Directory && writable {
        return Err(KernelError::Eisdir);
    }
    if vfs::kind(v) == VNodeKind::Regular && flags & O_TRUNC != 0 {
        vfs::truncate(v);
    }

    let readable = flags & O_WRONLY == 0;
    let fd = myproc().files.open_vnode(v, readable, writable)?;
    Ok(fd as isize)
}

pub(super) fn sys_close() -> KResult<isize> {
    let fd = argint(0) as usize;
    myproc().files.close(fd)?;
    Ok(0)
}

pub(super) fn sys_read() -> KResult<isize> {
    let fd = argint(0) as usize;
    let addr = argaddr(1);
    let count = argaddr(2).min(MAX_FILE_SIZE);
    let mut buf = alloc::vec![0u8; count];
    let n = myproc().files.read(fd, &mut buf)?;
    uaccess::copyout(addr, &buf[..n])?;
    Ok(n as isize)
}

pub(super) fn sys_write() -> KResult<isize> {
    let fd = argint(0) as usize;
    let addr = argaddr(1);
    let count = argaddr(2).min(MAX_FILE_SIZE);
    let mut buf = alloc::vec![0u8; count];
    uaccess::copyin(&mut buf, addr)?;
    let n = myproc().files.write(fd, &buf)?;
    Ok(n as isize)
}

pub(super) fn sys_lseek() -> KResult<isize> {
    let fd = argint(0) as usize;
    let offset = arglong(1);
    let whence = argint(2);
    let n = myproc().files.lseek(fd, offset, whence)?;
    Ok(n as isize)
}

fn stat_bytes(s: &Stat) -> &[u8] {
    unsafe { core::slice::from_raw_parts(s as *const Stat as *const u8, core::mem::size_of::<Stat>()) }
}

pub(super) fn sys_fstat() -> KResult<isize> {
    let fd = argint(0) as usize;
    let addr = argaddr(1);
    let st = myproc().files.fstat(fd)?;
    uaccess::copyout(addr, stat_bytes(&st))?;
    Ok(0)
}

pub(super) fn sys_fstatat() -> KResult<isize> {
    let dirfd = argint(0);
    let path = argstr(1)?;
    let addr = argaddr(2);
    let base = resolve_dirfd(dirfd)?;
    let v = vfs::resolve_path(&path, base)?;
    let st = Stat {
        size: vfs::size(v) as u64,
        is_dir: (vfs::kind(v) == VNodeKind::Directory) as u32,
        is_device: 0,
    };
    uaccess::copyout(addr, stat_bytes(&st))?;
    Ok(0)
}

pub(super) fn sys_mkdirat() -> KResult<isize> {
    let dirfd = argint(0);
    let path = argstr(1)?;
    let base = resolve_dirfd(dirfd)?;
    vfs::create_directory(&path, base)?;
    Ok(0)
}

pub(super) fn sys_unlinkat() -> KResult<isize> {
    let dirfd = argint(0);
    let path = argstr(1)?;
    let flags = argint(2);
    let base = resolve_dirfd(dirfd)?;
    vfs::unlink(&path, base, flags & AT_REMOVEDIR != 0)?;
    Ok(0)
}

pub(super) fn sys_chdir() -> KResult<isize> {
    let path = argstr(0)?;
    let v = vfs::resolve_path(&path, myproc().cwd)?;
    if vfs::kind(v) != VNodeKind::Directory {
        return Err(KernelError::Enotdir);
    }
    myproc().cwd = v;
    Ok(0)
}

/// `getcwd`: the only syscall that needs to turn a `VNodeRef` back into a
/// path string, via `vfs::absolute_path`.
pub(super) fn sys_getcwd() -> KResult<isize> {
    let buf_addr = argaddr(0);
    let size = argaddr(1);
    let mut path = vfs::absolute_path(myproc().cwd);
    path.push('\0');
    if path.len() > size {
        return Err(KernelError::Erange);
    }
    uaccess::copyout(buf_addr, path.as_bytes())?;
    Ok(path.len() as isize)
}

/// `execve`: replaces the caller's image. On success the whole trapframe
/// has already been rewritten by `exec::exec`, so `dispatch` must leave
/// `a0` alone afterward - that's why this returns `KResult<()>` rather than
/// the usual `KResult<isize>`.
pub(super) fn sys_execve() -> KResult<()> {
    let path = argstr(0)?;
    let argv_addr = argaddr(1);

    let mut argv: Vec<Vec<u8>> = Vec::new();
    let mut i = 0usize;
    loop {
        if i >= MAXARG {
            return Err(KernelError::Einval);
        }
        let mut ptr_bytes = [0u8; 8];
        uaccess::copyin(&mut ptr_bytes, argv_addr + i * 8)?;
        let ptr = u64::from_le_bytes(ptr_bytes) as usize;
        if ptr == 0 {
            break;
        }
        argv.push(uaccess::copyinstr(ptr, MAXPATH)?);
        i += 1;
    }

    crate::exec::exec(&path, &argv)
}
