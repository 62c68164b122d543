//! Per-process file-descriptor table over a global open-file pool.
//!
//! Claudia has no inodes, so `FileKind` instead names either the console
//! device or a `VNodeRef` into the in-memory tree (`vfs.rs`). This is a
//! tagged-union shape rather than a function-pointer vtable: there are
//! exactly two kinds of thing a descriptor can mean, and read/write/lseek
//! match on which.

use crate::errno::{KResult, KernelError};
use crate::param::{NFILE, NOFILE};
use crate::spinlock::Spinlock;
use crate::vfs::{self, VNodeKind, VNodeRef};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FileKind {
    Console,
    Vnode(VNodeRef),
}

struct OpenFileSlot {
    kind: FileKind,
    offset: usize,
    readable: bool,
    writable: bool,
    refcount: usize,
}

struct FilePool {
    slots: [Option<OpenFileSlot>; NFILE],
}

static LOCK: Spinlock = Spinlock::new("filepool");
static mut POOL: FilePool = FilePool {
    slots: [const { None }; NFILE],
};

fn alloc_slot(kind: FileKind, readable: bool, writable: bool) -> Option<usize> {
    LOCK.acquire();
    let pool = unsafe { &mut POOL };
    let r = pool.slots.iter().position(|s| s.is_none()).map(|i| {
        pool.slots[i] = Some(OpenFileSlot {
            kind,
            offset: 0,
            readable,
            writable,
            refcount: 1,
        });
        i
    });
    LOCK.release();
    r
}

fn bump(idx: usize) {
    LOCK.acquire();
    unsafe { POOL.slots[idx].as_mut().expect("fd::bump: dangling slot").refcount += 1 };
    LOCK.release();
}

fn drop_ref(idx: usize) {
    LOCK.acquire();
    let pool = unsafe { &mut POOL };
    let emptied = {
        let s = pool.slots[idx].as_mut().expect("fd::drop_ref: dangling slot");
        s.refcount -= 1;
        s.refcount == 0
    };
    if emptied {
        pool.slots[idx] = None;
    }
    LOCK.release();
}

/// Minimal `struct stat` subset the `fstat`/`fstatat` syscalls fill in.
#[repr(C)]
#[derive(Clone, Copy, Default)]
pub struct Stat {
    pub size: u64,
    pub is_dir: u32,
    pub is_device: u32,
}

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

/// Per-process fd table: a fixed array of indices into the global pool.
pub struct FileTable {
    fds: [Option<usize>; NOFILE],
}

impl FileTable {
    pub const fn new() -> Self {
        FileTable { fds: [None; NOFILE] }
    }

    /// Opens one shared console handle and installs it at fd 0/1/2.
    pub fn install_stdio(&mut self) {
        let idx = alloc_slot(FileKind::Console, true, true).expect("fd::install_stdio: pool exhausted");
        bump(idx);
        bump(idx);
        self.fds[0] = Some(idx);
        self.fds[1] = Some(idx);
        self.fds[2] = Some(idx);
    }

    fn lowest_free(&self) -> KResult<usize> {
        self.fds.iter().position(|f| f.is_none()).ok_or(KernelError::Emfile)
    }

    fn get(&self, fd: usize) -> KResult<usize> {
        if fd >= NOFILE {
            return Err(KernelError::Ebadf);
        }
        self.fds[fd].ok_or(KernelError::Ebadf)
    }

    pub fn open_vnode(&mut self, v: VNodeRef, readable: bool, writable: bool) -> KResult<usize> {
        let fd = self.lowest_free()?;
        let idx = alloc_slot(FileKind::Vnode(v), readable, writable).ok_or(KernelError::Emfile)?;
        self.fds[fd] = Some(idx);
        Ok(fd)
    }

    /// Stdin/stdout/stderr may not be closed.
    pub fn close(&mut self, fd: usize) -> KResult<()> {
        if fd < 3 {
            return Err(KernelError::Ebadf);
        }
        let idx = self.get(fd)?;
        self.fds[fd] = None;
        drop_ref(idx);
        Ok(())
    }

    pub fn dup(&mut self, fd: usize) -> KResult<usize> {
        let idx = self.get(fd)?;
        let newfd = self.lowest_free()?;
        bump(idx);
        self.fds[newfd] = Some(idx);
        Ok(newfd)
    }

    /// `dup2`/`dup3`: closes `newfd` first if it was already open.
    pub fn dup_to(&mut self, fd: usize, newfd: usize) -> KResult<usize> {
        let idx = self.get(fd)?;
        if newfd >= NOFILE {
            return Err(KernelError::Ebadf);
        }
        if fd == newfd {
            return Ok(newfd);
        }
        if self.fds[newfd].is_some() {
            let old = self.fds[newfd].take().unwrap();
            drop_ref(old);
        }
        bump(idx);
        self.fds[newfd] = Some(idx);
        Ok(newfd)
    }

    pub fn kind_of(&self, fd: usize) -> KResult<FileKind> {
        let idx = self.get(fd)?;
        LOCK.acquire();
        let k = unsafe { POOL.slots[idx].as_ref().unwrap().kind };
        LOCK.release();
        Ok(k)
    }

    pub fn read(&mut self, fd: usize, buf: &mut [u8]) -> KResult<usize> {
        let idx = self.get(fd)?;
        LOCK.acquire();
        let (kind, offset, readable) = {
            let s = unsafe { POOL.slots[idx].as_ref().unwrap() };
            (s.kind, s.offset, s.readable)
        };
        LOCK.release();
        if !readable {
            return Err(KernelError::Ebadf);
        }
        let n = match kind {
            FileKind::Console => crate::console::read(buf)?,
            FileKind::Vnode(v) => {
                if vfs::kind(v) == VNodeKind::Directory {
                    return Err(KernelError::Eisdir);
                }
                vfs::read(v, offset, buf)?
            }
        };
        if matches!(kind, FileKind::Vnode(_)) {
            LOCK.acquire();
            unsafe { POOL.slots[idx].as_mut().unwrap().offset += n };
            LOCK.release();
        }
        Ok(n)
    }

    pub fn write(&mut self, fd: usize, buf: &[u8]) -> KResult<usize> {
        let idx = self.get(fd)?;
        LOCK.acquire();
        let (kind, offset, writable) = {
            let s = unsafe { POOL.slots[idx].as_ref().unwrap() };
            (s.kind, s.offset, s.writable)
        };
        LOCK.release();
        if !writable {
            return Err(KernelError::Ebadf);
        }
        let n = match kind {
            FileKind::Console => crate::console::write(buf)?,
            FileKind::Vnode(v) => {
                if vfs::kind(v) == VNodeKind::Directory {
                    return Err(KernelError::Eisdir);
                }
                vfs::write(v, offset, buf)?
            }
        };
        if matches!(kind, FileKind::Vnode(_)) {
            LOCK.acquire();
            unsafe { POOL.slots[idx].as_mut().unwrap().offset += n };
            LOCK.release();
        }
        Ok(n)
    }

    pub fn lseek(&mut self, fd: usize, offset: i64, whence: i32) -> KResult<usize> {
        let idx = self.get(fd)?;
        LOCK.acquire();
        let (kind, cur) = {
            let s = unsafe { POOL.slots[idx].as_ref().unwrap() };
            (s.kind, s.offset)
        };
        LOCK.release();
        let v = match kind {
            FileKind::Console => return Err(KernelError::Espipe),
            FileKind::Vnode(v) => v,
        };
        let base: i64 = match whence {
            SEEK_SET => 0,
            SEEK_CUR => cur as i64,
            SEEK_END => vfs::size(v) as i64,
            _ => return Err(KernelError::Einval),
        };
        let new_offset = base + offset;
        if new_offset < 0 {
            return Err(KernelError::Einval);
        }
        LOCK.acquire();
        unsafe { POOL.slots[idx].as_mut().unwrap().offset = new_offset as usize };
        LOCK.release();
        Ok(new_offset as usize)
    }

    pub fn fstat(&self, fd: usize) -> KResult<Stat> {
        let kind = self.kind_of(fd)?;
        Ok(match kind {
            FileKind::Console => Stat {
                size: 0,
                is_dir: 0,
                is_device: 1,
            },
            FileKind::Vnode(v) => Stat {
                size: vfs::size(v) as u64,
                is_dir: (vfs::kind(v) == VNodeKind::Directory) as u32,
                is_device: 0,
            },
        })
    }
}

impl Clone for FileTable {
    /// Fork clones the table and bumps each referenced open file's refcount.
    fn clone(&self) -> Self {
        for idx in self.fds.iter().flatten() {
            bump(*idx);
        }
        FileTable { fds: self.fds }
    }
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;

    #[test]
    fn stdio_shares_one_slot_and_dup_allocates_lowest_free() {
        vfs::init();
        let mut t = FileTable::new();
        t.install_stdio();
        let fd = t.dup(0).unwrap();
        assert_eq!(fd, 3);
        assert_eq!(t.kind_of(0).unwrap(), t.kind_of(3).unwrap());
    }

    #[test]
    fn stdio_fds_cannot_be_closed() {
        vfs::init();
        let mut t = FileTable::new();
        t.install_stdio();
        assert_eq!(t.close(1).unwrap_err(), KernelError::Ebadf);
    }

    #[test]
    fn close_of_unknown_fd_is_ebadf() {
        let mut t = FileTable::new();
        assert_eq!(t.close(5).unwrap_err(), KernelError::Ebadf);
    }

    #[test]
    fn vnode_write_then_read_round_trips() {
        vfs::init();
        let root = vfs::root();
        let v = vfs::create_file("/f", root).unwrap();
        let mut t = FileTable::new();
        let fd = t.open_vnode(v, true, true).unwrap();
        assert_eq!(t.write(fd, b"hi").unwrap(), 2);
        t.lseek(fd, 0, SEEK_SET).unwrap();
        let mut buf = [0u8; 8];
        let n = t.read(fd, &mut buf).unwrap();
        assert_eq!(&buf[..n], b"hi");
    }
}
