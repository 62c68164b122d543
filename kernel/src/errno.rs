//! Errno taxonomy expressed as a typed error instead of a bare
//! `-1`/`None`/`panic!` signal. Every fallible kernel primitive returns
//! `Result<T, KernelError>`; the syscall dispatch layer is the single place
//! that turns a `KernelError` into the negative-errno `isize` the user ABI
//! specifies.

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(i32)]
pub enum KernelError {
    /// No current process (wait4 invariants, etc).
    Esrch = 3,
    /// No such file or directory.
    Enoent = 2,
    /// Child reaped / ECHILD.
    Echild = 10,
    /// Resource temporarily unavailable (process table full).
    Eagain = 11,
    /// Out of memory (no free frame, heap exhausted).
    Enomem = 12,
    /// Bad user pointer.
    Efault = 14,
    /// Invalid argument.
    Einval = 22,
    /// Unknown file descriptor.
    Ebadf = 9,
    /// Is a directory.
    Eisdir = 21,
    /// Not a directory.
    Enotdir = 20,
    /// File descriptor table full.
    Emfile = 24,
    /// Name already exists.
    Eexist = 17,
    /// Seek not supported on this file kind.
    Espipe = 29,
    /// Output buffer too small.
    Erange = 34,
    /// Path component too long.
    Enametoolong = 36,
    /// Not implemented.
    Enosys = 38,
    /// No space left in backing buffer.
    Enospc = 28,
    /// Directory not empty.
    Enotempty = 39,
    /// Interrupted (early wake from sleep).
    Eintr = 4,
}

impl KernelError {
    /// The negative-errno `isize` the syscall ABI returns in a0.
    pub const fn as_syscall_return(self) -> isize {
        -(self as i32 as isize)
    }
}

impl From<KernelError> for isize {
    fn from(e: KernelError) -> isize {
        e.as_syscall_return()
    }
}

/// Convenience alias used throughout the core subsystems.
pub type KResult<T> = Result<T, KernelError>;
