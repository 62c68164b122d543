//! Raw syscall wrappers over the trampolines `usys.S` assembles, one per
//! number in the user ABI. The bodies live in hand-written assembly, not
//! Rust - each one is just `li a7, N; ecall; ret`.

extern "C" {
    pub fn sys_getcwd(buf: *mut u8, size: usize) -> isize;
    pub fn sys_mkdirat(dirfd: i32, path: *const u8) -> isize;
    pub fn sys_unlinkat(dirfd: i32, path: *const u8, flags: i32) -> isize;
    pub fn sys_chdir(path: *const u8) -> isize;
    pub fn sys_openat(dirfd: i32, path: *const u8, flags: i32) -> isize;
    pub fn sys_close(fd: i32) -> isize;
    pub fn sys_lseek(fd: i32, offset: i64, whence: i32) -> isize;
    pub fn sys_read(fd: i32, buf: *mut u8, count: usize) -> isize;
    pub fn sys_write(fd: i32, buf: *const u8, count: usize) -> isize;
    pub fn sys_fstatat(dirfd: i32, path: *const u8, statbuf: *mut u8) -> isize;
    pub fn sys_fstat(fd: i32, statbuf: *mut u8) -> isize;
    pub fn sys_exit(status: i32) -> !;
    pub fn sys_nanosleep(req: *const u8, rem: *mut u8) -> isize;
    pub fn sys_clock_gettime(clk_id: i32, tp: *mut u8) -> isize;
    pub fn sys_sched_yield() -> isize;
    pub fn sys_getpid() -> isize;
    pub fn sys_getppid() -> isize;
    pub fn sys_brk(addr: usize) -> isize;
    pub fn sys_clone() -> isize;
    pub fn sys_execve(path: *const u8, argv: *const *const u8) -> isize;
    pub fn sys_wait4(pid: i32, status: *mut i32, options: i32) -> isize;
}
