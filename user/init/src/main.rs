//! The first user process: forks and execs the shell, restarting it
//! whenever it exits, and reaps any process that outlives its parent by
//! re-parenting to pid 1. There's no `mknod`/`open("console")` dance here
//! because `proc::user_init` already installs fd 0/1/2 before this binary's
//! first instruction runs.
#![no_std]
#![no_main]

use ulib::printf;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    loop {
        let pid = ulib::fork();
        if pid < 0 {
            printf!("init: fork failed\n");
            ulib::sched_yield();
            continue;
        }
        if pid == 0 {
            let path = b"shell\0";
            let argv: [*const u8; 1] = [core::ptr::null()];
            ulib::execv(path, &argv);
            printf!("init: exec shell failed\n");
            ulib::exit(1);
        }

        // Reap every exited child, not just the shell: orphans of
        // processes the shell forked land here too.
        loop {
            let mut status = 0i32;
            let reaped = ulib::wait4(&mut status);
            if reaped == pid {
                break;
            }
            if reaped < 0 {
                break;
            }
        }
    }
}
