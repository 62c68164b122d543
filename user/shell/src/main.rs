//! The line-oriented shell: a minimal command reader, not a POSIX shell.
//! There is no `pipe`/`dup`/`dup2` in the syscall surface, so there is no
//! pipeline or redirection support, only whitespace-tokenized single
//! commands.
#![no_std]
#![no_main]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use ulib::{fprintf, printf};

const PROMPT: &str = "claudia:/ # ";
const LINE_MAX: usize = 128;

#[no_mangle]
pub extern "C" fn _start() -> ! {
    loop {
        printf!("{}", PROMPT);

        let mut line = [0u8; LINE_MAX];
        let n = ulib::gets(&mut line);
        if n == 0 {
            // EOF on stdin: nothing left to read commands from.
            ulib::exit(0);
        }

        let text = core::str::from_utf8(&line[..n]).unwrap_or("").trim_end_matches(['\n', '\r']);
        let words: Vec<&str> = text.split_whitespace().collect();
        if words.is_empty() {
            continue;
        }

        if let Some(status) = run_builtin(&words) {
            let _ = status;
            continue;
        }

        run_external(&words);
    }
}

/// Runs `words[0]` as a builtin if it's one of the names the shell
/// recognizes itself. Returns `None` for anything else, so the caller
/// falls through to `exec`.
fn run_builtin(words: &[&str]) -> Option<i32> {
    match words[0] {
        "echo" => {
            let mut first = true;
            for w in &words[1..] {
                if !first {
                    printf!(" ");
                }
                printf!("{}", w);
                first = false;
            }
            printf!("\n");
            Some(0)
        }
        "cd" => {
            let target = words.get(1).copied().unwrap_or("/");
            let mut path = String::from(target);
            path.push('\0');
            if ulib::chdir(path.as_bytes()) < 0 {
                fprintf!(2, "cannot cd {}\n", target);
            }
            Some(0)
        }
        "cat" => {
            for path in &words[1..] {
                cat_one(path);
            }
            Some(0)
        }
        "mkdir" => {
            for path in &words[1..] {
                let mut p = String::from(*path);
                p.push('\0');
                if ulib::mkdir(p.as_bytes()) < 0 {
                    fprintf!(2, "mkdir {} failed\n", path);
                }
            }
            Some(0)
        }
        "rmdir" => {
            for path in &words[1..] {
                let mut p = String::from(*path);
                p.push('\0');
                if ulib::unlink(p.as_bytes(), true) < 0 {
                    fprintf!(2, "rmdir {} failed\n", path);
                }
            }
            Some(0)
        }
        "rm" => {
            for path in &words[1..] {
                let mut p = String::from(*path);
                p.push('\0');
                if ulib::unlink(p.as_bytes(), false) < 0 {
                    fprintf!(2, "rm {} failed\n", path);
                }
            }
            Some(0)
        }
        "sleep" => {
            let secs: u64 = words.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            ulib::sleep_secs(secs);
            Some(0)
        }
        "exit" => ulib::exit(0),
        _ => None,
    }
}

fn cat_one(path: &str) {
    let mut p = String::from(path);
    p.push('\0');
    let fd = ulib::open(p.as_bytes(), ulib::O_RDONLY);
    if fd < 0 {
        fprintf!(2, "cat: cannot open {}\n", path);
        return;
    }
    let mut buf = [0u8; 512];
    loop {
        let n = ulib::read(fd, &mut buf);
        if n <= 0 {
            break;
        }
        ulib::write(1, &buf[..n as usize]);
    }
    ulib::close(fd);
}

/// Forks and execs `words[0]` with `words` as argv, waiting for it to exit.
fn run_external(words: &[&str]) {
    let pid = ulib::fork();
    if pid < 0 {
        fprintf!(2, "fork failed\n");
        return;
    }
    if pid == 0 {
        let mut owned: Vec<String> = words.iter().map(|w| { let mut s = String::from(*w); s.push('\0'); s }).collect();
        let mut argv: Vec<*const u8> = owned.iter_mut().map(|s| s.as_ptr()).collect();
        argv.push(core::ptr::null());
        ulib::execv(owned[0].as_bytes(), &argv);
        fprintf!(2, "exec {} failed\n", words[0]);
        ulib::exit(1);
    }
    let mut status = 0i32;
    ulib::wait4(&mut status);
}
