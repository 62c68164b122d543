//! Process table and scheduler.
//!
//! Every process is referred to by its slot index into `PROCS`; parent/child
//! and wait-queue links are plain `usize`s, and there is exactly one owner
//! of the backing memory (this module) rather than borrowed pointers
//! threaded through `exec`/`vm`/`trap`.

use crate::errno::{KResult, KernelError};
use crate::fd::FileTable;
use crate::memlayout::{TRAMPOLINE, TRAPFRAME};
use crate::param::{KSTACK_PAGES, MAXNAME, NCPU, NPROC};
use crate::riscv::{r_tp, PageTable, PGSIZE, PTE_R, PTE_W, PTE_X};
use crate::spinlock::Spinlock;
use crate::vfs::VNodeRef;
use crate::vm;
use crate::KSTACK;
use core::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

pub const NOPROC: usize = usize::MAX;

/// Saved callee-saved registers for a context switch (`asm/switch.S`).
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Context {
    pub ra: u64,
    pub sp: u64,
    pub s0: u64,
    pub s1: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
}

#[cfg(not(any(feature = "std-test", feature = "kernel_as_a_lib")))]
extern "C" {
    fn swtch(old: *mut Context, new: *mut Context);
}
// `scheduler`/`r#yield` (the only callers) are never exercised host-side;
// see DESIGN.md's "Known limitations".
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
unsafe fn swtch(_old: *mut Context, _new: *mut Context) {
    unreachable!("swtch has no host-target implementation")
}

/// Per-process trap frame, laid out to match `asm/trampoline.S`'s field
/// offsets exactly.
#[repr(C)]
#[derive(Copy, Clone, Default)]
pub struct Trapframe {
    pub kernel_satp: u64,
    pub kernel_sp: u64,
    pub kernel_trap: u64,
    pub epc: u64,
    pub kernel_hartid: u64,
    pub ra: u64,
    pub sp: u64,
    pub gp: u64,
    pub tp: u64,
    pub t0: u64,
    pub t1: u64,
    pub t2: u64,
    pub s0: u64,
    pub s1: u64,
    pub a0: u64,
    pub a1: u64,
    pub a2: u64,
    pub a3: u64,
    pub a4: u64,
    pub a5: u64,
    pub a6: u64,
    pub a7: u64,
    pub s2: u64,
    pub s3: u64,
    pub s4: u64,
    pub s5: u64,
    pub s6: u64,
    pub s7: u64,
    pub s8: u64,
    pub s9: u64,
    pub s10: u64,
    pub s11: u64,
    pub t3: u64,
    pub t4: u64,
    pub t5: u64,
    pub t6: u64,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ProcState {
    Unused,
    Used,
    Sleeping,
    Runnable,
    Running,
    Zombie,
}

pub struct Proc {
    pub state: ProcState,
    /// Sleep channel: processes sleeping on the same value wake together.
    pub chan: usize,
    pub killed: bool,
    pub xstate: i32,
    pub pid: u32,
    pub parent: usize, // index into PROCS, or NOPROC
    pub kstack: usize,
    pub sz: usize,
    pub pagetable: *mut PageTable,
    pub trapframe: *mut Trapframe,
    pub context: Context,
    pub files: FileTable,
    pub cwd: VNodeRef,
    pub name: [u8; MAXNAME],
}

impl Proc {
    const fn unused(idx: usize) -> Self {
        let _ = idx;
        Proc {
            state: ProcState::Unused,
            chan: 0,
            killed: false,
            xstate: 0,
            pid: 0,
            parent: NOPROC,
            kstack: 0,
            sz: 0,
            pagetable: core::ptr::null_mut(),
            trapframe: core::ptr::null_mut(),
            context: Context {
                ra: 0,
                sp: 0,
                s0: 0,
                s1: 0,
                s2: 0,
                s3: 0,
                s4: 0,
                s5: 0,
                s6: 0,
                s7: 0,
                s8: 0,
                s9: 0,
                s10: 0,
                s11: 0,
            },
            files: FileTable::new(),
            cwd: VNodeRef::NONE,
            name: [0; MAXNAME],
        }
    }
}

struct ProcSlot {
    lock: Spinlock,
    proc: Proc,
}

struct ProcTable {
    slots: [ProcSlot; NPROC],
}

// one lock per slot, acquired individually; see module doc.
unsafe impl Sync for ProcTable {}

static mut PROCS: Option<ProcTable> = None;

struct Cpu {
    proc: AtomicUsize, // index into PROCS, or NOPROC
    context: Context,
    noff: u32,
}

static mut CPUS: [Cpu; NCPU] = [const {
    Cpu {
        proc: AtomicUsize::new(NOPROC),
        context: Context {
            ra: 0,
            sp: 0,
            s0: 0,
            s1: 0,
            s2: 0,
            s3: 0,
            s4: 0,
            s5: 0,
            s6: 0,
            s7: 0,
            s8: 0,
            s9: 0,
            s10: 0,
            s11: 0,
        },
        noff: 0,
    }
}; NCPU];

static NEXT_PID: AtomicU32 = AtomicU32::new(1);
static INIT_PID: AtomicU32 = AtomicU32::new(0);
static WAIT_LOCK: Spinlock = Spinlock::new("wait_lock");
static TICKS: AtomicUsize = AtomicUsize::new(0);

pub fn cpuid() -> usize {
    r_tp() as usize
}

fn cpu() -> &'static mut Cpu {
    unsafe { &mut CPUS[cpuid()] }
}

fn slot(idx: usize) -> &'static mut ProcSlot {
    unsafe {
        let table = PROCS.as_mut().expect("proc table not initialized");
        &mut table.slots[idx]
    }
}

/// Initializes the process table. Must run once, before `userinit`.
pub fn init() {
    unsafe {
        PROCS = Some(ProcTable {
            slots: core::array::from_fn(|i| ProcSlot {
                lock: Spinlock::new("proc"),
                proc: Proc::unused(i),
            }),
        });
    }
}

/// Maps a kernel stack (KSTACK_PAGES pages, plus an unmapped guard page
/// below) for every process slot into the kernel page table - every process
/// page table contains the full set of kernel-global mappings.
pub fn map_kernel_stacks(pt: *mut PageTable) -> crate::vm::VmResult<()> {
    for idx in 0..NPROC {
        let va_top = KSTACK!(idx);
        for page in 0..KSTACK_PAGES {
            let frame = crate::frame::alloc().ok_or(crate::vm::VmError::OutOfMemory)?;
            vm::map(pt, va_top + page * PGSIZE, frame, PGSIZE, PTE_R | PTE_W)?;
        }
        slot(idx).proc.kstack = va_top;
    }
    Ok(())
}

/// Returns the index of the process currently running on this hart, or
/// `NOPROC` if none.
pub fn current() -> usize {
    cpu().proc.load(Ordering::Relaxed)
}

/// Borrows the currently running process. Panics if called with no current
/// process (a kernel-only trap path, never from user-originated code).
pub fn myproc() -> &'static mut Proc {
    let idx = current();
    assert_ne!(idx, NOPROC, "myproc: no current process");
    &mut slot(idx).proc
}

fn alloc_pid() -> u32 {
    NEXT_PID.fetch_add(1, Ordering::Relaxed)
}

/// Finds an `Unused` slot, marks it `Used`, and allocates its trapframe and
/// empty user page table. Returns the slot index with its lock held.
fn alloc_proc() -> Option<usize> {
    for i in 0..NPROC {
        let s = slot(i);
        s.lock.acquire();
        if s.proc.state == ProcState::Unused {
            s.proc.pid = alloc_pid();
            s.proc.state = ProcState::Used;

            let trapframe = match crate::frame::alloc() {
                Some(f) => f as *mut Trapframe,
                None => {
                    free_proc(i);
                    s.lock.release();
                    return None;
                }
            };
            s.proc.trapframe = trapframe;

            let pagetable = match new_pagetable(trapframe) {
                Ok(pt) => pt,
                Err(_) => {
                    free_proc(i);
                    s.lock.release();
                    return None;
                }
            };
            s.proc.pagetable = pagetable;

            s.proc.context = Context::default();
            s.proc.context.ra = fork_ret as usize as u64;
            s.proc.context.sp = (s.proc.kstack + KSTACK_PAGES * PGSIZE) as u64;

            return Some(i);
        }
        s.lock.release();
    }
    None
}

/// Builds a fresh user page table containing only the trampoline and
/// trapframe mappings. Shared with `exec`, which builds a whole new address
/// space for the current process without touching its existing trapframe
/// page.
pub(crate) fn new_pagetable(trapframe: *mut Trapframe) -> crate::vm::VmResult<*mut PageTable> {
    let pt = vm::uvmcreate()?;
    let trampoline_addr = trampoline_addr();
    if let Err(e) = vm::map(pt, TRAMPOLINE, trampoline_addr, PGSIZE, PTE_R | PTE_X) {
        vm::deinit(pt, 0);
        return Err(e);
    }
    if let Err(e) = vm::map(pt, TRAPFRAME, trapframe as usize, PGSIZE, PTE_R | PTE_W) {
        vm::unmap(pt, TRAMPOLINE, 1, false);
        vm::deinit(pt, 0);
        return Err(e);
    }
    Ok(pt)
}

#[cfg(not(any(feature = "std-test", feature = "kernel_as_a_lib")))]
extern "C" {
    static trampoline: u8;
}
#[cfg(any(feature = "std-test", feature = "kernel_as_a_lib"))]
static trampoline: u8 = 0;

fn trampoline_addr() -> usize {
    unsafe { &trampoline as *const u8 as usize }
}

/// Frees a process slot and everything hanging off it. Caller must hold the
/// slot's lock.
fn free_proc(idx: usize) {
    let s = slot(idx);
    if !s.proc.trapframe.is_null() {
        crate::frame::free(s.proc.trapframe as usize);
    }
    s.proc.trapframe = core::ptr::null_mut();
    if !s.proc.pagetable.is_null() {
        vm::unmap(s.proc.pagetable, TRAMPOLINE, 1, false);
        vm::unmap(s.proc.pagetable, TRAPFRAME, 1, false);
        vm::deinit(s.proc.pagetable, s.proc.sz);
    }
    s.proc.pagetable = core::ptr::null_mut();
    s.proc.sz = 0;
    s.proc.pid = 0;
    s.proc.parent = NOPROC;
    s.proc.name = [0; MAXNAME];
    s.proc.chan = 0;
    s.proc.killed = false;
    s.proc.xstate = 0;
    s.proc.state = ProcState::Unused;
}

/// Sets up the very first process from the embedded `init` ELF image.
/// `alloc_proc` already gave the slot a placeholder page table with just the
/// trampoline/trapframe mappings; that's swapped out for the one
/// `build_address_space_from_bytes` builds, the same teardown-and-replace
/// dance `exec::exec` does for every later process.
pub fn user_init() {
    let idx = alloc_proc().expect("user_init: process table exhausted");
    let s = slot(idx);

    let image = crate::exec::init_image();
    let (pt, sz, sp, argv_va, entry) = crate::exec::build_address_space_from_bytes(image, s.proc.trapframe, &[])
        .expect("user_init: malformed embedded init image");

    let old_pt = s.proc.pagetable;
    vm::unmap(old_pt, TRAMPOLINE, 1, false);
    vm::unmap(old_pt, TRAPFRAME, 1, false);
    vm::deinit(old_pt, 0);

    s.proc.pagetable = pt;
    s.proc.sz = sz;

    unsafe {
        (*s.proc.trapframe).epc = entry as u64;
        (*s.proc.trapframe).sp = sp as u64;
        (*s.proc.trapframe).a0 = 0;
        (*s.proc.trapframe).a1 = argv_va as u64;
    }

    let name = b"init";
    s.proc.name[..name.len()].copy_from_slice(name);
    s.proc.cwd = crate::vfs::root();
    s.proc.files.install_stdio();

    INIT_PID.store(s.proc.pid, Ordering::Relaxed);
    s.proc.state = ProcState::Runnable;
    s.lock.release();
}

/// Entry point for a freshly forked process's first scheduling: drop the
/// lock `scheduler` left held, then fall through to `trap::user_trap_ret`.
extern "C" fn fork_ret() {
    slot(current()).lock.release();
    crate::trap::user_trap_ret();
}

/// Duplicates the calling process. Returns the child's pid to the parent, 0
/// conceptually to the child (the child actually resumes independently via
/// its own trapframe, a0 already set to 0 by the copy below).
pub fn fork() -> KResult<u32> {
    let p_idx = current();
    let child_idx = alloc_proc().ok_or(KernelError::Eagain)?;

    let (p_sz, p_pt, p_tf_epc, p_name, p_cwd) = {
        let p = &slot(p_idx).proc;
        (p.sz, p.pagetable, unsafe { (*p.trapframe).epc }, p.name, p.cwd)
    };

    if let Err(_) = vm::clone_user_space(p_pt, slot(child_idx).proc.pagetable, p_sz) {
        free_proc(child_idx);
        slot(child_idx).lock.release();
        return Err(KernelError::Enomem);
    }

    let c = &mut slot(child_idx).proc;
    c.sz = p_sz;
    unsafe {
        *c.trapframe = *slot(p_idx).proc.trapframe;
        (*c.trapframe).epc = p_tf_epc;
        (*c.trapframe).a0 = 0;
    }
    c.files = slot(p_idx).proc.files.clone();
    c.cwd = p_cwd;
    c.name = p_name;
    let pid = c.pid;

    WAIT_LOCK.acquire();
    slot(child_idx).proc.parent = p_idx;
    WAIT_LOCK.release();

    slot(child_idx).proc.state = ProcState::Runnable;
    slot(child_idx).lock.release();
    Ok(pid)
}

/// Terminates the current process with `status`: reparents children to
/// init, wakes the parent, becomes a zombie, and never returns.
pub fn exit(status: i32) -> ! {
    let idx = current();
    assert_ne!(idx, slot(idx).proc.parent, "exit: init exiting");

    WAIT_LOCK.acquire();
    reparent(idx);
    let parent = slot(idx).proc.parent;
    WAIT_LOCK.release();

    let s = slot(idx);
    s.lock.acquire();
    s.proc.xstate = status;
    s.proc.state = ProcState::Zombie;
    s.lock.release();

    WAIT_LOCK.acquire();
    if parent != NOPROC {
        wakeup(parent_chan(parent));
    }
    WAIT_LOCK.release();

    scheduler_yield();
    unreachable!("exit: zombie process was rescheduled");
}

fn parent_chan(parent_idx: usize) -> usize {
    &slot(parent_idx).proc as *const Proc as usize
}

fn reparent(idx: usize) {
    let init_pid = INIT_PID.load(Ordering::Relaxed);
    let init_idx = (0..NPROC).find(|&i| slot(i).proc.pid == init_pid && slot(i).proc.pid != 0);
    for i in 0..NPROC {
        if slot(i).proc.parent == idx {
            slot(i).proc.parent = init_idx.unwrap_or(NOPROC);
            if let Some(init_idx) = init_idx {
                wakeup(parent_chan(init_idx));
            }
        }
    }
}

/// Waits for any child to exit. Returns its pid and exit status, or
/// `ECHILD` if the caller has no children.
pub fn wait(status_out: &mut i32) -> KResult<u32> {
    let idx = current();
    WAIT_LOCK.acquire();
    loop {
        let mut have_children = false;
        for i in 0..NPROC {
            if slot(i).proc.parent != idx {
                continue;
            }
            have_children = true;
            let s = slot(i);
            s.lock.acquire();
            if s.proc.state == ProcState::Zombie {
                let pid = s.proc.pid;
                *status_out = s.proc.xstate;
                s.lock.release();
                free_proc(i);
                WAIT_LOCK.release();
                return Ok(pid);
            }
            s.lock.release();
        }
        if !have_children || slot(idx).proc.killed {
            WAIT_LOCK.release();
            return Err(KernelError::Echild);
        }
        sleep(parent_chan(idx), &WAIT_LOCK);
    }
}

/// The calling process's parent's pid, or 0 once orphaned/reparented past
/// init (`getppid`).
pub fn parent_pid() -> u32 {
    let idx = current();
    let parent = slot(idx).proc.parent;
    if parent == NOPROC {
        0
    } else {
        slot(parent).proc.pid
    }
}

pub fn kill(pid: u32) -> KResult<()> {
    for i in 0..NPROC {
        let s = slot(i);
        s.lock.acquire();
        if s.proc.pid == pid {
            s.proc.killed = true;
            if s.proc.state == ProcState::Sleeping {
                s.proc.state = ProcState::Runnable;
            }
            s.lock.release();
            return Ok(());
        }
        s.lock.release();
    }
    Err(KernelError::Esrch)
}

/// Blocks the current process on `chan`, releasing `lk` for the duration.
pub fn sleep(chan: usize, lk: &Spinlock) {
    let idx = current();
    let s = slot(idx);
    s.lock.acquire();
    lk.release();

    s.proc.chan = chan;
    s.proc.state = ProcState::Sleeping;
    scheduler_yield_locked();

    s.proc.chan = 0;
    s.lock.release();
    lk.acquire();
}

/// Wakes every process sleeping on `chan`.
pub fn wakeup(chan: usize) {
    for i in 0..NPROC {
        let s = slot(i);
        if i == current() {
            continue;
        }
        s.lock.acquire();
        if s.proc.state == ProcState::Sleeping && s.proc.chan == chan {
            s.proc.state = ProcState::Runnable;
        }
        s.lock.release();
    }
}

/// Cooperative + timer-driven round robin: never returns, repeatedly picks
/// the next `Runnable` slot and switches to it.
pub fn scheduler() -> ! {
    loop {
        let mut ran = false;
        for i in 0..NPROC {
            let s = slot(i);
            s.lock.acquire();
            if s.proc.state == ProcState::Runnable {
                s.proc.state = ProcState::Running;
                cpu().proc.store(i, Ordering::Relaxed);
                ran = true;
                unsafe {
                    swtch(&mut cpu().context as *mut Context, &mut s.proc.context as *mut Context);
                }
                cpu().proc.store(NOPROC, Ordering::Relaxed);
            }
            s.lock.release();
        }
        if !ran {
            #[cfg(target_arch = "riscv64")]
            unsafe {
                core::arch::asm!("wfi")
            };
        }
    }
}

/// Gives up the hart back to the scheduler; caller's slot lock is NOT held
/// on entry (ordinary cooperative yield from a syscall or the timer tick).
pub fn r#yield() {
    let idx = current();
    let s = slot(idx);
    s.lock.acquire();
    if s.proc.state == ProcState::Running {
        s.proc.state = ProcState::Runnable;
    }
    scheduler_yield_locked();
    s.lock.release();
}

/// Switches back into `scheduler`. Caller must hold the current process's
/// slot lock already.
fn scheduler_yield_locked() {
    let idx = current();
    let s = slot(idx);
    unsafe {
        swtch(&mut s.proc.context as *mut Context, &mut cpu().context as *mut Context);
    }
}

fn scheduler_yield() {
    scheduler_yield_locked();
}

pub fn tick() {
    TICKS.fetch_add(1, Ordering::Relaxed);
    wakeup(TICKS.as_ptr() as usize);
}

pub fn ticks() -> usize {
    TICKS.load(Ordering::Relaxed)
}

/// Prints the process table.
pub fn procdump() {
    for i in 0..NPROC {
        let p = &slot(i).proc;
        if p.state == ProcState::Unused {
            continue;
        }
        crate::printf!("{:>4} {:?}\n", p.pid, p.state);
    }
}
