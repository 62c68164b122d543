//! Boot glue.
//!
//! `asm::entry.S`'s `_entry` sets up a per-hart boot stack from `BOOT_STACK`
//! below and falls straight into `kmain` - OpenSBI has already dropped us
//! into S-mode with the hart id in `a0` and a DTB pointer in `a1`, so there
//! is no privilege transition left to do here. `kmain` brings subsystems up
//! in dependency order: heap, then frames, then paging, then the process
//! table, then traps/PLIC, then the VFS and its initrd mount, then the
//! timer, then the first user process.
#![no_std]
#![no_main]

use kernel::param::KERNEL_HEAP_SIZE;
use kernel::riscv::PGROUNDUP;
use kernel::{console, fs, frame, heap, logging, plic, proc, riscv, timer, trap, vfs, vm};

/// Linker-provided end of the kernel image (`.text`/`.rodata`/`.data`/`.bss`;
/// see `kernel.ld`). Everything above this, up to `PHYSTOP`, is free RAM:
/// first the kernel heap, then the frame allocator's bitmap-tracked region.
extern "C" {
    static _end: u8;
    static _initrd_start: u8;
    static _initrd_end: u8;
}

/// Per-hart boot stacks `asm/entry.S`'s `_entry` computes into from the
/// hart id. Sized for `NCPU` so the indexing arithmetic in `entry.S` stays
/// general even though this kernel only ever runs a single hart.
#[no_mangle]
static mut BOOT_STACK: [u8; 65536 * kernel::param::NCPU] = [0; 65536 * kernel::param::NCPU];

fn initrd_bytes() -> &'static [u8] {
    let start = unsafe { &_initrd_start as *const u8 };
    let end = unsafe { &_initrd_end as *const u8 };
    let len = end as usize - start as usize;
    unsafe { core::slice::from_raw_parts(start, len) }
}

/// Entered once per hart from `asm/entry.S`. Only hart 0 runs the full boot
/// sequence - `cpuid != 0` never actually happens on the `virt` machine's
/// default single-hart configuration, but the branch is kept so the shape
/// stays general rather than asserting an invariant this kernel never
/// exercises.
#[no_mangle]
pub extern "C" fn kmain(_hartid: usize, _dtb: usize) -> ! {
    console::init();
    logging::init();
    log::info!("claudia kernel is booting...");

    let end_addr = unsafe { &_end as *const u8 as usize };
    let heap_base = PGROUNDUP!(end_addr);
    heap::init(heap_base, KERNEL_HEAP_SIZE);
    log::debug!("kernel heap initialized at {:#x}", heap_base);

    let frame_base = PGROUNDUP!(heap_base + KERNEL_HEAP_SIZE);
    frame::init(frame_base);
    log::debug!("frame allocator initialized at {:#x}", frame_base);

    let kpt = vm::init().expect("kmain: out of memory building kernel page table");
    vm::build_kernel_global_mappings(kpt).expect("kmain: out of memory mapping kernel-global region");
    frame::protect(kpt as usize);
    log::debug!("virtual memory initialized");

    // MMU enable happens only after the kernel page table is fully
    // constructed and validated by a self-translation test.
    assert_eq!(
        vm::translate(kpt, heap_base),
        Some(heap_base),
        "kmain: kernel page table failed self-translation test"
    );
    vm::enable(kpt);
    log::debug!("paging turned on");

    proc::init();
    log::debug!("process table initialized");

    trap::init();
    trap::init_hart();
    log::debug!("trap vector installed");

    plic::init();
    plic::init_hart();
    log::debug!("plic initialized");

    vfs::init();
    log::debug!("vfs initialized");

    fs::mount_into_vfs(initrd_bytes()).expect("kmain: malformed initrd image");
    log::debug!("initrd mounted");

    timer::init();
    riscv::intr_on();
    log::debug!("timekeeping initialized");

    proc::user_init();
    log::info!("first user process initialized");

    log::info!("system boot successful");
    proc::scheduler();
}
