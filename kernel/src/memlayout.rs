//! Physical memory layout for the QEMU `virt` machine.
//!
//! No VIRTIO0 entry: claudia has no block device, SimpleFS is populated
//! from an embedded initrd blob instead. `TEST0` is the power/test-finisher
//! device.
//!
//! qemu -machine virt (hw/riscv/virt.c):
//! 0x00001000 -- boot ROM, provided by qemu
//! 0x00100000 -- test/poweroff finisher device
//! 0x02000000 -- CLINT
//! 0x0c000000 -- PLIC
//! 0x10000000 -- uart0
//! 0x80000000 -- OpenSBI loads itself here, jumps to 0x80200000 in S-mode
//! 0x80200000 -- kernel entry point (-kernel loads claudia here)

use crate::riscv::*;

pub const UART0: usize = 0x10000000;
pub const UART0_IRQ: usize = 10;

// core local interruptor (CLINT): timer + software-interrupt registers.
// claudia never pokes CLINT directly - the S-mode timer is rearmed through
// the SBI legacy timer extension (see sbi.rs) - but the address is kept
// here because it is still part of the platform's physical memory map and
// the kernel page table maps it.
pub const CLINT: usize = 0x0200_0000;
pub const CLINT_MAP_SIZE: usize = 0x10000;

// platform-level interrupt controller (PLIC).
pub const PLIC: usize = 0x0c00_0000;
pub const PLIC_MAP_SIZE: usize = 0x0040_0000;

#[macro_export]
macro_rules! PLIC_SENABLE {
    ( $hart:expr ) => {
        $crate::memlayout::PLIC + 0x2080 + ($hart) * 0x100
    };
}
#[macro_export]
macro_rules! PLIC_SPRIORITY {
    ( $hart:expr ) => {
        $crate::memlayout::PLIC + 0x201000 + ($hart) * 0x2000
    };
}
#[macro_export]
macro_rules! PLIC_SCLAIM {
    ( $hart:expr ) => {
        $crate::memlayout::PLIC + 0x201004 + ($hart) * 0x2000
    };
}

// memory-mapped "test device": magic u32 writes trigger shutdown/reboot.
pub const TEST0: usize = 0x10_0000;
pub const TEST0_SHUTDOWN: u32 = 0x5555;
pub const TEST0_REBOOT: u32 = 0x7777;

// RAM: kernel and user pages live from KERNBASE to PHYSTOP.
pub const KERNBASE: usize = 0x8020_0000;
pub const PHYSTOP: usize = 0x8000_0000 + 128 * 1024 * 1024;

// trampoline page: mapped at the same (highest) virtual address in every
// address space so a satp switch can happen without losing the PC.
pub const TRAMPOLINE: usize = MAXVA - PGSIZE;

// kernel stacks live below the trampoline, each with a guard page below it.
// A single page is easy to exhaust once core/alloc usage grows the call
// stack, so each process gets KSTACK_PAGES (2) plus one guard page. Past
// that boundary, sp points at an illegal virtual address and RISC-V traps
// with scause = 0xf (store/AMO page fault), stval holding the address.
#[macro_export]
macro_rules! KSTACK {
    ( $p:expr ) => {
        $crate::memlayout::TRAMPOLINE
            - (($p) + 1) * ($crate::param::KSTACK_PAGES + 1) * $crate::riscv::PGSIZE
    };
}

// User address space, counting down from the top:
// TRAMPOLINE
// TRAPFRAME (per-process trap frame page)
// ... free growth room for uvmalloc/brk ...
// heap (grows up from USER_HEAP_BASE)
// stack (fixed size, grows down to a guard page)
// data/bss
// text (USER_CODE_BASE)
pub const TRAPFRAME: usize = TRAMPOLINE - PGSIZE;
