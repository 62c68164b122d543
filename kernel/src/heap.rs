//! Kernel heap: a bump allocator over an identity-mapped region.
//!
//! `dealloc` is an intentional no-op - this allocator is for long-lived
//! kernel objects (the process table, the VFS tree, open-file slots), not
//! a general-purpose heap with churn.

use crate::spinlock::Spinlock;
use core::alloc::{GlobalAlloc, Layout};
use core::cell::UnsafeCell;

struct BumpState {
    base: usize,
    end: usize,
    cursor: usize,
}

struct KernelHeap {
    lock: Spinlock,
    state: UnsafeCell<BumpState>,
}

unsafe impl Sync for KernelHeap {}

impl KernelHeap {
    const fn new() -> Self {
        KernelHeap {
            lock: Spinlock::new("heap"),
            state: UnsafeCell::new(BumpState {
                base: 0,
                end: 0,
                cursor: 0,
            }),
        }
    }

    fn init(&self, base: usize, size: usize) {
        self.lock.acquire();
        unsafe {
            let s = &mut *self.state.get();
            s.base = base;
            s.end = base + size;
            s.cursor = base;
        }
        self.lock.release();
    }
}

unsafe impl GlobalAlloc for KernelHeap {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.lock.acquire();
        let s = &mut *self.state.get();
        let aligned = (s.cursor + layout.align() - 1) & !(layout.align() - 1);
        let next = aligned + layout.size();
        let ptr = if s.base == 0 || next > s.end {
            core::ptr::null_mut()
        } else {
            s.cursor = next;
            aligned as *mut u8
        };
        self.lock.release();
        ptr
    }

    unsafe fn dealloc(&self, _ptr: *mut u8, _layout: Layout) {
        // no-op.
    }
}

// Gated: when this crate is pulled in as a host-side library (the
// `kernel_as_a_lib` feature, used by `mkfs` to share SimpleFS/param/errno
// definitions), the consuming std binary brings its own global allocator and
// a second one here would be a duplicate-symbol link error.
#[cfg_attr(target_arch = "riscv64", global_allocator)]
static ALLOCATOR: KernelHeap = KernelHeap::new();

/// Must run once, before the first `alloc::boxed::Box`/`Vec`/etc. use.
pub fn init(base: usize, size: usize) {
    ALLOCATOR.init(base, size);
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;

    #[test]
    fn bump_allocator_respects_alignment_and_bounds() {
        let heap = KernelHeap::new();
        let mut backing = [0u8; 256];
        heap.init(backing.as_mut_ptr() as usize, backing.len());

        let layout = Layout::from_size_align(10, 16).unwrap();
        let p1 = unsafe { heap.alloc(layout) };
        assert_eq!(p1 as usize % 16, 0);

        let layout2 = Layout::from_size_align(300, 1).unwrap();
        let p2 = unsafe { heap.alloc(layout2) };
        assert!(p2.is_null());
    }
}
