//! Physical frame allocator: a bitmap over one contiguous region, rather
//! than a freelist threaded through the free pages themselves. SimpleFS's
//! own fixed-size, bitmap-indexed file table already nudges this codebase
//! toward "bitmap, not pointer-chasing", and a bitmap gives `stats` for
//! free, which a freelist can't without walking it.

use crate::param::FRAME_REGION_SIZE;
use crate::riscv::PGSIZE;
use crate::spinlock::Spinlock;

const NFRAMES: usize = FRAME_REGION_SIZE / PGSIZE;
const BITMAP_BYTES: usize = (NFRAMES + 7) / 8;

struct FrameAllocator {
    base: usize,
    /// 1 = used, 0 = free.
    bitmap: [u8; BITMAP_BYTES],
    free: usize,
}

impl FrameAllocator {
    const fn new() -> Self {
        FrameAllocator {
            base: 0,
            bitmap: [0; BITMAP_BYTES],
            free: 0,
        }
    }

    fn init(&mut self, base: usize) {
        self.base = base;
        self.bitmap = [0; BITMAP_BYTES];
        self.free = NFRAMES;
    }

    fn index_of(&self, addr: usize) -> Option<usize> {
        if addr < self.base || self.base == 0 {
            return None;
        }
        let off = addr - self.base;
        if off % PGSIZE != 0 {
            return None;
        }
        let idx = off / PGSIZE;
        if idx >= NFRAMES {
            return None;
        }
        Some(idx)
    }

    fn bit_get(&self, idx: usize) -> bool {
        self.bitmap[idx / 8] & (1 << (idx % 8)) != 0
    }

    fn bit_set(&mut self, idx: usize) {
        self.bitmap[idx / 8] |= 1 << (idx % 8);
    }

    fn bit_clear(&mut self, idx: usize) {
        self.bitmap[idx / 8] &= !(1 << (idx % 8));
    }

    /// First-fit scan, byte at a time so a fully-used byte (0xFF) is
    /// rejected in one comparison rather than eight.
    fn alloc(&mut self) -> Option<usize> {
        for byte in 0..BITMAP_BYTES {
            if self.bitmap[byte] == 0xFF {
                continue;
            }
            for bit in 0..8 {
                let idx = byte * 8 + bit;
                if idx >= NFRAMES {
                    break;
                }
                if !self.bit_get(idx) {
                    self.bit_set(idx);
                    self.free -= 1;
                    return Some(self.base + idx * PGSIZE);
                }
            }
        }
        None
    }

    fn free_frame(&mut self, addr: usize) {
        let Some(idx) = self.index_of(addr) else {
            return;
        };
        if !self.bit_get(idx) {
            // double free: silent no-op.
            return;
        }
        self.bit_clear(idx);
        self.free += 1;
    }
}

static LOCK: Spinlock = Spinlock::new("frame");
static mut ALLOCATOR: FrameAllocator = FrameAllocator::new();

/// Stable sentinel address the allocator refuses to hand back out once
/// freed nowhere, but more importantly that callers must never pass to
/// `free` while still active - the kernel root page table in particular.
static mut PROTECTED: [usize; 1] = [0];

pub fn init(base: usize) {
    LOCK.acquire();
    unsafe { ALLOCATOR.init(base) };
    LOCK.release();
}

/// Marks `addr` as never-freeable; used for the kernel root page table once
/// it's built and the MMU is live.
pub fn protect(addr: usize) {
    unsafe { PROTECTED[0] = addr };
}

pub fn alloc() -> Option<usize> {
    LOCK.acquire();
    let r = unsafe { ALLOCATOR.alloc() };
    LOCK.release();
    r
}

pub fn free(addr: usize) {
    if unsafe { PROTECTED[0] } == addr && addr != 0 {
        return;
    }
    LOCK.acquire();
    unsafe { ALLOCATOR.free_frame(addr) };
    LOCK.release();
}

pub struct Stats {
    pub total: usize,
    pub free: usize,
}

pub fn stats() -> Stats {
    LOCK.acquire();
    let s = Stats {
        total: NFRAMES,
        free: unsafe { ALLOCATOR.free },
    };
    LOCK.release();
    s
}

#[cfg(all(test, feature = "std-test"))]
mod tests {
    use super::*;

    #[test]
    fn alloc_is_first_fit_and_frees_back() {
        let mut a = FrameAllocator::new();
        a.init(0x1000);
        let f1 = a.alloc().unwrap();
        let f2 = a.alloc().unwrap();
        assert_ne!(f1, f2);
        assert_eq!(a.free, NFRAMES - 2);
        a.free_frame(f1);
        assert_eq!(a.free, NFRAMES - 1);
        let f3 = a.alloc().unwrap();
        assert_eq!(f3, f1); // first-fit reclaims the lowest free frame
    }

    #[test]
    fn double_free_is_a_silent_noop() {
        let mut a = FrameAllocator::new();
        a.init(0x1000);
        let f1 = a.alloc().unwrap();
        a.free_frame(f1);
        let before = a.free;
        a.free_frame(f1);
        assert_eq!(a.free, before);
    }

    #[test]
    fn free_of_unknown_address_is_ignored() {
        let mut a = FrameAllocator::new();
        a.init(0x1000);
        a.free_frame(0xDEAD_0000);
        assert_eq!(a.free, NFRAMES);
    }
}
