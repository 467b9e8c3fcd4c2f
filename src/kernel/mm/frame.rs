// src/kernel/mm/frame.rs
//! 物理フレーム管理
//!
//! ブートローダから渡されたメモリマップに基づいて、物理メモリフレームを
//! 管理します。ビットマップで全フレームの使用状況を追跡するため、
//! プロセス終了時にフレームを個別に解放できます。

use alloc::vec::Vec;
use bootloader::bootinfo::{MemoryMap, MemoryRegionType};
use spin::Mutex;
use x86_64::structures::paging::{FrameAllocator, FrameDeallocator, PhysFrame, Size4KiB};
use x86_64::PhysAddr;

/// Skip the first megabyte: real-mode IVT, BIOS data area, video memory.
const SAFE_MEMORY_START: u64 = 0x0010_0000;

/// Bitmap-backed physical frame allocator.
///
/// Each entry tracks one 4 KiB frame drawn from the bootloader's usable
/// memory regions. Unlike a pure bump allocator, frames freed via
/// [`FrameDeallocator::deallocate_frame`] become available for reuse,
/// which process teardown depends on.
pub struct BitmapFrameAllocator {
    frames: Vec<PhysFrame<Size4KiB>>,
    used: Vec<bool>,
    next_hint: usize,
}

impl BitmapFrameAllocator {
    /// Build the allocator from the bootloader's memory map.
    ///
    /// # Safety
    ///
    /// `memory_map` must describe the actual usable physical memory of
    /// this machine, and this must be called only once: handing out the
    /// same frame from two allocator instances would alias physical
    /// memory.
    pub unsafe fn init(memory_map: &'static MemoryMap) -> Self {
        let mut frames = Vec::new();

        for region in memory_map.iter() {
            if region.region_type != MemoryRegionType::Usable {
                continue;
            }

            let start = region.range.start_addr().max(SAFE_MEMORY_START);
            let end = region.range.end_addr();
            if start >= end {
                continue;
            }

            let start_frame = PhysFrame::containing_address(PhysAddr::new(start));
            let end_frame = PhysFrame::containing_address(PhysAddr::new(end - 1));
            for frame in PhysFrame::range_inclusive(start_frame, end_frame) {
                frames.push(frame);
            }
        }

        let used = alloc::vec![false; frames.len()];
        Self {
            frames,
            used,
            next_hint: 0,
        }
    }

    /// Total number of tracked frames.
    pub fn capacity(&self) -> usize {
        self.frames.len()
    }

    /// Number of frames currently handed out.
    pub fn in_use(&self) -> usize {
        self.used.iter().filter(|&&b| b).count()
    }

    fn index_of(&self, frame: PhysFrame<Size4KiB>) -> Option<usize> {
        self.frames.iter().position(|&f| f == frame)
    }
}

unsafe impl FrameAllocator<Size4KiB> for BitmapFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        let len = self.used.len();
        for offset in 0..len {
            let idx = (self.next_hint + offset) % len.max(1);
            if !self.used[idx] {
                self.used[idx] = true;
                self.next_hint = (idx + 1) % len;
                return Some(self.frames[idx]);
            }
        }
        None
    }
}

impl FrameDeallocator<Size4KiB> for BitmapFrameAllocator {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) {
        if let Some(idx) = self.index_of(frame) {
            self.used[idx] = false;
        }
    }
}

/// Alias kept so call sites and the ported `user_paging` module can refer
/// to the boot-time frame allocator by the name the rest of this tree
/// already expects.
pub type BootInfoFrameAllocator = BitmapFrameAllocator;

/// Global, lock-guarded frame allocator, installed once during boot.
pub static LOCKED_FRAME_ALLOCATOR: Mutex<Option<BitmapFrameAllocator>> = Mutex::new(None);

/// Thin `Mutex<Option<BitmapFrameAllocator>>` wrapper so call sites can
/// allocate/deallocate without repeating the lock-and-unwrap dance.
pub struct LockedFrameAllocator;

impl LockedFrameAllocator {
    /// Install the allocator. Must be called exactly once during boot.
    ///
    /// # Safety
    ///
    /// See [`BitmapFrameAllocator::init`].
    pub unsafe fn install(memory_map: &'static MemoryMap) {
        let allocator = unsafe { BitmapFrameAllocator::init(memory_map) };
        *LOCKED_FRAME_ALLOCATOR.lock() = Some(allocator);
    }

    /// Allocate a single 4 KiB frame.
    pub fn allocate() -> Option<PhysFrame<Size4KiB>> {
        LOCKED_FRAME_ALLOCATOR
            .lock()
            .as_mut()
            .expect("frame allocator not installed")
            .allocate_frame()
    }

    /// Free a previously allocated frame.
    ///
    /// # Safety
    ///
    /// `frame` must have come from this allocator and must not still be
    /// mapped anywhere.
    pub unsafe fn free(frame: PhysFrame<Size4KiB>) {
        unsafe {
            LOCKED_FRAME_ALLOCATOR
                .lock()
                .as_mut()
                .expect("frame allocator not installed")
                .deallocate_frame(frame);
        }
    }
}

/// Zero-sized `FrameAllocator` handle that delegates to the global
/// [`LockedFrameAllocator`]. Lets mapper calls that need a
/// `FrameAllocator<Size4KiB>` borrow the global allocator without
/// threading a `&mut BitmapFrameAllocator` through every call site.
pub struct GlobalFrameAllocator;

unsafe impl FrameAllocator<Size4KiB> for GlobalFrameAllocator {
    fn allocate_frame(&mut self) -> Option<PhysFrame<Size4KiB>> {
        LockedFrameAllocator::allocate()
    }
}

impl FrameDeallocator<Size4KiB> for GlobalFrameAllocator {
    unsafe fn deallocate_frame(&mut self, frame: PhysFrame<Size4KiB>) {
        unsafe { LockedFrameAllocator::free(frame) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allocator_with_one_region(frame_count: usize) -> BitmapFrameAllocator {
        let frames: Vec<PhysFrame<Size4KiB>> = (0..frame_count)
            .map(|i| {
                PhysFrame::containing_address(PhysAddr::new(
                    SAFE_MEMORY_START + (i as u64) * 4096,
                ))
            })
            .collect();
        let used = alloc::vec![false; frames.len()];
        BitmapFrameAllocator {
            frames,
            used,
            next_hint: 0,
        }
    }

    #[test]
    fn allocate_then_free_is_reusable() {
        let mut a = allocator_with_one_region(4);
        let f1 = a.allocate_frame().unwrap();
        let f2 = a.allocate_frame().unwrap();
        assert_ne!(f1, f2);
        assert_eq!(a.in_use(), 2);

        unsafe { a.deallocate_frame(f1) };
        assert_eq!(a.in_use(), 1);

        let f3 = a.allocate_frame().unwrap();
        assert_eq!(f3, f1);
    }

    #[test]
    fn exhausted_allocator_returns_none() {
        let mut a = allocator_with_one_region(1);
        assert!(a.allocate_frame().is_some());
        assert!(a.allocate_frame().is_none());
    }
}
