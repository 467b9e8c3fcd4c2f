// src/kernel/mm/mod.rs
//! メモリ管理モジュール

pub mod address_space;
pub mod allocator;
pub mod frame;
pub mod page_fault;
pub mod paging;
pub mod types;
pub mod user_paging;

pub use allocator::{LinkedListAllocator, LockedHeap};
pub use frame::{BitmapFrameAllocator, BootInfoFrameAllocator, LockedFrameAllocator};
pub use types::{LayoutSize, MemoryError, PageFrameNumber, PhysAddr, VirtAddr};

use bootloader::bootinfo::{MemoryMap, MemoryRegionType};
use core::sync::atomic::AtomicU64;

/// Higher-half kernel base address.
pub const KERNEL_BASE: u64 = 0xFFFF_FFFF_8000_0000;

/// Offset at which physical memory is mapped into kernel space
/// (`bootloader`'s `map_physical_memory` feature, read from `BootInfo`
/// at boot and published here so code far from `main` can translate
/// physical addresses without threading the offset through every call).
pub static PHYS_MEM_OFFSET: AtomicU64 = AtomicU64::new(0);

/// Find a usable memory region to back the kernel heap.
///
/// Skips the very first usable region (handed to the frame allocator)
/// and low memory below 1 MiB, mirroring the frame allocator's own
/// exclusions so the two never fight over the same bytes.
pub fn find_heap_region(memory_map: &MemoryMap, min_size: u64) -> Option<(PhysAddr, LayoutSize)> {
    const SAFE_MEMORY_START: u64 = 0x0010_0000;

    let mut usable = memory_map
        .iter()
        .filter(|r| r.region_type == MemoryRegionType::Usable)
        .filter(|r| r.range.start_addr() >= SAFE_MEMORY_START)
        .filter(|r| r.range.end_addr() - r.range.start_addr() >= min_size);

    // Skip the region the frame allocator will draw its first frames from.
    let _ = usable.next();

    let region = usable.next().or_else(|| {
        memory_map
            .iter()
            .filter(|r| r.region_type == MemoryRegionType::Usable)
            .filter(|r| r.range.start_addr() >= SAFE_MEMORY_START)
            .find(|r| r.range.end_addr() - r.range.start_addr() >= min_size)
    })?;

    Some((
        PhysAddr::new(region.range.start_addr() as usize),
        LayoutSize::new((region.range.end_addr() - region.range.start_addr()) as usize),
    ))
}
