// src/kernel/mm/user_paging.rs
//! User space page table management
//!
//! Functions for mapping user code, stack, and heap into a process's
//! page table.

use alloc::format;
use alloc::vec::Vec;
use core::fmt;
use x86_64::{
    structures::paging::{
        FrameAllocator, Mapper, OffsetPageTable, Page, PageTableFlags, PhysFrame, Size4KiB,
    },
    VirtAddr,
};

/// User memory layout constants.
///
/// User space address range: `0x0000_0000_0000_0000` to
/// `0x0000_7FFF_FFFF_FFFF`.
pub const USER_CODE_BASE: u64 = 0x0000_0000_0040_0000; // 4 MiB, traditional ELF base
/// User heap base address (96 TiB).
pub const USER_HEAP_BASE: u64 = 0x0000_6000_0000_0000;
/// User stack top address (128 TiB).
pub const USER_STACK_TOP: u64 = 0x0000_7000_0000_0000;

/// Default user stack size (1 MiB).
pub const DEFAULT_USER_STACK_SIZE: usize = 1024 * 1024;

/// Map user program code into a user page table.
///
/// Copies `code` into freshly allocated physical frames mapped at
/// `base_addr`, read-only and executable (code pages are never
/// writable, per W^X).
///
/// # Safety
///
/// The caller must ensure `mapper` is a valid user page table, that
/// `base_addr` lies in user space, and that no conflicting mapping
/// already exists there.
pub unsafe fn map_user_code<A>(
    mapper: &mut OffsetPageTable,
    code: &[u8],
    base_addr: VirtAddr,
    frame_allocator: &mut A,
) -> Result<Vec<PhysFrame>, MapError>
where
    A: FrameAllocator<Size4KiB>,
{
    if base_addr.as_u64() >= 0x0000_8000_0000_0000 {
        return Err(MapError::InvalidAddress);
    }

    let mut allocated_frames = Vec::new();
    let num_pages = (code.len() + 4095) / 4096;

    crate::debug_println!(
        "[user_paging] mapping {} bytes ({} pages) at {:#x}",
        code.len(),
        num_pages,
        base_addr.as_u64()
    );

    for i in 0..num_pages {
        let page_addr = base_addr + (i * 4096) as u64;
        let page: Page<Size4KiB> = Page::containing_address(page_addr);

        let frame = frame_allocator
            .allocate_frame()
            .ok_or(MapError::FrameAllocationFailed)?;

        let flags = PageTableFlags::PRESENT | PageTableFlags::USER_ACCESSIBLE;

        unsafe {
            mapper
                .map_to(page, frame, flags, frame_allocator)
                .map_err(|e| MapError::MappingFailed(format!("{:?}", e)))?
                .flush();
        }

        unsafe {
            let frame_ptr = (frame.start_address().as_u64()
                + crate::kernel::mm::PHYS_MEM_OFFSET.load(core::sync::atomic::Ordering::Relaxed))
                as *mut u8;
            let code_offset = i * 4096;
            let copy_len = core::cmp::min(4096, code.len() - code_offset);

            let dst = core::slice::from_raw_parts_mut(frame_ptr, 4096);
            dst[..copy_len].copy_from_slice(&code[code_offset..code_offset + copy_len]);
            dst[copy_len..].fill(0);
        }

        allocated_frames.push(frame);
    }

    Ok(allocated_frames)
}

/// Map a user stack below `USER_STACK_TOP`, growing downward, with an
/// unmapped guard page at the bottom to catch overflow.
///
/// Returns the virtual address the initial RSP should be set to.
///
/// # Safety
///
/// The caller must ensure `mapper` is a valid user page table and that
/// no conflicting mapping exists in the stack region.
pub unsafe fn map_user_stack<A>(
    mapper: &mut OffsetPageTable,
    stack_size: usize,
    frame_allocator: &mut A,
) -> Result<VirtAddr, MapError>
where
    A: FrameAllocator<Size4KiB>,
{
    let guard_page_size = 4096;
    let total_size = stack_size + guard_page_size;
    let stack_bottom = USER_STACK_TOP - total_size as u64;
    let num_pages = (stack_size + 4095) / 4096;

    for i in 0..num_pages {
        let page_addr = VirtAddr::new(stack_bottom + guard_page_size as u64 + (i * 4096) as u64);
        let page: Page<Size4KiB> = Page::containing_address(page_addr);

        let frame = frame_allocator
            .allocate_frame()
            .ok_or(MapError::FrameAllocationFailed)?;

        let flags = PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE
            | PageTableFlags::NO_EXECUTE;

        unsafe {
            mapper
                .map_to(page, frame, flags, frame_allocator)
                .map_err(|e| MapError::MappingFailed(format!("{:?}", e)))?
                .flush();
        }

        unsafe {
            let frame_ptr = (frame.start_address().as_u64()
                + crate::kernel::mm::PHYS_MEM_OFFSET.load(core::sync::atomic::Ordering::Relaxed))
                as *mut u8;
            core::ptr::write_bytes(frame_ptr, 0, 4096);
        }
    }

    // The guard page at `stack_bottom` is intentionally left unmapped.
    Ok(VirtAddr::new(USER_STACK_TOP))
}

/// Unmap `num_pages` starting at `start_addr` and deallocate the backing
/// frames.
///
/// # Safety
///
/// `start_addr` must be page-aligned and the range must currently be
/// mapped by `mapper` with no other references to the memory.
pub unsafe fn unmap_user_memory<A>(
    mapper: &mut OffsetPageTable,
    frame_allocator: &mut A,
    start_addr: VirtAddr,
    num_pages: usize,
) -> Result<(), MapError>
where
    A: x86_64::structures::paging::FrameDeallocator<Size4KiB>,
{
    for i in 0..num_pages {
        let page_addr = start_addr + (i * 4096) as u64;
        let page: Page<Size4KiB> = Page::containing_address(page_addr);

        match mapper.unmap(page) {
            Ok((frame, flush)) => {
                flush.flush();
                unsafe { frame_allocator.deallocate_frame(frame) };
            }
            Err(_) => return Err(MapError::NotMapped),
        }
    }

    Ok(())
}

/// Free every lower-half (user) mapping reachable from `pml4_frame`,
/// then free the top-level table itself.
///
/// There is no fork in this kernel, so every frame below a process's
/// own PML4 is uniquely owned by that process — no reference counting
/// is needed, unlike a CoW-capable fork path.
///
/// # Safety
///
/// `pml4_frame` must be a top-level table allocated by
/// [`crate::kernel::mm::address_space::AddressSpace::create`] and must
/// not be the currently active one (CR3 must point elsewhere, or the
/// caller is about to switch away immediately).
pub unsafe fn free_user_page_table(pml4_frame: PhysFrame) {
    use crate::kernel::mm::frame::GlobalFrameAllocator;
    use x86_64::structures::paging::{page_table::PageTableEntry, FrameDeallocator, PageTable};

    let offset = VirtAddr::new(
        crate::kernel::mm::PHYS_MEM_OFFSET.load(core::sync::atomic::Ordering::Relaxed),
    );

    unsafe fn table_at(offset: VirtAddr, frame: PhysFrame) -> &'static mut PageTable {
        let ptr = (offset + frame.start_address().as_u64()).as_mut_ptr::<PageTable>();
        unsafe { &mut *ptr }
    }

    unsafe fn free_level(entry: &mut PageTableEntry, offset: VirtAddr, depth: u8) {
        if entry.is_unused() || entry.flags().contains(PageTableFlags::HUGE_PAGE) {
            if let Ok(frame) = entry.frame() {
                unsafe { GlobalFrameAllocator.deallocate_frame(frame) };
            }
            entry.set_unused();
            return;
        }

        if let Ok(frame) = entry.frame() {
            if depth > 0 {
                let table = unsafe { table_at(offset, frame) };
                for child in table.iter_mut() {
                    if !child.is_unused() {
                        unsafe { free_level(child, offset, depth - 1) };
                    }
                }
            }
            unsafe { GlobalFrameAllocator.deallocate_frame(frame) };
        }
        entry.set_unused();
    }

    let pml4 = unsafe { table_at(offset, pml4_frame) };
    for entry in pml4.iter_mut().take(256) {
        if !entry.is_unused() {
            unsafe { free_level(entry, offset, 2) };
        }
    }
    unsafe { GlobalFrameAllocator.deallocate_frame(pml4_frame) };
}

/// Errors produced by user page table operations.
#[derive(Debug)]
pub enum MapError {
    /// Failed to allocate a physical frame.
    FrameAllocationFailed,
    /// Address is not in user space.
    InvalidAddress,
    /// Mapping operation failed.
    MappingFailed(alloc::string::String),
    /// Address is not mapped.
    NotMapped,
    /// Page already mapped.
    PageAlreadyMapped,
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FrameAllocationFailed => write!(f, "failed to allocate physical frame"),
            Self::InvalidAddress => write!(f, "address is not in user space"),
            Self::MappingFailed(msg) => write!(f, "mapping failed: {}", msg),
            Self::NotMapped => write!(f, "address is not mapped"),
            Self::PageAlreadyMapped => write!(f, "page is already mapped"),
        }
    }
}
