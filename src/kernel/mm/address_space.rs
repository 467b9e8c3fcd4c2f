// src/kernel/mm/address_space.rs
//! Per-process address space lifecycle: create, map/unmap, switch,
//! destroy. The "consumed interface" the process factory and scheduler
//! rely on to stay ignorant of page-table mechanics.

use core::sync::atomic::Ordering;
use x86_64::registers::control::{Cr3, Cr3Flags};
use x86_64::structures::paging::{
    FrameAllocator, Mapper, OffsetPageTable, Page, PageTable, PageTableFlags, PhysFrame, Size4KiB,
    Translate,
};
use x86_64::{PhysAddr, VirtAddr};

use crate::kernel::mm::frame::{GlobalFrameAllocator, LockedFrameAllocator};
use crate::kernel::mm::user_paging;
use crate::kernel::mm::PHYS_MEM_OFFSET;

fn phys_mem_offset() -> VirtAddr {
    VirtAddr::new(PHYS_MEM_OFFSET.load(Ordering::Relaxed))
}

unsafe fn pml4_ptr(frame: PhysFrame, offset: VirtAddr) -> &'static mut PageTable {
    let ptr = (offset + frame.start_address().as_u64()).as_mut_ptr::<PageTable>();
    unsafe { &mut *ptr }
}

/// A process's top-level page table, plus enough to switch to it and
/// tear it down. Owns every lower-half (user) mapping transitively
/// reachable from its PML4; the upper half is shared kernel state.
pub struct AddressSpace {
    pml4_frame: PhysFrame<Size4KiB>,
}

impl AddressSpace {
    /// Allocate a fresh top-level page table with the kernel half
    /// (entries 256..512) copied from the currently active table, so
    /// every address space shares the same kernel mappings.
    pub fn create() -> Option<Self> {
        let pml4_frame = LockedFrameAllocator::allocate()?;
        let offset = phys_mem_offset();

        let pml4 = unsafe { pml4_ptr(pml4_frame, offset) };
        pml4.zero();

        let (current_frame, _) = Cr3::read();
        let current_pml4 = unsafe { pml4_ptr(current_frame, offset) };
        for i in 256..512 {
            pml4[i] = current_pml4[i].clone();
        }

        Some(Self { pml4_frame })
    }

    /// Physical address of the top-level table, directly loadable into
    /// CR3.
    pub fn pml4_phys(&self) -> u64 {
        self.pml4_frame.start_address().as_u64()
    }

    fn mapper(&mut self) -> OffsetPageTable<'_> {
        let offset = phys_mem_offset();
        let pml4 = unsafe { pml4_ptr(self.pml4_frame, offset) };
        unsafe { OffsetPageTable::new(pml4, offset) }
    }

    /// Insert a 4 KiB mapping with the default user+writable+present
    /// flags (or just present+writable for kernel-only pages).
    pub fn map_4k(&mut self, phys: u64, virt: u64, user: bool) -> Result<(), MapFailure> {
        let mut flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
        if user {
            flags |= PageTableFlags::USER_ACCESSIBLE;
        }
        self.map_4k_flags(phys, virt, flags)
    }

    /// Insert a 4 KiB mapping with explicit flags, used by the ELF
    /// loader for segment-flag-aware permissions.
    pub fn map_4k_flags(
        &mut self,
        phys: u64,
        virt: u64,
        flags: PageTableFlags,
    ) -> Result<(), MapFailure> {
        let page = Page::<Size4KiB>::containing_address(VirtAddr::new(virt));
        let frame = PhysFrame::containing_address(PhysAddr::new(phys));
        let mut allocator = GlobalFrameAllocator;
        unsafe {
            self.mapper()
                .map_to(page, frame, flags, &mut allocator)
                .map_err(|_| MapFailure)?
                .flush();
        }
        Ok(())
    }

    /// Remove a 4 KiB mapping and return the physical frame that backed
    /// it, for reclamation by the caller.
    pub fn unmap_4k(&mut self, virt: u64) -> Option<u64> {
        let page = Page::<Size4KiB>::containing_address(VirtAddr::new(virt));
        let (frame, flush) = self.mapper().unmap(page).ok()?;
        flush.flush();
        Some(frame.start_address().as_u64())
    }

    /// Translate a virtual address without side effects. Used to detect
    /// whether a page is already mapped (e.g. segments sharing a page).
    pub fn translate(&mut self, virt: u64) -> Option<u64> {
        self.mapper()
            .translate_addr(VirtAddr::new(virt))
            .map(|a| a.as_u64())
    }

    /// Load this address space's top-level table into CR3.
    ///
    /// # Safety
    ///
    /// The caller must ensure interrupts are masked or that preemption
    /// mid-switch is otherwise accounted for: a stale CR3 reload during
    /// a half-built address space corrupts translations.
    pub unsafe fn activate(&self) {
        unsafe {
            Cr3::write(self.pml4_frame, Cr3Flags::empty());
        }
    }

    /// Reserve `n` contiguous 4 KiB pages of kernel virtual address
    /// space starting at `base`, without backing them — the caller maps
    /// them in with [`Self::map_4k`] once frames are ready.
    pub fn kernel_allocate_4k_pages(base: u64, n: u64) -> u64 {
        // This kernel's virtual layout has no separate kernel-heap
        // arena allocator; callers that need n contiguous kernel pages
        // (the kernel stack allocator) pick their own base and rely on
        // this purely as a naming/documentation seam.
        let _ = n;
        base
    }

    /// Free every user-space mapping and the top-level table itself.
    /// Consumes `self`: the address space cannot be used afterward.
    pub fn destroy(self) {
        unsafe { user_paging::free_user_page_table(self.pml4_frame) };
    }
}

/// Allocate one fresh physical frame, for callers that need raw frames
/// outside of a mapping operation (kernel stacks, ELF segment backing).
pub fn allocate_physical_block() -> Option<PhysFrame<Size4KiB>> {
    LockedFrameAllocator::allocate()
}

/// Return a physical frame to the allocator.
///
/// # Safety
///
/// `frame` must not still be mapped anywhere.
pub unsafe fn free_physical_block(frame: PhysFrame<Size4KiB>) {
    unsafe { LockedFrameAllocator::free(frame) };
}

#[cfg(test)]
impl AddressSpace {
    /// A non-functional address space for tests that only exercise
    /// process bookkeeping (ready-queue linking, PID allocation) and
    /// never map, activate, or destroy it.
    pub fn for_test() -> Self {
        Self {
            pml4_frame: PhysFrame::containing_address(PhysAddr::new(0x1000)),
        }
    }
}

/// Mapping failed — the allocator is exhausted or the target page was
/// already mapped. Per §4.A, frame exhaustion is treated as fatal by
/// callers; this type exists so the few spots that can recover (ELF
/// loader's "page already mapped" case) can distinguish it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapFailure;
