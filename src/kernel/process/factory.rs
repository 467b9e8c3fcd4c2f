// src/kernel/process/factory.rs
//! Builds `Process` records from either a bare kernel entry point or an
//! already-mapped ELF64 image, and hands them to the ready queue.

use x86_64::instructions::interrupts;
use x86_64::registers::control::Cr3;
use x86_64::VirtAddr;

use crate::kernel::mm::address_space::{self, AddressSpace};
use crate::kernel::process::elf::{Elf64Header, ElfError};
use crate::kernel::process::{Process, ProcessId, RegisterFrame, Thread, THREAD_STACK_SIZE};
use crate::kernel::scheduler::SCHEDULER;

/// Errors specific to `load_elf`; `create_process`'s only failure mode
/// (frame exhaustion) is fatal and panics, per §4.A's error model.
#[derive(Debug, Clone, Copy)]
pub enum LoadElfError {
    Elf(ElfError),
    OutOfMemory,
}

impl From<ElfError> for LoadElfError {
    fn from(e: ElfError) -> Self {
        LoadElfError::Elf(e)
    }
}

/// Allocate 4 fresh physical frames and map them as a contiguous 16 KiB
/// kernel stack at `stack_base`, returning the top (highest address).
fn allocate_kernel_stack(space: &mut AddressSpace, stack_base: u64) -> Option<VirtAddr> {
    for page in 0..4u64 {
        let frame = address_space::allocate_physical_block()?;
        let virt = stack_base + page * 4096;
        space
            .map_4k(frame.start_address().as_u64(), virt, false)
            .ok()?;
    }
    Some(VirtAddr::new(stack_base + THREAD_STACK_SIZE as u64))
}

/// Virtual base every process's kernel stack is mapped at. Real
/// concurrency would need a per-process slot; this kernel runs one CPU
/// and never has two stacks live at this address simultaneously because
/// each process owns its own address space.
const KERNEL_STACK_BASE: u64 = 0xFFFF_FF00_0000_0000;

fn insert_and_queue(process: Process) -> ProcessId {
    let mut scheduler = SCHEDULER.lock();
    let pid = process.pid();
    let idx = scheduler.insert_record(process);
    scheduler.ready_insert(idx);
    pid
}

/// §4.C `create_process`: build a process that starts executing kernel
/// code at `entry`, with no user-space mappings.
pub fn create_process(entry: VirtAddr) -> ProcessId {
    let mut scheduler = SCHEDULER.lock();
    let prior_lock = scheduler.save_raise_lock();
    let pid = scheduler.allocate_pid();
    drop(scheduler);

    let mut space = AddressSpace::create().expect("frame allocator exhausted creating address space");
    let stack_top =
        allocate_kernel_stack(&mut space, KERNEL_STACK_BASE).expect("frame allocator exhausted allocating kernel stack");

    let registers = RegisterFrame::for_new_thread(entry, stack_top);
    let thread = Thread {
        parent: pid,
        priority: 1,
        stack_top,
        registers,
    };
    let process = Process::new(pid, 1, 1, space, thread);

    let pid = insert_and_queue(process);

    let mut scheduler = SCHEDULER.lock();
    scheduler.restore_lock(prior_lock);
    pid
}

/// §4.C `load_elf`: build a process from an ELF64 image already mapped
/// into kernel memory, mapping its LOAD segments into a fresh address
/// space and pointing the thread's entry at the image's entry point.
pub fn load_elf(image: &[u8]) -> Result<ProcessId, LoadElfError> {
    let mut scheduler = SCHEDULER.lock();
    let prior_lock = scheduler.save_raise_lock();
    let pid = scheduler.allocate_pid();
    drop(scheduler);

    let header = unsafe { Elf64Header::from_bytes(image)? };
    let program_headers = unsafe { header.program_headers(image)? };

    let mut space = AddressSpace::create().expect("frame allocator exhausted creating address space");

    load_segments(&mut space, program_headers, image)?;

    let stack_top =
        allocate_kernel_stack(&mut space, KERNEL_STACK_BASE).expect("frame allocator exhausted allocating kernel stack");

    let entry = VirtAddr::new(header.e_entry);
    let registers = RegisterFrame::for_new_thread(entry, stack_top);
    let thread = Thread {
        parent: pid,
        priority: 1,
        stack_top,
        registers,
    };
    let process = Process::new(pid, 1, 10, space, thread);

    let pid = insert_and_queue(process);

    let mut scheduler = SCHEDULER.lock();
    scheduler.restore_lock(prior_lock);

    Ok(pid)
}

/// Pass 1 + pass 2 of the ELF loader (§4.C steps 3-7): switches CR3 to
/// `space` for the duration of the copy so direct virtual-address
/// writes land in the new process's pages, then restores the outgoing
/// table exactly once.
fn load_segments(
    space: &mut AddressSpace,
    program_headers: &[crate::kernel::process::elf::Elf64ProgramHeader],
    image: &[u8],
) -> Result<(), LoadElfError> {
    let (outgoing_frame, outgoing_flags) = Cr3::read();

    interrupts::disable();
    unsafe { space.activate() };

    let mut zero_page_mapped = space.translate(0).is_some();

    for phdr in program_headers {
        if phdr.p_memsz == 0 {
            continue;
        }

        let page_count = (phdr.p_memsz + (phdr.p_vaddr & 0xFFF)) / 4096 + 1;
        let flags = phdr.to_page_flags();

        for j in 0..page_count {
            let virt = phdr.p_vaddr + j * 4096;
            if space.translate(virt).is_some() {
                continue;
            }
            let frame = address_space::allocate_physical_block().ok_or(LoadElfError::OutOfMemory)?;
            space
                .map_4k_flags(frame.start_address().as_u64(), virt, flags)
                .map_err(|_| LoadElfError::OutOfMemory)?;
        }

        if !zero_page_mapped {
            let frame = address_space::allocate_physical_block().ok_or(LoadElfError::OutOfMemory)?;
            space
                .map_4k(frame.start_address().as_u64(), 0, true)
                .map_err(|_| LoadElfError::OutOfMemory)?;
            zero_page_mapped = true;
        }
    }

    for phdr in program_headers {
        if phdr.p_memsz == 0 {
            continue;
        }
        unsafe {
            let vaddr = phdr.p_vaddr as *mut u8;
            core::ptr::write_bytes(vaddr, 0, phdr.p_memsz as usize);
            let src = image.as_ptr().add(phdr.p_offset as usize);
            core::ptr::copy_nonoverlapping(src, vaddr, phdr.p_filesz as usize);
        }
    }

    unsafe { Cr3::write(outgoing_frame, outgoing_flags) };
    interrupts::enable();

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kernel_stack_base_is_page_aligned() {
        assert_eq!(KERNEL_STACK_BASE % 4096, 0);
    }

    #[test]
    fn elf_error_converts_into_load_elf_error() {
        let e: LoadElfError = ElfError::InvalidMagic.into();
        assert!(matches!(e, LoadElfError::Elf(ElfError::InvalidMagic)));
    }
}
