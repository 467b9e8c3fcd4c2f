// src/kernel/process/lifecycle.rs
//! Process teardown: unlink from the ready queue, reclaim its address
//! space and kernel stack frames, drop the record.

use crate::kernel::mm::address_space;
use crate::kernel::scheduler::{ProcessIndex, SCHEDULER};

/// Tear down a process: remove it from the ready queue, free its
/// kernel stack frames, destroy its address space, and drop its arena
/// slot. Per the lifecycle's Zombie → reclaimed transition, this is the
/// only path that frees a process's resources — there is no separate
/// "mark zombie, reap later" step because nothing in this kernel ever
/// waits on a child.
pub fn end_process(idx: ProcessIndex) {
    let mut scheduler = SCHEDULER.lock();
    scheduler.ready_remove(idx);
    let Some(process) = scheduler.remove_record(idx) else {
        return;
    };
    drop(scheduler);

    let stack_base = process.thread.stack_top.as_u64() - crate::kernel::process::THREAD_STACK_SIZE as u64;
    let mut space = process.address_space;
    for page in 0..4u64 {
        if let Some(phys) = space.unmap_4k(stack_base + page * 4096) {
            unsafe {
                address_space::free_physical_block(x86_64::structures::paging::PhysFrame::containing_address(
                    x86_64::PhysAddr::new(phys),
                ));
            }
        }
    }
    space.destroy();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::mm::address_space::AddressSpace;
    use crate::kernel::process::{Process, RegisterFrame, Thread};
    use x86_64::VirtAddr;

    #[test]
    fn end_process_on_unqueued_process_drops_the_record() {
        let mut scheduler = SCHEDULER.lock();
        let pid = scheduler.allocate_pid();
        let thread = Thread {
            parent: pid,
            priority: 1,
            stack_top: VirtAddr::new(0x5000),
            registers: RegisterFrame::for_new_thread(VirtAddr::new(0), VirtAddr::new(0x5000)),
        };
        let process = Process::new(pid, 1, 1, AddressSpace::for_test(), thread);
        let idx = scheduler.insert_record(process);
        drop(scheduler);

        end_process(idx);

        let scheduler = SCHEDULER.lock();
        assert_eq!(scheduler.find_by_pid(pid), None);
    }
}
