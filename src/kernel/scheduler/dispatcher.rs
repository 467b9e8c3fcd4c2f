// src/kernel/scheduler/dispatcher.rs
//! The tick path: called from the timer ISR on every interrupt, decides
//! whether to preserve the current quantum or switch to the next ready
//! process.

use crate::kernel::process::switch;
use crate::kernel::scheduler::SCHEDULER;

/// Read the address of the instruction right after this call returns.
/// Stands in for the original's `ReadRIP` helper; here it exists purely
/// for documentation fidelity since the sentinel check uses
/// [`switch::take_dispatch_in_progress`] instead of comparing against a
/// fixed address.
#[inline(always)]
fn read_rip() -> u64 {
    let rip: u64;
    unsafe {
        core::arch::asm!("lea {}, [rip]", out(reg) rip);
    }
    rip
}

/// Run one tick of the scheduler (§4.E). Called from the timer ISR with
/// interrupts still disabled; either returns (fast path, or lock held)
/// or never returns (it jumped into [`switch::task_switch`]).
///
/// `interrupted_rflags` is the RFLAGS the CPU captured in the ISR's own
/// interrupt frame at entry — the process's true pre-interrupt flags,
/// including whatever its interrupt-enable bit was. It must come from
/// there rather than a fresh `pushfq` here, since by the time `tick`
/// runs the CPU has already cleared IF for the ISR itself.
pub fn tick(interrupted_rflags: u64) {
    // Sentinel check equivalent: if the last dispatch never completed,
    // skip this tick rather than capture a half-switched context.
    if switch::take_dispatch_in_progress() {
        return;
    }

    let mut scheduler = SCHEDULER.lock();

    let Some(current) = scheduler.current() else {
        return;
    };

    if scheduler.process(current).time_slice > 0 {
        scheduler.process_mut(current).time_slice -= 1;
        return;
    }

    if scheduler.is_locked() {
        return;
    }

    let default = scheduler.process(current).time_slice_default;
    scheduler.process_mut(current).time_slice = default;

    // The resume point for `current` is right here: when it is next
    // dispatched, `task_switch` jumps to this captured RIP, which lands
    // back inside this function on `current`'s own kernel stack.
    let rip = read_rip();
    let rsp: u64;
    let rbp: u64;
    unsafe {
        core::arch::asm!("mov {}, rsp", out(reg) rsp);
        core::arch::asm!("mov {}, rbp", out(reg) rbp);
    }
    {
        let process = scheduler.process_mut(current);
        process.thread.registers.rip = rip;
        process.thread.registers.rsp = rsp;
        process.thread.registers.rbp = rbp;
        process.thread.registers.rflags = interrupted_rflags;
    }

    let Some(next) = scheduler.advance_current() else {
        return;
    };

    let next_process = scheduler.process(next);
    let entry = next_process.thread.registers.rip;
    let stack = next_process.thread.registers.rsp;
    let base = next_process.thread.registers.rbp;
    let rflags = next_process.thread.registers.rflags;
    let pml4 = next_process.address_space.pml4_phys();
    drop(scheduler);

    // Step 9: disable interrupts and jump to the stub, which loads CR3
    // from the just-published globals and jumps into the new task.
    x86_64::instructions::interrupts::disable();
    switch::publish_dispatch(entry, stack, base, pml4, rflags);

    unsafe {
        switch::task_switch();
    }
}
