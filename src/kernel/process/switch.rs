// src/kernel/process/switch.rs
//! The context-switch ABI between the dispatcher and the assembly stub
//! that actually performs the jump.
//!
//! The dispatcher never calls into a process's register state directly
//! — it publishes the dispatch globals and disables interrupts, then
//! the stub loads CR3, restores `rbp`, builds an interrupt-return frame
//! on the target stack, and `iretq`s into it. Every process runs at
//! CPL=0 (there is no ring change, so CS/SS always name the kernel
//! segments), but `iretq` is still required: it is what restores
//! RFLAGS, and with it the incoming process's saved interrupt flag,
//! after the `cli` the caller issued before jumping here. A plain `jmp`
//! would leave interrupts off forever after the first dispatch.

use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::arch::x86_64::gdt;

/// Marks where the sentinel RIP would live in a linker-placed build.
/// Not used for control flow here — [`DISPATCH_IN_PROGRESS`] is the
/// equivalent this port uses instead, since placing a symbol at a fixed
/// address requires a linker script this workspace doesn't carry.
pub const SWITCH_SENTINEL_RIP: u64 = 0xFFFF_FFFF_8000_BEEF;

/// Set immediately before the CR3 switch and jump, cleared at the top
/// of the next `tick()`. Stands in for the sentinel-RIP check: if the
/// timer fires again before this is cleared, the outgoing context was
/// captured mid-switch and must not be trusted.
pub static DISPATCH_IN_PROGRESS: AtomicBool = AtomicBool::new(false);

pub static PROCESS_ENTRY_POINT: AtomicU64 = AtomicU64::new(0);
pub static PROCESS_STACK: AtomicU64 = AtomicU64::new(0);
pub static PROCESS_BASE: AtomicU64 = AtomicU64::new(0);
pub static PROCESS_PML4: AtomicU64 = AtomicU64::new(0);
/// RFLAGS to hand the incoming process via the `iretq` frame. Carries
/// its saved interrupt flag across the switch — this is what actually
/// re-enables interrupts once the new task starts running.
pub static PROCESS_RFLAGS: AtomicU64 = AtomicU64::new(0x202);
/// Kernel code/data selectors for the `iretq` frame. Every process runs
/// at ring 0, so these never vary between processes; refreshed on every
/// publish rather than cached once, since it's cheap and keeps
/// `publish_dispatch` self-contained.
pub static PROCESS_CS: AtomicU64 = AtomicU64::new(0);
pub static PROCESS_SS: AtomicU64 = AtomicU64::new(0);

/// Publish the dispatch globals the switch stub reads, and raise
/// [`DISPATCH_IN_PROGRESS`]. Must be called with interrupts disabled;
/// the caller disables them and never re-enables before jumping to
/// [`task_switch`] — `iretq` is what re-enables them, via `rflags`.
pub fn publish_dispatch(entry: u64, stack: u64, base: u64, pml4: u64, rflags: u64) {
    let selectors = gdt::selectors();
    PROCESS_ENTRY_POINT.store(entry, Ordering::SeqCst);
    PROCESS_STACK.store(stack, Ordering::SeqCst);
    PROCESS_BASE.store(base, Ordering::SeqCst);
    PROCESS_PML4.store(pml4, Ordering::SeqCst);
    PROCESS_RFLAGS.store(rflags, Ordering::SeqCst);
    PROCESS_CS.store(selectors.kernel_code.0 as u64, Ordering::SeqCst);
    PROCESS_SS.store(selectors.kernel_data.0 as u64, Ordering::SeqCst);
    DISPATCH_IN_PROGRESS.store(true, Ordering::SeqCst);
}

/// Clear the in-progress flag. Called at the top of `tick()`, before
/// anything else reads process state — equivalent to the sentinel-RIP
/// check: if this was still set when we got here, the previous switch
/// never completed and the outgoing register capture must be skipped.
pub fn take_dispatch_in_progress() -> bool {
    DISPATCH_IN_PROGRESS.swap(false, Ordering::SeqCst)
}

/// Load the published CR3, restore `rbp`, build an interrupt-return
/// frame (RIP/CS/RFLAGS/RSP/SS) just below the top of the published
/// stack, and `iretq` into it. Never returns.
///
/// `rbp` is restored directly rather than through the `iretq` frame —
/// it isn't part of the hardware interrupt frame.
///
/// # Safety
///
/// The caller must have already published valid values via
/// [`publish_dispatch`] and disabled interrupts. `PROCESS_PML4` must
/// name a page table with the kernel's upper half mapped identically
/// to the one currently active, or the jump itself (still executing
/// kernel code) will fault immediately after the `mov cr3`. The stub's
/// body must be reachable in all address spaces (kernel half is
/// globally mapped).
#[unsafe(naked)]
pub unsafe extern "C" fn task_switch() -> ! {
    core::arch::naked_asm!(
        "lea rax, [rip + {pml4}]",
        "mov rax, [rax]",
        "mov cr3, rax",

        "lea rax, [rip + {base}]",
        "mov rbp, [rax]",

        // rax = top of the target stack; reserve 40 bytes below it for
        // the iretq frame (RIP, CS, RFLAGS, RSP, SS, low to high).
        "lea rax, [rip + {stack}]",
        "mov rax, [rax]",
        "sub rax, 40",

        "lea rcx, [rip + {entry}]",
        "mov rcx, [rcx]",
        "mov [rax], rcx",

        "lea rcx, [rip + {cs}]",
        "mov rcx, [rcx]",
        "mov [rax + 8], rcx",

        "lea rcx, [rip + {rflags}]",
        "mov rcx, [rcx]",
        "mov [rax + 16], rcx",

        "lea rcx, [rip + {stack}]",
        "mov rcx, [rcx]",
        "mov [rax + 24], rcx",

        "lea rcx, [rip + {ss}]",
        "mov rcx, [rcx]",
        "mov [rax + 32], rcx",

        "mov rsp, rax",
        "iretq",
        pml4 = sym PROCESS_PML4,
        base = sym PROCESS_BASE,
        stack = sym PROCESS_STACK,
        entry = sym PROCESS_ENTRY_POINT,
        rflags = sym PROCESS_RFLAGS,
        cs = sym PROCESS_CS,
        ss = sym PROCESS_SS,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_dispatch_sets_in_progress_and_all_globals() {
        publish_dispatch(0x1000, 0x2000, 0x3000, 0x4000, 0x246);
        assert!(DISPATCH_IN_PROGRESS.load(Ordering::SeqCst));
        assert_eq!(PROCESS_ENTRY_POINT.load(Ordering::SeqCst), 0x1000);
        assert_eq!(PROCESS_STACK.load(Ordering::SeqCst), 0x2000);
        assert_eq!(PROCESS_BASE.load(Ordering::SeqCst), 0x3000);
        assert_eq!(PROCESS_PML4.load(Ordering::SeqCst), 0x4000);
        assert_eq!(PROCESS_RFLAGS.load(Ordering::SeqCst), 0x246);
        assert!(take_dispatch_in_progress());
        assert!(!take_dispatch_in_progress());
    }

    #[test]
    fn publish_dispatch_sources_selectors_from_the_kernel_gdt() {
        publish_dispatch(0, 0, 0, 0, 0);
        let selectors = gdt::selectors();
        assert_eq!(PROCESS_CS.load(Ordering::SeqCst), selectors.kernel_code.0 as u64);
        assert_eq!(PROCESS_SS.load(Ordering::SeqCst), selectors.kernel_data.0 as u64);
    }
}
