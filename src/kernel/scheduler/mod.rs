// src/kernel/scheduler/mod.rs
//! The ready queue: an arena of process records plus the circular
//! `next`-chain linking the ones currently eligible for dispatch.
//!
//! Represented as indices into a `Vec` rather than a true linked list
//! of pointers, so the queue survives removal-during-iteration and the
//! borrow checker without `unsafe`.

pub mod dispatcher;

use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

use crate::kernel::process::{Process, ProcessId};

/// Index into the scheduler's process arena. Stands in for the raw
/// pointer a circular linked list would otherwise use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessIndex(usize);

impl ProcessIndex {
    #[must_use]
    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Owns every process record and the ready-queue links between them,
/// plus the two pieces of scheduling state (`current`, `scheduler_lock`)
/// that must be mutated only with interrupts off or the lock held.
pub struct Scheduler {
    arena: Vec<Option<Process>>,
    queue_start: Option<ProcessIndex>,
    current: Option<ProcessIndex>,
    scheduler_lock: bool,
    next_pid: u64,
}

impl Scheduler {
    const fn new() -> Self {
        Self {
            arena: Vec::new(),
            queue_start: None,
            current: None,
            scheduler_lock: false,
            next_pid: 0,
        }
    }

    /// Hand out the next PID. PIDs are never reused.
    pub fn allocate_pid(&mut self) -> ProcessId {
        let pid = self.next_pid;
        self.next_pid += 1;
        ProcessId::new(pid)
    }

    /// Add a process record to the arena without linking it into the
    /// ready queue yet.
    pub fn insert_record(&mut self, process: Process) -> ProcessIndex {
        let idx = ProcessIndex(self.arena.len());
        self.arena.push(Some(process));
        idx
    }

    /// Drop a process record once it has already been unlinked from
    /// the ready queue.
    pub fn remove_record(&mut self, idx: ProcessIndex) -> Option<Process> {
        self.arena.get_mut(idx.0).and_then(|slot| slot.take())
    }

    pub fn process(&self, idx: ProcessIndex) -> &Process {
        self.arena[idx.0].as_ref().expect("process slot freed while still referenced")
    }

    pub fn process_mut(&mut self, idx: ProcessIndex) -> &mut Process {
        self.arena[idx.0]
            .as_mut()
            .expect("process slot freed while still referenced")
    }

    pub fn find_by_pid(&self, pid: ProcessId) -> Option<ProcessIndex> {
        self.arena
            .iter()
            .enumerate()
            .find(|(_, slot)| slot.as_ref().is_some_and(|p| p.pid() == pid))
            .map(|(i, _)| ProcessIndex(i))
    }

    #[must_use]
    pub const fn current(&self) -> Option<ProcessIndex> {
        self.current
    }

    pub fn set_current(&mut self, idx: Option<ProcessIndex>) {
        self.current = idx;
    }

    /// Insert `idx` into the ready queue (§4.D): first process becomes
    /// its own singleton cycle; otherwise it is spliced in immediately
    /// after `queue_start`, which keeps round-robin fair under
    /// steady-state traversal.
    pub fn ready_insert(&mut self, idx: ProcessIndex) {
        match self.queue_start {
            None => {
                self.process_mut(idx).next = Some(idx);
                self.queue_start = Some(idx);
                self.current = Some(idx);
            }
            Some(start) => {
                let start_next = self.process(start).next.expect("queue_start must be linked");
                self.process_mut(idx).next = Some(start_next);
                self.process_mut(start).next = Some(idx);
            }
        }
    }

    /// Remove `idx` from the ready queue (§4.D). Handles the
    /// single-element cycle and `idx == queue_start` explicitly rather
    /// than looping past the end. No-op if `idx` isn't linked.
    pub fn ready_remove(&mut self, idx: ProcessIndex) {
        let next = match self.process(idx).next {
            Some(n) => n,
            None => return,
        };

        if next == idx {
            self.process_mut(idx).next = None;
            self.queue_start = None;
            self.current = None;
            return;
        }

        let mut pred = next;
        loop {
            let pred_next = self.process(pred).next.expect("ready queue cycle broken");
            if pred_next == idx {
                break;
            }
            pred = pred_next;
        }
        self.process_mut(pred).next = Some(next);
        self.process_mut(idx).next = None;

        if self.queue_start == Some(idx) {
            self.queue_start = Some(next);
        }
        if self.current == Some(idx) {
            self.current = Some(next);
        }
    }

    /// Advance `current` to the next node in the ready-queue cycle.
    /// Unconditional: no priority weighting, no skipping non-`Active`
    /// processes (§4.D explicitly defers that to a future upgrade).
    pub fn advance_current(&mut self) -> Option<ProcessIndex> {
        let current = self.current?;
        let next = self.process(current).next?;
        self.current = Some(next);
        self.current
    }

    /// Number of processes currently linked into the ready queue, by
    /// walking the cycle once. Used by tests and by property checks,
    /// not on any hot path.
    pub fn ready_queue_len(&self) -> usize {
        let Some(start) = self.queue_start else {
            return 0;
        };
        let mut count = 1;
        let mut walker = self.process(start).next.expect("queue_start must be linked");
        while walker != start {
            count += 1;
            walker = self.process(walker).next.expect("ready queue cycle broken");
        }
        count
    }

    /// Save the prior `scheduler_lock` value and raise it. Pair with
    /// [`Self::restore_lock`].
    pub fn save_raise_lock(&mut self) -> bool {
        let prior = self.scheduler_lock;
        self.scheduler_lock = true;
        prior
    }

    pub fn restore_lock(&mut self, prior: bool) {
        self.scheduler_lock = prior;
    }

    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.scheduler_lock
    }
}

lazy_static! {
    /// The single scheduler instance. All ready-queue and dispatch
    /// state lives here; callers take the lock for the shortest
    /// critical section that correctness allows.
    pub static ref SCHEDULER: Mutex<Scheduler> = Mutex::new(Scheduler::new());
}

/// Look up a process's arena slot by PID. `O(n)` linear scan, matching
/// the message bus's own lookup cost (§4.F) — this kernel never has
/// enough processes for that to matter.
pub fn find_process_by_pid(pid: ProcessId) -> Option<ProcessIndex> {
    SCHEDULER.lock().find_by_pid(pid)
}

/// The idle task: PID 0, runs forever doing nothing but halting until
/// the next interrupt. Every system has at least this one process, so
/// the ready queue is never empty once boot completes.
extern "C" fn idle_process() -> ! {
    loop {
        x86_64::instructions::hlt();
    }
}

/// One-shot scheduler bring-up (§6 `initialize()`): create the idle
/// process, seed the dispatch globals and CR3 from it, then jump
/// straight into it. Never returns.
///
/// # Safety
///
/// Must be called exactly once, after the heap and frame allocator are
/// both live, with interrupts still disabled from boot.
pub unsafe fn initialize() -> ! {
    SCHEDULER.lock().save_raise_lock();

    let idle_entry = x86_64::VirtAddr::new(idle_process as usize as u64);
    let idle_pid = crate::kernel::process::create_process(idle_entry);

    let mut scheduler = SCHEDULER.lock();
    let idx = scheduler
        .find_by_pid(idle_pid)
        .expect("idle process must be in the ready queue immediately after creation");
    let idle = scheduler.process(idx);
    let entry = idle.thread.registers.rip;
    let stack = idle.thread.registers.rsp;
    let base = idle.thread.registers.rbp;
    let rflags = idle.thread.registers.rflags;
    let pml4 = idle.address_space.pml4_phys();
    drop(scheduler);

    // CR3 is loaded by `task_switch` itself from the published PML4;
    // no need to set it here too.
    x86_64::instructions::interrupts::disable();

    SCHEDULER.lock().restore_lock(false);

    crate::kernel::process::switch::publish_dispatch(entry, stack, base, pml4, rflags);
    unsafe {
        crate::kernel::process::switch::task_switch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::mm::address_space::AddressSpace;
    use crate::kernel::process::{RegisterFrame, Thread};
    use x86_64::VirtAddr;

    fn stub_process(s: &mut Scheduler) -> ProcessIndex {
        let pid = s.allocate_pid();
        let thread = Thread {
            parent: pid,
            priority: 1,
            stack_top: VirtAddr::new(0x1000),
            registers: RegisterFrame::for_new_thread(VirtAddr::new(0), VirtAddr::new(0x1000)),
        };
        let process = Process::new(pid, 1, 1, AddressSpace::for_test(), thread);
        s.insert_record(process)
    }

    #[test]
    fn pid_allocation_is_monotonic() {
        let mut s = Scheduler::new();
        let a = s.allocate_pid();
        let b = s.allocate_pid();
        let c = s.allocate_pid();
        assert!(a.as_u64() < b.as_u64());
        assert!(b.as_u64() < c.as_u64());
    }

    #[test]
    fn ready_insert_singleton_is_self_cycle() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        s.ready_insert(a);
        assert_eq!(s.process(a).next, Some(a));
        assert_eq!(s.current(), Some(a));
        assert_eq!(s.ready_queue_len(), 1);
    }

    #[test]
    fn ready_insert_splices_after_queue_start() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let b = stub_process(&mut s);
        let c = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_insert(b);
        s.ready_insert(c);
        // a -> c -> b -> a
        assert_eq!(s.process(a).next, Some(c));
        assert_eq!(s.process(c).next, Some(b));
        assert_eq!(s.process(b).next, Some(a));
        assert_eq!(s.ready_queue_len(), 3);
    }

    #[test]
    fn advance_current_cycles_through_the_whole_queue() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let b = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_insert(b);
        assert_eq!(s.current(), Some(a));
        assert_eq!(s.advance_current(), Some(b));
        assert_eq!(s.advance_current(), Some(a));
    }

    #[test]
    fn ready_remove_sole_element_empties_the_queue() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_remove(a);
        assert_eq!(s.ready_queue_len(), 0);
        assert_eq!(s.current(), None);
        assert_eq!(s.process(a).next, None);
    }

    #[test]
    fn ready_remove_queue_start_rewires_to_its_successor() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let b = stub_process(&mut s);
        let c = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_insert(b);
        s.ready_insert(c);
        // a -> c -> b -> a ; remove a (queue_start and current)
        s.ready_remove(a);
        assert_eq!(s.ready_queue_len(), 2);
        assert_eq!(s.current(), Some(c));
        assert_eq!(s.process(b).next, Some(c));
        assert_eq!(s.process(c).next, Some(b));
    }

    #[test]
    fn ready_remove_middle_element_relinks_around_it() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let b = stub_process(&mut s);
        let c = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_insert(b);
        s.ready_insert(c);
        // a -> c -> b -> a ; remove c
        s.ready_remove(c);
        assert_eq!(s.ready_queue_len(), 2);
        assert_eq!(s.process(a).next, Some(b));
        assert_eq!(s.process(b).next, Some(a));
    }

    #[test]
    fn scheduler_lock_save_restore_round_trips() {
        let mut s = Scheduler::new();
        assert!(!s.is_locked());
        let prior = s.save_raise_lock();
        assert!(s.is_locked());
        s.restore_lock(prior);
        assert!(!s.is_locked());
    }

    #[test]
    fn find_by_pid_locates_inserted_process() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let pid = s.process(a).pid();
        assert_eq!(s.find_by_pid(pid), Some(a));
    }

    /// The arena-level half of `dispatcher::tick` (decrement-or-advance),
    /// with the hardware jump stripped out — exercises the same
    /// round-robin bookkeeping `tick` does without touching `task_switch`.
    fn simulate_tick(s: &mut Scheduler) {
        let Some(current) = s.current() else { return };
        if s.process(current).time_slice > 0 {
            s.process_mut(current).time_slice -= 1;
            return;
        }
        if s.is_locked() {
            return;
        }
        let default = s.process(current).time_slice_default;
        s.process_mut(current).time_slice = default;
        s.advance_current();
    }

    #[test]
    fn quantum_preservation_holds_current_while_slice_remains() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        s.process_mut(a).time_slice = 3;
        s.process_mut(a).time_slice_default = 3;
        s.ready_insert(a);
        simulate_tick(&mut s);
        assert_eq!(s.current(), Some(a));
        assert_eq!(s.process(a).time_slice, 2);
    }

    #[test]
    fn lock_suppresses_switching_past_a_zeroed_slice() {
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let b = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_insert(b);
        s.process_mut(a).time_slice = 0;
        let prior = s.save_raise_lock();
        for _ in 0..5 {
            simulate_tick(&mut s);
        }
        assert_eq!(s.current(), Some(a));
        s.restore_lock(prior);
    }

    #[test]
    fn two_kernel_tasks_alternate_by_quantum() {
        // S2, quantum 1: tick 1 burns a's only slice, tick 2 switches to
        // b, tick 3 burns b's slice, tick 4 switches back, and so on.
        let mut s = Scheduler::new();
        let a = stub_process(&mut s);
        let b = stub_process(&mut s);
        s.ready_insert(a);
        s.ready_insert(b);
        let expected = [a, b, b, a, a, b];
        for want in expected {
            simulate_tick(&mut s);
            assert_eq!(s.current(), Some(want));
        }
    }

    #[test]
    fn round_robin_restores_default_quantum_on_every_handoff() {
        // Property 3's fairness rests on this: a process always resumes
        // with a full, untouched quantum, never a stale partial one.
        let mut s = Scheduler::new();
        let t = 3u32;
        let procs = [stub_process(&mut s), stub_process(&mut s), stub_process(&mut s)];
        for &p in &procs {
            s.process_mut(p).time_slice_default = t;
            s.process_mut(p).time_slice = t;
            s.ready_insert(p);
        }
        for _ in 0..(procs.len() as u32 * t * 2) {
            let before = s.current();
            simulate_tick(&mut s);
            let after = s.current().expect("queue never empties");
            if Some(after) != before {
                assert_eq!(s.process(after).time_slice, s.process(after).time_slice_default);
            }
        }
    }
}
