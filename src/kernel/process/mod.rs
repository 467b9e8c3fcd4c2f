// src/kernel/process/mod.rs
//! Process and thread records.
//!
//! A `Process` owns exactly one `Thread` (multi-threaded processes are
//! out of scope) plus its address space, message queue, and the link
//! that makes it a node of the scheduler's ready-queue arena.

pub mod elf;
pub mod factory;
pub mod lifecycle;
pub mod switch;

pub use factory::{create_process, load_elf, LoadElfError};
pub use lifecycle::end_process;

use alloc::collections::VecDeque;
use x86_64::VirtAddr;

use crate::kernel::mm::address_space::AddressSpace;
use crate::kernel::scheduler::ProcessIndex;

/// Per-receiver message queue bound. Past this, `send_message` reports
/// back-pressure instead of growing without limit.
pub const MESSAGE_QUEUE_CAPACITY: usize = 32;

/// Fixed payload size for a message. The scheduler treats it as opaque
/// bytes; interpretation is the sender/receiver's business.
pub const MESSAGE_PAYLOAD_SIZE: usize = 256;

/// A process-to-process message. `sender_pid == receiver_pid == 0`
/// denotes the null/queue-empty sentinel returned by `receive_message`.
#[derive(Debug, Clone, Copy)]
pub struct Message {
    pub sender_pid: u64,
    pub receiver_pid: u64,
    pub payload: [u8; MESSAGE_PAYLOAD_SIZE],
}

impl Message {
    /// The zero-initialized sentinel returned when a receiver's queue is empty.
    pub const fn null() -> Self {
        Self {
            sender_pid: 0,
            receiver_pid: 0,
            payload: [0; MESSAGE_PAYLOAD_SIZE],
        }
    }

    pub fn new(sender_pid: u64, receiver_pid: u64, payload: [u8; MESSAGE_PAYLOAD_SIZE]) -> Self {
        Self {
            sender_pid,
            receiver_pid,
            payload,
        }
    }

    pub fn is_null(&self) -> bool {
        self.sender_pid == 0 && self.receiver_pid == 0
    }
}

/// Process identifier. Monotonically increasing starting at 0 (the
/// idle process), never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProcessId(u64);

impl ProcessId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<ProcessId> for crate::kernel::core::types::ProcessId {
    fn from(pid: ProcessId) -> Self {
        crate::kernel::core::types::ProcessId(pid.as_u64())
    }
}

impl From<crate::kernel::core::types::ProcessId> for ProcessId {
    fn from(pid: crate::kernel::core::types::ProcessId) -> Self {
        ProcessId::new(pid.0)
    }
}

/// `{Active, Blocked, Zombie}` per the process state machine. Only
/// `Active` processes are ever linked into the ready queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Active,
    Blocked,
    Zombie,
}

/// A 64-bit register frame, laid out explicitly because the
/// context-switch stub reads and writes it by fixed offset.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RegisterFrame {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
}

impl RegisterFrame {
    /// A register frame for a freshly created thread: everything zero
    /// except `rip`, `rsp`/`rbp` (both set to the top of its kernel
    /// stack), and `rflags` with the interrupt flag set so the thread
    /// starts with interrupts enabled.
    pub fn for_new_thread(entry: VirtAddr, stack_top: VirtAddr) -> Self {
        Self {
            rax: 0,
            rbx: 0,
            rcx: 0,
            rdx: 0,
            rsi: 0,
            rdi: 0,
            rbp: stack_top.as_u64(),
            rsp: stack_top.as_u64(),
            r8: 0,
            r9: 0,
            r10: 0,
            r11: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: entry.as_u64(),
            rflags: 0x202,
        }
    }
}

/// The kernel stack size allocated to every thread: 4 pages of 4 KiB.
pub const THREAD_STACK_SIZE: usize = 4 * 4096;

/// A process's single thread of execution.
pub struct Thread {
    /// Owning process, for diagnostics only — the scheduler never walks
    /// this back-reference during dispatch.
    pub parent: ProcessId,
    pub priority: u8,
    /// Top (highest address) of the thread's kernel stack.
    pub stack_top: VirtAddr,
    pub registers: RegisterFrame,
}

/// Process control block. One per process; owns its address space,
/// its single thread, and its message inbox. `next` makes this a node
/// in the scheduler's circular ready-queue arena.
pub struct Process {
    pid: ProcessId,
    state: ProcessState,
    pub priority: u8,
    pub time_slice_default: u32,
    pub time_slice: u32,
    pub address_space: AddressSpace,
    pub thread: Thread,
    /// Indices 0/1/2 reserved for stdin/stdout/stderr; both currently
    /// null placeholders pending a real file-descriptor layer.
    pub file_descriptors: alloc::vec::Vec<Option<()>>,
    pub message_queue: VecDeque<Message>,
    /// Forward link in the circular ready queue. `None` while the
    /// process is not linked (not yet inserted, or just removed).
    pub next: Option<ProcessIndex>,
}

impl Process {
    pub fn new(
        pid: ProcessId,
        priority: u8,
        time_slice_default: u32,
        address_space: AddressSpace,
        thread: Thread,
    ) -> Self {
        Self {
            pid,
            state: ProcessState::Active,
            priority,
            time_slice_default,
            time_slice: time_slice_default,
            address_space,
            thread,
            file_descriptors: alloc::vec![None, None, None],
            message_queue: VecDeque::new(),
            next: None,
        }
    }

    #[must_use]
    pub const fn pid(&self) -> ProcessId {
        self.pid
    }

    #[must_use]
    pub const fn state(&self) -> ProcessState {
        self.state
    }

    pub fn set_state(&mut self, state: ProcessState) {
        self.state = state;
    }
}
