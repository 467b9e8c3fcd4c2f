// src/kernel/ipc/mod.rs
//! The message bus (§4.F): bounded, PID-addressed, strict FIFO per
//! receiver. Styled after the pipe's buffer/capacity discipline, but
//! addressed by PID instead of by file descriptor since messages route
//! between arbitrary processes, not just parent/child fd pairs.

use crate::kernel::process::{Message, Process, ProcessId, MESSAGE_QUEUE_CAPACITY};
use crate::kernel::scheduler::SCHEDULER;

/// No process with the given PID is currently in the ready queue.
pub const ERR_NO_SUCH_PID: u32 = 1;
/// The target's message queue is already at `MESSAGE_QUEUE_CAPACITY`.
pub const ERR_QUEUE_FULL: u32 = 2;

/// Look up `pid` by linear scan and append `msg` to its queue.
///
/// Returns `0` on success, [`ERR_NO_SUCH_PID`] if no such process is
/// linked into the ready queue, or [`ERR_QUEUE_FULL`] if the target's
/// queue is already at capacity.
pub fn send_message(pid: ProcessId, msg: Message) -> u32 {
    let mut scheduler = SCHEDULER.lock();
    let Some(idx) = scheduler.find_by_pid(pid) else {
        return ERR_NO_SUCH_PID;
    };
    let process = scheduler.process_mut(idx);
    if process.message_queue.len() >= MESSAGE_QUEUE_CAPACITY {
        return ERR_QUEUE_FULL;
    }
    process.message_queue.push_back(msg);
    0
}

/// Direct variant of [`send_message`] for callers that already hold the
/// target process record, bypassing the PID scan entirely. Returns `0`
/// on success or [`ERR_QUEUE_FULL`] if `proc`'s queue is already at
/// capacity.
pub fn send_message_direct(proc: &mut Process, msg: Message) -> u32 {
    if proc.message_queue.len() >= MESSAGE_QUEUE_CAPACITY {
        return ERR_QUEUE_FULL;
    }
    proc.message_queue.push_back(msg);
    0
}

/// Pop the head of `pid`'s message queue, or [`Message::null`] if
/// empty. Returns `None` (rather than the null sentinel) only when
/// `pid` itself does not exist, since that is a caller error distinct
/// from "nothing to receive."
pub fn receive_message(pid: ProcessId) -> Option<Message> {
    let mut scheduler = SCHEDULER.lock();
    let idx = scheduler.find_by_pid(pid)?;
    let process = scheduler.process_mut(idx);
    Some(process.message_queue.pop_front().unwrap_or_else(Message::null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::mm::address_space::AddressSpace;
    use crate::kernel::process::{Process, RegisterFrame, Thread, MESSAGE_PAYLOAD_SIZE};
    use x86_64::VirtAddr;

    fn stub_process() -> ProcessId {
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
        scheduler.ready_insert(idx);
        pid
    }

    #[test]
    fn send_to_missing_pid_reports_error_one() {
        let bogus = ProcessId::new(u64::MAX);
        let msg = Message::new(1, bogus.as_u64(), [0; MESSAGE_PAYLOAD_SIZE]);
        assert_eq!(send_message(bogus, msg), ERR_NO_SUCH_PID);
    }

    #[test]
    fn receive_on_empty_queue_returns_null_sentinel() {
        let pid = stub_process();
        let msg = receive_message(pid).expect("process exists");
        assert!(msg.is_null());
    }

    #[test]
    fn send_then_receive_round_trips_fifo() {
        let receiver = stub_process();
        let sender = stub_process();

        let mut first = [0u8; MESSAGE_PAYLOAD_SIZE];
        first[0] = 1;
        let mut second = [0u8; MESSAGE_PAYLOAD_SIZE];
        second[0] = 2;

        assert_eq!(send_message(receiver, Message::new(sender.as_u64(), receiver.as_u64(), first)), 0);
        assert_eq!(send_message(receiver, Message::new(sender.as_u64(), receiver.as_u64(), second)), 0);

        let got_first = receive_message(receiver).unwrap();
        let got_second = receive_message(receiver).unwrap();
        assert_eq!(got_first.payload[0], 1);
        assert_eq!(got_second.payload[0], 2);

        let empty = receive_message(receiver).unwrap();
        assert!(empty.is_null());
    }

    #[test]
    fn send_message_direct_bypasses_the_pid_scan() {
        let receiver = stub_process();
        let sender = stub_process();
        let payload = [0u8; MESSAGE_PAYLOAD_SIZE];

        let idx = SCHEDULER.lock().find_by_pid(receiver).expect("receiver exists");
        let mut scheduler = SCHEDULER.lock();
        let process = scheduler.process_mut(idx);
        assert_eq!(
            send_message_direct(process, Message::new(sender.as_u64(), receiver.as_u64(), payload)),
            0
        );
        drop(scheduler);

        let got = receive_message(receiver).unwrap();
        assert!(!got.is_null());
    }

    #[test]
    fn send_message_direct_reports_queue_full() {
        let receiver = stub_process();
        let sender = stub_process();
        let payload = [0u8; MESSAGE_PAYLOAD_SIZE];

        let idx = SCHEDULER.lock().find_by_pid(receiver).expect("receiver exists");
        let mut scheduler = SCHEDULER.lock();
        let process = scheduler.process_mut(idx);
        for _ in 0..MESSAGE_QUEUE_CAPACITY {
            assert_eq!(
                send_message_direct(process, Message::new(sender.as_u64(), receiver.as_u64(), payload)),
                0
            );
        }
        assert_eq!(
            send_message_direct(process, Message::new(sender.as_u64(), receiver.as_u64(), payload)),
            ERR_QUEUE_FULL
        );
    }

    #[test]
    fn queue_rejects_sends_past_capacity() {
        let receiver = stub_process();
        let sender = stub_process();
        let payload = [0u8; MESSAGE_PAYLOAD_SIZE];

        for _ in 0..MESSAGE_QUEUE_CAPACITY {
            assert_eq!(
                send_message(receiver, Message::new(sender.as_u64(), receiver.as_u64(), payload)),
                0
            );
        }
        assert_eq!(
            send_message(receiver, Message::new(sender.as_u64(), receiver.as_u64(), payload)),
            ERR_QUEUE_FULL
        );
    }
}
