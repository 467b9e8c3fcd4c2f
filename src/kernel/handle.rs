// src/kernel/handle.rs
//! Opaque handle table (§4.G): a fixed-size array of raw pointers,
//! indexed by a small integer the kernel hands out to callers that
//! need to refer back to some object without exposing its address
//! directly. Index 0 is reserved as the null handle.

use alloc::vec::Vec;
use lazy_static::lazy_static;
use spin::Mutex;

/// Fixed capacity of the handle table. Exceeding it is a reportable
/// error, not undefined behavior.
pub const INITIAL_HANDLE_TABLE_SIZE: usize = 0xFFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleError {
    TableFull,
}

pub struct HandleTable {
    slots: Vec<Option<usize>>,
    count: usize,
}

impl HandleTable {
    fn new() -> Self {
        let mut slots = Vec::with_capacity(INITIAL_HANDLE_TABLE_SIZE);
        slots.push(None); // index 0: reserved null handle
        Self { slots, count: 1 }
    }

    /// Assign the next integer handle to `ptr`, starting at 1.
    pub fn register_handle(&mut self, ptr: usize) -> Result<usize, HandleError> {
        if self.count >= INITIAL_HANDLE_TABLE_SIZE {
            return Err(HandleError::TableFull);
        }
        self.slots.push(Some(ptr));
        let handle = self.slots.len() - 1;
        self.count += 1;
        Ok(handle)
    }

    /// Direct indexed lookup. Out-of-bounds or unregistered handles
    /// return `None`; callers are trusted not to pass a handle they
    /// never received from `register_handle`.
    pub fn find_handle(&self, handle: usize) -> Option<usize> {
        self.slots.get(handle).copied().flatten()
    }
}

lazy_static! {
    pub static ref HANDLE_TABLE: Mutex<HandleTable> = Mutex::new(HandleTable::new());
}

pub fn register_handle(ptr: usize) -> Result<usize, HandleError> {
    HANDLE_TABLE.lock().register_handle(ptr)
}

pub fn find_handle(handle: usize) -> Option<usize> {
    HANDLE_TABLE.lock().find_handle(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handle_zero_is_always_null() {
        let table = HandleTable::new();
        assert_eq!(table.find_handle(0), None);
    }

    #[test]
    fn register_then_find_round_trips() {
        let mut table = HandleTable::new();
        let h = table.register_handle(0xDEAD_BEEF).unwrap();
        assert_ne!(h, 0);
        assert_eq!(table.find_handle(h), Some(0xDEAD_BEEF));
    }

    #[test]
    fn table_reports_full_instead_of_overflowing() {
        let mut table = HandleTable::new();
        for i in 0..(INITIAL_HANDLE_TABLE_SIZE - 1) {
            assert!(table.register_handle(i).is_ok());
        }
        assert_eq!(table.register_handle(0), Err(HandleError::TableFull));
    }

    #[test]
    fn one_thousand_distinct_pointers_each_resolve_to_themselves() {
        // S6
        let mut table = HandleTable::new();
        let handles: alloc::vec::Vec<usize> = (0..1000)
            .map(|i| table.register_handle(0x1000 + i).expect("table has room for 1000 handles"))
            .collect();
        assert!(handles.iter().all(|&h| h != 0));
        for (i, &h) in handles.iter().enumerate() {
            assert_eq!(table.find_handle(h), Some(0x1000 + i));
        }
    }
}
