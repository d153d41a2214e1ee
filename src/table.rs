//! # Thread Table
//!
//! Fixed-capacity arena owning every [`ThreadDescriptor`]. Slots are
//! addressed by [`ThreadHandle`]; a slot is reused only after its
//! previous occupant has been reclaimed.

use core::ops::{Index, IndexMut};

use crate::arch::{MachineContext, Tick};
use crate::config::MAX_THREADS;
use crate::error::{Result, SchedError};
use crate::thread::{ThreadConfig, ThreadDescriptor, ThreadHandle, ThreadId};

const EMPTY_SLOT: Option<ThreadDescriptor> = None;

pub struct ThreadTable {
    slots: [Option<ThreadDescriptor>; MAX_THREADS],
    next_id: u32,
    live: usize,
}

impl ThreadTable {
    pub const fn new() -> Self {
        Self {
            slots: [EMPTY_SLOT; MAX_THREADS],
            next_id: 0,
            live: 0,
        }
    }

    /// Allocate a descriptor for `config`. Ids are handed out in
    /// allocation order and never reused.
    pub fn allocate(&mut self, config: &ThreadConfig, now: Tick) -> Result<ThreadHandle> {
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(SchedError::TableFull { max: MAX_THREADS })?;

        let descriptor = ThreadDescriptor::new(ThreadId(self.next_id), config, now)?;
        self.next_id += 1;
        self.slots[index] = Some(descriptor);
        self.live += 1;
        Ok(ThreadHandle(index as u16))
    }

    /// Release a descriptor. Returns it, or `None` for a stale handle.
    pub fn reclaim(&mut self, handle: ThreadHandle) -> Option<ThreadDescriptor> {
        let descriptor = self.slots.get_mut(handle.index())?.take()?;
        self.live -= 1;
        Some(descriptor)
    }

    pub fn get(&self, handle: ThreadHandle) -> Option<&ThreadDescriptor> {
        self.slots.get(handle.index())?.as_ref()
    }

    pub fn get_mut(&mut self, handle: ThreadHandle) -> Option<&mut ThreadDescriptor> {
        self.slots.get_mut(handle.index())?.as_mut()
    }

    pub fn contains(&self, handle: ThreadHandle) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live descriptors.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ThreadHandle, &ThreadDescriptor)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|d| (ThreadHandle(i as u16), d)))
    }

    /// Raw pointers to the machine contexts of two distinct threads, for
    /// the register swap.
    ///
    /// Slots live inline in the table, so the pointers stay valid for as
    /// long as the table is not moved and neither thread is reclaimed.
    pub(crate) fn context_pair(
        &mut self,
        from: ThreadHandle,
        to: ThreadHandle,
    ) -> (*mut MachineContext, *const MachineContext) {
        assert_ne!(from, to, "context switch onto the running thread");
        let from_ptr: *mut MachineContext = &mut self[from].context;
        let to_ptr: *const MachineContext = &self[to].context;
        (from_ptr, to_ptr)
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<ThreadHandle> for ThreadTable {
    type Output = ThreadDescriptor;

    #[track_caller]
    fn index(&self, handle: ThreadHandle) -> &ThreadDescriptor {
        match self.get(handle) {
            Some(descriptor) => descriptor,
            None => panic!("stale thread handle {:?}", handle),
        }
    }
}

impl IndexMut<ThreadHandle> for ThreadTable {
    #[track_caller]
    fn index_mut(&mut self, handle: ThreadHandle) -> &mut ThreadDescriptor {
        match self.get_mut(handle) {
            Some(descriptor) => descriptor,
            None => panic!("stale thread handle {:?}", handle),
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::thread::ThreadStatus;

    #[test]
    fn test_ids_are_monotonic() {
        let mut table = ThreadTable::new();
        let a = table.allocate(&ThreadConfig::new("a", 10), 0).unwrap();
        let b = table.allocate(&ThreadConfig::new("b", 10), 0).unwrap();
        assert_eq!(table[a].id, ThreadId(0));
        assert_eq!(table[b].id, ThreadId(1));
        assert_eq!(table.len(), 2);

        table.reclaim(a).unwrap();
        let c = table.allocate(&ThreadConfig::new("c", 10), 0).unwrap();
        // slot reused, id not
        assert_eq!(c, a);
        assert_eq!(table[c].id, ThreadId(2));
    }

    #[test]
    fn test_table_full() {
        let mut table = ThreadTable::new();
        for _ in 0..MAX_THREADS {
            table.allocate(&ThreadConfig::new("t", 0), 0).unwrap();
        }
        assert_eq!(
            table.allocate(&ThreadConfig::new("overflow", 0), 0),
            Err(SchedError::TableFull { max: MAX_THREADS })
        );
    }

    #[test]
    fn test_invalid_config_does_not_consume_id() {
        let mut table = ThreadTable::new();
        assert!(table.allocate(&ThreadConfig::new("bad", 150), 0).is_err());
        let ok = table.allocate(&ThreadConfig::new("ok", 0), 0).unwrap();
        assert_eq!(table[ok].id, ThreadId(0));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_reclaim_stale_handle() {
        let mut table = ThreadTable::new();
        let h = table.allocate(&ThreadConfig::new("t", 0), 0).unwrap();
        assert_eq!(table[h].status, ThreadStatus::Blocked);
        assert!(table.reclaim(h).is_some());
        assert!(table.reclaim(h).is_none());
        assert!(!table.contains(h));
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "stale thread handle")]
    fn test_index_stale_handle_panics() {
        let table = ThreadTable::new();
        let _ = &table[ThreadHandle(3)];
    }
}
