//! # Ready Queues
//!
//! One queue per band. Level 1 and Level 2 keep a strict total order
//! defined by their comparator, so insertion places a thread at its
//! final position and removal always takes the head. Level 3 is FIFO.
//!
//! | Level | Key                        | Tie-break     |
//! |-------|----------------------------|---------------|
//! | L1    | burst estimate, ascending  | id ascending  |
//! | L2    | priority, descending       | id ascending  |
//! | L3    | admission order            | none          |
//!
//! Queues store handles only. Comparators look descriptors up in the
//! thread table passed by the caller.

use core::cmp::Ordering;

use heapless::Vec;

use crate::config::MAX_THREADS;
use crate::table::ThreadTable;
use crate::thread::{Level, ThreadDescriptor, ThreadHandle};

/// Level-1 order: shorter predicted burst first.
pub fn shortest_job_first(a: &ThreadDescriptor, b: &ThreadDescriptor) -> Ordering {
    a.burst
        .estimate()
        .total_cmp(&b.burst.estimate())
        .then_with(|| a.id.cmp(&b.id))
}

/// Level-2 order: higher priority first.
pub fn static_priority(a: &ThreadDescriptor, b: &ThreadDescriptor) -> Ordering {
    b.priority.cmp(&a.priority).then_with(|| a.id.cmp(&b.id))
}

pub type Comparator = fn(&ThreadDescriptor, &ThreadDescriptor) -> Ordering;

/// Ordering rule of `level`, or `None` for FIFO.
pub fn comparator(level: Level) -> Option<Comparator> {
    match level {
        Level::L1 => Some(shortest_job_first as Comparator),
        Level::L2 => Some(static_priority as Comparator),
        Level::L3 => None,
    }
}

pub struct ReadyQueue {
    level: Level,
    entries: Vec<ThreadHandle, MAX_THREADS>,
}

impl ReadyQueue {
    pub const fn new(level: Level) -> Self {
        Self {
            level,
            entries: Vec::new(),
        }
    }

    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    /// Insert `handle` using this queue's ordering rule.
    ///
    /// # Panics
    /// If the queue is full, which means a thread was enqueued twice.
    pub fn insert(&mut self, handle: ThreadHandle, table: &ThreadTable) {
        let position = match comparator(self.level) {
            Some(order) => {
                let incoming = &table[handle];
                self.entries
                    .iter()
                    .position(|&queued| order(incoming, &table[queued]) == Ordering::Less)
                    .unwrap_or(self.entries.len())
            }
            None => self.entries.len(),
        };
        if self.entries.insert(position, handle).is_err() {
            panic!("ready queue {} overflow", self.level);
        }
    }

    /// Remove `handle` wherever it sits. Returns whether it was present.
    pub fn remove(&mut self, handle: ThreadHandle) -> bool {
        match self.entries.iter().position(|&queued| queued == handle) {
            Some(position) => {
                self.entries.remove(position);
                true
            }
            None => false,
        }
    }

    pub fn pop_front(&mut self) -> Option<ThreadHandle> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0))
        }
    }

    pub fn front(&self) -> Option<ThreadHandle> {
        self.entries.first().copied()
    }

    pub fn contains(&self, handle: ThreadHandle) -> bool {
        self.entries.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles from head to tail.
    pub fn iter(&self) -> impl Iterator<Item = ThreadHandle> + '_ {
        self.entries.iter().copied()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
