//! # Errors
//!
//! Recoverable errors returned to callers of the thread table and kernel
//! API. Scheduler contract violations are not represented here: they
//! panic at the point of detection.

use core::fmt;

use crate::thread::{ThreadHandle, ThreadId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Every slot of the thread table is in use.
    TableFull { max: usize },

    /// Requested priority is above `MAX_PRIORITY`.
    PriorityOutOfRange { priority: u8 },

    /// Initial burst estimate is negative or not finite.
    InvalidBurstEstimate,

    /// Handle does not name a live thread.
    UnknownThread { handle: ThreadHandle },

    /// Thread was expected to be blocked.
    NotBlocked { thread_id: ThreadId },
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TableFull { max } => write!(f, "Thread table full: {}/{}", max, max),
            Self::PriorityOutOfRange { priority } => {
                write!(f, "Priority {} outside 0..={}", priority, crate::config::MAX_PRIORITY)
            }
            Self::InvalidBurstEstimate => {
                write!(f, "Burst estimate must be finite and non-negative")
            }
            Self::UnknownThread { handle } => write!(f, "No thread for {:?}", handle),
            Self::NotBlocked { thread_id } => write!(f, "Thread {} is not blocked", thread_id),
        }
    }
}

pub type Result<T> = core::result::Result<T, SchedError>;
