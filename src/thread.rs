//! # Thread Descriptor
//!
//! Defines the per-thread record the scheduler works on: identity,
//! priority band, burst bookkeeping, timestamps and the saved execution
//! context.
//!
//! ## Priority Bands
//!
//! | Priority   | Level | Discipline                        |
//! |------------|-------|-----------------------------------|
//! | 100 – 149  | L1    | shortest-job-first (preemptive)   |
//! | 50 – 99    | L2    | static priority (non-preemptive)  |
//! | 0 – 49     | L3    | round-robin                       |

use core::fmt;

use crate::arch::{MachineContext, Tick, UserContext};
use crate::burst::BurstEstimator;
use crate::config::{DEFAULT_BURST_ESTIMATE, LEVEL1_MIN_PRIORITY, LEVEL2_MIN_PRIORITY, MAX_PRIORITY};
use crate::error::{Result, SchedError};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique, monotonically assigned thread identifier. Final tie-break of
/// every queue ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable slot index of a descriptor in the thread table.
///
/// Ready queues hold handles, never descriptors. A handle stays valid
/// until its thread is reclaimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub(crate) u16);

impl ThreadHandle {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Priority and bands
// ---------------------------------------------------------------------------

/// Thread priority in `0..=MAX_PRIORITY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Priority(u8);

impl Priority {
    pub const MAX: Priority = Priority(MAX_PRIORITY);

    pub const fn new(value: u8) -> Result<Self> {
        if value > MAX_PRIORITY {
            return Err(SchedError::PriorityOutOfRange { priority: value });
        }
        Ok(Self(value))
    }

    #[inline]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Priority after one aging step, saturating at `MAX_PRIORITY`.
    pub fn aged(self, increment: u8) -> Self {
        Self(self.0.saturating_add(increment).min(MAX_PRIORITY))
    }

    /// Band this priority belongs to.
    pub const fn level(self) -> Level {
        if self.0 >= LEVEL1_MIN_PRIORITY {
            Level::L1
        } else if self.0 >= LEVEL2_MIN_PRIORITY {
            Level::L2
        } else {
            Level::L3
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the three ready-queue bands, in selection precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    /// Shortest-job-first.
    L1,
    /// Static priority.
    L2,
    /// Round-robin.
    L3,
}

impl Level {
    /// Selection precedence: L1 first.
    pub const ALL: [Level; 3] = [Level::L1, Level::L2, Level::L3];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Level::L1 => 0,
            Level::L2 => 1,
            Level::L3 => 2,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.index() + 1)
    }
}

// ---------------------------------------------------------------------------
// Thread state machine
// ---------------------------------------------------------------------------

/// Execution state of a thread.
///
/// ```text
///   ┌──────────┐   dispatch    ┌─────────┐
///   │  Ready   │ ────────────► │ Running │
///   └──────────┘               └─────────┘
///     ▲     ▲   preempt/yield    │  │  │
///     │     └────────────────────┘  │  │ finish
///     │ wake          sleep         │  ▼
///   ┌─────────┐ ◄───────────────────┘ ┌──────────┐
///   │ Blocked │                       │ Finished │
///   └─────────┘                       └──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    /// Sitting in exactly one ready queue.
    Ready,
    /// On the processor.
    Running,
    /// Waiting for an event; not in any queue. Also the state of a freshly
    /// allocated descriptor before its first admission.
    Blocked,
    /// No more work; awaiting reclamation.
    Finished,
}

// ---------------------------------------------------------------------------
// Spawn-time configuration
// ---------------------------------------------------------------------------

/// Parameters supplied by whoever spawns a thread.
#[derive(Debug, Clone, Copy)]
pub struct ThreadConfig {
    /// Name for diagnostics.
    pub name: &'static str,
    /// Initial priority, `0..=MAX_PRIORITY`.
    pub priority: u8,
    /// Initial burst estimate. Must be finite and non-negative.
    pub initial_burst: f64,
    /// Context the thread starts from.
    pub context: MachineContext,
    /// User program state, if the thread runs one.
    pub user: Option<UserContext>,
}

impl ThreadConfig {
    pub const fn new(name: &'static str, priority: u8) -> Self {
        Self {
            name,
            priority,
            initial_burst: DEFAULT_BURST_ESTIMATE,
            context: MachineContext {
                callee_saved: [0; 8],
                sp: 0,
                lr: 0,
            },
            user: None,
        }
    }

    pub fn with_burst(mut self, initial_burst: f64) -> Self {
        self.initial_burst = initial_burst;
        self
    }

    pub fn with_context(mut self, context: MachineContext) -> Self {
        self.context = context;
        self
    }

    pub fn with_user(mut self, user: UserContext) -> Self {
        self.user = Some(user);
        self
    }
}

// ---------------------------------------------------------------------------
// Thread descriptor
// ---------------------------------------------------------------------------

/// Scheduler-visible state of one thread.
///
/// Owned by the thread table. Ready queues reference it through its
/// [`ThreadHandle`].
#[derive(Debug, Clone)]
pub struct ThreadDescriptor {
    pub id: ThreadId,
    pub name: &'static str,
    pub priority: Priority,
    pub status: ThreadStatus,
    pub burst: BurstEstimator,

    /// Tick of the last entry into a ready queue (or last aging step).
    pub ready_timestamp: Tick,
    /// Tick of the last dispatch.
    pub dispatch_timestamp: Tick,
    /// CPU time consumed over the thread's lifetime.
    pub total_executed_ticks: Tick,
    /// CPU time consumed during the most recent dispatch.
    pub last_run_ticks: Tick,

    /// Stopped mid-burst by preemption.
    pub preempted: bool,
    /// Stopped by blocking; its burst was already closed.
    pub slept: bool,

    pub context: MachineContext,
    pub user: Option<UserContext>,

    /// Queue currently holding this thread, if any.
    pub(crate) queued: Option<Level>,
}

impl ThreadDescriptor {
    /// Build a descriptor from `config`. The thread starts `Blocked`
    /// until it is admitted.
    pub fn new(id: ThreadId, config: &ThreadConfig, now: Tick) -> Result<Self> {
        let priority = Priority::new(config.priority)?;
        let burst = BurstEstimator::new(config.initial_burst)?;
        Ok(Self {
            id,
            name: config.name,
            priority,
            status: ThreadStatus::Blocked,
            burst,
            ready_timestamp: now,
            dispatch_timestamp: now,
            total_executed_ticks: 0,
            last_run_ticks: 0,
            preempted: false,
            slept: false,
            context: config.context,
            user: config.user,
            queued: None,
        })
    }

    /// Band implied by the current priority.
    #[inline]
    pub fn level(&self) -> Level {
        self.priority.level()
    }

    /// Queue currently holding this thread. O(1).
    #[inline]
    pub fn queued_in(&self) -> Option<Level> {
        self.queued
    }

    #[inline]
    pub fn is_runnable(&self) -> bool {
        self.status == ThreadStatus::Ready
    }
}

impl fmt::Display for ThreadDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "thread {} ({}) priority {} burst {:.1} {:?}",
            self.id,
            self.name,
            self.priority,
            self.burst.estimate(),
            self.status
        )
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
