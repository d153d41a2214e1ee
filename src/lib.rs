//! # TriQ
//!
//! A preemptive three-level feedback-queue scheduler for single-processor,
//! tick-driven kernels.
//!
//! ## Overview
//!
//! Every thread carries a priority in `0..=149` that places it in one of
//! three ready queues. Each queue has its own discipline, and the queues
//! are served in strict precedence:
//!
//! | Priority  | Queue | Discipline                                   |
//! |-----------|-------|----------------------------------------------|
//! | 100 – 149 | L1    | shortest-job-first on a predicted CPU burst  |
//! | 50 – 99   | L2    | static priority                              |
//! | 0 – 49    | L3    | round-robin                                  |
//!
//! A thread that waits 1500 ticks in a ready queue gains 10 priority,
//! which eventually lifts starving threads into a higher band.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                  Kernel (kernel.rs)                     │
//! │   spawn · yield_now · sleep · finish · wake · kill      │
//! │   tick ─► timer callback ─► preemption check           │
//! ├──────────────┬────────────────────┬───────────────────┤
//! │  Scheduler   │   Aging Monitor    │  Timer Callback   │
//! │  scheduler.rs│   aging.rs         │  timer.rs         │
//! │  ─ ready_to_run                   │                   │
//! │  ─ find_next_to_run               │                   │
//! │  ─ run (dispatch)                 │                   │
//! ├──────────────┴────────────────────┴───────────────────┤
//! │  Ready Queues (queue.rs) · Thread Table (table.rs)      │
//! │  Thread Descriptor (thread.rs) · Burst (burst.rs)       │
//! ├────────────────────────────────────────────────────────┤
//! │  Platform (arch/)  ·  Critical Sections (sync.rs)       │
//! │  sim.rs (host)  ·  cortex_m4.rs (Thumb-2)               │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Memory Model
//!
//! - **No heap**: the thread table is a fixed array of `MAX_THREADS` slots
//! - **Handles, not pointers**: ready queues store slot indices
//! - **Interrupts off = exclusive access**: no lock inside the scheduler
//!
//! ## Logging
//!
//! Scheduling events go through the [`log`] facade at `info` level, one
//! line per event (`Tick [t]: Thread n is inserted into queue L1`, ...).
//! The crate installs no logger.

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod error;
pub mod arch;
pub mod sync;
pub mod thread;
pub mod burst;
pub mod table;
pub mod queue;
pub mod aging;
pub mod scheduler;
pub mod timer;
pub mod kernel;

pub use error::{Result, SchedError};
pub use kernel::{Kernel, KernelStats};
pub use scheduler::Scheduler;
pub use thread::{Level, Priority, ThreadConfig, ThreadHandle, ThreadId, ThreadStatus};
