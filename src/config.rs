//! # TriQ Configuration
//!
//! Compile-time constants governing the scheduler and system behavior.
//! All limits are fixed at compile time; nothing is allocated dynamically.

use static_assertions::const_assert;

use crate::arch::Tick;

/// Maximum number of threads the thread table can hold simultaneously.
/// Also the capacity of every ready queue, since a thread sits in at
/// most one queue at a time.
pub const MAX_THREADS: usize = 32;

/// Highest priority a thread may hold. Aging saturates here.
pub const MAX_PRIORITY: u8 = 149;

/// Lowest priority of the Level-1 (shortest-job-first) band.
pub const LEVEL1_MIN_PRIORITY: u8 = 100;

/// Lowest priority of the Level-2 (static priority) band.
/// Everything below is Level 3 (round-robin).
pub const LEVEL2_MIN_PRIORITY: u8 = 50;

/// Ticks a thread may wait in a ready queue before it is aged.
pub const AGING_THRESHOLD: Tick = 1500;

/// Priority added to a thread each time it is aged.
pub const AGING_INCREMENT: u8 = 10;

/// Ticks between two timer interrupts. Bounds the Level-3 time slice
/// and the latency of Level-1 preemption checks.
pub const TIMER_QUANTUM: Tick = 100;

/// Burst estimate given to threads spawned without one.
pub const DEFAULT_BURST_ESTIMATE: f64 = 0.0;

/// Upper clamp for computed burst estimates. Keeps the Level-1
/// comparator away from infinities.
pub const MAX_BURST_ESTIMATE: f64 = 1.0e12;

/// Number of user-mode registers saved per thread that owns a user context.
pub const USER_REGISTERS: usize = 40;

/// SysTick frequency in Hz on the Cortex-M4 port.
pub const TICK_HZ: u32 = 1000;

/// System clock frequency in Hz (default for STM32F4 at 16 MHz HSI).
pub const SYSTEM_CLOCK_HZ: u32 = 16_000_000;

const_assert!(LEVEL2_MIN_PRIORITY < LEVEL1_MIN_PRIORITY);
const_assert!(LEVEL1_MIN_PRIORITY <= MAX_PRIORITY);
const_assert!(MAX_THREADS <= u16::MAX as usize);
const_assert!(TIMER_QUANTUM > 0);
const_assert!(SYSTEM_CLOCK_HZ % TICK_HZ == 0);
