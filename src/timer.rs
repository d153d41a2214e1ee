//! # Timer Callback
//!
//! Periodic interrupt source driving preemption. Each firing asks the
//! interrupt return path to consider a yield and re-arms one quantum
//! later. The timer never decides whether the yield happens; that is
//! [`crate::scheduler::Scheduler::should_preempt`].

use log::debug;

use crate::arch::Tick;
use crate::config::TIMER_QUANTUM;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerCallback {
    quantum: Tick,
    next_fire: Option<Tick>,
    yield_requested: bool,
    fired: u64,
}

impl TimerCallback {
    /// Disarmed timer firing every `quantum` ticks once scheduled.
    pub const fn new(quantum: Tick) -> Self {
        assert!(quantum > 0, "timer quantum must be positive");
        Self {
            quantum,
            next_fire: None,
            yield_requested: false,
            fired: 0,
        }
    }

    #[inline]
    pub fn quantum(&self) -> Tick {
        self.quantum
    }

    /// Arm the timer to fire `after` ticks from `now`.
    pub fn schedule(&mut self, now: Tick, after: Tick) {
        self.next_fire = Some(now.saturating_add(after));
    }

    pub fn cancel(&mut self) {
        self.next_fire = None;
    }

    pub fn next_fire(&self) -> Option<Tick> {
        self.next_fire
    }

    pub fn is_due(&self, now: Tick) -> bool {
        matches!(self.next_fire, Some(at) if now >= at)
    }

    /// Interrupt handler body: request a yield on return and re-arm.
    pub fn callback(&mut self, now: Tick) {
        debug!("Tick [{}]: timer interrupt", now);
        self.fired += 1;
        self.yield_requested = true;
        self.schedule(now, self.quantum);
    }

    /// Consume a pending yield request.
    pub fn take_yield_request(&mut self) -> bool {
        core::mem::take(&mut self.yield_requested)
    }

    /// Number of times the callback ran.
    pub fn fired(&self) -> u64 {
        self.fired
    }
}

impl Default for TimerCallback {
    fn default() -> Self {
        Self::new(TIMER_QUANTUM)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
