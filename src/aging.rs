//! # Aging Monitor
//!
//! Starvation guard for the lower bands. Before every selection, each
//! thread that has waited in a ready queue for at least `threshold`
//! ticks gains `increment` priority and its wait restarts. A thread
//! whose new priority falls in a higher band moves to that band's queue.

use heapless::Vec;
use log::info;

use crate::arch::{Platform, Tick};
use crate::config::{AGING_INCREMENT, AGING_THRESHOLD, MAX_THREADS};
use crate::scheduler::Scheduler;
use crate::thread::{Level, ThreadHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgingMonitor {
    threshold: Tick,
    increment: u8,
}

impl AgingMonitor {
    pub const fn new(threshold: Tick, increment: u8) -> Self {
        assert!(threshold > 0, "aging threshold must be positive");
        Self { threshold, increment }
    }

    #[inline]
    pub fn threshold(&self) -> Tick {
        self.threshold
    }

    #[inline]
    pub fn increment(&self) -> u8 {
        self.increment
    }

    /// Age every waiting thread once. Returns the number of boosts.
    ///
    /// Waiting threads are collected up front, so a thread relocated to
    /// a higher band during the scan is not visited a second time.
    pub fn scan<P: Platform>(&self, scheduler: &mut Scheduler, platform: &P) -> usize {
        let now = platform.now();

        let mut waiting: Vec<(ThreadHandle, Level), MAX_THREADS> = Vec::new();
        for (handle, thread) in scheduler.threads().iter() {
            if let Some(level) = thread.queued_in() {
                if thread.is_runnable() {
                    // at most one slot per thread
                    let _ = waiting.push((handle, level));
                }
            }
        }

        let mut boosted = 0;
        for (handle, level) in waiting {
            let Some(thread) = scheduler.thread_mut(handle) else {
                continue;
            };
            if now.saturating_sub(thread.ready_timestamp) < self.threshold {
                continue;
            }

            let before = thread.priority;
            thread.priority = before.aged(self.increment);
            thread.ready_timestamp = now;
            let after = thread.priority;
            boosted += 1;
            info!(
                "Tick [{}]: Thread {} changes its priority from {} to {}",
                now, thread.id, before, after
            );

            if after.level() != level {
                scheduler.evict(platform, handle, level);
                scheduler.ready_to_run(platform, handle);
            } else if level == Level::L2 && after != before {
                scheduler.reposition(handle);
            }
        }
        boosted
    }
}

impl Default for AgingMonitor {
    fn default() -> Self {
        Self::new(AGING_THRESHOLD, AGING_INCREMENT)
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimulatedMachine;
    use crate::arch::IntLevel;
    use crate::thread::ThreadConfig;

    fn setup() -> (SimulatedMachine, Scheduler) {
        let machine = SimulatedMachine::new();
        machine.set_interrupt_level(IntLevel::Off);
        (machine, Scheduler::new())
    }

    fn admit(machine: &SimulatedMachine, sched: &mut Scheduler, priority: u8) -> ThreadHandle {
        let h = sched.allocate(machine, &ThreadConfig::new("t", priority)).unwrap();
        sched.ready_to_run(machine, h);
        h
    }

    #[test]
    fn test_waiting_thread_stays_in_level3_below_50() {
        let (machine, mut sched) = setup();
        let aging = AgingMonitor::default();
        let h = admit(&machine, &mut sched, 0);

        machine.set_now(1499);
        assert_eq!(aging.scan(&mut sched, &machine), 0);

        machine.set_now(1500);
        assert_eq!(aging.scan(&mut sched, &machine), 1);
        assert_eq!(sched.thread(h).unwrap().priority.get(), 10);

        machine.set_now(3000);
        assert_eq!(aging.scan(&mut sched, &machine), 1);
        let t = sched.thread(h).unwrap();
        assert_eq!(t.priority.get(), 20);
        assert_eq!(t.queued_in(), Some(Level::L3));
        assert_eq!(t.ready_timestamp, 3000);
    }

    #[test]
    fn test_crossing_into_level2_relocates() {
        let (machine, mut sched) = setup();
        let aging = AgingMonitor::default();
        let h = admit(&machine, &mut sched, 45);
        let neighbour = admit(&machine, &mut sched, 10);

        machine.set_now(1600);
        assert_eq!(aging.scan(&mut sched, &machine), 2);

        let t = sched.thread(h).unwrap();
        assert_eq!(t.priority.get(), 55);
        assert_eq!(t.queued_in(), Some(Level::L2));
        assert_eq!(t.ready_timestamp, 1600);
        assert!(sched.queue(Level::L2).contains(h));
        assert!(!sched.queue(Level::L3).contains(h));
        assert_eq!(sched.queue(Level::L3).front(), Some(neighbour));
    }

    #[test]
    fn test_one_boost_per_scan() {
        let (machine, mut sched) = setup();
        let aging = AgingMonitor::default();
        // 95 -> 105 crosses into L1 mid-scan; it must not be aged again there
        let h = admit(&machine, &mut sched, 95);

        machine.set_now(10_000);
        assert_eq!(aging.scan(&mut sched, &machine), 1);
        assert_eq!(sched.thread(h).unwrap().priority.get(), 105);
        assert_eq!(sched.thread(h).unwrap().queued_in(), Some(Level::L1));

        // same instant: wait restarted, nothing to do
        assert_eq!(aging.scan(&mut sched, &machine), 0);
    }

    #[test]
    fn test_level2_resorts_after_boost() {
        let (machine, mut sched) = setup();
        let aging = AgingMonitor::default();
        let old = admit(&machine, &mut sched, 60);

        machine.set_now(1000);
        let fresh = admit(&machine, &mut sched, 65);
        assert_eq!(sched.queue(Level::L2).front(), Some(fresh));

        // only `old` has waited long enough: 60 -> 70 overtakes 65
        machine.set_now(1500);
        assert_eq!(aging.scan(&mut sched, &machine), 1);
        assert_eq!(sched.queue(Level::L2).iter().collect::<std::vec::Vec<_>>(), [old, fresh]);
    }

    #[test]
    fn test_saturates_at_max_priority() {
        let (machine, mut sched) = setup();
        let aging = AgingMonitor::default();
        let h = admit(&machine, &mut sched, 145);

        machine.set_now(1500);
        aging.scan(&mut sched, &machine);
        machine.set_now(3000);
        aging.scan(&mut sched, &machine);
        assert_eq!(sched.thread(h).unwrap().priority.get(), 149);
        assert_eq!(sched.thread(h).unwrap().queued_in(), Some(Level::L1));
    }

    #[test]
    fn test_custom_parameters() {
        let (machine, _) = setup();
        let mut sched = Scheduler::with_aging(AgingMonitor::new(10, 25));
        let h = admit(&machine, &mut sched, 30);

        machine.set_now(10);
        assert_eq!(sched.find_next_to_run(&machine), Some(h));
        assert_eq!(sched.thread(h).unwrap().priority.get(), 55);
    }
}
