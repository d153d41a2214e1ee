//! # Scheduler
//!
//! Three-level feedback queue and dispatcher.
//!
//! ## Scheduling Algorithm
//!
//! At every rescheduling point:
//! 1. **Age** every waiting thread (see [`crate::aging`])
//! 2. **Select** the head of the first non-empty queue, L1 > L2 > L3
//! 3. **Dispatch**: account the outgoing thread's run, mark the incoming
//!    one running, swap register sets
//!
//! Precedence is strict: a non-empty L1 always wins. Lower bands can
//! starve until aging lifts their threads into a higher band.
//!
//! ## Mutual Exclusion
//!
//! Every operation asserts that interrupts are disabled. There is no
//! lock: on one processor, masked interrupts are exclusion enough, and a
//! lock that could block would re-enter `find_next_to_run`.

use log::{debug, info};

use crate::aging::AgingMonitor;
use crate::arch::Platform;
use crate::error::Result;
use crate::queue::{shortest_job_first, ReadyQueue};
use crate::sync::assert_interrupts_off;
use crate::table::ThreadTable;
use crate::thread::{Level, ThreadConfig, ThreadDescriptor, ThreadHandle, ThreadStatus};

// ---------------------------------------------------------------------------
// Scheduler struct
// ---------------------------------------------------------------------------

/// The scheduler state: thread table, ready queues, current thread and
/// the pending-destroy slot.
///
/// ## Design Notes
///
/// - One value owns everything; the kernel passes it around explicitly
/// - Queues hold handles into the table, so membership checks are O(1)
///   through [`ThreadDescriptor::queued_in`]
/// - The table stores descriptors inline; the scheduler must not move
///   while threads are suspended inside [`Scheduler::run`]
pub struct Scheduler {
    threads: ThreadTable,
    queues: [ReadyQueue; 3],
    current: Option<ThreadHandle>,
    to_be_destroyed: Option<ThreadHandle>,
    aging: AgingMonitor,
    dispatches: u64,
}

impl Scheduler {
    /// Empty scheduler with default aging parameters.
    pub const fn new() -> Self {
        Self::with_aging(AgingMonitor::new(
            crate::config::AGING_THRESHOLD,
            crate::config::AGING_INCREMENT,
        ))
    }

    pub const fn with_aging(aging: AgingMonitor) -> Self {
        Self {
            threads: ThreadTable::new(),
            queues: [
                ReadyQueue::new(Level::L1),
                ReadyQueue::new(Level::L2),
                ReadyQueue::new(Level::L3),
            ],
            current: None,
            to_be_destroyed: None,
            aging,
            dispatches: 0,
        }
    }

    // -----------------------------------------------------------------------
    // Thread table
    // -----------------------------------------------------------------------

    /// Allocate a descriptor. The thread is not runnable until admitted
    /// with [`Scheduler::ready_to_run`].
    pub fn allocate<P: Platform>(&mut self, platform: &P, config: &ThreadConfig) -> Result<ThreadHandle> {
        self.threads.allocate(config, platform.now())
    }

    /// Install `handle` as the running thread without a context switch.
    /// Used once, for the thread that was executing when the scheduler
    /// took over.
    pub fn bootstrap<P: Platform>(&mut self, platform: &P, handle: ThreadHandle) {
        assert_interrupts_off(platform);
        assert!(self.current.is_none(), "scheduler already has a running thread");
        let thread = &mut self.threads[handle];
        thread.status = ThreadStatus::Running;
        thread.dispatch_timestamp = platform.now();
        self.current = Some(handle);
    }

    /// Release a thread that is neither running, queued, nor pending
    /// destruction.
    pub fn reclaim(&mut self, handle: ThreadHandle) -> Option<ThreadDescriptor> {
        let thread = self.threads.get(handle)?;
        assert!(thread.queued.is_none(), "reclaiming a queued thread");
        assert_ne!(self.current, Some(handle), "reclaiming the current thread");
        assert_ne!(self.to_be_destroyed, Some(handle), "reclaiming a thread pending destruction");
        self.threads.reclaim(handle)
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn thread(&self, handle: ThreadHandle) -> Option<&ThreadDescriptor> {
        self.threads.get(handle)
    }

    pub fn thread_mut(&mut self, handle: ThreadHandle) -> Option<&mut ThreadDescriptor> {
        self.threads.get_mut(handle)
    }

    #[track_caller]
    pub(crate) fn descriptor_mut(&mut self, handle: ThreadHandle) -> &mut ThreadDescriptor {
        &mut self.threads[handle]
    }

    // -----------------------------------------------------------------------
    // Feedback queue manager
    // -----------------------------------------------------------------------

    /// Mark `handle` ready and put it on the queue of its band.
    ///
    /// # Panics
    /// If interrupts are enabled or the thread is already enqueued.
    pub fn ready_to_run<P: Platform>(&mut self, platform: &P, handle: ThreadHandle) {
        assert_interrupts_off(platform);
        let now = platform.now();

        let thread = &mut self.threads[handle];
        assert!(
            thread.queued.is_none(),
            "thread {} admitted while already enqueued",
            thread.id
        );
        debug!("Putting thread on ready list: {}", thread.name);
        thread.status = ThreadStatus::Ready;
        thread.ready_timestamp = now;
        let level = thread.level();

        self.enqueue(handle, level);
        info!("Tick [{}]: Thread {} is inserted into queue {}", now, self.threads[handle].id, level);
    }

    /// Age waiting threads, then remove and return the head of the
    /// highest non-empty queue. `None` means the processor has nothing
    /// to run.
    pub fn find_next_to_run<P: Platform>(&mut self, platform: &P) -> Option<ThreadHandle> {
        assert_interrupts_off(platform);
        let aging = self.aging;
        aging.scan(self, platform);

        let now = platform.now();
        for level in Level::ALL {
            if let Some(handle) = self.queues[level.index()].pop_front() {
                let thread = &mut self.threads[handle];
                thread.queued = None;
                info!("Tick [{}]: Thread {} is removed from queue {}", now, thread.id, level);
                return Some(handle);
            }
        }
        None
    }

    /// Remove `handle` from the queue of `level` without touching its
    /// status. Returns whether it was there.
    pub fn evict<P: Platform>(&mut self, platform: &P, handle: ThreadHandle, level: Level) -> bool {
        assert_interrupts_off(platform);
        if !self.queues[level.index()].remove(handle) {
            return false;
        }
        let thread = &mut self.threads[handle];
        thread.queued = None;
        info!("Tick [{}]: Thread {} is removed from queue {}", platform.now(), thread.id, level);
        true
    }

    /// Re-sort `handle` inside its queue after its ordering key changed.
    /// Status and ready timestamp are kept.
    pub(crate) fn reposition(&mut self, handle: ThreadHandle) {
        if let Some(level) = self.threads[handle].queued {
            self.queues[level.index()].remove(handle);
            self.queues[level.index()].insert(handle, &self.threads);
        }
    }

    fn enqueue(&mut self, handle: ThreadHandle, level: Level) {
        self.queues[level.index()].insert(handle, &self.threads);
        self.threads[handle].queued = Some(level);
    }

    /// Whether the running thread should give up the processor at a
    /// timer boundary.
    ///
    /// - L1: a ready L1 thread orders strictly before it (preemptive SJF)
    /// - L2: L1 is non-empty (priority is non-preemptive within L2)
    /// - L3: anything is ready (round-robin, or a higher band arrived)
    pub fn should_preempt(&self) -> bool {
        let Some(current) = self.current else {
            return false;
        };
        let running = &self.threads[current];
        if running.status != ThreadStatus::Running {
            return false;
        }
        match running.level() {
            Level::L1 => self.queues[Level::L1.index()]
                .front()
                .map(|head| shortest_job_first(&self.threads[head], running).is_lt())
                .unwrap_or(false),
            Level::L2 => !self.queues[Level::L1.index()].is_empty(),
            Level::L3 => self.has_ready(),
        }
    }

    pub fn has_ready(&self) -> bool {
        self.queues.iter().any(|q| !q.is_empty())
    }

    pub fn queue(&self, level: Level) -> &ReadyQueue {
        &self.queues[level.index()]
    }

    pub fn current(&self) -> Option<ThreadHandle> {
        self.current
    }

    pub fn pending_destroy(&self) -> Option<ThreadHandle> {
        self.to_be_destroyed
    }

    /// Number of completed dispatches.
    pub fn dispatches(&self) -> u64 {
        self.dispatches
    }

    pub fn aging(&self) -> AgingMonitor {
        self.aging
    }

    // -----------------------------------------------------------------------
    // Dispatcher
    // -----------------------------------------------------------------------

    /// Hand the processor to `next`.
    ///
    /// The outgoing thread must already be out of the Running state
    /// (ready, blocked or finished). With `finishing`, it is reclaimed as
    /// soon as another thread runs on the processor, since until then
    /// its context is still in use.
    ///
    /// # Panics
    /// If interrupts are enabled, if a destruction is already pending,
    /// or if there is no current thread.
    pub fn run<P: Platform>(&mut self, platform: &P, next: ThreadHandle, finishing: bool) {
        assert_interrupts_off(platform);
        let old = match self.current {
            Some(old) => old,
            None => panic!("dispatch without a current thread"),
        };

        if finishing {
            assert!(
                self.to_be_destroyed.is_none(),
                "thread {} finishing while another awaits destruction",
                self.threads[old].id
            );
            self.to_be_destroyed = Some(old);
        }

        let now = platform.now();
        let prev = &mut self.threads[old];
        if let Some(user) = prev.user.as_mut() {
            platform.save_user_state(user);
        }

        if !prev.slept {
            let executed = now.saturating_sub(prev.dispatch_timestamp);
            prev.total_executed_ticks += executed;
            prev.last_run_ticks = executed;
            prev.burst.accumulate(executed);
        }
        prev.preempted = false;
        let (old_id, old_name, old_ran) = (prev.id, prev.name, prev.last_run_ticks);

        let incoming = &mut self.threads[next];
        assert!(incoming.queued.is_none(), "dispatching a queued thread");
        incoming.dispatch_timestamp = now;
        incoming.status = ThreadStatus::Running;
        self.current = Some(next);
        self.dispatches += 1;

        info!("Tick [{}]: Thread {} is now selected for execution", now, incoming.id);
        info!(
            "Tick [{}]: Thread {} is replaced, and it has executed {} ticks",
            now, old_id, old_ran
        );
        debug!("Switching from: {} to: {}", old_name, incoming.name);

        let (from, to) = self.threads.context_pair(old, next);
        // SAFETY: both contexts live inline in the table, which does not
        // move, and neither slot can be reclaimed before the switch back.
        unsafe { platform.switch_context(from, to) };

        // Back on the processor: whoever dispatched us set `current`.
        assert_interrupts_off(platform);
        self.check_to_be_destroyed();

        if let Some(resumed) = self.current {
            let thread = &mut self.threads[resumed];
            debug!("Now in thread: {}", thread.name);
            if let Some(user) = thread.user.as_ref() {
                platform.restore_user_state(user);
            }
            thread.slept = false;
        }
    }

    /// Free the thread that finished before the last switch, if any.
    pub fn check_to_be_destroyed(&mut self) {
        if let Some(handle) = self.to_be_destroyed.take() {
            if let Some(thread) = self.threads.reclaim(handle) {
                debug!("Destroying thread {} ({})", thread.id, thread.name);
            }
        }
    }

    /// Dump the ready queues.
    pub fn print(&self) {
        info!("Ready list contents:");
        for queue in &self.queues {
            info!("  {} ({} threads)", queue.level(), queue.len());
            for handle in queue.iter() {
                info!("    {}", self.threads[handle]);
            }
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimulatedMachine;
    use crate::arch::{AddressSpaceId, IntLevel, UserContext};
    use crate::thread::ThreadId;

    /// Scheduler with a running boot thread (id 0) and interrupts off.
    fn setup() -> (SimulatedMachine, Scheduler, ThreadHandle) {
        let machine = SimulatedMachine::new();
        machine.set_interrupt_level(IntLevel::Off);
        let mut sched = Scheduler::new();
        let main = sched.allocate(&machine, &ThreadConfig::new("main", 0)).unwrap();
        sched.bootstrap(&machine, main);
        (machine, sched, main)
    }

    fn admit(machine: &SimulatedMachine, sched: &mut Scheduler, config: ThreadConfig) -> ThreadHandle {
        let h = sched.allocate(machine, &config).unwrap();
        sched.ready_to_run(machine, h);
        h
    }

    fn id(sched: &Scheduler, h: ThreadHandle) -> ThreadId {
        sched.thread(h).unwrap().id
    }

    #[test]
    fn test_admit_classifies_by_priority() {
        let (machine, mut sched, _) = setup();
        machine.set_now(7);
        let l1 = admit(&machine, &mut sched, ThreadConfig::new("l1", 100));
        let l2 = admit(&machine, &mut sched, ThreadConfig::new("l2", 99));
        let l3 = admit(&machine, &mut sched, ThreadConfig::new("l3", 49));

        assert_eq!(sched.thread(l1).unwrap().queued_in(), Some(Level::L1));
        assert_eq!(sched.thread(l2).unwrap().queued_in(), Some(Level::L2));
        assert_eq!(sched.thread(l3).unwrap().queued_in(), Some(Level::L3));
        for h in [l1, l2, l3] {
            let t = sched.thread(h).unwrap();
            assert_eq!(t.status, ThreadStatus::Ready);
            assert_eq!(t.ready_timestamp, 7);
        }
    }

    #[test]
    fn test_end_to_end_selection_order() {
        let (machine, mut sched, _) = setup();
        let t1 = admit(&machine, &mut sched, ThreadConfig::new("t1", 120).with_burst(5.0));
        let t2 = admit(&machine, &mut sched, ThreadConfig::new("t2", 120).with_burst(3.0));
        let t3 = admit(&machine, &mut sched, ThreadConfig::new("t3", 30));
        assert_eq!((id(&sched, t1), id(&sched, t2), id(&sched, t3)), (ThreadId(1), ThreadId(2), ThreadId(3)));

        assert_eq!(sched.find_next_to_run(&machine), Some(t2));
        assert_eq!(sched.find_next_to_run(&machine), Some(t1));
        assert_eq!(sched.find_next_to_run(&machine), Some(t3));
        assert_eq!(sched.find_next_to_run(&machine), None);
    }

    #[test]
    fn test_level1_always_beats_lower_levels() {
        let (machine, mut sched, _) = setup();
        let l2 = admit(&machine, &mut sched, ThreadConfig::new("l2", 99));
        let l3 = admit(&machine, &mut sched, ThreadConfig::new("l3", 0));
        let l1 = admit(&machine, &mut sched, ThreadConfig::new("l1", 100).with_burst(1.0e6));

        assert_eq!(sched.find_next_to_run(&machine), Some(l1));
        assert_eq!(sched.find_next_to_run(&machine), Some(l2));
        assert_eq!(sched.find_next_to_run(&machine), Some(l3));
    }

    #[test]
    fn test_equal_keys_select_lower_id() {
        let (machine, mut sched, _) = setup();
        let a = admit(&machine, &mut sched, ThreadConfig::new("a", 70));
        let b = admit(&machine, &mut sched, ThreadConfig::new("b", 70));
        let c = admit(&machine, &mut sched, ThreadConfig::new("c", 130).with_burst(4.0));
        let d = admit(&machine, &mut sched, ThreadConfig::new("d", 110).with_burst(4.0));

        assert_eq!(sched.find_next_to_run(&machine), Some(c));
        assert_eq!(sched.find_next_to_run(&machine), Some(d));
        assert_eq!(sched.find_next_to_run(&machine), Some(a));
        assert_eq!(sched.find_next_to_run(&machine), Some(b));
    }

    #[test]
    fn test_empty_queues_are_not_an_error() {
        let (machine, mut sched, _) = setup();
        assert!(!sched.has_ready());
        assert_eq!(sched.find_next_to_run(&machine), None);
    }

    #[test]
    #[should_panic(expected = "already enqueued")]
    fn test_double_admission_panics() {
        let (machine, mut sched, _) = setup();
        let h = admit(&machine, &mut sched, ThreadConfig::new("t", 10));
        sched.ready_to_run(&machine, h);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_admission_requires_interrupts_off() {
        let (machine, mut sched, _) = setup();
        let h = sched.allocate(&machine, &ThreadConfig::new("t", 10)).unwrap();
        machine.set_interrupt_level(IntLevel::On);
        sched.ready_to_run(&machine, h);
    }

    #[test]
    fn test_evict_keeps_status() {
        let (machine, mut sched, _) = setup();
        let h = admit(&machine, &mut sched, ThreadConfig::new("t", 10));
        assert!(!sched.evict(&machine, h, Level::L2));
        assert!(sched.evict(&machine, h, Level::L3));
        let t = sched.thread(h).unwrap();
        assert_eq!(t.status, ThreadStatus::Ready);
        assert_eq!(t.queued_in(), None);
        assert!(sched.queue(Level::L3).is_empty());
    }

    #[test]
    fn test_run_switches_and_accounts() {
        let (machine, mut sched, main) = setup();
        let next = admit(&machine, &mut sched, ThreadConfig::new("next", 10));

        machine.set_now(25);
        let picked = sched.find_next_to_run(&machine).unwrap();
        sched.thread_mut(main).unwrap().status = ThreadStatus::Blocked;
        sched.run(&machine, picked, false);

        assert_eq!(sched.current(), Some(next));
        assert_eq!(machine.switches(), 1);
        assert_eq!(sched.dispatches(), 1);

        let prev = sched.thread(main).unwrap();
        assert_eq!(prev.total_executed_ticks, 25);
        assert_eq!(prev.last_run_ticks, 25);
        assert_eq!(prev.burst.accumulated(), 25);

        let now_running = sched.thread(next).unwrap();
        assert_eq!(now_running.status, ThreadStatus::Running);
        assert_eq!(now_running.dispatch_timestamp, 25);
    }

    #[test]
    fn test_preempted_partial_burst_accumulates() {
        let (machine, mut sched, main) = setup();
        let other = admit(&machine, &mut sched, ThreadConfig::new("other", 10));

        machine.set_now(12);
        {
            let t = sched.thread_mut(main).unwrap();
            t.preempted = true;
        }
        let picked = sched.find_next_to_run(&machine).unwrap();
        sched.ready_to_run(&machine, main);
        sched.run(&machine, picked, false);

        let prev = sched.thread(main).unwrap();
        assert!(!prev.preempted);
        assert_eq!(prev.burst.accumulated(), 12);
        assert_eq!(sched.current(), Some(other));
    }

    #[test]
    fn test_slept_thread_is_not_charged_again() {
        let (machine, mut sched, main) = setup();
        let other = admit(&machine, &mut sched, ThreadConfig::new("other", 10));

        machine.set_now(40);
        {
            let t = sched.thread_mut(main).unwrap();
            t.status = ThreadStatus::Blocked;
            t.slept = true;
            t.burst.complete(40);
        }
        let picked = sched.find_next_to_run(&machine).unwrap();
        sched.run(&machine, picked, false);

        let prev = sched.thread(main).unwrap();
        assert_eq!(prev.burst.accumulated(), 0);
        assert_eq!(prev.burst.estimate(), 20.0);
        assert_eq!(prev.total_executed_ticks, 0);
        // flag stays until the sleeper itself resumes
        assert!(prev.slept);
        assert!(!sched.thread(other).unwrap().slept);
    }

    #[test]
    fn test_finishing_thread_is_reclaimed_after_switch() {
        let (machine, mut sched, main) = setup();
        let next = admit(&machine, &mut sched, ThreadConfig::new("next", 10));

        sched.thread_mut(main).unwrap().status = ThreadStatus::Finished;
        let picked = sched.find_next_to_run(&machine).unwrap();
        sched.run(&machine, picked, true);

        assert!(sched.thread(main).is_none());
        assert_eq!(sched.pending_destroy(), None);
        assert_eq!(sched.current(), Some(next));
        assert_eq!(sched.threads().len(), 1);
    }

    #[test]
    #[should_panic(expected = "awaits destruction")]
    fn test_double_pending_destroy_panics() {
        let (machine, mut sched, _) = setup();
        let next = admit(&machine, &mut sched, ThreadConfig::new("next", 10));
        sched.find_next_to_run(&machine);
        // a destruction left pending by a switch that has not come back
        sched.to_be_destroyed = Some(next);
        sched.run(&machine, next, true);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_dispatch_requires_interrupts_off() {
        let (machine, mut sched, _) = setup();
        admit(&machine, &mut sched, ThreadConfig::new("next", 10));
        let picked = sched.find_next_to_run(&machine).unwrap();
        machine.set_interrupt_level(IntLevel::On);
        sched.run(&machine, picked, false);
    }

    #[test]
    fn test_user_state_saved_and_restored() {
        let (machine, mut sched, main) = setup();
        sched.thread_mut(main).unwrap().user = Some(UserContext::new(AddressSpaceId(1)));
        let user = admit(
            &machine,
            &mut sched,
            ThreadConfig::new("user", 10).with_user(UserContext::new(AddressSpaceId(2))),
        );

        let picked = sched.find_next_to_run(&machine).unwrap();
        sched.ready_to_run(&machine, main);
        sched.run(&machine, picked, false);

        assert_eq!(sched.current(), Some(user));
        assert_eq!(machine.user_saves(), 1);
        assert_eq!(machine.user_restores(), 1);
    }

    #[test]
    fn test_should_preempt_rules() {
        let (machine, mut sched, main) = setup();
        // main is L3: preempted by anything ready
        assert!(!sched.should_preempt());
        admit(&machine, &mut sched, ThreadConfig::new("rr", 5));
        assert!(sched.should_preempt());

        // L2 running: only L1 arrivals preempt
        sched.thread_mut(main).unwrap().priority = crate::thread::Priority::new(60).unwrap();
        admit(&machine, &mut sched, ThreadConfig::new("l2", 99));
        assert!(!sched.should_preempt());
        admit(&machine, &mut sched, ThreadConfig::new("long", 120).with_burst(50.0));
        assert!(sched.should_preempt());

        // L1 running: only a strictly shorter L1 job preempts
        let t = sched.thread_mut(main).unwrap();
        t.priority = crate::thread::Priority::new(120).unwrap();
        t.burst = crate::burst::BurstEstimator::new(10.0).unwrap();
        assert!(!sched.should_preempt());
        admit(&machine, &mut sched, ThreadConfig::new("short", 120).with_burst(2.0));
        assert!(sched.should_preempt());
    }
}
