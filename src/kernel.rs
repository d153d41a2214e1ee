//! # Kernel
//!
//! Thread lifecycle and timer glue around the [`Scheduler`].
//!
//! The kernel owns the platform, the scheduler and the timer. Every
//! public function runs inside a critical section, so the scheduler is
//! always entered with interrupts disabled.
//!
//! ## Lifecycle
//!
//! ```text
//! Kernel::new(platform, main)    ← boot thread becomes current
//!   ├─► spawn()                  ← allocate + admit (×N)
//!   ├─► tick()                   ← once per clock tick
//!   │     ├─► timer callback     ← yield requested every quantum
//!   │     └─► should_preempt()?  ← re-admit current, dispatch next
//!   └─► yield_now() · sleep() · finish() · wake() · kill()
//! ```
//!
//! ## Idle
//!
//! When the running thread blocks or finishes and nothing is ready, the
//! processor idles. The stopped thread keeps the current slot until a
//! later `tick()` finds work to dispatch.

use log::{debug, info};

use crate::arch::{Platform, Tick};
use crate::error::{Result, SchedError};
use crate::scheduler::Scheduler;
use crate::sync;
use crate::thread::{ThreadConfig, ThreadHandle, ThreadStatus};
use crate::timer::TimerCallback;

/// Counters kept by the kernel on top of the scheduler's own.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KernelStats {
    /// Ticks spent with no thread on the processor.
    pub idle_ticks: u64,
    /// Dispatches forced by the timer.
    pub preemptions: u64,
    /// Timer callbacks delivered.
    pub timer_interrupts: u64,
}

#[derive(Debug, Clone, Copy)]
struct Idle {
    /// The stopped thread must be reclaimed at the next dispatch.
    finishing: bool,
    since: Tick,
}

struct KernelState {
    scheduler: Scheduler,
    timer: TimerCallback,
    idle: Option<Idle>,
    stats: KernelStats,
}

/// A uniprocessor kernel instance.
///
/// Thread descriptors, including saved register sets, live inline in
/// the kernel. On hardware the kernel must be placed once and never
/// moved after the first context switch.
pub struct Kernel<P: Platform> {
    platform: P,
    state: KernelState,
}

impl<P: Platform> Kernel<P> {
    /// Take over the processor: `main` describes the thread executing
    /// this call, which becomes the running thread.
    pub fn new(platform: P, main: &ThreadConfig) -> Result<Self> {
        Self::with_parts(platform, main, Scheduler::new(), TimerCallback::default())
    }

    /// Like [`Kernel::new`] with a preconfigured scheduler and timer.
    pub fn with_parts(
        platform: P,
        main: &ThreadConfig,
        scheduler: Scheduler,
        timer: TimerCallback,
    ) -> Result<Self> {
        let mut state = KernelState {
            scheduler,
            timer,
            idle: None,
            stats: KernelStats::default(),
        };
        sync::critical_section(&platform, |p| state.bootstrap(p, main))?;
        Ok(Self { platform, state })
    }

    /// Create a thread and make it ready.
    pub fn spawn(&mut self, config: &ThreadConfig) -> Result<ThreadHandle> {
        sync::critical_section(&self.platform, |p| self.state.spawn(p, config))
    }

    /// Give the processor to another ready thread, if there is one. The
    /// caller goes back to its ready queue.
    pub fn yield_now(&mut self) {
        sync::critical_section(&self.platform, |p| self.state.yield_now(p))
    }

    /// Block the running thread until [`Kernel::wake`].
    ///
    /// # Panics
    /// If no thread is running.
    pub fn sleep(&mut self) {
        sync::critical_section(&self.platform, |p| self.state.stop(p, false))
    }

    /// Terminate the running thread.
    ///
    /// # Panics
    /// If no thread is running.
    pub fn finish(&mut self) {
        sync::critical_section(&self.platform, |p| self.state.stop(p, true))
    }

    /// Make a blocked thread ready.
    pub fn wake(&mut self, handle: ThreadHandle) -> Result<()> {
        sync::critical_section(&self.platform, |p| self.state.wake(p, handle))
    }

    /// Terminate any thread.
    pub fn kill(&mut self, handle: ThreadHandle) -> Result<()> {
        sync::critical_section(&self.platform, |p| self.state.kill(p, handle))
    }

    /// Clock tick. Call once per tick after the platform counter has
    /// advanced.
    pub fn tick(&mut self) {
        sync::critical_section(&self.platform, |p| self.state.tick(p))
    }

    /// Thread on the processor, or `None` while idle.
    pub fn current(&self) -> Option<ThreadHandle> {
        match self.state.idle {
            Some(_) => None,
            None => self.state.scheduler.current(),
        }
    }

    pub fn is_idle(&self) -> bool {
        self.state.idle.is_some()
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.state.scheduler
    }

    pub fn timer(&self) -> &TimerCallback {
        &self.state.timer
    }

    pub fn stats(&self) -> KernelStats {
        self.state.stats
    }

    /// Dump the ready queues to the log.
    pub fn print(&self) {
        self.state.scheduler.print();
    }
}

// ---------------------------------------------------------------------------
// Operations (interrupts disabled)
// ---------------------------------------------------------------------------

impl KernelState {
    fn bootstrap<P: Platform>(&mut self, p: &P, main: &ThreadConfig) -> Result<()> {
        let handle = self.scheduler.allocate(p, main)?;
        self.scheduler.bootstrap(p, handle);
        let now = p.now();
        self.timer.schedule(now, self.timer.quantum());
        info!("Tick [{}]: Thread {} is running", now, self.scheduler.threads()[handle].id);
        Ok(())
    }

    fn spawn<P: Platform>(&mut self, p: &P, config: &ThreadConfig) -> Result<ThreadHandle> {
        let handle = self.scheduler.allocate(p, config)?;
        self.scheduler.ready_to_run(p, handle);
        Ok(handle)
    }

    #[track_caller]
    fn running(&self) -> ThreadHandle {
        match (self.idle, self.scheduler.current()) {
            (None, Some(handle)) => handle,
            _ => panic!("no thread is running"),
        }
    }

    fn yield_now<P: Platform>(&mut self, p: &P) {
        if self.idle.is_some() {
            return;
        }
        let current = self.running();
        if let Some(next) = self.scheduler.find_next_to_run(p) {
            self.scheduler.ready_to_run(p, current);
            self.scheduler.run(p, next, false);
        }
    }

    /// Timer-driven switch. The slice just cut short is only added to
    /// the burst accumulator; the estimate itself is kept until the
    /// thread next blocks.
    fn preempt<P: Platform>(&mut self, p: &P) {
        let current = self.running();
        if let Some(next) = self.scheduler.find_next_to_run(p) {
            self.scheduler.descriptor_mut(current).preempted = true;
            self.scheduler.ready_to_run(p, current);
            self.scheduler.run(p, next, false);
            self.stats.preemptions += 1;
        }
    }

    /// Take the running thread off the processor for good (`finishing`)
    /// or until it is woken.
    fn stop<P: Platform>(&mut self, p: &P, finishing: bool) {
        let current = self.running();
        let now = p.now();

        let thread = self.scheduler.descriptor_mut(current);
        let executed = now.saturating_sub(thread.dispatch_timestamp);
        thread.total_executed_ticks += executed;
        thread.last_run_ticks = executed;
        thread.slept = true;
        if finishing {
            thread.status = ThreadStatus::Finished;
            debug!("Finishing thread: {}", thread.name);
        } else {
            thread.status = ThreadStatus::Blocked;
            let estimate = thread.burst.complete(executed);
            info!("Tick [{}]: Thread {} has nextBurst: {}", now, thread.id, estimate);
            debug!("Sleeping thread: {}", thread.name);
        }

        self.dispatch_or_idle(p, finishing);
    }

    fn dispatch_or_idle<P: Platform>(&mut self, p: &P, finishing: bool) {
        match self.scheduler.find_next_to_run(p) {
            Some(next) => self.scheduler.run(p, next, finishing),
            None => {
                debug!("Tick [{}]: no thread ready, idling", p.now());
                self.idle = Some(Idle {
                    finishing,
                    since: p.now(),
                });
            }
        }
    }

    fn wake<P: Platform>(&mut self, p: &P, handle: ThreadHandle) -> Result<()> {
        let thread = self
            .scheduler
            .thread(handle)
            .ok_or(SchedError::UnknownThread { handle })?;
        if thread.status != ThreadStatus::Blocked {
            return Err(SchedError::NotBlocked { thread_id: thread.id });
        }
        self.scheduler.ready_to_run(p, handle);
        Ok(())
    }

    fn kill<P: Platform>(&mut self, p: &P, handle: ThreadHandle) -> Result<()> {
        let status = self
            .scheduler
            .thread(handle)
            .ok_or(SchedError::UnknownThread { handle })?
            .status;

        if self.scheduler.current() == Some(handle) {
            if self.idle.is_none() {
                self.stop(p, true);
                return Ok(());
            }
            // stopped on an idle processor, possibly woken since
            if let Some(level) = self.scheduler.thread(handle).and_then(|t| t.queued_in()) {
                self.scheduler.evict(p, handle, level);
            }
            if status != ThreadStatus::Finished {
                self.scheduler.descriptor_mut(handle).status = ThreadStatus::Finished;
                if let Some(idle) = self.idle.as_mut() {
                    idle.finishing = true;
                }
            }
            return Ok(());
        }

        match status {
            ThreadStatus::Ready => {
                if let Some(level) = self.scheduler.thread(handle).and_then(|t| t.queued_in()) {
                    self.scheduler.evict(p, handle, level);
                }
                self.destroy(handle);
            }
            ThreadStatus::Blocked => self.destroy(handle),
            ThreadStatus::Running | ThreadStatus::Finished => {}
        }
        Ok(())
    }

    fn destroy(&mut self, handle: ThreadHandle) {
        if let Some(thread) = self.scheduler.reclaim(handle) {
            debug!("Destroying thread {} ({})", thread.id, thread.name);
        }
    }

    fn tick<P: Platform>(&mut self, p: &P) {
        let now = p.now();
        if self.timer.is_due(now) {
            self.stats.timer_interrupts += 1;
            self.timer.callback(now);
        }

        if let Some(idle) = self.idle {
            self.stats.idle_ticks += 1;
            // nothing on the processor to yield
            self.timer.take_yield_request();
            self.resume_from_idle(p, idle);
            return;
        }

        if self.timer.take_yield_request() && self.scheduler.should_preempt() {
            self.preempt(p);
        }
    }

    fn resume_from_idle<P: Platform>(&mut self, p: &P, idle: Idle) {
        let Some(next) = self.scheduler.find_next_to_run(p) else {
            return;
        };
        self.idle = None;
        let now = p.now();
        debug!("Tick [{}]: leaving idle after {} ticks", now, now - idle.since);

        if self.scheduler.current() == Some(next) {
            // woken before anyone else ran: no switch needed
            let thread = self.scheduler.descriptor_mut(next);
            thread.status = ThreadStatus::Running;
            thread.dispatch_timestamp = now;
            thread.slept = false;
            info!("Tick [{}]: Thread {} is now selected for execution", now, thread.id);
        } else {
            self.scheduler.run(p, next, idle.finishing);
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests (host-only)
// ---------------------------------------------------------------------------
