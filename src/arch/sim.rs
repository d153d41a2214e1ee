//! # Simulated Machine
//!
//! Host-side [`Platform`] with a software tick counter and interrupt
//! level. A context switch is recorded and returns immediately, which
//! the scheduler observes as "the incoming thread resumed inside its
//! own dispatch call".

use core::cell::Cell;

use super::{IntLevel, MachineContext, Platform, Tick, UserContext};

#[derive(Debug)]
pub struct SimulatedMachine {
    ticks: Cell<Tick>,
    level: Cell<IntLevel>,
    switches: Cell<u64>,
    last_switch: Cell<Option<(MachineContext, MachineContext)>>,
    user_saves: Cell<u64>,
    user_restores: Cell<u64>,
}

impl SimulatedMachine {
    /// Machine at tick 0 with interrupts enabled.
    pub const fn new() -> Self {
        Self {
            ticks: Cell::new(0),
            level: Cell::new(IntLevel::On),
            switches: Cell::new(0),
            last_switch: Cell::new(None),
            user_saves: Cell::new(0),
            user_restores: Cell::new(0),
        }
    }

    /// Advance the clock by `ticks`.
    pub fn advance(&self, ticks: Tick) {
        self.ticks.set(self.ticks.get() + ticks);
    }

    /// Jump the clock to `tick`. Time never goes backwards.
    pub fn set_now(&self, tick: Tick) {
        assert!(tick >= self.ticks.get(), "clock moved backwards");
        self.ticks.set(tick);
    }

    /// Number of context switches performed.
    pub fn switches(&self) -> u64 {
        self.switches.get()
    }

    /// `(from, to)` contexts of the most recent switch.
    pub fn last_switch(&self) -> Option<(MachineContext, MachineContext)> {
        self.last_switch.get()
    }

    pub fn user_saves(&self) -> u64 {
        self.user_saves.get()
    }

    pub fn user_restores(&self) -> u64 {
        self.user_restores.get()
    }
}

impl Default for SimulatedMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimulatedMachine {
    fn now(&self) -> Tick {
        self.ticks.get()
    }

    fn interrupt_level(&self) -> IntLevel {
        self.level.get()
    }

    fn set_interrupt_level(&self, level: IntLevel) -> IntLevel {
        self.level.replace(level)
    }

    unsafe fn switch_context(&self, from: *mut MachineContext, to: *const MachineContext) {
        assert_eq!(self.level.get(), IntLevel::Off, "context switch with interrupts enabled");
        self.switches.set(self.switches.get() + 1);
        self.last_switch.set(Some((*from, *to)));
    }

    fn save_user_state(&self, _user: &mut UserContext) {
        self.user_saves.set(self.user_saves.get() + 1);
    }

    fn restore_user_state(&self, _user: &UserContext) {
        self.user_restores.set(self.user_restores.get() + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_level_round_trip() {
        let machine = SimulatedMachine::new();
        assert_eq!(machine.interrupt_level(), IntLevel::On);
        let previous = machine.set_interrupt_level(IntLevel::Off);
        assert_eq!(previous, IntLevel::On);
        assert_eq!(machine.interrupt_level(), IntLevel::Off);
    }

    #[test]
    fn test_switch_is_recorded() {
        let machine = SimulatedMachine::new();
        let mut from = MachineContext::default();
        let to = MachineContext::prepare(0x2000_1004, 0x0800_0101);
        machine.set_interrupt_level(IntLevel::Off);
        unsafe { machine.switch_context(&mut from, &to) };
        assert_eq!(machine.switches(), 1);
        assert_eq!(machine.last_switch(), Some((from, to)));
        assert_eq!(to.sp, 0x2000_1000);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_switch_requires_interrupts_off() {
        let machine = SimulatedMachine::new();
        let mut from = MachineContext::default();
        let to = MachineContext::default();
        unsafe { machine.switch_context(&mut from, &to) };
    }
}
