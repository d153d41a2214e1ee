//! # Synchronization Primitives
//!
//! On a single processor, masking interrupts is the only mutual exclusion
//! the scheduler uses. A lock inside the scheduler could block, and
//! blocking calls back into the scheduler.

use crate::arch::{IntLevel, Platform};

/// Execute a closure with interrupts disabled.
///
/// The previous level is restored on exit, so critical sections nest:
/// an inner section entered with interrupts already off leaves them off.
///
/// # Usage
/// ```ignore
/// sync::critical_section(&machine, |platform| {
///     scheduler.ready_to_run(platform, handle);
/// });
/// ```
#[inline]
pub fn critical_section<P, F, R>(platform: &P, f: F) -> R
where
    P: Platform,
    F: FnOnce(&P) -> R,
{
    let previous = platform.set_interrupt_level(IntLevel::Off);
    let result = f(platform);
    platform.set_interrupt_level(previous);
    result
}

/// Fail fast if interrupts are enabled.
#[inline]
#[track_caller]
pub fn assert_interrupts_off<P: Platform>(platform: &P) {
    assert!(
        platform.interrupt_level() == IntLevel::Off,
        "scheduler entered with interrupts enabled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::sim::SimulatedMachine;

    #[test]
    fn test_critical_section_restores_level() {
        let machine = SimulatedMachine::new();
        let seen = critical_section(&machine, |p| p.interrupt_level());
        assert_eq!(seen, IntLevel::Off);
        assert_eq!(machine.interrupt_level(), IntLevel::On);
    }

    #[test]
    fn test_critical_section_nests() {
        let machine = SimulatedMachine::new();
        critical_section(&machine, |outer| {
            critical_section(outer, |_| {});
            assert_eq!(outer.interrupt_level(), IntLevel::Off);
        });
        assert_eq!(machine.interrupt_level(), IntLevel::On);
    }

    #[test]
    #[should_panic(expected = "interrupts enabled")]
    fn test_assert_interrupts_off_panics() {
        let machine = SimulatedMachine::new();
        assert_interrupts_off(&machine);
    }
}
