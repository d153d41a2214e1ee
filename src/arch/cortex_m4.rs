//! # Cortex-M4 Port Layer
//!
//! Hardware-specific [`Platform`] for the ARM Cortex-M4 (Thumb-2).
//!
//! ## Context Switch Mechanism
//!
//! Threads run privileged on MSP. The dispatcher switches synchronously:
//! `triq_context_switch` stores R4–R11, SP and LR of the outgoing thread
//! into its [`MachineContext`], loads the incoming one and branches to
//! its LR. Caller-saved registers are already spilled by the AAPCS call
//! into the routine, so this is the complete thread state.
//!
//! The FPU context (S16–S31) is not saved. Threads scheduled by this
//! port must not keep live values in FPU registers across a switch.
//!
//! ## Tick Source
//!
//! SysTick fires at `TICK_HZ`. The crate defines no exception handler:
//! the firmware's `SysTick` handler calls [`on_systick`] to advance the
//! 64-bit counter and records that a tick is pending. `Kernel::tick`
//! then runs on the interrupt return path, from thread context, never
//! inside the ISR itself, because it may switch threads.
//!
//! ```ignore
//! #[exception]
//! fn SysTick() {
//!     triq::arch::cortex_m4::on_systick();
//! }
//!
//! // main loop / return path
//! for _ in 0..cortex_m4::take_pending_ticks() {
//!     kernel.tick();
//! }
//! ```

use core::cell::Cell;

use cortex_m::interrupt::{self, Mutex};
use cortex_m::peripheral::syst::SystClkSource;
use cortex_m::register::primask;

use super::{IntLevel, MachineContext, Platform, Tick};
use crate::config::{SYSTEM_CLOCK_HZ, TICK_HZ};

// thumbv7em has no 64-bit atomics
static TICKS: Mutex<Cell<Tick>> = Mutex::new(Cell::new(0));
static PENDING: Mutex<Cell<u32>> = Mutex::new(Cell::new(0));

// ---------------------------------------------------------------------------
// SysTick configuration
// ---------------------------------------------------------------------------

/// Configure SysTick to fire at `TICK_HZ` from the processor clock.
pub fn configure_systick(syst: &mut cortex_m::peripheral::SYST) {
    let reload = SYSTEM_CLOCK_HZ / TICK_HZ - 1;
    syst.set_reload(reload);
    syst.clear_current();
    syst.set_clock_source(SystClkSource::Core);
    syst.enable_counter();
    syst.enable_interrupt();
}

/// Set SysTick to the lowest interrupt priority so it never preempts
/// application ISRs.
pub fn set_interrupt_priorities() {
    unsafe {
        // System Handler Priority Register 3 (SHPR3): 0xE000_ED20
        // Bits [31:24] = SysTick priority
        let shpr3: *mut u32 = 0xE000_ED20 as *mut u32;
        let val = core::ptr::read_volatile(shpr3);
        core::ptr::write_volatile(shpr3, val | (0xFF << 24));
    }
}

/// Body of the firmware's SysTick handler: advance the tick counter.
pub fn on_systick() {
    interrupt::free(|cs| {
        let ticks = TICKS.borrow(cs);
        ticks.set(ticks.get() + 1);
        let pending = PENDING.borrow(cs);
        pending.set(pending.get().saturating_add(1));
    });
}

/// Ticks counted by [`on_systick`] that `Kernel::tick` has not yet
/// processed. Resets the count.
pub fn take_pending_ticks() -> u32 {
    interrupt::free(|cs| PENDING.borrow(cs).replace(0))
}

// ---------------------------------------------------------------------------
// Register swap
// ---------------------------------------------------------------------------

core::arch::global_asm!(
    ".section .text.triq_context_switch,\"ax\",%progbits",
    ".global triq_context_switch",
    ".type triq_context_switch,%function",
    ".thumb_func",
    "triq_context_switch:",
    // r0 = from, r1 = to
    "    stmia r0, {{r4-r11}}",
    "    mov r2, sp",
    "    str r2, [r0, #32]",
    "    str lr, [r0, #36]",
    "    ldmia r1, {{r4-r11}}",
    "    ldr r2, [r1, #32]",
    "    mov sp, r2",
    "    ldr lr, [r1, #36]",
    "    bx lr",
    ".size triq_context_switch, . - triq_context_switch",
);

extern "C" {
    fn triq_context_switch(from: *mut MachineContext, to: *const MachineContext);
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// The Cortex-M4 processor. Zero-sized: all state lives in hardware
/// registers and in the SysTick counter.
#[derive(Debug)]
pub struct CortexM4 {
    _private: (),
}

impl CortexM4 {
    /// Start the tick source and return the platform handle.
    pub fn init(syst: &mut cortex_m::peripheral::SYST) -> Self {
        set_interrupt_priorities();
        configure_systick(syst);
        Self { _private: () }
    }
}

impl Platform for CortexM4 {
    fn now(&self) -> Tick {
        interrupt::free(|cs| TICKS.borrow(cs).get())
    }

    fn interrupt_level(&self) -> IntLevel {
        // PRIMASK "active" means configurable-priority exceptions are taken
        if primask::read().is_active() {
            IntLevel::On
        } else {
            IntLevel::Off
        }
    }

    fn set_interrupt_level(&self, level: IntLevel) -> IntLevel {
        let previous = self.interrupt_level();
        match level {
            IntLevel::Off => interrupt::disable(),
            IntLevel::On => unsafe { interrupt::enable() },
        }
        previous
    }

    unsafe fn switch_context(&self, from: *mut MachineContext, to: *const MachineContext) {
        triq_context_switch(from, to);
    }
}
