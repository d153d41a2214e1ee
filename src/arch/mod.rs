//! # Architecture Abstraction Layer
//!
//! Provides a hardware abstraction boundary for the scheduler. The core
//! only ever talks to the processor through [`Platform`]: the tick
//! counter, the interrupt level and the register swap.
//!
//! - [`sim`]: host simulation used by tests and by hosted kernels
//! - [`cortex_m4`]: ARM Cortex-M4 port (bare-metal ARM targets only)

use crate::config::USER_REGISTERS;

pub mod sim;

#[cfg(all(target_arch = "arm", target_os = "none"))]
pub mod cortex_m4;

/// Discrete unit of simulated or hardware time.
pub type Tick = u64;

/// Processor interrupt level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntLevel {
    /// Interrupts masked. Every scheduler operation runs at this level.
    Off,
    /// Interrupts delivered.
    On,
}

/// Callee-saved machine state of a suspended thread.
///
/// Layout is fixed (`repr(C)`) because the Cortex-M4 switch routine
/// addresses the fields by offset: `callee_saved` at 0, `sp` at
/// `8 * size_of::<usize>()`, `lr` right after.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineContext {
    /// R4–R11 on Thumb-2.
    pub callee_saved: [usize; 8],
    /// Stack pointer at suspension.
    pub sp: usize,
    /// Resume address.
    pub lr: usize,
}

impl MachineContext {
    /// Context for a thread that has never run: resumes at `entry` on a
    /// fresh stack whose highest address is `stack_top`.
    ///
    /// `entry` starts with interrupts disabled, exactly like a thread
    /// resuming inside the dispatcher.
    pub fn prepare(stack_top: usize, entry: usize) -> Self {
        Self {
            callee_saved: [0; 8],
            // AAPCS: 8-byte aligned stack at public interfaces
            sp: stack_top & !0x07,
            lr: entry,
        }
    }
}

/// Opaque address-space identifier handed out by the memory manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpaceId(pub u32);

/// User-mode register file and address space of a thread that runs a
/// user program. Kernel-only threads have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    pub registers: [usize; USER_REGISTERS],
    pub space: AddressSpaceId,
}

impl UserContext {
    pub const fn new(space: AddressSpaceId) -> Self {
        Self {
            registers: [0; USER_REGISTERS],
            space,
        }
    }
}

/// Services the scheduler consumes from the processor.
///
/// All methods are called with interrupts disabled except
/// [`Platform::set_interrupt_level`], which is how they get disabled.
pub trait Platform {
    /// Monotonic tick counter.
    fn now(&self) -> Tick;

    /// Current interrupt level.
    fn interrupt_level(&self) -> IntLevel;

    /// Set the interrupt level and return the previous one.
    fn set_interrupt_level(&self, level: IntLevel) -> IntLevel;

    /// Suspend execution under `from` and resume execution under `to`.
    ///
    /// Returns only when some later switch resumes `from`.
    ///
    /// # Safety
    /// Both pointers must reference live contexts that stay in place
    /// until the switch back. Interrupts must be disabled.
    unsafe fn switch_context(&self, from: *mut MachineContext, to: *const MachineContext);

    /// Copy the user-mode registers of the outgoing thread into `user`
    /// and persist its address-space state.
    fn save_user_state(&self, _user: &mut UserContext) {}

    /// Load `user` into the user-mode registers and install its
    /// address space.
    fn restore_user_state(&self, _user: &UserContext) {}
}
