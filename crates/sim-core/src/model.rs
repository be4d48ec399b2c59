//! Processor-model capability consumed by the runloop.
//!
//! The model owns the architectural state, the decoder, the per-opcode
//! execution semantics and the bus/MMU; the runloop only drives it. Where
//! the model cannot make forward progress it returns a [`RecoveryCause`] up
//! the call chain instead of performing a non-local transfer.

use crate::trap::{HostFault, HostFaultKind, RecoveryCause};

/// Log mask bit: trace retired instructions.
pub const LOG_INST: u32 = 1 << 0;
/// Log mask bit: trace operand values.
pub const LOG_OPERANDS: u32 = 1 << 1;
/// Log mask bit: trace trap dispatch.
pub const LOG_TRAP: u32 = 1 << 2;
/// Log mask bit: trace device MMIO accesses.
pub const LOG_MMIO: u32 = 1 << 3;

/// Guest cause: instruction fetch faulted.
pub const CAUSE_FAULT_FETCH: u32 = 1;
/// Guest cause: no execution path accepted the instruction.
pub const CAUSE_ILLEGAL_INSTRUCTION: u32 = 2;
/// Guest cause: data load faulted.
pub const CAUSE_FAULT_LOAD: u32 = 5;
/// Guest cause: data store faulted.
pub const CAUSE_FAULT_STORE: u32 = 7;

/// One fetched instruction word and the program-counter advance its fetch
/// implies (instruction length after any translation).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fetched {
    /// Raw instruction word.
    pub word: u32,
    /// Program-counter offset covering the fetched encoding.
    pub pc_offset: u64,
}

/// Pluggable processor model driven by the runloop.
///
/// The runloop holds the model by composition; models are process-scoped
/// singletons for the lifetime of one simulated core and are never cloned.
pub trait ProcessorModel {
    /// Opaque decode result. Only cache re-usability matters, so the bound
    /// is `Copy`, not equality.
    type Decoded: Copy;

    /// Current program counter.
    fn pc(&self) -> u64;

    /// Sets the program counter.
    fn set_pc(&mut self, pc: u64);

    /// Retired-instruction counter.
    fn instret(&self) -> u64;

    /// Counts one retired instruction.
    fn retire(&mut self);

    /// Current logging bitmask (`LOG_*` bits).
    fn log_mask(&self) -> u32;

    /// Replaces the logging bitmask.
    fn set_log_mask(&mut self, mask: u32);

    /// Fetches the raw instruction word at `pc` through the bus/MMU.
    ///
    /// # Errors
    ///
    /// Returns the [`RecoveryCause`] for a fetch fault.
    fn fetch(&mut self, pc: u64) -> Result<Fetched, RecoveryCause>;

    /// Decodes a raw instruction word.
    fn decode(&mut self, word: u32) -> Self::Decoded;

    /// Attempts generic execution. `Ok(Some(offset))` retires the
    /// instruction and advances the program counter by `offset`;
    /// `Ok(None)` declines the instruction.
    ///
    /// # Errors
    ///
    /// Returns the [`RecoveryCause`] for any fault raised while executing.
    fn exec(&mut self, decoded: &Self::Decoded, pc_offset: u64)
        -> Result<Option<u64>, RecoveryCause>;

    /// Attempts privileged execution, tried only after [`Self::exec`]
    /// declines. Same contract as [`Self::exec`].
    ///
    /// # Errors
    ///
    /// Returns the [`RecoveryCause`] for any fault raised while executing.
    fn exec_priv(
        &mut self,
        decoded: &Self::Decoded,
        pc_offset: u64,
    ) -> Result<Option<u64>, RecoveryCause>;

    /// One-time initialization, called after fault dispatch is installed.
    fn init(&mut self) {}

    /// Delivers pending interrupts; called once per batch before any
    /// instruction executes.
    fn isr(&mut self) {}

    /// Advances the model's notion of virtual time by up to `cycles`
    /// instruction slots; called at the top of every batch.
    fn advance_time(&mut self, cycles: u64) {
        let _ = cycles;
    }

    /// Generic trap handler for guest-visible synchronous exceptions. The
    /// partially-decoded instruction context is passed when one exists.
    fn trap(&mut self, decoded: Option<&Self::Decoded>, cause: u32);

    /// Raises a synchronous exception at `pc`, yielding the cause the
    /// runloop routes through recovery. Models override this to remap
    /// causes; the default forwards the guest cause unchanged.
    fn raise(&mut self, cause: u32, pc: u64) -> RecoveryCause {
        let _ = pc;
        RecoveryCause::Trap(cause)
    }

    /// Translates a host fault into a recovery cause. The default mapping
    /// sends interrupts and debug requests to the debugger, termination to
    /// power-off, and memory faults to a guest load fault.
    fn host_fault(&mut self, fault: HostFault) -> RecoveryCause {
        match fault.kind {
            HostFaultKind::MemoryFault => RecoveryCause::Trap(CAUSE_FAULT_LOAD),
            HostFaultKind::Interrupt | HostFaultKind::DebugRequest => RecoveryCause::DebugBreak,
            HostFaultKind::Terminate => RecoveryCause::Poweroff,
        }
    }

    /// Resets the model to its power-on state.
    fn reset(&mut self) {}

    /// `false` once the model has decided to stop for good.
    fn running(&self) -> bool;

    /// `true` while a debug session drives the runloop.
    fn debugging(&self) -> bool;

    /// Enters or leaves debug mode.
    fn set_debugging(&mut self, debugging: bool);

    /// Breakpoint address; 0 disables breakpoint-triggered exits.
    fn breakpoint(&self) -> u64 {
        0
    }

    /// Dumps control/status and general registers for diagnostics.
    fn dump_registers(&self) {}

    /// Emits one instruction trace record; called when the log mask is
    /// non-zero, after a successful execution.
    fn trace(&mut self, decoded: &Self::Decoded, word: u32) {
        let _ = (decoded, word);
    }
}
