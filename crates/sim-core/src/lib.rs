//! Execution core of a parameterized instruction-set simulator.
//!
//! The crate provides the instruction-dispatch runloop with its decode cache
//! and batch-stepping protocol, the bridge between host fault signals and
//! guest exception semantics, and the memory-mapped device abstraction with
//! an electrical pin model used by the GPIO controller and the
//! externally-backed register bridge. Instruction decoding, per-opcode
//! semantics and memory translation stay behind the [`ProcessorModel`]
//! capability supplied by the embedding.

/// Processor-model capability trait, guest trap causes and log mask bits.
pub mod model;
pub use model::{
    Fetched, ProcessorModel, CAUSE_FAULT_FETCH, CAUSE_FAULT_LOAD, CAUSE_FAULT_STORE,
    CAUSE_ILLEGAL_INSTRUCTION, LOG_INST, LOG_MMIO, LOG_OPERANDS, LOG_TRAP,
};

/// Direct-mapped decode cache.
pub mod cache;
pub use cache::{InstructionCache, INST_CACHE_SIZE};

/// Host fault dispatch and the recovery-cause taxonomy.
pub mod trap;
pub use trap::{HostFault, HostFaultKind, RecoveryCause, TrapBridge, TrapInstallError};

/// Batched instruction dispatch, debug-session protocol and control surface.
pub mod runloop;
pub use runloop::{
    ControlRequest, ControlResponse, DebugSession, ExitCause, Runloop, StepRequest, INST_STEP,
};

/// Electrical pin model and the keyed pin registry.
pub mod pin;
pub use pin::{Drive, Level, Pin, PinError, PinRegistry};

/// Memory-mapped device capability and bus status codes.
pub mod device;
pub use device::{BusError, BusResult, IrqController, MmioDevice, PMA_IO, PMA_READ, PMA_WRITE};

/// General-purpose I/O controller with a 32-line pin fabric.
pub mod gpio;
pub use gpio::{
    GpioDevice, GpioRegisters, GpioTriggerConfig, PowerCommand, GPIO_LINES, GPIO_TOTAL_SIZE,
};

/// Register block forwarded to host callbacks.
pub mod external;
pub use external::{ExternalRead, ExternalRegisterDevice, ExternalWrite, EXTERNAL_TOTAL_SIZE};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
