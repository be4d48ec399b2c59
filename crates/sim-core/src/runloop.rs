//! Batched fetch/decode/execute dispatch around a [`ProcessorModel`].
//!
//! The loop runs instructions in batches and re-evaluates the outside world
//! only at batch and instruction boundaries: host faults are polled from the
//! trap bridge between instructions, interrupts are delivered once per batch,
//! and a debug session is consulted whenever a batch ends with control handed
//! back to the operator.

use crate::cache::InstructionCache;
use crate::model::{
    ProcessorModel, CAUSE_ILLEGAL_INSTRUCTION, LOG_INST, LOG_OPERANDS, LOG_TRAP,
};
use crate::trap::{RecoveryCause, TrapBridge, TrapInstallError};

/// Default number of instructions per batch when free-running.
pub const INST_STEP: u64 = 100_000;

/// Why a `step()` batch handed control back to its caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExitCause {
    /// The batch retired its full instruction count. Internal to the
    /// run/step protocol; `run()` never leaves the loop on it.
    Continue,
    /// Control goes to the debug session (breakpoint, debug break, or a
    /// completed single-step batch while debugging).
    Cli,
    /// The simulation is over; terminal.
    Poweroff,
}

/// How the debug session wants execution to proceed after a break.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StepRequest {
    /// Leave debug mode and free-run with the saved log mask.
    Resume,
    /// Stay in debug mode and run exactly this many instructions, with
    /// instruction/operand/trap tracing forced on.
    Steps(u64),
}

/// Interactive debugger hook consulted by [`Runloop::run`] on every
/// [`ExitCause::Cli`]. The session may inspect and mutate the model before
/// answering.
pub trait DebugSession<P: ProcessorModel> {
    /// Called with control handed to the debugger; returns how to continue.
    fn request(&mut self, model: &mut P) -> StepRequest;
}

/// Transport-free remote-control request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ControlRequest {
    /// Liveness probe.
    Ping,
    /// Run one instruction.
    Step,
    /// Run exactly this many instructions.
    StepN(u64),
    /// Run until the simulation exits.
    Finish,
}

/// Transport-free remote-control response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ControlResponse {
    /// Liveness answer to [`ControlRequest::Ping`].
    Pong,
    /// The requested batch completed and the simulation can keep going.
    Continue,
    /// The simulation reached a terminal or operator-visible stop.
    Finished,
}

/// Instruction-dispatch loop composing a model, its decode cache and the
/// host trap bridge.
#[derive(Debug)]
pub struct Runloop<P: ProcessorModel> {
    model: P,
    cache: InstructionCache<P::Decoded>,
    bridge: TrapBridge,
}

impl<P: ProcessorModel> Runloop<P> {
    /// Wraps a model with an empty decode cache and an uninstalled bridge.
    pub fn new(model: P) -> Self {
        Self {
            model,
            cache: InstructionCache::new(),
            bridge: TrapBridge::new(),
        }
    }

    /// Installs host fault dispatch, then initializes the model.
    ///
    /// # Errors
    ///
    /// Returns [`TrapInstallError`] when the process-wide dispatch slot is
    /// taken or handler registration fails.
    pub fn init(&mut self) -> Result<(), TrapInstallError> {
        self.bridge.install()?;
        self.model.init();
        Ok(())
    }

    /// Shared access to the model.
    pub const fn model(&self) -> &P {
        &self.model
    }

    /// Exclusive access to the model.
    pub fn model_mut(&mut self) -> &mut P {
        &mut self.model
    }

    /// Drops every cached decode; the next batch re-decodes everything.
    pub fn flush_cache(&mut self) {
        self.cache.flush();
    }

    /// Drives the run/debug protocol until power-off.
    ///
    /// `Cli` exits enter debug mode and ask `session` for the next batch:
    /// [`StepRequest::Resume`] restores the free-run batch size and the log
    /// mask saved at entry, [`StepRequest::Steps`] forces instruction
    /// tracing on for the requested count. While debugging, a batch that
    /// completes normally is handed straight back to the session.
    pub fn run<S: DebugSession<P>>(&mut self, initial: ExitCause, session: &mut S) {
        let saved_log_mask = self.model.log_mask();
        let mut count = INST_STEP;
        let mut cause = initial;
        loop {
            match cause {
                ExitCause::Continue => {}
                ExitCause::Cli => {
                    self.model.set_debugging(true);
                    match session.request(&mut self.model) {
                        StepRequest::Resume => {
                            self.model.set_debugging(false);
                            self.model.set_log_mask(saved_log_mask);
                            count = INST_STEP;
                        }
                        StepRequest::Steps(steps) => {
                            let mask = self.model.log_mask() | LOG_INST | LOG_OPERANDS | LOG_TRAP;
                            self.model.set_log_mask(mask);
                            count = steps;
                        }
                    }
                }
                ExitCause::Poweroff => return,
            }
            cause = self.step(count);
            if self.model.debugging() && cause == ExitCause::Continue {
                cause = ExitCause::Cli;
            }
        }
    }

    /// Runs up to `count` instructions and reports why the batch ended.
    ///
    /// The batch retires exactly `count` instructions unless a breakpoint,
    /// debug break or power-off cuts it short; [`ExitCause::Continue`] is
    /// only returned for a full batch. The breakpoint address is compared
    /// against the program counter after each retirement, so stepping away
    /// from a hit breakpoint retires instructions. Guest traps are delivered
    /// to the model in place and stepping resumes within the same call while
    /// the model keeps running.
    pub fn step(&mut self, count: u64) -> ExitCause {
        let target = self.model.instret().saturating_add(count);
        self.model.advance_time(count);
        self.model.isr();

        while self.model.instret() < target {
            if let Some(fault) = self.bridge.poll(self.model.pc()) {
                let cause = self.model.host_fault(fault);
                match self.recover(None, cause) {
                    Some(exit) => return exit,
                    None => continue,
                }
            }

            let pc = self.model.pc();
            let fetched = match self.model.fetch(pc) {
                Ok(fetched) => fetched,
                Err(cause) => match self.recover(None, cause) {
                    Some(exit) => return exit,
                    None => continue,
                },
            };

            let decoded = match self.cache.lookup(fetched.word) {
                Some(decoded) => decoded,
                None => {
                    let decoded = self.model.decode(fetched.word);
                    self.cache.insert(fetched.word, decoded);
                    decoded
                }
            };

            let executed = match self.model.exec(&decoded, fetched.pc_offset) {
                Ok(Some(offset)) => Some(offset),
                Ok(None) => match self.model.exec_priv(&decoded, fetched.pc_offset) {
                    Ok(outcome) => outcome,
                    Err(cause) => match self.recover(Some(&decoded), cause) {
                        Some(exit) => return exit,
                        None => continue,
                    },
                },
                Err(cause) => match self.recover(Some(&decoded), cause) {
                    Some(exit) => return exit,
                    None => continue,
                },
            };

            match executed {
                Some(offset) => {
                    if self.model.log_mask() != 0 {
                        self.model.trace(&decoded, fetched.word);
                    }
                    self.model.set_pc(pc.wrapping_add(offset));
                    self.model.retire();
                    // Compared after the advance, so a batch starting at the
                    // breakpoint address still makes forward progress.
                    let breakpoint = self.model.breakpoint();
                    if breakpoint != 0 && self.model.pc() == breakpoint {
                        return ExitCause::Cli;
                    }
                }
                None => {
                    // Both execution paths declined; pc does not advance.
                    let cause = self.model.raise(CAUSE_ILLEGAL_INSTRUCTION, pc);
                    if let Some(exit) = self.recover(Some(&decoded), cause) {
                        return exit;
                    }
                }
            }
        }
        ExitCause::Continue
    }

    /// Services one remote-control request.
    ///
    /// `Finish` keeps stepping full batches until the simulation stops; the
    /// other step forms report whether their single batch finished the
    /// simulation.
    pub fn handle_control(&mut self, request: ControlRequest) -> ControlResponse {
        match request {
            ControlRequest::Ping => ControlResponse::Pong,
            ControlRequest::Step => Self::batch_outcome(self.step(1)),
            ControlRequest::StepN(count) => Self::batch_outcome(self.step(count)),
            ControlRequest::Finish => loop {
                if self.step(INST_STEP) != ExitCause::Continue {
                    return ControlResponse::Finished;
                }
            },
        }
    }

    const fn batch_outcome(cause: ExitCause) -> ControlResponse {
        match cause {
            ExitCause::Continue => ControlResponse::Continue,
            ExitCause::Cli | ExitCause::Poweroff => ControlResponse::Finished,
        }
    }

    /// Classifies a recovery cause at the batch's recovery point. `Some` is
    /// an exit from `step()`; `None` resumes stepping after an in-place
    /// guest trap.
    fn recover(&mut self, decoded: Option<&P::Decoded>, cause: RecoveryCause) -> Option<ExitCause> {
        match cause {
            RecoveryCause::DebugBreak => Some(ExitCause::Cli),
            RecoveryCause::Fatal => {
                self.model.dump_registers();
                Some(ExitCause::Poweroff)
            }
            RecoveryCause::Poweroff => Some(ExitCause::Poweroff),
            RecoveryCause::Trap(guest_cause) => {
                self.model.trap(decoded, guest_cause);
                if self.model.running() {
                    None
                } else {
                    Some(ExitCause::Poweroff)
                }
            }
        }
    }
}
