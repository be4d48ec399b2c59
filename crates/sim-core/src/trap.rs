//! Bridge between host fault signals and the runloop's recovery causes.
//!
//! Two distinguished entry points receive host notifications: one for
//! memory-access faults and one for the termination/interrupt/debug-request
//! signals. Both funnel into a single recording routine that only stores the
//! fault metadata into process-wide atomics; the runloop consumes the record
//! at the next instruction boundary and converts it through the model's
//! fault-translation hook. From the loop's perspective a host fault is a
//! synchronous, structured outcome raised between two instructions, never a
//! saved-context jump.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};

use thiserror::Error;

/// Cause carried back to the recovery point established by `step()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryCause {
    /// Hand control to the debug session; simulation state stays resumable.
    DebugBreak,
    /// Unrecoverable internal condition; registers are dumped before exit.
    Fatal,
    /// Explicit shutdown request; terminal.
    Poweroff,
    /// Guest-visible synchronous exception, forwarded to the model's trap
    /// handler with its cause number.
    Trap(u32),
}

/// Classification of a host-delivered fault signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostFaultKind {
    /// Host memory-access fault; carries the faulting address when known.
    MemoryFault,
    /// Interactive interrupt (typically Ctrl-C).
    Interrupt,
    /// Explicit debug-break request.
    DebugRequest,
    /// Termination request.
    Terminate,
}

/// One recorded host fault, consumed at an instruction boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostFault {
    /// What class of signal was delivered.
    pub kind: HostFaultKind,
    /// Raw host signal number.
    pub signal: i32,
    /// Faulting address for memory faults, when the host reported one.
    pub fault_addr: Option<u64>,
}

/// Errors from installing the process-wide fault handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TrapInstallError {
    /// Another bridge already owns fault dispatch in this process. Exactly
    /// one runloop may be the active dispatch target at a time.
    #[error("a trap bridge is already installed in this process")]
    AlreadyInstalled,
    /// The host refused the handler registration for this signal number.
    #[error("signal handler registration failed for signal {0}")]
    HandlerRegistration(i32),
}

const KIND_NONE: usize = 0;

static BRIDGE_INSTALLED: AtomicBool = AtomicBool::new(false);
static PENDING_KIND: AtomicUsize = AtomicUsize::new(KIND_NONE);
static PENDING_SIGNAL: AtomicI32 = AtomicI32::new(0);
static PENDING_ADDR: AtomicU64 = AtomicU64::new(0);
static PENDING_HAS_ADDR: AtomicBool = AtomicBool::new(false);

const fn kind_code(kind: HostFaultKind) -> usize {
    match kind {
        HostFaultKind::MemoryFault => 1,
        HostFaultKind::Interrupt => 2,
        HostFaultKind::DebugRequest => 3,
        HostFaultKind::Terminate => 4,
    }
}

const fn kind_from_code(code: usize) -> Option<HostFaultKind> {
    match code {
        1 => Some(HostFaultKind::MemoryFault),
        2 => Some(HostFaultKind::Interrupt),
        3 => Some(HostFaultKind::DebugRequest),
        4 => Some(HostFaultKind::Terminate),
        _ => None,
    }
}

/// Async-signal-safe: stores only into the pending-fault atomics.
fn record_pending(kind: HostFaultKind, signal: i32, fault_addr: Option<u64>) {
    PENDING_ADDR.store(fault_addr.unwrap_or(0), Ordering::Relaxed);
    PENDING_HAS_ADDR.store(fault_addr.is_some(), Ordering::Relaxed);
    PENDING_SIGNAL.store(signal, Ordering::Relaxed);
    PENDING_KIND.store(kind_code(kind), Ordering::Release);
}

/// Installs and owns the process-wide host fault handlers.
///
/// Only one bridge may be installed per process; the second `install()`
/// fails with [`TrapInstallError::AlreadyInstalled`]. Dropping the installed
/// bridge releases the slot (the OS handlers stay registered but keep only
/// recording into the atomics, which is harmless).
#[derive(Debug, Default)]
pub struct TrapBridge {
    installed: bool,
}

impl TrapBridge {
    /// Creates a bridge with no handlers installed yet.
    #[must_use]
    pub const fn new() -> Self {
        Self { installed: false }
    }

    /// Registers the memory-fault handler and the termination/interrupt/
    /// debug-request handlers, claiming the process-wide dispatch slot.
    ///
    /// # Errors
    ///
    /// Returns [`TrapInstallError::AlreadyInstalled`] when another bridge
    /// holds the slot, or [`TrapInstallError::HandlerRegistration`] when the
    /// host rejects a handler.
    pub fn install(&mut self) -> Result<(), TrapInstallError> {
        if BRIDGE_INSTALLED.swap(true, Ordering::SeqCst) {
            return Err(TrapInstallError::AlreadyInstalled);
        }
        if let Err(err) = host::install() {
            BRIDGE_INSTALLED.store(false, Ordering::SeqCst);
            return Err(err);
        }
        self.installed = true;
        Ok(())
    }

    /// Returns `true` when this bridge owns the dispatch slot.
    #[must_use]
    pub const fn installed(&self) -> bool {
        self.installed
    }

    /// Consumes the pending host fault, if one was recorded since the last
    /// poll. Logs the program counter and faulting address of the event.
    #[must_use]
    pub fn poll(&self, pc: u64) -> Option<HostFault> {
        let kind = kind_from_code(PENDING_KIND.swap(KIND_NONE, Ordering::Acquire))?;
        let signal = PENDING_SIGNAL.load(Ordering::Relaxed);
        let fault_addr = if PENDING_HAS_ADDR.load(Ordering::Relaxed) {
            Some(PENDING_ADDR.load(Ordering::Relaxed))
        } else {
            None
        };
        match fault_addr {
            Some(addr) => log::info!("host signal {signal} pc=0x{pc:x} fault_addr=0x{addr:x}"),
            None => log::info!("host signal {signal} pc=0x{pc:x}"),
        }
        Some(HostFault {
            kind,
            signal,
            fault_addr,
        })
    }

    /// Records a synthetic host fault, exactly as the signal handlers do.
    ///
    /// This is the delivery path for embeddings without OS signals and for
    /// test harnesses.
    pub fn post(kind: HostFaultKind, signal: i32, fault_addr: Option<u64>) {
        record_pending(kind, signal, fault_addr);
    }
}

impl Drop for TrapBridge {
    fn drop(&mut self) {
        if self.installed {
            BRIDGE_INSTALLED.store(false, Ordering::SeqCst);
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
mod host {
    use super::{record_pending, HostFaultKind, TrapInstallError};

    const HANDLED_SIGNALS: [libc::c_int; 6] = [
        libc::SIGSEGV,
        libc::SIGTERM,
        libc::SIGQUIT,
        libc::SIGINT,
        libc::SIGHUP,
        libc::SIGUSR1,
    ];

    const fn classify(signal: libc::c_int) -> Option<HostFaultKind> {
        match signal {
            libc::SIGSEGV => Some(HostFaultKind::MemoryFault),
            libc::SIGINT => Some(HostFaultKind::Interrupt),
            libc::SIGUSR1 => Some(HostFaultKind::DebugRequest),
            libc::SIGTERM | libc::SIGQUIT | libc::SIGHUP => Some(HostFaultKind::Terminate),
            _ => None,
        }
    }

    pub(super) fn install() -> Result<(), TrapInstallError> {
        unsafe {
            // Block the handled set while swapping handlers in, so a signal
            // arriving mid-registration cannot hit a half-installed state.
            let mut block: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut block);
            for signal in HANDLED_SIGNALS {
                libc::sigaddset(&mut block, signal);
            }
            if libc::pthread_sigmask(libc::SIG_BLOCK, &block, std::ptr::null_mut()) != 0 {
                return Err(TrapInstallError::HandlerRegistration(0));
            }

            // SIGPIPE is never wanted while a control transport is attached.
            let mut pipe_set: libc::sigset_t = std::mem::zeroed();
            libc::sigemptyset(&mut pipe_set);
            libc::sigaddset(&mut pipe_set, libc::SIGPIPE);
            libc::sigprocmask(libc::SIG_BLOCK, &pipe_set, std::ptr::null_mut());

            let mut action: libc::sigaction = std::mem::zeroed();
            let entry: extern "C" fn(libc::c_int, *mut libc::siginfo_t, *mut libc::c_void) =
                handle_signal;
            action.sa_sigaction = entry as usize;
            action.sa_flags = libc::SA_SIGINFO;
            libc::sigemptyset(&mut action.sa_mask);
            for signal in HANDLED_SIGNALS {
                if libc::sigaction(signal, &action, std::ptr::null_mut()) != 0 {
                    return Err(TrapInstallError::HandlerRegistration(signal));
                }
            }

            if libc::pthread_sigmask(libc::SIG_UNBLOCK, &block, std::ptr::null_mut()) != 0 {
                return Err(TrapInstallError::HandlerRegistration(0));
            }
        }
        Ok(())
    }

    // Restricted execution context: reads fault metadata, stores atomics,
    // returns. No allocation, no locks, no logging.
    extern "C" fn handle_signal(
        signal: libc::c_int,
        info: *mut libc::siginfo_t,
        _context: *mut libc::c_void,
    ) {
        if let Some(kind) = classify(signal) {
            record_pending(kind, signal, fault_address(signal, info));
        }
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn fault_address(signal: libc::c_int, info: *mut libc::siginfo_t) -> Option<u64> {
        if signal != libc::SIGSEGV || info.is_null() {
            return None;
        }
        Some(unsafe { (*info).si_addr() } as usize as u64)
    }

    #[cfg(not(any(target_os = "linux", target_os = "android")))]
    fn fault_address(_signal: libc::c_int, _info: *mut libc::siginfo_t) -> Option<u64> {
        None
    }
}

#[cfg(not(unix))]
mod host {
    use super::TrapInstallError;

    // No host signal delivery on this platform; synthetic posts still work.
    pub(super) fn install() -> Result<(), TrapInstallError> {
        Ok(())
    }
}
