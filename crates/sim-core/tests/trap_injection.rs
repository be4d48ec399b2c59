//! Host-fault delivery through the runloop.
//!
//! These cases share the process-wide pending-fault slot and the bridge
//! installation slot, so they live in their own test binary and run as one
//! sequential scenario.

use sim_core::{
    ExitCause, Fetched, HostFaultKind, ProcessorModel, RecoveryCause, Runloop, TrapBridge,
    TrapInstallError,
};

/// Endless-nop model; every host fault goes through the default translation.
struct NopModel {
    pc: u64,
    instret: u64,
    log_mask: u32,
    debugging: bool,
    traps: Vec<u32>,
}

impl NopModel {
    const fn new() -> Self {
        Self {
            pc: 0,
            instret: 0,
            log_mask: 0,
            debugging: false,
            traps: Vec::new(),
        }
    }
}

impl ProcessorModel for NopModel {
    type Decoded = u32;

    fn pc(&self) -> u64 {
        self.pc
    }

    fn set_pc(&mut self, pc: u64) {
        self.pc = pc;
    }

    fn instret(&self) -> u64 {
        self.instret
    }

    fn retire(&mut self) {
        self.instret += 1;
    }

    fn log_mask(&self) -> u32 {
        self.log_mask
    }

    fn set_log_mask(&mut self, mask: u32) {
        self.log_mask = mask;
    }

    fn fetch(&mut self, _pc: u64) -> Result<Fetched, RecoveryCause> {
        Ok(Fetched {
            word: 1,
            pc_offset: 4,
        })
    }

    fn decode(&mut self, word: u32) -> u32 {
        word
    }

    fn exec(&mut self, _decoded: &u32, pc_offset: u64) -> Result<Option<u64>, RecoveryCause> {
        Ok(Some(pc_offset))
    }

    fn exec_priv(&mut self, _decoded: &u32, _pc_offset: u64) -> Result<Option<u64>, RecoveryCause> {
        Ok(None)
    }

    fn trap(&mut self, _decoded: Option<&u32>, cause: u32) {
        self.traps.push(cause);
        self.pc += 4;
    }

    fn running(&self) -> bool {
        true
    }

    fn debugging(&self) -> bool {
        self.debugging
    }

    fn set_debugging(&mut self, debugging: bool) {
        self.debugging = debugging;
    }
}

#[test]
fn host_faults_cut_batches_at_instruction_boundaries() {
    let mut runloop = Runloop::new(NopModel::new());

    // Termination request pending before the batch starts: nothing retires.
    TrapBridge::post(HostFaultKind::Terminate, 15, None);
    assert_eq!(runloop.step(10), ExitCause::Poweroff);
    assert_eq!(runloop.model().instret(), 0);

    // Consumed faults do not re-fire.
    assert_eq!(runloop.step(5), ExitCause::Continue);
    assert_eq!(runloop.model().instret(), 5);

    // Interrupt and debug-request both hand control to the debugger.
    TrapBridge::post(HostFaultKind::Interrupt, 2, None);
    assert_eq!(runloop.step(10), ExitCause::Cli);
    TrapBridge::post(HostFaultKind::DebugRequest, 10, None);
    assert_eq!(runloop.step(10), ExitCause::Cli);
    assert_eq!(runloop.model().instret(), 5);

    // A memory fault becomes a guest trap and the batch then resumes.
    TrapBridge::post(HostFaultKind::MemoryFault, 11, Some(0x1000));
    assert_eq!(runloop.step(10), ExitCause::Continue);
    assert_eq!(runloop.model().traps, vec![5]);
    assert_eq!(runloop.model().instret(), 15);

    // Exactly one bridge owns fault dispatch per process.
    assert!(runloop.init().is_ok());
    let mut second = Runloop::new(NopModel::new());
    assert_eq!(second.init(), Err(TrapInstallError::AlreadyInstalled));
    assert_eq!(second.step(1), ExitCause::Continue);
}
