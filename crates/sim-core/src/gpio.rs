//! General-purpose I/O controller with a 32-line pin fabric.
//!
//! The register block is a little-endian image of 37 words: interrupt
//! enable, interrupt pending, input, output, direction, then one signed pull
//! strength per line. Every store re-synchronizes the pin fabric, so a
//! harness reading the input register always observes the levels implied by
//! the latest output/direction/pull state and any external drives.

use std::cell::RefCell;
use std::rc::Rc;

use crate::device::{BusError, BusResult, IrqController, MmioDevice};
use crate::pin::{Drive, PinError, PinRegistry};

/// Number of GPIO lines per controller.
pub const GPIO_LINES: u32 = 32;

/// Register image size in bytes: 5 control words plus 32 pull words.
pub const GPIO_TOTAL_SIZE: u64 = 37 * 4;

const WORD_IE: u64 = 0;
const WORD_IP: u64 = 1;
const WORD_IN: u64 = 2;
const WORD_OUT: u64 = 3;
const WORD_DIR: u64 = 4;
const WORD_PULL_BASE: u64 = 5;

/// Plain register state of one GPIO controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GpioRegisters {
    /// Per-line interrupt enable mask.
    pub ie: u32,
    /// Per-line interrupt pending mask.
    pub ip: u32,
    /// Sampled input levels, one bit per line.
    pub input: u32,
    /// Output drive values, one bit per line.
    pub output: u32,
    /// Direction mask; a set bit makes the line an output.
    pub dir: u32,
    /// Signed pull strength per line (negative pulls low).
    pub pull: [i32; 32],
}

impl GpioRegisters {
    fn word(&self, index: u64) -> u32 {
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        match index {
            WORD_IE => self.ie,
            WORD_IP => self.ip,
            WORD_IN => self.input,
            WORD_OUT => self.output,
            WORD_DIR => self.dir,
            _ => self.pull[(index - WORD_PULL_BASE) as usize] as u32,
        }
    }

    fn set_word(&mut self, index: u64, value: u32) {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        match index {
            WORD_IE => self.ie = value,
            WORD_IP => self.ip = value,
            WORD_IN => self.input = value,
            WORD_OUT => self.output = value,
            WORD_DIR => self.dir = value,
            _ => self.pull[(index - WORD_PULL_BASE) as usize] = value as i32,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    fn byte(&self, offset: u64) -> u8 {
        let shift = (offset % 4) * 8;
        (self.word(offset / 4) >> shift) as u8
    }

    fn set_byte(&mut self, offset: u64, value: u8) {
        #[allow(clippy::cast_possible_truncation)]
        let shift = ((offset % 4) * 8) as u32;
        let word = self.word(offset / 4) & !(0xFF << shift);
        self.set_word(offset / 4, word | (u32::from(value) << shift));
    }
}

/// Latched power-state request raised by a configured trigger line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum PowerCommand {
    /// Line 0 requested a power-off.
    PowerOff,
    /// Line 1 requested a reset.
    Reset,
}

/// Opt-in wiring of output lines 0/1 to power-state requests. Both triggers
/// are off by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct GpioTriggerConfig {
    /// Latch [`PowerCommand::PowerOff`] when output line 0 goes high.
    pub power_off: bool,
    /// Latch [`PowerCommand::Reset`] when output line 1 goes high.
    pub reset: bool,
}

/// Memory-mapped GPIO controller bound to a shared pin registry and an
/// interrupt controller.
#[derive(Debug)]
pub struct GpioDevice {
    base: u64,
    irq: u32,
    base_instance: u32,
    registers: GpioRegisters,
    trigger: GpioTriggerConfig,
    power_command: Option<PowerCommand>,
    pins: Rc<RefCell<PinRegistry>>,
    irq_controller: Rc<RefCell<dyn IrqController>>,
}

impl GpioDevice {
    /// Creates the controller and registers its 32 `"GPIO"` pins starting at
    /// `base_instance` in the shared registry.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::DuplicatePin`] when another device already owns
    /// one of the pin keys.
    pub fn new(
        base: u64,
        irq: u32,
        base_instance: u32,
        pins: Rc<RefCell<PinRegistry>>,
        irq_controller: Rc<RefCell<dyn IrqController>>,
    ) -> Result<Self, PinError> {
        {
            let mut registry = pins.borrow_mut();
            for line in 0..GPIO_LINES {
                registry.add_pin("GPIO", base_instance + line)?;
            }
        }
        Ok(Self {
            base,
            irq,
            base_instance,
            registers: GpioRegisters::default(),
            trigger: GpioTriggerConfig::default(),
            power_command: None,
            pins,
            irq_controller,
        })
    }

    /// Enables the power-off/reset trigger lines.
    pub fn set_trigger(&mut self, trigger: GpioTriggerConfig) {
        self.trigger = trigger;
    }

    /// Current register state.
    #[must_use]
    pub const fn registers(&self) -> &GpioRegisters {
        &self.registers
    }

    /// Takes the latched power-state request, if a trigger fired since the
    /// last call.
    pub fn take_power_command(&mut self) -> Option<PowerCommand> {
        self.power_command.take()
    }

    /// Removes this controller's pins from the shared registry.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when a pin was already removed.
    pub fn detach(&mut self) -> Result<(), PinError> {
        let mut registry = self.pins.borrow_mut();
        for line in 0..GPIO_LINES {
            registry.del_pin("GPIO", self.base_instance + line)?;
        }
        Ok(())
    }

    /// Pushes output/direction/pull state into the pin fabric and samples
    /// the resolved level of every line back into the input register.
    ///
    /// Output lines drive their output bit, input lines float; a line whose
    /// resolved level is high sets its input bit.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the fabric lost one of this
    /// controller's pins.
    pub fn sync_pins(&mut self) -> Result<(), PinError> {
        let mut registry = self.pins.borrow_mut();
        for line in 0..GPIO_LINES {
            let instance = self.base_instance + line;
            registry.int_pin_pullup("GPIO", instance, self.registers.pull[line as usize])?;
            let drive = if self.registers.dir & (1 << line) == 0 {
                Drive::Floating
            } else if self.registers.output & (1 << line) == 0 {
                Drive::Low
            } else {
                Drive::High
            };
            registry.int_pin_set("GPIO", instance, drive)?;
            if registry.pin_get("GPIO", instance)?.is_high() {
                self.registers.input |= 1 << line;
            } else {
                self.registers.input &= !(1 << line);
            }
        }
        Ok(())
    }

    /// Drives the interrupt line from the enabled-and-pending mask.
    pub fn service(&mut self) {
        let level = self.registers.ie & self.registers.ip != 0;
        self.irq_controller.borrow_mut().set_irq(self.irq, level);
    }

    /// Logs the full register image.
    pub fn print_registers(&self) {
        log::debug!(
            "gpio@0x{:x} ie=0x{:08x} ip=0x{:08x} in=0x{:08x} out=0x{:08x} dir=0x{:08x}",
            self.base,
            self.registers.ie,
            self.registers.ip,
            self.registers.input,
            self.registers.output,
            self.registers.dir
        );
    }

    fn after_store(&mut self) -> BusResult<()> {
        self.sync_pins().map_err(|err| {
            log::warn!("gpio@0x{:x}: {err}", self.base);
            BusError::Config
        })?;
        self.service();
        self.latch_trigger();
        Ok(())
    }

    fn latch_trigger(&mut self) {
        if self.trigger.power_off && self.registers.output & 1 != 0 {
            self.power_command = Some(PowerCommand::PowerOff);
        } else if self.trigger.reset && self.registers.output & 2 != 0 {
            self.power_command = Some(PowerCommand::Reset);
        }
    }
}

impl MmioDevice for GpioDevice {
    fn name(&self) -> &'static str {
        "GPIO"
    }

    fn base(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        GPIO_TOTAL_SIZE
    }

    fn load_u8(&mut self, offset: u64) -> BusResult<u8> {
        if offset >= GPIO_TOTAL_SIZE {
            return Ok(0);
        }
        Ok(self.registers.byte(offset))
    }

    fn load_u16(&mut self, offset: u64) -> BusResult<u16> {
        if offset > GPIO_TOTAL_SIZE - 2 {
            return Ok(0);
        }
        Ok(u16::from_le_bytes([
            self.registers.byte(offset),
            self.registers.byte(offset + 1),
        ]))
    }

    fn load_u32(&mut self, offset: u64) -> BusResult<u32> {
        if offset > GPIO_TOTAL_SIZE - 4 {
            return Ok(0);
        }
        if offset % 4 == 0 {
            return Ok(self.registers.word(offset / 4));
        }
        Ok(u32::from_le_bytes([
            self.registers.byte(offset),
            self.registers.byte(offset + 1),
            self.registers.byte(offset + 2),
            self.registers.byte(offset + 3),
        ]))
    }

    fn load_u64(&mut self, offset: u64) -> BusResult<u64> {
        if offset > GPIO_TOTAL_SIZE - 8 {
            return Ok(0);
        }
        let low = self.load_u32(offset)?;
        let high = self.load_u32(offset + 4)?;
        Ok(u64::from(low) | (u64::from(high) << 32))
    }

    fn store_u8(&mut self, offset: u64, value: u8) -> BusResult<()> {
        if offset >= GPIO_TOTAL_SIZE {
            return Ok(());
        }
        self.registers.set_byte(offset, value);
        self.after_store()
    }

    fn store_u16(&mut self, offset: u64, value: u16) -> BusResult<()> {
        if offset > GPIO_TOTAL_SIZE - 2 {
            return Ok(());
        }
        for (index, byte) in value.to_le_bytes().into_iter().enumerate() {
            self.registers.set_byte(offset + index as u64, byte);
        }
        self.after_store()
    }

    fn store_u32(&mut self, offset: u64, value: u32) -> BusResult<()> {
        if offset > GPIO_TOTAL_SIZE - 4 {
            return Ok(());
        }
        if offset % 4 == 0 {
            self.registers.set_word(offset / 4, value);
        } else {
            for (index, byte) in value.to_le_bytes().into_iter().enumerate() {
                self.registers.set_byte(offset + index as u64, byte);
            }
        }
        self.after_store()
    }

    fn store_u64(&mut self, offset: u64, value: u64) -> BusResult<()> {
        if offset > GPIO_TOTAL_SIZE - 8 {
            return Ok(());
        }
        #[allow(clippy::cast_possible_truncation)]
        {
            self.store_u32(offset, value as u32)?;
            self.store_u32(offset + 4, (value >> 32) as u32)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use rstest::rstest;

    use super::{GpioDevice, GpioTriggerConfig, PowerCommand, GPIO_TOTAL_SIZE, WORD_OUT};
    use crate::device::{IrqController, MmioDevice};
    use crate::pin::{Drive, Level, PinRegistry};

    #[derive(Debug, Default)]
    struct RecordingIrq {
        last: Option<(u32, bool)>,
    }

    impl IrqController for RecordingIrq {
        fn set_irq(&mut self, irq: u32, level: bool) {
            self.last = Some((irq, level));
        }
    }

    fn fixture() -> (
        GpioDevice,
        Rc<RefCell<PinRegistry>>,
        Rc<RefCell<RecordingIrq>>,
    ) {
        let pins = Rc::new(RefCell::new(PinRegistry::new()));
        let irq = Rc::new(RefCell::new(RecordingIrq::default()));
        let device = GpioDevice::new(0x4000_0000, 5, 0, Rc::clone(&pins), irq.clone()).unwrap();
        (device, pins, irq)
    }

    #[test]
    fn construction_registers_all_lines_and_detach_removes_them() {
        let (mut device, pins, _irq) = fixture();
        assert_eq!(pins.borrow().len(), 32);
        assert!(pins.borrow().contains("GPIO", 31));
        device.detach().unwrap();
        assert!(pins.borrow().is_empty());
    }

    #[test]
    fn duplicate_pin_keys_reject_a_second_controller() {
        let (device, pins, irq) = fixture();
        assert!(GpioDevice::new(0x4000_1000, 6, 0, pins, irq).is_err());
        drop(device);
    }

    #[test]
    fn output_lines_drive_pins_and_sample_back_into_input() {
        let (mut device, pins, _irq) = fixture();
        device.store_u32(WORD_OUT * 4, 1).unwrap();
        device.store_u32(16, 0xFFFF_FFFF).unwrap();

        assert_eq!(pins.borrow().pin_get("GPIO", 0).unwrap(), Level::High);
        assert_eq!(pins.borrow().pin_get("GPIO", 1).unwrap(), Level::Low);
        assert_eq!(device.load_u32(8).unwrap(), 1);
    }

    #[test]
    fn input_lines_float_and_follow_external_drives() {
        let (mut device, pins, _irq) = fixture();
        pins.borrow_mut().ext_pin_set("GPIO", 3, Drive::High).unwrap();
        device.store_u32(16, 0).unwrap();

        assert_eq!(device.load_u32(8).unwrap(), 1 << 3);
        assert_eq!(pins.borrow().pin_get("GPIO", 0).unwrap(), Level::Floating);
    }

    #[test]
    fn pull_strength_registers_bias_undriven_lines() {
        let (mut device, _pins, _irq) = fixture();
        // Pull line 2 high, leave it an input.
        device.store_u32(20 + 2 * 4, 7).unwrap();
        assert_eq!(device.load_u32(8).unwrap() & (1 << 2), 1 << 2);

        device.store_u32(20 + 2 * 4, (-7i32) as u32).unwrap();
        assert_eq!(device.load_u32(8).unwrap() & (1 << 2), 0);
    }

    #[test]
    fn irq_line_follows_enabled_and_pending() {
        let (mut device, _pins, irq) = fixture();
        device.store_u32(0, 0x10).unwrap();
        assert_eq!(irq.borrow().last, Some((5, false)));

        device.store_u32(4, 0x10).unwrap();
        assert_eq!(irq.borrow().last, Some((5, true)));

        device.store_u32(4, 0).unwrap();
        assert_eq!(irq.borrow().last, Some((5, false)));
    }

    #[test]
    fn triggers_stay_dormant_unless_configured() {
        let (mut device, _pins, _irq) = fixture();
        device.store_u32(16, 3).unwrap();
        device.store_u32(12, 3).unwrap();
        assert_eq!(device.take_power_command(), None);

        device.set_trigger(GpioTriggerConfig {
            power_off: true,
            reset: true,
        });
        device.store_u32(12, 1).unwrap();
        assert_eq!(device.take_power_command(), Some(PowerCommand::PowerOff));
        assert_eq!(device.take_power_command(), None);

        device.store_u32(12, 2).unwrap();
        assert_eq!(device.take_power_command(), Some(PowerCommand::Reset));
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(2)]
    fn narrow_and_wide_accesses_see_the_same_image(#[case] byte: u64) {
        let (mut device, _pins, _irq) = fixture();
        device.store_u32(12, 0x00C0_FFEE).unwrap();

        let word = device.load_u32(12).unwrap();
        let half = device.load_u16(12 + byte).unwrap();
        let expected = u16::try_from((word >> (byte * 8)) & 0xFFFF).unwrap();
        assert_eq!(half, expected);

        device.store_u8(13, 0xAA).unwrap();
        assert_eq!(device.load_u32(12).unwrap(), 0x00C0_AAEE);
    }

    #[test]
    fn double_word_access_spans_two_registers() {
        let (mut device, _pins, _irq) = fixture();
        device.store_u64(0, 0x0000_0002_0000_0001).unwrap();
        assert_eq!(device.load_u32(0).unwrap(), 1);
        assert_eq!(device.load_u32(4).unwrap(), 2);
        assert_eq!(device.load_u64(0).unwrap(), 0x0000_0002_0000_0001);
    }

    #[test]
    fn out_of_range_accesses_zero_fill_and_swallow() {
        let (mut device, _pins, _irq) = fixture();
        assert_eq!(device.load_u32(GPIO_TOTAL_SIZE).unwrap(), 0);
        assert_eq!(device.load_u64(GPIO_TOTAL_SIZE - 4).unwrap(), 0);
        assert!(device.store_u32(GPIO_TOTAL_SIZE, 0xFFFF_FFFF).is_ok());
        assert_eq!(device.size(), GPIO_TOTAL_SIZE);

        // Offsets near the top of the address space must not wrap past the
        // range check into the register image.
        assert_eq!(device.load_u32(u64::MAX).unwrap(), 0);
        assert_eq!(device.load_u64(u64::MAX - 2).unwrap(), 0);
        assert!(device.store_u16(u64::MAX - 1, 0xFFFF).is_ok());
        assert!(device.store_u64(u64::MAX - 7, u64::MAX).is_ok());
        assert_eq!(device.registers().output, 0);
    }
}
