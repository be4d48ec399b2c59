//! Register block whose contents live outside the simulation.
//!
//! The device owns no storage: every word access is forwarded verbatim to a
//! pair of host callbacks, which lets a co-simulation harness or a hardware
//! bridge back the register file. Only word-sized accesses are meaningful to
//! such a backend, so the narrower and wider widths report a bus error
//! instead of being quietly decomposed.

use std::fmt;

use crate::device::{BusError, BusResult, MmioDevice};

/// Register block size in bytes: 4096 words.
pub const EXTERNAL_TOTAL_SIZE: u64 = 4096 * 4;

/// Host callback servicing a word load at a device-relative offset.
pub type ExternalRead = Box<dyn FnMut(u64) -> BusResult<u32>>;

/// Host callback servicing a word store at a device-relative offset.
pub type ExternalWrite = Box<dyn FnMut(u64, u32) -> BusResult<()>>;

/// Memory-mapped register block forwarded to host callbacks.
pub struct ExternalRegisterDevice {
    base: u64,
    read: Option<ExternalRead>,
    write: Option<ExternalWrite>,
}

impl ExternalRegisterDevice {
    /// Creates the device with no callbacks attached; every access reports
    /// [`BusError::Unserviced`] until a backend is connected.
    #[must_use]
    pub const fn new(base: u64) -> Self {
        Self {
            base,
            read: None,
            write: None,
        }
    }

    /// Attaches the word-load backend.
    pub fn connect_read(&mut self, read: ExternalRead) {
        self.read = Some(read);
    }

    /// Attaches the word-store backend.
    pub fn connect_write(&mut self, write: ExternalWrite) {
        self.write = Some(write);
    }

    /// Detaches both backends.
    pub fn disconnect(&mut self) {
        self.read = None;
        self.write = None;
    }
}

impl fmt::Debug for ExternalRegisterDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalRegisterDevice")
            .field("base", &self.base)
            .field("read", &self.read.is_some())
            .field("write", &self.write.is_some())
            .finish()
    }
}

impl MmioDevice for ExternalRegisterDevice {
    fn name(&self) -> &'static str {
        "EXT"
    }

    fn base(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        EXTERNAL_TOTAL_SIZE
    }

    fn load_u8(&mut self, _offset: u64) -> BusResult<u8> {
        Err(BusError::Unserviced)
    }

    fn load_u16(&mut self, _offset: u64) -> BusResult<u16> {
        Err(BusError::Unserviced)
    }

    fn load_u32(&mut self, offset: u64) -> BusResult<u32> {
        if offset > EXTERNAL_TOTAL_SIZE - 4 {
            return Err(BusError::OutOfRange);
        }
        match self.read.as_mut() {
            Some(read) => read(offset),
            None => Err(BusError::Unserviced),
        }
    }

    fn load_u64(&mut self, _offset: u64) -> BusResult<u64> {
        Err(BusError::Unserviced)
    }

    fn store_u8(&mut self, _offset: u64, _value: u8) -> BusResult<()> {
        Err(BusError::Unserviced)
    }

    fn store_u16(&mut self, _offset: u64, _value: u16) -> BusResult<()> {
        Err(BusError::Unserviced)
    }

    fn store_u32(&mut self, offset: u64, value: u32) -> BusResult<()> {
        if offset > EXTERNAL_TOTAL_SIZE - 4 {
            return Err(BusError::OutOfRange);
        }
        match self.write.as_mut() {
            Some(write) => write(offset, value),
            None => Err(BusError::Unserviced),
        }
    }

    fn store_u64(&mut self, _offset: u64, _value: u64) -> BusResult<()> {
        Err(BusError::Unserviced)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{ExternalRegisterDevice, EXTERNAL_TOTAL_SIZE};
    use crate::device::{BusError, MmioDevice};

    #[test]
    fn word_accesses_forward_to_the_backend() {
        let backing = Rc::new(RefCell::new(vec![0u32; 4096]));
        let mut device = ExternalRegisterDevice::new(0x5000_0000);

        let store = Rc::clone(&backing);
        #[allow(clippy::cast_possible_truncation)]
        device.connect_read(Box::new(move |offset| {
            Ok(store.borrow()[(offset / 4) as usize])
        }));
        let store = Rc::clone(&backing);
        #[allow(clippy::cast_possible_truncation)]
        device.connect_write(Box::new(move |offset, value| {
            store.borrow_mut()[(offset / 4) as usize] = value;
            Ok(())
        }));

        device.store_u32(8, 0xCAFE_F00D).unwrap();
        assert_eq!(backing.borrow()[2], 0xCAFE_F00D);
        assert_eq!(device.load_u32(8).unwrap(), 0xCAFE_F00D);
    }

    #[test]
    fn unconnected_device_reports_unserviced() {
        let mut device = ExternalRegisterDevice::new(0x5000_0000);
        assert_eq!(device.load_u32(0), Err(BusError::Unserviced));
        assert_eq!(device.store_u32(0, 1), Err(BusError::Unserviced));

        device.connect_read(Box::new(|_| Ok(7)));
        assert_eq!(device.load_u32(0), Ok(7));
        device.disconnect();
        assert_eq!(device.load_u32(0), Err(BusError::Unserviced));
    }

    #[test]
    fn only_word_width_is_serviced() {
        let mut device = ExternalRegisterDevice::new(0x5000_0000);
        device.connect_read(Box::new(|_| Ok(0)));
        device.connect_write(Box::new(|_, _| Ok(())));

        assert_eq!(device.load_u8(0), Err(BusError::Unserviced));
        assert_eq!(device.load_u16(0), Err(BusError::Unserviced));
        assert_eq!(device.load_u64(0), Err(BusError::Unserviced));
        assert_eq!(device.store_u8(0, 0), Err(BusError::Unserviced));
        assert_eq!(device.store_u16(0, 0), Err(BusError::Unserviced));
        assert_eq!(device.store_u64(0, 0), Err(BusError::Unserviced));
    }

    #[test]
    fn out_of_range_words_are_bus_errors() {
        let mut device = ExternalRegisterDevice::new(0x5000_0000);
        device.connect_read(Box::new(|_| Ok(0)));
        assert_eq!(
            device.load_u32(EXTERNAL_TOTAL_SIZE),
            Err(BusError::OutOfRange)
        );
        assert_eq!(
            device.load_u32(EXTERNAL_TOTAL_SIZE - 2),
            Err(BusError::OutOfRange)
        );
        assert_eq!(device.size(), EXTERNAL_TOTAL_SIZE);

        // Offsets near the top of the address space must not wrap past the
        // range check into the backend.
        assert_eq!(device.load_u32(u64::MAX - 1), Err(BusError::OutOfRange));
        assert_eq!(device.store_u32(u64::MAX - 3, 0), Err(BusError::OutOfRange));
    }
}
