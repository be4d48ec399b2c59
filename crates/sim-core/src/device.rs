//! Memory-mapped device capability for the simulated bus.

use std::fmt;

use thiserror::Error;

/// Physical-memory attribute: device/IO segment.
pub const PMA_IO: u32 = 1 << 0;
/// Physical-memory attribute: segment is readable.
pub const PMA_READ: u32 = 1 << 1;
/// Physical-memory attribute: segment is writable.
pub const PMA_WRITE: u32 = 1 << 2;

/// Status returned by a device for an access it cannot or will not service.
///
/// A bus error is reported to the model's bus dispatch as a status code, not
/// as a process-level failure; whether it escalates into a guest trap is the
/// model's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum BusError {
    /// The offset falls outside the device's address range.
    #[error("access outside the device address range")]
    OutOfRange,
    /// No handler is installed for this access width or offset.
    #[error("no handler services this access")]
    Unserviced,
    /// The device itself is wired incorrectly (for example a missing pin).
    #[error("device configuration error")]
    Config,
}

/// Result alias for device bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// A device occupying a fixed, non-overlapping byte range on the simulated
/// bus.
///
/// The bus invokes the sized accessors with a device-relative offset, and
/// only from within the single active `step()` call stack; devices carry no
/// internal synchronization. The default accessor bodies service every read
/// as zero-fill and every write as a no-op, which is the minimum contract
/// for out-of-range offsets; devices override what they actually decode and
/// may report [`BusError`] instead.
pub trait MmioDevice {
    /// Short device name used in logs.
    fn name(&self) -> &'static str;

    /// First bus address of the segment.
    fn base(&self) -> u64;

    /// Segment length in bytes.
    fn size(&self) -> u64;

    /// Physical-memory attribute flags for the segment.
    fn flags(&self) -> u32 {
        PMA_IO | PMA_READ | PMA_WRITE
    }

    /// Loads one byte at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn load_u8(&mut self, offset: u64) -> BusResult<u8> {
        let _ = offset;
        Ok(0)
    }

    /// Loads a half-word at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn load_u16(&mut self, offset: u64) -> BusResult<u16> {
        let _ = offset;
        Ok(0)
    }

    /// Loads a word at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn load_u32(&mut self, offset: u64) -> BusResult<u32> {
        let _ = offset;
        Ok(0)
    }

    /// Loads a double-word at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn load_u64(&mut self, offset: u64) -> BusResult<u64> {
        let _ = offset;
        Ok(0)
    }

    /// Stores one byte at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn store_u8(&mut self, offset: u64, value: u8) -> BusResult<()> {
        let _ = (offset, value);
        Ok(())
    }

    /// Stores a half-word at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn store_u16(&mut self, offset: u64, value: u16) -> BusResult<()> {
        let _ = (offset, value);
        Ok(())
    }

    /// Stores a word at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn store_u32(&mut self, offset: u64, value: u32) -> BusResult<()> {
        let _ = (offset, value);
        Ok(())
    }

    /// Stores a double-word at a device-relative offset.
    ///
    /// # Errors
    ///
    /// Returns [`BusError`] when the device refuses to service the access.
    fn store_u64(&mut self, offset: u64, value: u64) -> BusResult<()> {
        let _ = (offset, value);
        Ok(())
    }
}

/// External interrupt controller a device can assert lines on.
pub trait IrqController: fmt::Debug {
    /// Asserts (`true`) or deasserts (`false`) one named interrupt line.
    fn set_irq(&mut self, irq: u32, level: bool);
}
