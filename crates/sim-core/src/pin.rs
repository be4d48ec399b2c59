//! Electrical pin model shared between simulated devices and the host harness.
//!
//! Every pin is a single node with two independent drivers (internal device
//! logic and the external host harness) and two independent pull resistors.
//! Resolution is total: any combination of drives and pulls yields a defined
//! [`Level`]. Drive conflicts are logged and resolved to [`Level::Conflict`];
//! they never escalate to a trap or process failure.

use std::collections::HashMap;

use thiserror::Error;

/// Value actively asserted onto a pin by one driver.
///
/// The wire encoding used by host harnesses is `'0'`, `'1'` and `'Z'`; any
/// other character has no [`Drive`] representation, so illegal drive values
/// are rejected at the type boundary rather than at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Drive {
    /// Actively driven low.
    Low,
    /// Actively driven high.
    High,
    /// Not driven (high impedance).
    #[default]
    Floating,
}

impl Drive {
    /// Returns the harness wire encoding for this drive value.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Low => '0',
            Self::High => '1',
            Self::Floating => 'Z',
        }
    }

    /// Parses the harness wire encoding. Returns `None` for any character
    /// outside `{'0', '1', 'Z'}`.
    #[must_use]
    pub const fn from_char(encoded: char) -> Option<Self> {
        match encoded {
            '0' => Some(Self::Low),
            '1' => Some(Self::High),
            'Z' => Some(Self::Floating),
            _ => None,
        }
    }

    /// Returns `true` when this driver is not asserting a value.
    #[must_use]
    pub const fn is_floating(self) -> bool {
        matches!(self, Self::Floating)
    }
}

/// Resolved logic value read back from a pin.
///
/// Unlike [`Drive`], a resolved level can also be [`Level::Conflict`] (wire
/// encoding `'X'`), which is a read outcome only and never drivable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Level {
    /// Resolved low.
    Low,
    /// Resolved high.
    High,
    /// No driver and no net pull bias.
    Floating,
    /// Both drivers active at once; indeterminate.
    Conflict,
}

impl Level {
    /// Returns the harness wire encoding for this level.
    #[must_use]
    pub const fn as_char(self) -> char {
        match self {
            Self::Low => '0',
            Self::High => '1',
            Self::Floating => 'Z',
            Self::Conflict => 'X',
        }
    }

    /// Returns `true` when the resolved level is a defined logic high.
    #[must_use]
    pub const fn is_high(self) -> bool {
        matches!(self, Self::High)
    }
}

impl From<Drive> for Level {
    fn from(drive: Drive) -> Self {
        match drive {
            Drive::Low => Self::Low,
            Drive::High => Self::High,
            Drive::Floating => Self::Floating,
        }
    }
}

/// One electrical node with internal/external drive and pull state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pin {
    pin_type: String,
    instance: u32,
    internal_drive: Drive,
    external_drive: Drive,
    internal_pull: i32,
    external_pull: i32,
}

impl Pin {
    fn new(pin_type: &str, instance: u32) -> Self {
        Self {
            pin_type: pin_type.to_owned(),
            instance,
            internal_drive: Drive::Floating,
            external_drive: Drive::Floating,
            internal_pull: 0,
            external_pull: 0,
        }
    }

    /// Returns the device-type half of this pin's registry key.
    #[must_use]
    pub fn pin_type(&self) -> &str {
        &self.pin_type
    }

    /// Returns the instance half of this pin's registry key.
    #[must_use]
    pub const fn instance(&self) -> u32 {
        self.instance
    }

    /// Resolves the pin to a single logic value.
    ///
    /// Both drivers active is a conflict: it is logged and reported as
    /// [`Level::Conflict`]. A single active driver wins outright over any
    /// pull bias. With both drivers floating, the sign of the summed pull
    /// strengths decides the level; a zero sum leaves the pin floating.
    #[must_use]
    pub fn resolve(&self) -> Level {
        if !self.internal_drive.is_floating() && !self.external_drive.is_floating() {
            log::warn!(
                "pin {}/{} driven both internally ({}) and externally ({})",
                self.pin_type,
                self.instance,
                self.internal_drive.as_char(),
                self.external_drive.as_char()
            );
            return Level::Conflict;
        }
        if !self.internal_drive.is_floating() {
            return self.internal_drive.into();
        }
        if !self.external_drive.is_floating() {
            return self.external_drive.into();
        }
        // Strength magnitudes only matter through the sign of the sum.
        let bias = i64::from(self.internal_pull) + i64::from(self.external_pull);
        match bias {
            0 => Level::Floating,
            b if b < 0 => Level::Low,
            _ => Level::High,
        }
    }

    /// Sets the internal (device-side) driver.
    pub fn set_internal_drive(&mut self, drive: Drive) {
        self.internal_drive = drive;
        let _ = self.resolve();
    }

    /// Sets the external (harness-side) driver.
    pub fn set_external_drive(&mut self, drive: Drive) {
        self.external_drive = drive;
        let _ = self.resolve();
    }

    /// Sets the internal pull strength (negative pulls low, positive high).
    pub fn set_internal_pull(&mut self, strength: i32) {
        self.internal_pull = strength;
        let _ = self.resolve();
    }

    /// Sets the external pull strength (negative pulls low, positive high).
    pub fn set_external_pull(&mut self, strength: i32) {
        self.external_pull = strength;
        let _ = self.resolve();
    }

    fn describe(&self) -> (char, &'static str) {
        if !self.internal_drive.is_floating() && !self.external_drive.is_floating() {
            return ('X', "conflict");
        }
        if !self.internal_drive.is_floating() {
            return (self.internal_drive.as_char(), "internal");
        }
        if !self.external_drive.is_floating() {
            return (self.external_drive.as_char(), "external");
        }
        let bias = i64::from(self.internal_pull) + i64::from(self.external_pull);
        match bias {
            0 => ('Z', "no drive"),
            b if b < 0 => ('0', "pulled down"),
            _ => ('1', "pulled up"),
        }
    }
}

/// Errors reported by [`PinRegistry`] key operations.
///
/// Lookup of an unregistered key is a configuration error in the device
/// wiring; the registry fails fast instead of auto-creating pins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PinError {
    /// No pin is registered under the requested key.
    #[error("no pin registered as {pin_type}/{instance}")]
    UnknownPin {
        /// Device-type half of the missing key.
        pin_type: String,
        /// Instance half of the missing key.
        instance: u32,
    },
    /// A pin is already registered under the requested key.
    #[error("pin {pin_type}/{instance} is already registered")]
    DuplicatePin {
        /// Device-type half of the colliding key.
        pin_type: String,
        /// Instance half of the colliding key.
        instance: u32,
    },
}

/// Exclusive owner of every [`Pin`], keyed by `(pin_type, instance)`.
///
/// Devices register their pins at construction and remove them at teardown;
/// the host harness reaches the same pins through the `ext_*` mutators.
/// Pins are stored in per-type banks so a lookup borrows the type name and
/// allocates nothing; only registration copies the key.
#[derive(Debug, Default, Clone)]
pub struct PinRegistry {
    pins: HashMap<String, HashMap<u32, Pin>>,
}

impl PinRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and inserts a pin with everything floating.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::DuplicatePin`] when the key is already taken.
    pub fn add_pin(&mut self, pin_type: &str, instance: u32) -> Result<(), PinError> {
        let bank = self.pins.entry(pin_type.to_owned()).or_default();
        if bank.contains_key(&instance) {
            return Err(PinError::DuplicatePin {
                pin_type: pin_type.to_owned(),
                instance,
            });
        }
        bank.insert(instance, Pin::new(pin_type, instance));
        Ok(())
    }

    /// Removes and frees a pin.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the key is absent.
    pub fn del_pin(&mut self, pin_type: &str, instance: u32) -> Result<(), PinError> {
        let removed = self
            .pins
            .get_mut(pin_type)
            .and_then(|bank| bank.remove(&instance));
        if removed.is_none() {
            return Err(PinError::UnknownPin {
                pin_type: pin_type.to_owned(),
                instance,
            });
        }
        if self.pins.get(pin_type).is_some_and(HashMap::is_empty) {
            self.pins.remove(pin_type);
        }
        Ok(())
    }

    /// Resolves a pin to its current logic value.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the key is absent.
    pub fn pin_get(&self, pin_type: &str, instance: u32) -> Result<Level, PinError> {
        self.pins
            .get(pin_type)
            .and_then(|bank| bank.get(&instance))
            .map(Pin::resolve)
            .ok_or_else(|| PinError::UnknownPin {
                pin_type: pin_type.to_owned(),
                instance,
            })
    }

    /// Sets the internal driver of a pin.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the key is absent.
    pub fn int_pin_set(
        &mut self,
        pin_type: &str,
        instance: u32,
        drive: Drive,
    ) -> Result<(), PinError> {
        self.pin_mut(pin_type, instance)?.set_internal_drive(drive);
        Ok(())
    }

    /// Sets the internal pull strength of a pin.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the key is absent.
    pub fn int_pin_pullup(
        &mut self,
        pin_type: &str,
        instance: u32,
        strength: i32,
    ) -> Result<(), PinError> {
        self.pin_mut(pin_type, instance)?.set_internal_pull(strength);
        Ok(())
    }

    /// Sets the external driver of a pin.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the key is absent.
    pub fn ext_pin_set(
        &mut self,
        pin_type: &str,
        instance: u32,
        drive: Drive,
    ) -> Result<(), PinError> {
        self.pin_mut(pin_type, instance)?.set_external_drive(drive);
        Ok(())
    }

    /// Sets the external pull strength of a pin.
    ///
    /// # Errors
    ///
    /// Returns [`PinError::UnknownPin`] when the key is absent.
    pub fn ext_pin_pullup(
        &mut self,
        pin_type: &str,
        instance: u32,
        strength: i32,
    ) -> Result<(), PinError> {
        self.pin_mut(pin_type, instance)?.set_external_pull(strength);
        Ok(())
    }

    /// Returns `true` when a pin is registered under the key.
    #[must_use]
    pub fn contains(&self, pin_type: &str, instance: u32) -> bool {
        self.pins
            .get(pin_type)
            .is_some_and(|bank| bank.contains_key(&instance))
    }

    /// Returns the number of registered pins.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pins.values().map(HashMap::len).sum()
    }

    /// Returns `true` when no pins are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// Logs the resolved value of every registered pin.
    pub fn print_pins(&self) {
        for bank in self.pins.values() {
            for pin in bank.values() {
                let (value, reason) = pin.describe();
                log::debug!("pin {}/{}: {value} ({reason})", pin.pin_type, pin.instance);
            }
        }
    }

    fn pin_mut(&mut self, pin_type: &str, instance: u32) -> Result<&mut Pin, PinError> {
        self.pins
            .get_mut(pin_type)
            .and_then(|bank| bank.get_mut(&instance))
            .ok_or_else(|| PinError::UnknownPin {
                pin_type: pin_type.to_owned(),
                instance,
            })
    }
}
