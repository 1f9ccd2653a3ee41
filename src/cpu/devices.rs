//! Peripheral devices.
//!
//! The machine talks to devices only through the [`Device`] hooks. Units
//! are numbered; the standard configuration attaches:
//!
//! | Units  | Device       | Block size |
//! |--------|--------------|------------|
//! | 0..=7  | tape         | 100        |
//! | 8..=15 | disk         | 100        |
//! | 16     | card reader  | 16         |
//! | 17     | card punch   | 16         |
//! | 18     | line printer | 24         |
//! | 19     | terminal     | 14         |
//! | 20     | paper tape   | 14         |

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;
use crate::binary::Word;

/// Instruction hooks a peripheral provides.
pub trait Device: fmt::Debug {
    /// Number of words moved by one IN or OUT.
    fn block_size(&self) -> usize;

    /// Is the unit still working on a previous operation?
    fn is_busy(&self) -> bool {
        false
    }

    /// IOC: device-specific control (rewind, seek, skip to page...).
    fn control(&mut self, _operation: i64) -> Result<(), DeviceError> {
        Ok(())
    }

    /// IN: fill `block` from the device.
    fn input(&mut self, block: &mut [Word]) -> Result<(), DeviceError>;

    /// OUT: take `block` from memory.
    fn output(&mut self, block: &[Word]) -> Result<(), DeviceError>;
}

/// A device that holds one block and is never busy.
///
/// IN copies the held block into memory, OUT replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDevice {
    name: &'static str,
    block: Vec<Word>,
}

impl BufferDevice {
    pub fn new(name: &'static str, block_size: usize) -> Self {
        Self {
            name,
            block: vec![Word::ZERO; block_size],
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The block currently held.
    pub fn contents(&self) -> &[Word] {
        &self.block
    }

    /// Replace the held block, e.g. to prepare a card for IN.
    pub fn load(&mut self, words: &[Word]) -> Result<(), DeviceError> {
        check_len(self.block.len(), words.len())?;
        self.block.copy_from_slice(words);
        Ok(())
    }
}

fn check_len(expected: usize, got: usize) -> Result<(), DeviceError> {
    if expected != got {
        return Err(DeviceError::BlockSize { expected, got });
    }
    Ok(())
}

impl Device for BufferDevice {
    fn block_size(&self) -> usize {
        self.block.len()
    }

    fn input(&mut self, block: &mut [Word]) -> Result<(), DeviceError> {
        check_len(self.block.len(), block.len())?;
        block.copy_from_slice(&self.block);
        Ok(())
    }

    fn output(&mut self, block: &[Word]) -> Result<(), DeviceError> {
        self.load(block)
    }
}

/// Standard unit numbers.
pub mod unit {
    pub const TAPE0: u8 = 0;
    pub const DISK0: u8 = 8;
    pub const CARD_READER: u8 = 16;
    pub const CARD_PUNCH: u8 = 17;
    pub const LINE_PRINTER: u8 = 18;
    pub const TERMINAL: u8 = 19;
    pub const PAPER_TAPE: u8 = 20;
}

/// Devices attached to the machine, keyed by unit number.
#[derive(Debug, Default)]
pub struct Devices {
    units: BTreeMap<u8, Box<dyn Device>>,
}

impl Devices {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard configuration of units 0..=20, all buffer devices.
    pub fn standard() -> Self {
        let mut devices = Self::new();
        for i in 0..8 {
            devices.attach(unit::TAPE0 + i, BufferDevice::new("tape", 100));
            devices.attach(unit::DISK0 + i, BufferDevice::new("disk", 100));
        }
        devices.attach(unit::CARD_READER, BufferDevice::new("card reader", 16));
        devices.attach(unit::CARD_PUNCH, BufferDevice::new("card punch", 16));
        devices.attach(unit::LINE_PRINTER, BufferDevice::new("line printer", 24));
        devices.attach(unit::TERMINAL, BufferDevice::new("terminal", 14));
        devices.attach(unit::PAPER_TAPE, BufferDevice::new("paper tape", 14));
        devices
    }

    /// Attach a device, replacing whatever was on the unit.
    pub fn attach(&mut self, unit: u8, device: impl Device + 'static) -> Option<Box<dyn Device>> {
        self.units.insert(unit, Box::new(device))
    }

    /// Detach a device.
    pub fn detach(&mut self, unit: u8) -> Option<Box<dyn Device>> {
        self.units.remove(&unit)
    }

    pub fn get(&self, unit: u8) -> Result<&dyn Device, DeviceError> {
        self.units
            .get(&unit)
            .map(|d| d.as_ref())
            .ok_or(DeviceError::NoSuchDevice(unit))
    }

    pub fn get_mut(&mut self, unit: u8) -> Result<&mut (dyn Device + 'static), DeviceError> {
        self.units
            .get_mut(&unit)
            .map(|d| d.as_mut())
            .ok_or(DeviceError::NoSuchDevice(unit))
    }

    /// Attached unit numbers in ascending order.
    pub fn units(&self) -> impl Iterator<Item = u8> + '_ {
        self.units.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

/// Errors raised by device hooks.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("no device attached to unit {0}")]
    NoSuchDevice(u8),

    #[error("block size mismatch: device moves {expected} words, got {got}")]
    BlockSize { expected: usize, got: usize },
}
