//! Byte- and word-level access to one addressed device on a shared two-wire
//! bus.
//!
//! The driver in [`crate::protocol`] talks to the ADS1119 exclusively through
//! the [`BusTransport`] trait, so tests can substitute a mocked bus and the
//! protocol logic stays independent of the Linux I2C plumbing.

use embedded_hal::i2c::I2c;
use tracing::trace;

/// Command/data primitives against the currently selected device address.
///
/// Word reads return the bus's native byte order. For SMBus-style transports
/// the first byte on the wire lands in the low byte of the returned word; the
/// ADS1119 transmits its data register MSB first, so the protocol layer is
/// responsible for correcting the order.
pub trait BusTransport {
    type Error: core::fmt::Debug;

    /// Select which device address subsequent operations target.
    fn select_address(&mut self, address: u8) -> Result<(), Self::Error>;

    /// Send a lead command byte with no data.
    fn write_command(&mut self, command: u8) -> Result<(), Self::Error>;

    /// Send a lead command byte followed by one data byte.
    fn write_command_with_data(&mut self, command: u8, data: u8) -> Result<(), Self::Error>;

    /// Send a lead command byte and read one byte back.
    fn read_byte(&mut self, command: u8) -> Result<u8, Self::Error>;

    /// Send a lead command byte and read a 16-bit word back, native byte order.
    fn read_word(&mut self, command: u8) -> Result<u16, Self::Error>;
}

/// [`BusTransport`] over any [`embedded_hal::i2c::I2c`] bus.
///
/// Holds the bus handle together with the currently selected device address,
/// the same pairing the kernel keeps after an `I2C_SLAVE` ioctl.
pub struct I2cBus<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cBus<I2C> {
    pub fn new(i2c: I2C, address: u8) -> Self {
        I2cBus { i2c, address }
    }

    /// Destroy the `I2cBus` instance and return its I2C instance
    pub fn destroy(self) -> I2C {
        self.i2c
    }
}

impl<I2C> BusTransport for I2cBus<I2C>
where
    I2C: I2c,
{
    type Error = I2C::Error;

    fn select_address(&mut self, address: u8) -> Result<(), Self::Error> {
        trace!("select address {address:#04x}");
        self.address = address;
        Ok(())
    }

    fn write_command(&mut self, command: u8) -> Result<(), Self::Error> {
        trace!("write {command:#04x}");
        self.i2c.write(self.address, &[command])
    }

    fn write_command_with_data(&mut self, command: u8, data: u8) -> Result<(), Self::Error> {
        trace!("write {command:#04x} {data:#04x}");
        self.i2c.write(self.address, &[command, data])
    }

    fn read_byte(&mut self, command: u8) -> Result<u8, Self::Error> {
        let mut read_buffer = [0];
        self.i2c
            .write_read(self.address, &[command], &mut read_buffer)?;
        trace!(
            "read (with command {command:#04x}) value {:#04x}",
            read_buffer[0]
        );
        Ok(read_buffer[0])
    }

    fn read_word(&mut self, command: u8) -> Result<u16, Self::Error> {
        let mut read_buffer = [0u8, 0u8];
        self.i2c
            .write_read(self.address, &[command], &mut read_buffer)?;
        // SMBus word convention: first byte on the wire is the low byte
        let value = u16::from_le_bytes(read_buffer);
        trace!("read (with command {command:#04x}) value {value:#06x}");
        Ok(value)
    }
}
