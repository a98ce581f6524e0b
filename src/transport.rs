/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
//! Serial bus capability consumed by the driver.

use crate::hal::blocking::spi::Write;
use crate::hal::digital::v2::OutputPin;
use crate::hal::spi::{Mode, MODE_2};

/// SPI mode the AD9833 expects: clock idles high, data sampled on the falling edge.
pub const MODE: Mode = MODE_2;

/// Write-only 3-wire bus to a single chip.
///
/// The driver frames every register word as `select()`, `transmit()`, `deselect()`.
pub trait Transport {
    type Error;

    /// Assert chip-select.
    fn select(&mut self) -> Result<(), Self::Error>;
    /// Deassert chip-select.
    fn deselect(&mut self) -> Result<(), Self::Error>;
    /// Send one 16-bit register word, most significant byte first.
    fn transmit(&mut self, bytes: &[u8; 2]) -> Result<(), Self::Error>;
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Error<S, P> {
    Spi(S),
    ChipSelect(P),
}

#[cfg(feature = "defmt")]
impl<S: defmt::Format, P: defmt::Format> defmt::Format for Error<S, P> {
    fn format(&self, f: defmt::Formatter) {
        match self {
            Error::Spi(e) => defmt::write!(f, "SPI error: {}", e),
            Error::ChipSelect(e) => defmt::write!(f, "chip-select error: {}", e),
        }
    }
}

/// [`Transport`] over an `embedded-hal` SPI bus and a chip-select pin.
pub struct SpiTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
}

impl<SPI, CS, SpiE, PinE> SpiTransport<SPI, CS>
where
    SPI: Write<u8, Error = SpiE>,
    CS: OutputPin<Error = PinE>,
{
    /// Takes ownership of the bus and leaves chip-select deasserted.
    pub fn new(spi: SPI, mut cs: CS) -> Result<Self, Error<SpiE, PinE>> {
        cs.set_high().map_err(Error::ChipSelect)?;
        Ok(SpiTransport { spi, cs })
    }

    /// Gives back the SPI bus and the chip-select pin.
    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI, CS, SpiE, PinE> Transport for SpiTransport<SPI, CS>
where
    SPI: Write<u8, Error = SpiE>,
    CS: OutputPin<Error = PinE>,
{
    type Error = Error<SpiE, PinE>;

    fn select(&mut self) -> Result<(), Self::Error> {
        self.cs.set_low().map_err(Error::ChipSelect)
    }

    fn deselect(&mut self) -> Result<(), Self::Error> {
        self.cs.set_high().map_err(Error::ChipSelect)
    }

    fn transmit(&mut self, bytes: &[u8; 2]) -> Result<(), Self::Error> {
        self.spi.write(bytes).map_err(Error::Spi)
    }
}
