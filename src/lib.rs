/*
   Copyright 2018 Ilya Epifanov

   Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
   http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
   http://opensource.org/licenses/MIT>, at your option. This file may not be
   copied, modified, or distributed except according to those terms.
*/
/*!
A platform agnostic Rust driver for the [AD9833], based on the
[`embedded-hal`] traits.

## The Device

The Analog Devices [AD9833] is a low power programmable waveform generator
producing sine, triangle and square outputs from a 28-bit direct digital
synthesis core with two frequency and two phase registers.

The device has a write-only 3-wire serial interface (SCLK, SDATA, FSYNC).

## Usage

Wrap the SPI bus and the FSYNC pin in a [`SpiTransport`] (the bus must be
configured for [`MODE`]):

```ignore
use ad9833::SpiTransport;

let transport = SpiTransport::new(spi, fsync)?;
```

Then instantiate the device with the frequency of its master clock and
initialize it:

```ignore
use ad9833::{Ad9833, Ad9833Device};

let mut dds = Ad9833Device::new(transport, 25_000_000);
dds.init()?;
```

Or, for the common breakout boards with a 25 MHz crystal:

```ignore
let mut dds = Ad9833Device::new_module(transport);
dds.init()?;
```

And program a waveform:

```ignore
use ad9833::{Channel, Mode};

dds.set_frequency(Channel::Ch1, 14_175.0)?;
dds.set_phase(Channel::Ch1, 900)?;
dds.set_active_frequency(Channel::Ch1)?;
dds.set_mode(Mode::Triangle)?;
```

Any other bus can be used by implementing [`Transport`].

[AD9833]: https://www.analog.com/media/en/technical-documentation/data-sheets/ad9833.pdf
[`embedded-hal`]: https://github.com/rust-embedded/embedded-hal
*/
#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitflags;
use embedded_hal as hal;

mod transport;

pub use crate::transport::{Error, SpiTransport, Transport, MODE};

/// Master clock of the widely available AD9833 breakout modules.
pub const DEFAULT_MCLK_HZ: u32 = 25_000_000;

const TWO_POW_28: f64 = (1u32 << 28) as f64;
const FREQ_WORD_MASK: u32 = 0x0FFF_FFFF;
const FREQ_HALF_MASK: u32 = 0x3FFF;
const PHASE_WORD_MASK: u16 = 0x0FFF;

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mode {
    Off,
    Sine,
    Triangle,
    /// Square wave with DIV2 set.
    SquareHalfClock,
    SquareFullClock,
}

#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Ch0 = 0,
    Ch1,
}

/// Tag bits selecting the target of a data write.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    Freq0 = 0x4000,
    Freq1 = 0x8000,
    Phase0 = 0xC000,
    Phase1 = 0xE000,
}

impl Register {
    pub fn tag(&self) -> u16 {
        *self as u16
    }
}

bitflags! {
    pub struct ControlBits: u16 {
        const B28 = 1 << 13;
        const HLB = 1 << 12;
        const FSELECT = 1 << 11;
        const PSELECT = 1 << 10;
        const RESET = 1 << 8;
        const SLEEP1 = 1 << 7;
        const SLEEP12 = 1 << 6;
        const OPBITEN = 1 << 5;
        const DIV2 = 1 << 3;
        const MODE = 1 << 1;
    }
}

impl Mode {
    /// Bits to set and bits to clear for this waveform. DIV2 is only ever set.
    fn control_bits(self) -> (ControlBits, ControlBits) {
        let sleep = ControlBits::SLEEP1 | ControlBits::SLEEP12;
        match self {
            Mode::Off => (sleep, ControlBits::OPBITEN | ControlBits::MODE),
            Mode::Sine => (
                ControlBits::empty(),
                ControlBits::OPBITEN | ControlBits::MODE | sleep,
            ),
            Mode::Triangle => (ControlBits::MODE, ControlBits::OPBITEN | sleep),
            Mode::SquareHalfClock => (
                ControlBits::OPBITEN | ControlBits::DIV2,
                ControlBits::MODE | sleep,
            ),
            Mode::SquareFullClock => (ControlBits::OPBITEN, ControlBits::MODE | sleep),
        }
    }

    fn apply(self, control: ControlBits) -> ControlBits {
        let (set, clear) = self.control_bits();
        (control - clear) | set
    }
}

impl Channel {
    fn ix(&self) -> usize {
        *self as usize
    }

    fn frequency_register(&self) -> Register {
        match self {
            Channel::Ch0 => Register::Freq0,
            Channel::Ch1 => Register::Freq1,
        }
    }

    fn phase_register(&self) -> Register {
        match self {
            Channel::Ch0 => Register::Phase0,
            Channel::Ch1 => Register::Phase1,
        }
    }
}

/// Frequency tuning word for `freq_hz` at master clock `mclk_hz`, rounded half-up.
///
/// Not range checked: words wider than 28 bits wrap once written.
pub fn frequency_to_word(freq_hz: f32, mclk_hz: u32) -> u32 {
    let word = (freq_hz as f64 * TWO_POW_28) / mclk_hz as f64;
    (word + 0.5) as u64 as u32
}

/// Phase word (4096 steps per turn) for a phase in tenths of a degree, rounded half-up.
pub fn phase_to_word(tenths_deg: u16) -> u16 {
    let word = 512.0 * (tenths_deg as f64 / 10.0) / 45.0;
    (word + 0.5) as u32 as u16
}

fn word_to_frequency(word: u32, mclk_hz: u32) -> f32 {
    (word as f64 * mclk_hz as f64 / TWO_POW_28) as f32
}

fn word_to_phase(word: u16) -> u16 {
    (word as f64 * 450.0 / 512.0 + 0.5) as u16
}

/// AD9833 driver
pub struct Ad9833Device<T> {
    transport: T,
    mclk_hz: u32,
    control: ControlBits,
    mode: Mode,
    frequency: [f32; 2],
    frequency_word: [u32; 2],
    phase: [u16; 2],
    phase_word: [u16; 2],
}

pub trait Ad9833 {
    type Error;

    fn init(&mut self) -> Result<(), Self::Error>;
    fn reset(&mut self, hold: bool) -> Result<(), Self::Error>;

    fn set_mode(&mut self, mode: Mode) -> Result<(), Self::Error>;
    fn set_active_frequency(&mut self, channel: Channel) -> Result<(), Self::Error>;
    fn set_active_phase(&mut self, channel: Channel) -> Result<(), Self::Error>;

    fn set_frequency(&mut self, channel: Channel, freq_hz: f32) -> Result<(), Self::Error>;
    fn set_frequency_word(&mut self, channel: Channel, word: u32) -> Result<(), Self::Error>;
    fn set_phase(&mut self, channel: Channel, tenths_deg: u16) -> Result<(), Self::Error>;
    fn set_phase_word(&mut self, channel: Channel, word: u16) -> Result<(), Self::Error>;
}

impl<T> Ad9833Device<T>
where
    T: Transport,
{
    /// Creates a new driver. Nothing is sent until [`Ad9833::init`].
    pub fn new(transport: T, mclk_hz: u32) -> Self {
        Ad9833Device {
            transport,
            mclk_hz,
            control: ControlBits::B28,
            mode: Mode::Sine,
            frequency: [0.; 2],
            frequency_word: [0; 2],
            phase: [0; 2],
            phase_word: [0; 2],
        }
    }

    pub fn new_module(transport: T) -> Self {
        Ad9833Device::new(transport, DEFAULT_MCLK_HZ)
    }

    pub fn release(self) -> T {
        self.transport
    }

    pub fn mclk_hz(&self) -> u32 {
        self.mclk_hz
    }

    /// Last control word sent to the chip.
    pub fn control(&self) -> ControlBits {
        self.control
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn active_frequency(&self) -> Channel {
        if self.control.contains(ControlBits::FSELECT) {
            Channel::Ch1
        } else {
            Channel::Ch0
        }
    }

    pub fn active_phase(&self) -> Channel {
        if self.control.contains(ControlBits::PSELECT) {
            Channel::Ch1
        } else {
            Channel::Ch0
        }
    }

    pub fn frequency(&self, channel: Channel) -> f32 {
        self.frequency[channel.ix()]
    }

    pub fn frequency_word(&self, channel: Channel) -> u32 {
        self.frequency_word[channel.ix()]
    }

    /// Phase in tenths of a degree.
    pub fn phase(&self, channel: Channel) -> u16 {
        self.phase[channel.ix()]
    }

    pub fn phase_word(&self, channel: Channel) -> u16 {
        self.phase_word[channel.ix()]
    }

    /// One framed transaction. FSYNC is released even if the transfer fails.
    fn write_register(&mut self, word: u16) -> Result<(), T::Error> {
        #[cfg(feature = "defmt")]
        defmt::trace!("ad9833 <- {=u16:#x}", word);

        self.transport.select()?;
        let sent = self.transport.transmit(&word.to_be_bytes());
        let released = self.transport.deselect();
        sent.and(released)
    }

    fn write_control(&mut self, control: ControlBits) -> Result<(), T::Error> {
        self.write_register(control.bits())?;
        self.control = control;
        Ok(())
    }

    /// B28 has to be in place before the two 14-bit halves go out.
    fn flush_frequency(&mut self, channel: Channel) -> Result<(), T::Error> {
        let word = self.frequency_word[channel.ix()];
        let tag = channel.frequency_register().tag();

        self.write_control(self.control | ControlBits::B28)?;
        self.write_register(tag | (word & FREQ_HALF_MASK) as u16)?;
        self.write_register(tag | ((word >> 14) & FREQ_HALF_MASK) as u16)
    }

    fn flush_phase(&mut self, channel: Channel) -> Result<(), T::Error> {
        let word = self.phase_word[channel.ix()];
        self.write_register(channel.phase_register().tag() | word)
    }
}

impl<T> Ad9833 for Ad9833Device<T>
where
    T: Transport,
{
    type Error = T::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        self.write_control(ControlBits::B28)?;

        self.reset(true)?;
        self.set_frequency(Channel::Ch0, 1000.0)?;
        self.set_phase(Channel::Ch0, 0)?;
        self.reset(false)?;

        self.set_mode(Mode::Sine)?;
        self.set_active_frequency(Channel::Ch0)?;
        self.set_active_phase(Channel::Ch0)
    }

    fn reset(&mut self, hold: bool) -> Result<(), Self::Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("ad9833 reset, hold={}", hold);

        let held = self.control | ControlBits::RESET;
        self.write_control(held)?;

        if !hold {
            self.write_control(held - ControlBits::RESET)?;
        }

        Ok(())
    }

    fn set_mode(&mut self, mode: Mode) -> Result<(), Self::Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("ad9833 mode {}", mode);

        self.write_control(mode.apply(self.control))?;
        self.mode = mode;
        Ok(())
    }

    fn set_active_frequency(&mut self, channel: Channel) -> Result<(), Self::Error> {
        let mut control = self.control;
        control.set(ControlBits::FSELECT, channel == Channel::Ch1);
        self.write_control(control)
    }

    fn set_active_phase(&mut self, channel: Channel) -> Result<(), Self::Error> {
        let mut control = self.control;
        control.set(ControlBits::PSELECT, channel == Channel::Ch1);
        self.write_control(control)
    }

    fn set_frequency(&mut self, channel: Channel, freq_hz: f32) -> Result<(), Self::Error> {
        #[cfg(feature = "defmt")]
        defmt::debug!("ad9833 {} frequency {} Hz", channel, freq_hz);

        let ix = channel.ix();
        self.frequency[ix] = freq_hz;
        self.frequency_word[ix] = frequency_to_word(freq_hz, self.mclk_hz) & FREQ_WORD_MASK;
        self.flush_frequency(channel)
    }

    fn set_frequency_word(&mut self, channel: Channel, word: u32) -> Result<(), Self::Error> {
        let ix = channel.ix();
        self.frequency_word[ix] = word & FREQ_WORD_MASK;
        self.frequency[ix] = word_to_frequency(self.frequency_word[ix], self.mclk_hz);
        self.flush_frequency(channel)
    }

    fn set_phase(&mut self, channel: Channel, tenths_deg: u16) -> Result<(), Self::Error> {
        let ix = channel.ix();
        self.phase[ix] = tenths_deg;
        self.phase_word[ix] = phase_to_word(tenths_deg) & PHASE_WORD_MASK;
        self.flush_phase(channel)
    }

    fn set_phase_word(&mut self, channel: Channel, word: u16) -> Result<(), Self::Error> {
        let ix = channel.ix();
        self.phase_word[ix] = word & PHASE_WORD_MASK;
        self.phase[ix] = word_to_phase(self.phase_word[ix]);
        self.flush_phase(channel)
    }
}
