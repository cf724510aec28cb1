//! Raspberry Pi header GPIO backend (via `rppal`).

use super::{BackendError, IoBackend};
use gpio_core::{Level, Pin};
use rppal::gpio::{Gpio, IoPin, Mode};
use serde::Deserialize;
use std::collections::HashMap;

/// How configured pin numbers map onto the SoC's GPIO lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PinNumbering {
    /// Physical position on the 40-pin header.
    #[default]
    Board,
    /// Broadcom GPIO line number.
    Bcm,
}

/// Header position -> BCM line for the 40-pin header. Power and ground
/// positions have no line.
const BOARD_TO_BCM: [Option<u8>; 41] = [
    None,     // 0 (unused)
    None,     // 1  3V3
    None,     // 2  5V
    Some(2),  // 3
    None,     // 4  5V
    Some(3),  // 5
    None,     // 6  GND
    Some(4),  // 7
    Some(14), // 8
    None,     // 9  GND
    Some(15), // 10
    Some(17), // 11
    Some(18), // 12
    Some(27), // 13
    None,     // 14 GND
    Some(22), // 15
    Some(23), // 16
    None,     // 17 3V3
    Some(24), // 18
    Some(10), // 19
    None,     // 20 GND
    Some(9),  // 21
    Some(25), // 22
    Some(11), // 23
    Some(8),  // 24
    None,     // 25 GND
    Some(7),  // 26
    Some(0),  // 27
    Some(1),  // 28
    Some(5),  // 29
    None,     // 30 GND
    Some(6),  // 31
    Some(12), // 32
    Some(13), // 33
    None,     // 34 GND
    Some(19), // 35
    Some(16), // 36
    Some(26), // 37
    Some(20), // 38
    None,     // 39 GND
    Some(21), // 40
];

impl PinNumbering {
    /// BCM line for a configured pin number, if it has one.
    pub fn to_bcm(self, pin: Pin) -> Option<u8> {
        match self {
            Self::Bcm => Some(pin.number()),
            Self::Board => BOARD_TO_BCM.get(pin.number() as usize).copied().flatten(),
        }
    }
}

/// Header GPIO backend.
///
/// Every configured pin is held as an `IoPin` so it can switch from input
/// to output in place. Dropping the pins (on `release()`) restores their
/// original modes.
pub struct GpioBackend {
    gpio: Gpio,
    numbering: PinNumbering,
    lines: HashMap<Pin, IoPin>,
}

impl std::fmt::Debug for GpioBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioBackend")
            .field("numbering", &self.numbering)
            .field("lines", &self.lines.len())
            .finish_non_exhaustive()
    }
}

impl GpioBackend {
    /// Open the SoC GPIO peripheral.
    pub fn open(numbering: PinNumbering) -> Result<Self, BackendError> {
        let gpio = Gpio::new().map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Ok(Self {
            gpio,
            numbering,
            lines: HashMap::new(),
        })
    }

    fn acquire(&mut self, pin: Pin) -> Result<&mut IoPin, BackendError> {
        if !self.lines.contains_key(&pin) {
            let bcm = self
                .numbering
                .to_bcm(pin)
                .ok_or(BackendError::InvalidPin(pin))?;
            let line = self
                .gpio
                .get(bcm)
                .map_err(|e| BackendError::Io {
                    pin,
                    reason: e.to_string(),
                })?
                .into_io(Mode::Input);
            tracing::debug!("Initialising GPIO pin {} (BCM {})", pin, bcm);
            self.lines.insert(pin, line);
        }
        self.lines.get_mut(&pin).ok_or(BackendError::InvalidPin(pin))
    }

    fn line(&mut self, pin: Pin) -> Result<&mut IoPin, BackendError> {
        self.lines.get_mut(&pin).ok_or(BackendError::InvalidPin(pin))
    }
}

impl IoBackend for GpioBackend {
    fn name(&self) -> &'static str {
        "gpio"
    }

    fn configure_input(&mut self, pin: Pin) -> Result<(), BackendError> {
        let line = self.acquire(pin)?;
        line.set_mode(Mode::Input);
        Ok(())
    }

    fn configure_output(&mut self, pin: Pin, initial: Level) -> Result<(), BackendError> {
        let line = self.acquire(pin)?;
        // Latch the level first so the line never glitches to the wrong state.
        line.write(to_rppal(initial));
        line.set_mode(Mode::Output);
        Ok(())
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level, BackendError> {
        let line = self.line(pin)?;
        Ok(from_rppal(line.read()))
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<(), BackendError> {
        let line = self.line(pin)?;
        line.write(to_rppal(level));
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        tracing::debug!("Releasing {} GPIO lines", self.lines.len());
        self.lines.clear();
        Ok(())
    }
}

fn to_rppal(level: Level) -> rppal::gpio::Level {
    match level {
        Level::Low => rppal::gpio::Level::Low,
        Level::High => rppal::gpio::Level::High,
    }
}

fn from_rppal(level: rppal::gpio::Level) -> Level {
    match level {
        rppal::gpio::Level::Low => Level::Low,
        rppal::gpio::Level::High => Level::High,
    }
}
