//! I/O backend abstraction.
//!
//! This module provides the single hardware capability the engine needs,
//! with one implementation per supported board family (plus a mock):
//!
//! - `configure_input()` / `configure_output()` set a pin's direction
//! - `read_level()` / `write_level()` sample and drive a pin
//! - `release()` hands the hardware back on shutdown
//!
//! The concrete variant is chosen once at startup by [`open_backend`]; the
//! rest of the bridge only sees `dyn IoBackend`.

mod gpio;
mod mock;
mod piface;

pub use gpio::{GpioBackend, PinNumbering};
pub use mock::MockBackend;
pub use piface::{PiFaceBackend, PIFACE_PINS};

use gpio_core::{Level, Pin};
use serde::Deserialize;
use std::fmt;
use thiserror::Error;

/// Backend errors.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The hardware capability is missing or could not be opened.
    #[error("hardware unavailable: {0}")]
    Unavailable(String),

    /// A single pin operation failed.
    #[error("I/O error on pin {pin}: {reason}")]
    Io {
        /// Pin the operation targeted.
        pin: Pin,
        /// Driver error text.
        reason: String,
    },

    /// The pin does not exist on this board or was never configured.
    #[error("invalid pin {0}")]
    InvalidPin(Pin),
}

/// Capability contract the engine requires of a hardware driver.
///
/// Implementations are driven from a single task; they need no internal
/// locking.
pub trait IoBackend: Send {
    /// Short name for log lines.
    fn name(&self) -> &'static str;

    /// Configure a pin as an input.
    fn configure_input(&mut self, pin: Pin) -> Result<(), BackendError>;

    /// Reconfigure a pin as an output, starting at `initial`.
    fn configure_output(&mut self, pin: Pin, initial: Level) -> Result<(), BackendError>;

    /// Sample a pin.
    fn read_level(&mut self, pin: Pin) -> Result<Level, BackendError>;

    /// Drive an output pin.
    fn write_level(&mut self, pin: Pin, level: Level) -> Result<(), BackendError>;

    /// Release the hardware. Further calls may fail.
    fn release(&mut self) -> Result<(), BackendError>;
}

impl<B: IoBackend + ?Sized> IoBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn configure_input(&mut self, pin: Pin) -> Result<(), BackendError> {
        (**self).configure_input(pin)
    }

    fn configure_output(&mut self, pin: Pin, initial: Level) -> Result<(), BackendError> {
        (**self).configure_output(pin, initial)
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level, BackendError> {
        (**self).read_level(pin)
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<(), BackendError> {
        (**self).write_level(pin, level)
    }

    fn release(&mut self) -> Result<(), BackendError> {
        (**self).release()
    }
}

/// Supported board families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleKind {
    /// Raspberry Pi header GPIO.
    Gpio,
    /// PiFace Digital expansion board.
    #[serde(alias = "piface")]
    Pfio,
}

impl ModuleKind {
    /// Whether outputs on this board are wired active-low by default.
    ///
    /// Relay modules on the Pi header switch on a low line; the PiFace
    /// open-collector outputs switch on a set bit.
    pub fn default_active_low(self) -> bool {
        match self {
            Self::Gpio => true,
            Self::Pfio => false,
        }
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gpio => f.write_str("gpio"),
            Self::Pfio => f.write_str("pfio"),
        }
    }
}

/// Options for opening a hardware backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BackendOptions {
    /// Pin numbering used by the configuration (GPIO only).
    pub numbering: PinNumbering,
}

/// Open the hardware backend for a board family.
///
/// # Errors
///
/// Returns [`BackendError::Unavailable`] if the driver cannot reach the
/// hardware. Callers treat this as fatal.
pub fn open_backend(
    kind: ModuleKind,
    options: &BackendOptions,
) -> Result<Box<dyn IoBackend>, BackendError> {
    match kind {
        ModuleKind::Gpio => {
            let backend = GpioBackend::open(options.numbering)?;
            tracing::info!("RPi GPIO backend opened ({:?} numbering)", options.numbering);
            Ok(Box::new(backend))
        }
        ModuleKind::Pfio => {
            let backend = PiFaceBackend::open()?;
            tracing::info!("PiFace Digital backend opened");
            Ok(Box::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boxed_backend_delegates() {
        let mock = MockBackend::new();
        mock.set_level(Pin::new(3), Level::High);

        let mut boxed: Box<dyn IoBackend> = Box::new(mock.clone());
        boxed.configure_input(Pin::new(3)).unwrap();
        assert_eq!(boxed.read_level(Pin::new(3)).unwrap(), Level::High);
        assert_eq!(boxed.name(), "mock");
        assert_eq!(mock.configured_inputs(), vec![Pin::new(3)]);
    }

    #[test]
    fn active_low_defaults() {
        assert!(ModuleKind::Gpio.default_active_low());
        assert!(!ModuleKind::Pfio.default_active_low());
    }

    #[test]
    fn module_kind_display() {
        assert_eq!(ModuleKind::Gpio.to_string(), "gpio");
        assert_eq!(ModuleKind::Pfio.to_string(), "pfio");
    }
}
