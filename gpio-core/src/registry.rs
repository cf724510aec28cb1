//! Authoritative record of what has been told to the broker.
//!
//! The registry is built once from the monitored pin list and never grows or
//! shrinks. Each entry remembers the last level published for the pin and
//! whether an inbound command has switched it to output mode.
//!
//! The registry does no I/O and has no locking of its own; the caller owns it
//! exclusively and serializes every access.

use crate::error::CoreError;
use crate::pin::{Level, Pin, PinMode};
use std::collections::HashMap;

/// Per-pin record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PinState {
    /// The pin this record belongs to.
    pub pin: Pin,
    /// Last level published, `None` until the first observation.
    pub last_published: Option<Level>,
    /// Current direction.
    pub mode: PinMode,
}

impl PinState {
    fn new(pin: Pin) -> Self {
        Self {
            pin,
            last_published: None,
            mode: PinMode::Input,
        }
    }
}

/// A level to publish on the pin's outbound topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboundEvent {
    /// Pin whose level is being reported.
    pub pin: Pin,
    /// Level to report.
    pub level: Level,
}

/// Ordered set of monitored pins with keyed lookup.
#[derive(Debug, Clone, Default)]
pub struct PinRegistry {
    /// Records in configuration order.
    states: Vec<PinState>,
    /// Pin -> position in `states`.
    index: HashMap<Pin, usize>,
}

impl PinRegistry {
    /// Build a registry from the monitored pin list.
    ///
    /// Every pin starts as an input with an unknown published level.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicatePin`] if a pin appears more than once.
    pub fn new(pins: impl IntoIterator<Item = Pin>) -> Result<Self, CoreError> {
        let mut registry = Self::default();
        for pin in pins {
            if registry.index.contains_key(&pin) {
                return Err(CoreError::DuplicatePin(pin));
            }
            registry.index.insert(pin, registry.states.len());
            registry.states.push(PinState::new(pin));
        }
        Ok(registry)
    }

    /// Look up a pin's record.
    pub fn get(&self, pin: Pin) -> Option<&PinState> {
        self.index.get(&pin).map(|&i| &self.states[i])
    }

    /// Number of monitored pins.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether no pins are monitored.
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Monitored pins in configuration order.
    pub fn pins(&self) -> impl Iterator<Item = Pin> + '_ {
        self.states.iter().map(|s| s.pin)
    }

    /// Pins that have been switched to output mode, in configuration order.
    pub fn output_pins(&self) -> impl Iterator<Item = Pin> + '_ {
        self.states
            .iter()
            .filter(|s| s.mode == PinMode::Output)
            .map(|s| s.pin)
    }

    /// Record the level that was published for a pin.
    pub fn set_published(&mut self, pin: Pin, level: Level) -> Result<(), CoreError> {
        let state = self.get_mut(pin)?;
        state.last_published = Some(level);
        Ok(())
    }

    /// Switch a pin to output mode.
    ///
    /// Returns `true` only on the first call for the pin; the transition is
    /// one-way, so later calls are no-ops returning `false`.
    pub fn mark_output(&mut self, pin: Pin) -> Result<bool, CoreError> {
        let state = self.get_mut(pin)?;
        if state.mode == PinMode::Output {
            return Ok(false);
        }
        state.mode = PinMode::Output;
        Ok(true)
    }

    /// Compare a freshly read level with the last published one.
    ///
    /// If they differ (or nothing was published yet) the new level is
    /// recorded and an event is returned.
    pub fn observe(&mut self, pin: Pin, level: Level) -> Result<Option<OutboundEvent>, CoreError> {
        let state = self.get_mut(pin)?;
        if state.last_published == Some(level) {
            return Ok(None);
        }
        state.last_published = Some(level);
        Ok(Some(OutboundEvent { pin, level }))
    }

    fn get_mut(&mut self, pin: Pin) -> Result<&mut PinState, CoreError> {
        match self.index.get(&pin) {
            Some(&i) => Ok(&mut self.states[i]),
            None => Err(CoreError::UnknownPin(pin)),
        }
    }
}
