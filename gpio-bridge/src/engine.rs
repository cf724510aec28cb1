//! SyncEngine - decides what the broker needs to be told.
//!
//! The engine owns the [`PinRegistry`] and the [`IoBackend`] together, so a
//! single `&mut` borrow covers both the recorded state and the hardware
//! access for a pin. Methods return the [`OutboundEvent`]s to publish, in
//! order; the caller forwards them to the broker.
//!
//! Per-pin updates are all-or-nothing: a failed read leaves the pin's record
//! untouched, and a failed output reconfiguration leaves the pin an input.

use crate::backend::{BackendError, IoBackend};
use gpio_core::{
    CoreError, InboundCommand, OutboundEvent, OutputPolarity, Pin, PinMode, PinRegistry,
};
use thiserror::Error;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Registry rejected the pin.
    #[error(transparent)]
    Registry(#[from] CoreError),

    /// Hardware call failed.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Pin-state synchronization engine.
#[derive(Debug)]
pub struct SyncEngine<B: IoBackend> {
    backend: B,
    registry: PinRegistry,
    polarity: OutputPolarity,
}

impl<B: IoBackend> SyncEngine<B> {
    /// Create an engine over a backend and the monitored pin registry.
    pub fn new(backend: B, registry: PinRegistry, polarity: OutputPolarity) -> Self {
        Self {
            backend,
            registry,
            polarity,
        }
    }

    /// The pin registry.
    pub fn registry(&self) -> &PinRegistry {
        &self.registry
    }

    /// The backend's short name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Configure every monitored pin as an input.
    ///
    /// # Errors
    ///
    /// Stops at the first failure; the caller treats it as fatal.
    pub fn initialise(&mut self) -> Result<(), BackendError> {
        let pins: Vec<Pin> = self.registry.pins().collect();
        if pins.is_empty() {
            tracing::debug!("Not monitoring any pins");
        } else {
            tracing::debug!("Monitoring pins {:?}", pins);
        }

        for pin in pins {
            tracing::debug!("Initialising {} input pin {}...", self.backend.name(), pin);
            self.backend.configure_input(pin)?;
        }
        Ok(())
    }

    /// Read every monitored pin and report the ones whose level differs from
    /// what was last published.
    ///
    /// A read failure skips that pin for this tick only.
    pub fn poll_tick(&mut self) -> Vec<OutboundEvent> {
        let pins: Vec<Pin> = self.registry.pins().collect();
        let mut events = Vec::new();

        for pin in pins {
            let level = match self.backend.read_level(pin) {
                Ok(level) => level,
                Err(e) => {
                    tracing::warn!("Skipping pin {} this tick: {}", pin, e);
                    continue;
                }
            };

            let previous = self.registry.get(pin).and_then(|s| s.last_published);
            match self.registry.observe(pin, level) {
                Ok(Some(event)) => {
                    tracing::debug!(
                        "Pin {} changed from {} to {}",
                        pin,
                        previous.map_or("unknown".to_string(), |l| l.to_string()),
                        level
                    );
                    events.push(event);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Pin {} vanished from registry: {}", pin, e),
            }
        }

        events
    }

    /// Read every monitored pin and report all of them, changed or not.
    pub fn refresh_all(&mut self) -> Vec<OutboundEvent> {
        let pins: Vec<Pin> = self.registry.pins().collect();
        let mut events = Vec::with_capacity(pins.len());

        for pin in pins {
            let level = match self.backend.read_level(pin) {
                Ok(level) => level,
                Err(e) => {
                    tracing::warn!("Cannot refresh pin {}: {}", pin, e);
                    continue;
                }
            };

            tracing::debug!("Refreshing pin {} state -> {}", pin, level);
            if let Err(e) = self.registry.set_published(pin, level) {
                tracing::warn!("Pin {} vanished from registry: {}", pin, e);
                continue;
            }
            events.push(OutboundEvent { pin, level });
        }

        events
    }

    /// Drive a pin as commanded.
    ///
    /// The first command for an input pin switches it to an output starting
    /// at the safe level. The published level is left alone; the next poll
    /// reports whatever the hardware reads back.
    ///
    /// # Errors
    ///
    /// [`CoreError::UnknownPin`] for pins outside the monitored set, or the
    /// backend error if reconfiguration or the write fails.
    pub fn apply_command(&mut self, command: InboundCommand) -> Result<(), EngineError> {
        let InboundCommand { pin, level } = command;
        let mode = self
            .registry
            .get(pin)
            .map(|s| s.mode)
            .ok_or(CoreError::UnknownPin(pin))?;

        tracing::debug!("Incoming message for pin {} -> {}", pin, level);

        if mode == PinMode::Input {
            self.backend
                .configure_output(pin, self.polarity.safe_level())?;
            self.registry.mark_output(pin)?;
            tracing::info!("Pin {} switched to output", pin);
        }

        self.backend.write_level(pin, self.polarity.physical(level))?;
        Ok(())
    }

    /// Drive every forced output to its safe level. Failures are logged and
    /// the remaining pins are still driven.
    pub fn drive_outputs_safe(&mut self) {
        let safe = self.polarity.safe_level();
        let outputs: Vec<Pin> = self.registry.output_pins().collect();
        for pin in outputs {
            match self.backend.write_level(pin, safe) {
                Ok(()) => tracing::debug!("Pin {} set to safe level {}", pin, safe),
                Err(e) => tracing::warn!("Could not reset pin {}: {}", pin, e),
            }
        }
    }

    /// Release the backend.
    pub fn release(&mut self) -> Result<(), BackendError> {
        tracing::debug!("Clean up {} backend", self.backend.name());
        self.backend.release()
    }
}
