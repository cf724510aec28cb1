//! Mock backend for testing.
//!
//! Allows scripting pin levels, injecting read failures and capturing
//! writes for verification. Writes are reflected back on the next read, like
//! a line whose level settles immediately.

use super::{BackendError, IoBackend};
use gpio_core::{Level, Pin};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

/// Mock backend for testing and hardware-less runs.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another.
#[derive(Debug, Default, Clone)]
pub struct MockBackend {
    inner: Arc<Mutex<MockBackendInner>>,
}

#[derive(Debug, Default)]
struct MockBackendInner {
    levels: HashMap<Pin, Level>,
    scripts: HashMap<Pin, VecDeque<Level>>,
    inputs: Vec<Pin>,
    outputs: Vec<(Pin, Level)>,
    writes: Vec<(Pin, Level)>,
    reads: usize,
    fail_next_read: HashSet<Pin>,
    fail_configure: Option<String>,
    released: bool,
}

impl MockBackend {
    /// Create a new mock backend. Unset pins read low.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockBackendInner> {
        // A panic while holding the lock only happens inside a failing test.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the level a pin reads from now on.
    pub fn set_level(&self, pin: Pin, level: Level) {
        let mut inner = self.lock();
        inner.scripts.remove(&pin);
        inner.levels.insert(pin, level);
    }

    /// Queue levels returned by successive reads; the last one sticks.
    pub fn script(&self, pin: Pin, levels: &[Level]) {
        let mut inner = self.lock();
        inner.scripts.insert(pin, levels.iter().copied().collect());
    }

    /// Cause the next read of `pin` to fail.
    pub fn fail_next_read(&self, pin: Pin) {
        self.lock().fail_next_read.insert(pin);
    }

    /// Cause every configure call to fail with the given error.
    pub fn fail_configure(&self, error: &str) {
        self.lock().fail_configure = Some(error.to_string());
    }

    /// Current level of a pin.
    pub fn level(&self, pin: Pin) -> Level {
        self.lock().levels.get(&pin).copied().unwrap_or(Level::Low)
    }

    /// Pins configured as inputs, in call order.
    pub fn configured_inputs(&self) -> Vec<Pin> {
        self.lock().inputs.clone()
    }

    /// Output configurations (pin, initial level), in call order.
    pub fn configured_outputs(&self) -> Vec<(Pin, Level)> {
        self.lock().outputs.clone()
    }

    /// All writes (pin, level), in call order.
    pub fn writes(&self) -> Vec<(Pin, Level)> {
        self.lock().writes.clone()
    }

    /// Number of successful reads.
    pub fn read_count(&self) -> usize {
        self.lock().reads
    }

    /// Whether `release()` was called.
    pub fn is_released(&self) -> bool {
        self.lock().released
    }
}

impl IoBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn configure_input(&mut self, pin: Pin) -> Result<(), BackendError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_configure.clone() {
            return Err(BackendError::Unavailable(error));
        }
        inner.inputs.push(pin);
        Ok(())
    }

    fn configure_output(&mut self, pin: Pin, initial: Level) -> Result<(), BackendError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_configure.clone() {
            return Err(BackendError::Io { pin, reason: error });
        }
        inner.outputs.push((pin, initial));
        inner.scripts.remove(&pin);
        inner.levels.insert(pin, initial);
        Ok(())
    }

    fn read_level(&mut self, pin: Pin) -> Result<Level, BackendError> {
        let mut inner = self.lock();
        if inner.released {
            return Err(BackendError::InvalidPin(pin));
        }
        if inner.fail_next_read.remove(&pin) {
            return Err(BackendError::Io {
                pin,
                reason: "injected read failure".into(),
            });
        }

        let scripted = match inner.scripts.get_mut(&pin) {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().copied(),
            None => None,
        };
        if let Some(level) = scripted {
            inner.levels.insert(pin, level);
        }

        inner.reads += 1;
        Ok(inner.levels.get(&pin).copied().unwrap_or(Level::Low))
    }

    fn write_level(&mut self, pin: Pin, level: Level) -> Result<(), BackendError> {
        let mut inner = self.lock();
        if inner.released {
            return Err(BackendError::InvalidPin(pin));
        }
        inner.writes.push((pin, level));
        inner.scripts.remove(&pin);
        inner.levels.insert(pin, level);
        Ok(())
    }

    fn release(&mut self) -> Result<(), BackendError> {
        self.lock().released = true;
        Ok(())
    }
}
