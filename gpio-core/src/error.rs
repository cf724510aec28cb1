//! Error types for gpio-core.

use crate::pin::Pin;
use thiserror::Error;

/// Errors raised by the pin registry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The same pin was listed twice in the monitored set.
    #[error("pin {0} is listed more than once")]
    DuplicatePin(Pin),

    /// The pin is not part of the monitored set.
    #[error("pin {0} is not monitored")]
    UnknownPin(Pin),
}

/// Errors raised while decoding inbound topics and payloads.
///
/// These are never fatal: the offending message is logged and dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The final topic segment is not a pin number.
    #[error("no pin number in topic {topic:?}")]
    InvalidPin {
        /// The topic that failed to parse.
        topic: String,
    },

    /// The payload is not an integer level.
    #[error("invalid level payload {payload:?}")]
    InvalidLevel {
        /// The payload that failed to parse (lossy UTF-8).
        payload: String,
    },

    /// A pin list entry is not a pin number.
    #[error("invalid pin list entry {entry:?}")]
    InvalidPinList {
        /// The entry that failed to parse.
        entry: String,
    },
}
