//! # gpio-core
//!
//! Pure pin-state logic for mqtt-gpio-monitor (no I/O, instant tests).
//!
//! This crate holds everything in the bridge that has state or ordering
//! rules but does not touch hardware or the network:
//!
//! - [`PinRegistry`]: last published level and mode of every monitored pin
//! - [`TopicRouter`]: pin number <-> MQTT topic mapping
//! - [`LifecycleState`]: startup / shutdown state machine
//! - [`backoff`]: reconnect delay calculation
//!
//! ## Design Philosophy
//!
//! All modules in this crate are **pure** - they take input and produce output
//! without side effects. The hardware and broker I/O lives in `gpio-bridge`,
//! which drives these types and interprets the actions they return.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backoff;
pub mod error;
pub mod lifecycle;
pub mod pin;
pub mod registry;
pub mod topics;

pub use backoff::ReconnectPolicy;
pub use error::{CoreError, ParseError};
pub use lifecycle::{Action, LifecycleEvent, LifecycleState, Termination, FATAL_EXIT_CODE};
pub use pin::{Level, OutputPolarity, Pin, PinMode};
pub use registry::{OutboundEvent, PinRegistry, PinState};
pub use topics::{Inbound, InboundCommand, TopicRouter};
