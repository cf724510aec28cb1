//! # gpio-bridge
//!
//! Pin synchronization engine bridging GPIO boards to an MQTT broker.
//!
//! Input pins are polled and every change is published to
//! `{base}/out/{pin}`; messages on `{base}/in/{pin}` switch the pin to an
//! output and drive it. A retained presence topic reports `1` while the
//! bridge is online and `0` once it is gone.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────────────────────┐
//!   signals ────► │   LifecycleController      │ ◄──── SessionEvent ─── BrokerSession
//!                 │  (single owner, one task)  │                         (rumqttc / mock)
//!                 │        SyncEngine          │ ───── OutboundEvent ──► publisher task
//!                 │  PinRegistry + IoBackend   │
//!                 └────────────────────────────┘
//!                          │
//!                 GpioBackend / PiFaceBackend / MockBackend
//! ```
//!
//! Every registry mutation and every hardware call happens on the
//! controller's task, so poll ticks, refreshes and commands never interleave.
//!
//! ## Example
//!
//! ```ignore
//! use mqtt_gpio_bridge::{LifecycleController, ControllerConfig, MockBackend, MockBroker, SyncEngine};
//!
//! let (broker, events) = MockBroker::new();
//! let engine = SyncEngine::new(MockBackend::new(), registry, OutputPolarity::ActiveLow);
//! let controller = LifecycleController::new(engine, broker, events, router, config);
//! let exit_code = controller.run(shutdown_signal()).await;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod broker;
pub mod controller;
pub mod engine;

pub use backend::{
    open_backend, BackendError, BackendOptions, GpioBackend, IoBackend, MockBackend, ModuleKind,
    PiFaceBackend, PinNumbering,
};
pub use broker::{
    BrokerError, BrokerSession, MockBroker, MqttSession, MqttSettings, PublishedMessage,
    QosLevel, SessionEvent, Will,
};
pub use controller::{ControllerConfig, LifecycleController, OFFLINE_PAYLOAD, ONLINE_PAYLOAD};
pub use engine::{EngineError, SyncEngine};
