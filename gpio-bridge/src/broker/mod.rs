//! Broker session abstraction.
//!
//! This module provides a pluggable session layer over the MQTT transport
//! (rumqttc in production, a mock for testing).
//!
//! # Design
//!
//! Outbound operations are async methods on [`BrokerSession`]:
//! - `connect()` starts the session (the last will is armed beforehand)
//! - `subscribe()` / `publish()` queue packets
//! - `disconnect()` closes the session gracefully
//!
//! Inbound traffic and connection state changes arrive as [`SessionEvent`]s
//! on the channel returned when the session is created. Reconnecting after
//! an unexpected drop is the session's job; the controller only sees
//! `ConnectionLost` followed later by `Connected`.

mod mock;
mod mqtt;

pub use mock::{MockBroker, PublishedMessage};
pub use mqtt::{MqttSession, MqttSettings, Will};

use async_trait::async_trait;
use thiserror::Error;

/// Capacity of the inbound session event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Broker session errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Connection could not be started.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Session was not started or has been closed.
    #[error("not connected")]
    NotConnected,

    /// Publish could not be queued.
    #[error("publish failed: {0}")]
    PublishFailed(String),

    /// Subscribe could not be queued.
    #[error("subscribe failed: {0}")]
    SubscribeFailed(String),
}

/// MQTT delivery guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QosLevel {
    /// QoS 0.
    #[default]
    AtMostOnce,
    /// QoS 1.
    AtLeastOnce,
    /// QoS 2.
    ExactlyOnce,
}

impl TryFrom<u8> for QosLevel {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(other),
        }
    }
}

/// Something the broker session reports to the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The broker accepted the connection (first time or after a drop).
    Connected,
    /// A connection attempt failed.
    ConnectFailed {
        /// Transport error text.
        reason: String,
    },
    /// An established connection dropped without us asking.
    ConnectionLost {
        /// Transport error text.
        reason: String,
    },
    /// A message arrived on a subscribed topic.
    Message {
        /// Topic the message was published on.
        topic: String,
        /// Raw payload.
        payload: Vec<u8>,
    },
}

/// Session trait for talking to the broker.
///
/// Implementations handle the underlying connection mechanism and its
/// reconnection policy.
#[async_trait]
pub trait BrokerSession: Send + Sync + 'static {
    /// Start the session. The outcome is reported as a [`SessionEvent`].
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), BrokerError>;

    /// Publish a message.
    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), BrokerError>;

    /// Check if currently connected.
    fn is_connected(&self) -> bool;

    /// Close the session gracefully, flushing queued publishes first.
    async fn disconnect(&self) -> Result<(), BrokerError>;
}
