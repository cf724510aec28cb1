//! Mock broker session for testing.
//!
//! Captures subscriptions and publishes, and lets tests inject inbound
//! messages and connection state changes.

use super::{BrokerError, BrokerSession, QosLevel, SessionEvent, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

/// A captured publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    /// Topic published to.
    pub topic: String,
    /// Payload as text.
    pub payload: String,
    /// QoS requested.
    pub qos: QosLevel,
    /// Retain flag.
    pub retain: bool,
}

/// Mock broker session.
///
/// `connect()` immediately reports [`SessionEvent::Connected`] unless
/// [`MockBroker::refuse_connections`] was called.
#[derive(Debug, Clone)]
pub struct MockBroker {
    inner: Arc<Mutex<MockBrokerInner>>,
    events: mpsc::Sender<SessionEvent>,
}

#[derive(Debug, Default)]
struct MockBrokerInner {
    connected: bool,
    connect_calls: usize,
    refuse: Option<String>,
    subscriptions: Vec<(String, QosLevel)>,
    published: Vec<PublishedMessage>,
    fail_next_publish: Option<String>,
    disconnected_cleanly: bool,
}

impl MockBroker {
    /// Create a mock session and the event receiver the controller consumes.
    pub fn new() -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let broker = Self {
            inner: Arc::new(Mutex::new(MockBrokerInner::default())),
            events: tx,
        };
        (broker, rx)
    }

    fn lock(&self) -> MutexGuard<'_, MockBrokerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: SessionEvent) {
        // The controller may already be gone at the end of a test.
        let _ = self.events.try_send(event);
    }

    /// Make every `connect()` report a refusal.
    pub fn refuse_connections(&self, reason: &str) {
        self.lock().refuse = Some(reason.to_string());
    }

    /// Cause the next publish to fail.
    pub fn fail_next_publish(&self, error: &str) {
        self.lock().fail_next_publish = Some(error.to_string());
    }

    /// Deliver an inbound message as if the broker forwarded it.
    pub fn deliver(&self, topic: &str, payload: &[u8]) {
        self.emit(SessionEvent::Message {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        });
    }

    /// Simulate an unexpected connection drop.
    pub fn drop_connection(&self, reason: &str) {
        self.lock().connected = false;
        self.emit(SessionEvent::ConnectionLost {
            reason: reason.to_string(),
        });
    }

    /// Simulate the transport reconnecting after a drop.
    pub fn restore_connection(&self) {
        self.lock().connected = true;
        self.emit(SessionEvent::Connected);
    }

    /// All publishes, in order.
    pub fn published(&self) -> Vec<PublishedMessage> {
        self.lock().published.clone()
    }

    /// Payloads published to one topic, in order.
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.lock()
            .published
            .iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload.clone())
            .collect()
    }

    /// All subscriptions, in order.
    pub fn subscriptions(&self) -> Vec<(String, QosLevel)> {
        self.lock().subscriptions.clone()
    }

    /// Number of `connect()` calls.
    pub fn connect_calls(&self) -> usize {
        self.lock().connect_calls
    }

    /// Whether `disconnect()` was called.
    pub fn disconnected_cleanly(&self) -> bool {
        self.lock().disconnected_cleanly
    }
}

#[async_trait]
impl BrokerSession for MockBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        let event = {
            let mut inner = self.lock();
            inner.connect_calls += 1;
            match inner.refuse.clone() {
                Some(reason) => SessionEvent::ConnectFailed { reason },
                None => {
                    inner.connected = true;
                    SessionEvent::Connected
                }
            }
        };
        self.emit(event);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        if !inner.connected {
            return Err(BrokerError::NotConnected);
        }
        inner.subscriptions.push((filter.to_string(), qos));
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        if let Some(error) = inner.fail_next_publish.take() {
            return Err(BrokerError::PublishFailed(error));
        }
        inner.published.push(PublishedMessage {
            topic: topic.to_string(),
            payload: String::from_utf8_lossy(payload).into_owned(),
            qos,
            retain,
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.lock().connected
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        let mut inner = self.lock();
        inner.connected = false;
        inner.disconnected_cleanly = true;
        Ok(())
    }
}
