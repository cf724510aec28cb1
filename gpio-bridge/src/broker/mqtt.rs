//! rumqttc-backed broker session.
//!
//! `MqttSession::new()` builds the client with the last will armed; the
//! event loop only starts polling on `connect()`. The driver task turns
//! rumqttc events into [`SessionEvent`]s and retries with
//! [`ReconnectPolicy`] backoff after an unexpected drop.

use super::{BrokerError, BrokerSession, QosLevel, SessionEvent, EVENT_CHANNEL_CAPACITY};
use async_trait::async_trait;
use gpio_core::ReconnectPolicy;
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, LastWill, MqttOptions,
    Outgoing, Packet, QoS,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

/// Capacity of rumqttc's outgoing request queue.
const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// How long `disconnect()` waits for queued packets to flush.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Last will registered with the broker at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Will {
    /// Presence topic.
    pub topic: String,
    /// Payload published by the broker on ungraceful loss.
    pub payload: String,
    /// QoS of the will message.
    pub qos: QosLevel,
    /// Retain flag of the will message.
    pub retain: bool,
}

/// Connection settings for [`MqttSession`].
#[derive(Clone)]
pub struct MqttSettings {
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// MQTT client identifier.
    pub client_id: String,
    /// User name; credentials are sent only when set.
    pub username: Option<String>,
    /// Password (ignored without a user name).
    pub password: Option<String>,
    /// Clean session flag.
    pub clean_session: bool,
    /// Keep-alive interval.
    pub keep_alive: Duration,
    /// Last will.
    pub will: Will,
    /// Retry schedule after a dropped connection.
    pub reconnect: ReconnectPolicy,
}

impl std::fmt::Debug for MqttSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("clean_session", &self.clean_session)
            .field("keep_alive", &self.keep_alive)
            .field("will", &self.will)
            .field("reconnect", &self.reconnect)
            .finish()
    }
}

impl MqttSettings {
    fn options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(self.client_id.clone(), self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive);
        options.set_clean_session(self.clean_session);
        if let Some(username) = self.username.as_ref().filter(|u| !u.is_empty()) {
            options.set_credentials(
                username.clone(),
                self.password.clone().unwrap_or_default(),
            );
        }
        options.set_last_will(LastWill::new(
            self.will.topic.clone(),
            self.will.payload.clone().into_bytes(),
            to_rumqttc(self.will.qos),
            self.will.retain,
        ));
        options
    }
}

/// State shared between the session handle and its driver task.
#[derive(Debug, Default)]
struct LinkFlags {
    connected: AtomicBool,
    closing: AtomicBool,
}

/// Broker session over rumqttc.
pub struct MqttSession {
    client: AsyncClient,
    eventloop: Mutex<Option<EventLoop>>,
    driver: Mutex<Option<JoinHandle<()>>>,
    events: mpsc::Sender<SessionEvent>,
    flags: Arc<LinkFlags>,
    endpoint: String,
    reconnect: ReconnectPolicy,
}

impl std::fmt::Debug for MqttSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttSession")
            .field("endpoint", &self.endpoint)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

impl MqttSession {
    /// Build a session and the event receiver the controller consumes.
    ///
    /// Nothing touches the network until [`BrokerSession::connect`].
    pub fn new(settings: &MqttSettings) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (client, eventloop) = AsyncClient::new(settings.options(), REQUEST_CHANNEL_CAPACITY);
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let session = Self {
            client,
            eventloop: Mutex::new(Some(eventloop)),
            driver: Mutex::new(None),
            events: tx,
            flags: Arc::new(LinkFlags::default()),
            endpoint: format!("{}:{}", settings.host, settings.port),
            reconnect: settings.reconnect,
        };
        (session, rx)
    }
}

#[async_trait]
impl BrokerSession for MqttSession {
    async fn connect(&self) -> Result<(), BrokerError> {
        let eventloop = self
            .eventloop
            .lock()
            .await
            .take()
            .ok_or_else(|| BrokerError::ConnectionFailed("session already started".into()))?;

        tracing::debug!("Connecting to {}...", self.endpoint);
        let driver = tokio::spawn(drive(
            eventloop,
            self.events.clone(),
            Arc::clone(&self.flags),
            self.endpoint.clone(),
            self.reconnect,
        ));
        *self.driver.lock().await = Some(driver);
        Ok(())
    }

    async fn subscribe(&self, filter: &str, qos: QosLevel) -> Result<(), BrokerError> {
        self.client
            .subscribe(filter, to_rumqttc(qos))
            .await
            .map_err(|e| BrokerError::SubscribeFailed(e.to_string()))
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QosLevel,
        retain: bool,
    ) -> Result<(), BrokerError> {
        self.client
            .publish(topic, to_rumqttc(qos), retain, payload.to_vec())
            .await
            .map_err(|e| BrokerError::PublishFailed(e.to_string()))
    }

    fn is_connected(&self) -> bool {
        self.flags.connected.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) -> Result<(), BrokerError> {
        self.flags.closing.store(true, Ordering::SeqCst);
        tracing::info!("Disconnecting from broker...");

        let driver = self.driver.lock().await.take();
        let Some(driver) = driver else {
            return Err(BrokerError::NotConnected);
        };

        let requested = self
            .client
            .disconnect()
            .await
            .map_err(|e| BrokerError::ConnectionFailed(e.to_string()));

        match tokio::time::timeout(DISCONNECT_TIMEOUT, driver).await {
            Ok(_) => {}
            Err(_) => tracing::warn!(
                "Broker did not acknowledge disconnect within {:?}",
                DISCONNECT_TIMEOUT
            ),
        }
        self.flags.connected.store(false, Ordering::SeqCst);
        requested
    }
}

/// Poll the event loop until the session is closed or the controller goes
/// away.
async fn drive(
    mut eventloop: EventLoop,
    events: mpsc::Sender<SessionEvent>,
    flags: Arc<LinkFlags>,
    endpoint: String,
    reconnect: ReconnectPolicy,
) {
    let mut ever_connected = false;
    let mut attempt: u32 = 0;

    loop {
        let event = match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) if ack.code == ConnectReturnCode::Success => {
                tracing::info!("Connected to {}", endpoint);
                flags.connected.store(true, Ordering::SeqCst);
                ever_connected = true;
                attempt = 0;
                SessionEvent::Connected
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => SessionEvent::Message {
                topic: publish.topic.clone(),
                payload: publish.payload.to_vec(),
            },
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                tracing::info!("Clean disconnection from broker");
                flags.connected.store(false, Ordering::SeqCst);
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                if flags.closing.load(Ordering::SeqCst) {
                    tracing::debug!("Event loop stopped during shutdown: {}", e);
                    return;
                }

                let reason = describe(&e);
                let was_connected = flags.connected.swap(false, Ordering::SeqCst);
                let event = if was_connected {
                    tracing::info!("Broker connection lost: {}", reason);
                    SessionEvent::ConnectionLost { reason }
                } else {
                    tracing::info!("Connection to {} failed: {}", endpoint, reason);
                    SessionEvent::ConnectFailed { reason }
                };

                if events.send(event).await.is_err() {
                    return;
                }
                if !ever_connected {
                    // The first connection must succeed; the controller
                    // treats this as fatal.
                    return;
                }

                attempt = attempt.saturating_add(1);
                let delay = reconnect.delay(attempt);
                tracing::info!("Retrying in {:.1}s (attempt {})", delay.as_secs_f64(), attempt);
                tokio::time::sleep(delay).await;
                continue;
            }
        };

        if events.send(event).await.is_err() {
            tracing::debug!("Session event receiver dropped, stopping event loop");
            return;
        }
    }
}

/// Human-readable reason for a connection error, spelling out CONNACK
/// refusals.
fn describe(error: &ConnectionError) -> String {
    match error {
        ConnectionError::ConnectionRefused(code) => {
            format!("connection refused - {}", refusal_reason(code))
        }
        other => other.to_string(),
    }
}

fn refusal_reason(code: &ConnectReturnCode) -> &'static str {
    match code {
        ConnectReturnCode::RefusedProtocolVersion => "unacceptable protocol version",
        ConnectReturnCode::BadClientId => "identifier rejected",
        ConnectReturnCode::ServiceUnavailable => "server unavailable",
        ConnectReturnCode::BadUserNamePassword => "bad user name or password",
        ConnectReturnCode::NotAuthorized => "not authorised",
        ConnectReturnCode::Success => "accepted",
    }
}

fn to_rumqttc(qos: QosLevel) -> QoS {
    match qos {
        QosLevel::AtMostOnce => QoS::AtMostOnce,
        QosLevel::AtLeastOnce => QoS::AtLeastOnce,
        QosLevel::ExactlyOnce => QoS::ExactlyOnce,
    }
}
