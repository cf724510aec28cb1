//! LifecycleController - runs the bridge from startup to exit.
//!
//! The controller is the single owner of the [`SyncEngine`]. One task
//! multiplexes the poll timer, inbound session events and the shutdown
//! signal, so all registry and hardware access is serialized without locks.
//! Outbound pin events are handed to a publisher task over an in-order
//! channel and never block the loop.
//!
//! Lifecycle decisions come from the pure [`LifecycleState`] machine; this
//! module only interprets its [`Action`]s.

use crate::backend::IoBackend;
use crate::broker::{BrokerSession, QosLevel, SessionEvent};
use crate::engine::SyncEngine;
use gpio_core::{
    Action, Inbound, LifecycleEvent, LifecycleState, OutboundEvent, Termination, TopicRouter,
};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Presence payload published once connected.
pub const ONLINE_PAYLOAD: &str = "1";

/// Presence payload for the last will and the orderly shutdown.
pub const OFFLINE_PAYLOAD: &str = "0";

/// Settings the controller needs beyond the engine and session.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Retained presence (last will) topic.
    pub presence_topic: String,
    /// QoS for command subscription and pin publishes.
    pub qos: QosLevel,
    /// Retain flag for pin publishes.
    pub retain: bool,
    /// Time between poll ticks.
    pub poll_interval: Duration,
}

/// Result of executing a single action.
enum Step {
    Continue,
    Event(LifecycleEvent),
    Exit(i32),
}

/// Drives the bridge lifecycle.
pub struct LifecycleController<B: IoBackend, S: BrokerSession> {
    engine: SyncEngine<B>,
    session: Arc<S>,
    events: mpsc::Receiver<SessionEvent>,
    router: TopicRouter,
    config: ControllerConfig,
    state: LifecycleState,
    outbox: Option<mpsc::UnboundedSender<OutboundEvent>>,
    publisher: Option<JoinHandle<()>>,
}

impl<B: IoBackend, S: BrokerSession> LifecycleController<B, S> {
    /// Create a controller. Nothing runs until [`run`](Self::run).
    pub fn new(
        engine: SyncEngine<B>,
        session: S,
        events: mpsc::Receiver<SessionEvent>,
        router: TopicRouter,
        config: ControllerConfig,
    ) -> Self {
        Self {
            engine,
            session: Arc::new(session),
            events,
            router,
            config,
            state: LifecycleState::new(),
            outbox: None,
            publisher: None,
        }
    }

    /// Run until shutdown or a fatal startup error.
    ///
    /// Returns the process exit status: the signal number after an orderly
    /// shutdown, or [`gpio_core::FATAL_EXIT_CODE`] if initialization failed.
    pub async fn run<F>(mut self, shutdown: F) -> i32
    where
        F: Future<Output = Termination>,
    {
        self.start_publisher();

        let startup = match self.engine.initialise() {
            Ok(()) => LifecycleEvent::BackendReady,
            Err(e) => {
                tracing::error!("Cannot initialise {} backend: {}", self.engine.backend_name(), e);
                LifecycleEvent::BackendFailed
            }
        };
        if let Some(code) = self.dispatch(startup).await {
            return code;
        }

        tokio::pin!(shutdown);
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut session_open = true;

        loop {
            tokio::select! {
                signal = &mut shutdown => {
                    tracing::info!("Received {}, shutting down", signal);
                    if let Some(code) = self.dispatch(LifecycleEvent::Signal(signal)).await {
                        return code;
                    }
                    if let Some(code) = self.dispatch(LifecycleEvent::ShutdownComplete).await {
                        tracing::info!("Exiting on signal {}", code);
                        return code;
                    }
                }
                event = self.events.recv(), if session_open => {
                    let step = match event {
                        Some(event) => self.on_session_event(event),
                        None => {
                            tracing::error!("Broker session closed its event channel");
                            session_open = false;
                            None
                        }
                    };
                    if let Some(event) = step {
                        if let Some(code) = self.dispatch(event).await {
                            return code;
                        }
                    }
                }
                _ = ticker.tick(), if self.state.is_running() => {
                    let events = self.engine.poll_tick();
                    self.forward(events);
                }
            }
        }
    }

    /// Handle a session event; returns a lifecycle event if it affects the
    /// lifecycle.
    fn on_session_event(&mut self, event: SessionEvent) -> Option<LifecycleEvent> {
        match event {
            SessionEvent::Connected => Some(LifecycleEvent::SessionUp),
            SessionEvent::ConnectFailed { reason } => {
                tracing::warn!("Broker connection failed: {}", reason);
                Some(LifecycleEvent::ConnectFailed)
            }
            SessionEvent::ConnectionLost { reason } => {
                tracing::warn!("Broker connection lost: {}", reason);
                Some(LifecycleEvent::SessionLost)
            }
            SessionEvent::Message { topic, payload } => {
                self.on_message(&topic, &payload);
                None
            }
        }
    }

    fn on_message(&mut self, topic: &str, payload: &[u8]) {
        match self.router.classify(topic, payload) {
            Ok(Inbound::Refresh) => {
                tracing::debug!("Refreshing the state of all monitored pins...");
                let events = self.engine.refresh_all();
                self.forward(events);
            }
            Ok(Inbound::Command(command)) => {
                if let Err(e) = self.engine.apply_command(command) {
                    tracing::warn!("Ignoring command for pin {}: {}", command.pin, e);
                }
            }
            Err(e) => tracing::warn!("Dropping message on {}: {}", topic, e),
        }
    }

    /// Feed an event to the state machine and execute the resulting actions,
    /// including any follow-up events they produce.
    async fn dispatch(&mut self, event: LifecycleEvent) -> Option<i32> {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            let (state, actions) = self.state.clone().on_event(event);
            if state != self.state {
                tracing::debug!("Lifecycle {:?} -> {:?}", self.state, state);
            }
            self.state = state;

            for action in actions {
                match self.execute(action).await {
                    Step::Continue => {}
                    Step::Event(next) => pending.push_back(next),
                    Step::Exit(code) => return Some(code),
                }
            }
        }
        None
    }

    async fn execute(&mut self, action: Action) -> Step {
        match action {
            Action::Connect => {
                if let Err(e) = self.session.connect().await {
                    tracing::error!("Error connecting to broker: {}", e);
                    return Step::Event(LifecycleEvent::ConnectFailed);
                }
            }
            Action::Subscribe => {
                let filter = self.router.command_filter();
                if let Err(e) = self.session.subscribe(&filter, self.config.qos).await {
                    tracing::warn!("Cannot subscribe to {}: {}", filter, e);
                }
                if let Some(refresh) = self.router.refresh_topic() {
                    if let Err(e) = self.session.subscribe(refresh, QosLevel::AtMostOnce).await {
                        tracing::warn!("Cannot subscribe to {}: {}", refresh, e);
                    }
                }
            }
            Action::Announce => {
                publish_presence(self.session.as_ref(), &self.config.presence_topic, ONLINE_PAYLOAD)
                    .await
            }
            // Polling follows the Running state; these only mark the edges.
            Action::StartPolling => {
                tracing::debug!("Polling every {:?}", self.config.poll_interval)
            }
            Action::PausePolling => tracing::info!("Polling paused until the broker is back"),
            Action::StopPolling => tracing::debug!("Polling stopped"),
            Action::DriveOutputsSafe => self.engine.drive_outputs_safe(),
            Action::PublishOffline => {
                self.flush_publisher().await;
                publish_presence(self.session.as_ref(), &self.config.presence_topic, OFFLINE_PAYLOAD)
                    .await;
            }
            Action::CloseSession => {
                if let Err(e) = self.session.disconnect().await {
                    tracing::warn!("Broker disconnect: {}", e);
                }
            }
            Action::ReleaseBackend => {
                if let Err(e) = self.engine.release() {
                    tracing::warn!("Backend release: {}", e);
                }
            }
            Action::Exit(code) => return Step::Exit(code),
        }
        Step::Continue
    }

    fn forward(&self, events: Vec<OutboundEvent>) {
        let Some(outbox) = &self.outbox else {
            return;
        };
        for event in events {
            if outbox.send(event).is_err() {
                tracing::warn!("Publisher stopped, dropping update for pin {}", event.pin);
            }
        }
    }

    fn start_publisher(&mut self) {
        let (tx, mut rx) = mpsc::unbounded_channel::<OutboundEvent>();
        let session = Arc::clone(&self.session);
        let router = self.router.clone();
        let qos = self.config.qos;
        let retain = self.config.retain;

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let topic = router.outbound_topic(event.pin);
                if let Err(e) = session
                    .publish(&topic, event.level.as_payload().as_bytes(), qos, retain)
                    .await
                {
                    tracing::warn!("Cannot publish {} to {}: {}", event.level, topic, e);
                }
            }
        });

        self.outbox = Some(tx);
        self.publisher = Some(handle);
    }

    /// Close the outbox and wait until every queued pin update is handed to
    /// the session.
    async fn flush_publisher(&mut self) {
        self.outbox = None;
        if let Some(handle) = self.publisher.take() {
            if let Err(e) = handle.await {
                tracing::warn!("Publisher task failed: {}", e);
            }
        }
    }
}

/// Presence is always retained at QoS 0, matching the last will.
async fn publish_presence<S: BrokerSession>(session: &S, topic: &str, payload: &str) {
    if let Err(e) = session
        .publish(topic, payload.as_bytes(), QosLevel::AtMostOnce, true)
        .await
    {
        tracing::warn!("Cannot publish presence {} to {}: {}", payload, topic, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::broker::MockBroker;
    use gpio_core::{Level, OutputPolarity, Pin, PinRegistry};
    use std::time::Instant;
    use tokio::sync::oneshot;

    const PRESENCE: &str = "gpio/status";

    fn controller(
        pins: &[u8],
        refresh: Option<&str>,
    ) -> (
        LifecycleController<MockBackend, MockBroker>,
        MockBackend,
        MockBroker,
    ) {
        let backend = MockBackend::new();
        let (broker, events) = MockBroker::new();
        let registry = PinRegistry::new(pins.iter().copied().map(Pin::new)).unwrap();
        let engine = SyncEngine::new(backend.clone(), registry, OutputPolarity::ActiveLow);
        let config = ControllerConfig {
            presence_topic: PRESENCE.into(),
            qos: QosLevel::AtLeastOnce,
            retain: false,
            poll_interval: Duration::from_millis(10),
        };
        let router = TopicRouter::new("gpio", refresh);
        let controller = LifecycleController::new(engine, broker.clone(), events, router, config);
        (controller, backend, broker)
    }

    fn shutdown() -> (
        oneshot::Sender<Termination>,
        impl Future<Output = Termination>,
    ) {
        let (tx, rx) = oneshot::channel();
        (tx, async move { rx.await.unwrap_or(Termination::Terminate) })
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "condition not reached in time");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn subscribes_and_announces_on_connect() {
        let (controller, _backend, broker) = controller(&[17], Some("gpio/refresh"));
        let (stop, signal) = shutdown();

        let (code, ()) = tokio::join!(controller.run(signal), async {
            wait_until(|| broker.published_to(PRESENCE) == vec!["1"]).await;
            let _ = stop.send(Termination::Quit);
        });

        assert_eq!(code, 3);
        assert_eq!(
            broker.subscriptions(),
            vec![
                ("gpio/in/+".to_string(), QosLevel::AtLeastOnce),
                ("gpio/refresh".to_string(), QosLevel::AtMostOnce),
            ]
        );
        let presence: Vec<_> = broker
            .published()
            .into_iter()
            .filter(|m| m.topic == PRESENCE)
            .collect();
        assert!(presence
            .iter()
            .all(|m| m.retain && m.qos == QosLevel::AtMostOnce));
    }

    #[tokio::test]
    async fn pin_updates_use_configured_qos_and_retain() {
        let (controller, _backend, broker) = controller(&[17], None);
        let (stop, signal) = shutdown();

        tokio::join!(controller.run(signal), async {
            wait_until(|| !broker.published_to("gpio/out/17").is_empty()).await;
            let _ = stop.send(Termination::Terminate);
        });

        let update = broker
            .published()
            .into_iter()
            .find(|m| m.topic == "gpio/out/17")
            .unwrap();
        assert_eq!(update.payload, "0");
        assert_eq!(update.qos, QosLevel::AtLeastOnce);
        assert!(!update.retain);
    }

    #[tokio::test]
    async fn reconnect_resubscribes_without_republishing() {
        let (controller, backend, broker) = controller(&[17], None);
        let (stop, signal) = shutdown();

        tokio::join!(controller.run(signal), async {
            wait_until(|| broker.published_to("gpio/out/17").len() == 1).await;

            broker.drop_connection("keep alive timeout");
            tokio::time::sleep(Duration::from_millis(20)).await;
            backend.set_level(Pin::new(17), Level::High);
            tokio::time::sleep(Duration::from_millis(50)).await;
            // Polling is paused while the session is down.
            assert_eq!(broker.published_to("gpio/out/17"), vec!["0"]);

            broker.restore_connection();
            wait_until(|| broker.published_to("gpio/out/17").len() == 2).await;
            let _ = stop.send(Termination::Terminate);
        });

        assert_eq!(broker.published_to("gpio/out/17"), vec!["0", "1"]);
        assert_eq!(broker.subscriptions().len(), 2);
        assert_eq!(broker.published_to(PRESENCE), vec!["1", "1", "0"]);
    }

    #[tokio::test]
    async fn malformed_messages_are_dropped() {
        let (controller, backend, broker) = controller(&[18], None);
        let (stop, signal) = shutdown();

        tokio::join!(controller.run(signal), async {
            wait_until(|| broker.published_to(PRESENCE) == vec!["1"]).await;
            broker.deliver("gpio/in/abc", b"1");
            broker.deliver("gpio/in/18", b"on");
            broker.deliver("gpio/in/19", b"1");
            tokio::time::sleep(Duration::from_millis(30)).await;
            let _ = stop.send(Termination::Terminate);
        });

        assert!(backend.configured_outputs().is_empty());
        assert!(backend.writes().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_does_not_stop_the_loop() {
        let (controller, backend, broker) = controller(&[17], None);
        let (stop, signal) = shutdown();
        // The online announcement is the first publish.
        broker.fail_next_publish("queue full");

        tokio::join!(controller.run(signal), async {
            wait_until(|| broker.published_to("gpio/out/17") == vec!["0"]).await;
            backend.set_level(Pin::new(17), Level::High);
            wait_until(|| broker.published_to("gpio/out/17").len() == 2).await;
            let _ = stop.send(Termination::Terminate);
        });

        assert_eq!(broker.published_to(PRESENCE), vec!["0"]);
    }
}
