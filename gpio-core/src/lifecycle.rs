//! Bridge lifecycle state machine.
//!
//! This module provides a pure, side-effect-free state machine for the
//! bridge's startup and shutdown ordering. The state machine takes events as
//! input and produces a new state plus a list of actions to execute.
//!
//! ```text
//! Starting ──BackendReady──► Connected ──SessionUp──► Running
//!    │                          │  ▲                     │
//!    │ BackendFailed            │  └────SessionLost──────┘
//!    ▼                          │ ConnectFailed (first attempt)
//!  Failed ◄─────────────────────┘
//!
//! any live state ──Signal──► Disconnecting ──ShutdownComplete──► Stopped
//! ```
//!
//! The actual I/O (hardware, broker) is performed by the controller in
//! `gpio-bridge`, not by this module.

use std::fmt;

/// Exit status for fatal initialization failures.
pub const FATAL_EXIT_CODE: i32 = 2;

/// Termination signals that trigger an orderly shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// SIGHUP.
    Hangup,
    /// SIGINT.
    Interrupt,
    /// SIGQUIT.
    Quit,
    /// SIGTERM.
    Terminate,
}

impl Termination {
    /// Conventional signal number, used as the process exit status.
    pub fn signal_number(self) -> i32 {
        match self {
            Self::Hangup => 1,
            Self::Interrupt => 2,
            Self::Quit => 3,
            Self::Terminate => 15,
        }
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hangup => "SIGHUP",
            Self::Interrupt => "SIGINT",
            Self::Quit => "SIGQUIT",
            Self::Terminate => "SIGTERM",
        };
        f.write_str(name)
    }
}

/// Lifecycle state - NO I/O, just state transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    /// Initializing the I/O backend.
    Starting,
    /// Backend ready, broker session being (re)established.
    Connected {
        /// `true` once the session has been up at least once. Connection
        /// failures are fatal only before that.
        reconnecting: bool,
    },
    /// Polling pins and dispatching inbound messages.
    Running,
    /// Orderly shutdown in progress.
    Disconnecting {
        /// Signal that started the shutdown.
        signal: Termination,
    },
    /// Shutdown finished.
    Stopped {
        /// Process exit status.
        exit_code: i32,
    },
    /// Initialization failed.
    Failed,
}

impl LifecycleState {
    /// Create a new state machine in the Starting state.
    pub fn new() -> Self {
        Self::Starting
    }

    /// Process an event and return the new state plus actions to execute.
    ///
    /// This is a pure function - no side effects. The caller is responsible
    /// for executing the returned actions in order.
    pub fn on_event(self, event: LifecycleEvent) -> (Self, Vec<Action>) {
        match (self, event) {
            // From Starting
            (Self::Starting, LifecycleEvent::BackendReady) => {
                (Self::Connected { reconnecting: false }, vec![Action::Connect])
            }
            (Self::Starting, LifecycleEvent::BackendFailed) => {
                (Self::Failed, vec![Action::Exit(FATAL_EXIT_CODE)])
            }
            (Self::Starting, LifecycleEvent::Signal(signal)) => (
                Self::Disconnecting { signal },
                vec![Action::ReleaseBackend],
            ),

            // From Connected
            (Self::Connected { .. }, LifecycleEvent::SessionUp) => (
                Self::Running,
                vec![Action::Subscribe, Action::Announce, Action::StartPolling],
            ),
            (Self::Connected { reconnecting: false }, LifecycleEvent::ConnectFailed) => (
                Self::Failed,
                vec![Action::ReleaseBackend, Action::Exit(FATAL_EXIT_CODE)],
            ),
            (Self::Connected { reconnecting: true }, LifecycleEvent::ConnectFailed) => {
                (Self::Connected { reconnecting: true }, vec![])
            }
            (Self::Connected { .. }, LifecycleEvent::Signal(signal)) => (
                Self::Disconnecting { signal },
                shutdown_actions(),
            ),

            // From Running
            (Self::Running, LifecycleEvent::SessionLost) => (
                Self::Connected { reconnecting: true },
                vec![Action::PausePolling],
            ),
            (Self::Running, LifecycleEvent::Signal(signal)) => (
                Self::Disconnecting { signal },
                shutdown_actions(),
            ),

            // From Disconnecting
            (Self::Disconnecting { signal }, LifecycleEvent::ShutdownComplete) => {
                let exit_code = signal.signal_number();
                (Self::Stopped { exit_code }, vec![Action::Exit(exit_code)])
            }

            // Invalid transitions - stay in current state
            (state, _) => (state, vec![]),
        }
    }

    /// Whether pin polling should run in this state.
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

/// The shutdown sequence, in execution order.
fn shutdown_actions() -> Vec<Action> {
    vec![
        Action::StopPolling,
        Action::DriveOutputsSafe,
        Action::PublishOffline,
        Action::CloseSession,
        Action::ReleaseBackend,
    ]
}

/// Events that drive the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Input pins configured.
    BackendReady,
    /// Hardware capability missing or unusable.
    BackendFailed,
    /// Broker accepted the connection.
    SessionUp,
    /// Broker connection attempt failed.
    ConnectFailed,
    /// Established broker connection dropped unexpectedly.
    SessionLost,
    /// Termination signal received.
    Signal(Termination),
    /// Every shutdown action has been executed.
    ShutdownComplete,
}

/// Actions to be executed by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Open the broker session (last will already armed).
    Connect,
    /// Subscribe to the command filter and refresh topic.
    Subscribe,
    /// Publish the retained online payload on the presence topic.
    Announce,
    /// Begin (or resume) the poll loop.
    StartPolling,
    /// Suspend polling while the broker is unreachable.
    PausePolling,
    /// Stop polling for good.
    StopPolling,
    /// Drive every forced output to its safe level.
    DriveOutputsSafe,
    /// Publish the retained offline payload on the presence topic.
    PublishOffline,
    /// Close the broker session.
    CloseSession,
    /// Release the I/O backend.
    ReleaseBackend,
    /// Leave with the given process exit status.
    Exit(i32),
}
