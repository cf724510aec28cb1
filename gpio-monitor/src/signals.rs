//! Process signal wiring.
//!
//! SIGHUP, SIGINT, SIGQUIT and SIGTERM all request the same orderly
//! shutdown; which one arrived only decides the exit status.

use gpio_core::Termination;
use tokio::signal::unix::{signal, Signal, SignalKind};

/// Registered shutdown signal streams.
pub struct ShutdownSignals {
    hangup: Signal,
    interrupt: Signal,
    quit: Signal,
    terminate: Signal,
}

impl ShutdownSignals {
    /// Register the handlers. Must be called inside the runtime.
    pub fn install() -> std::io::Result<Self> {
        Ok(Self {
            hangup: signal(SignalKind::hangup())?,
            interrupt: signal(SignalKind::interrupt())?,
            quit: signal(SignalKind::quit())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for the first shutdown signal.
    pub async fn recv(mut self) -> Termination {
        tokio::select! {
            _ = self.hangup.recv() => Termination::Hangup,
            _ = self.interrupt.recv() => Termination::Interrupt,
            _ = self.quit.recv() => Termination::Quit,
            _ = self.terminate.recv() => Termination::Terminate,
        }
    }
}
