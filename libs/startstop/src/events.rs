//! Diagnostic events emitted by a running session.

use std::net::SocketAddr;

use tokio::sync::mpsc;

/// Sender half of a session's diagnostic sink.
pub type EventSink = mpsc::UnboundedSender<SessionEvent>;

/// Lifecycle events, in the order the controller processed them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The source address is bound and accepting.
    Listening { addr: SocketAddr },
    /// A client connected.
    ConnectionOpened { peer: SocketAddr, live: usize },
    /// A relay finished.
    ConnectionClosed { live: usize },
    /// The idle countdown started.
    TimerArmed,
    /// The idle countdown was cancelled by a new connection or process exit.
    TimerDisarmed,
    /// The managed process is being launched.
    ProcessStarting,
    /// The idle countdown elapsed and the process was asked to stop.
    ProcessStopping,
    /// The managed process exited; `requested` is set if it followed a stop.
    ProcessExited { requested: bool },
}
