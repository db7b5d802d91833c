//! Session configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::addr::NetAddr;
use crate::backoff::BackoffPolicy;
use crate::error::ConfigError;
use crate::events::EventSink;
use crate::process::ManagedProcess;
use crate::relay::DEFAULT_CONNECT_TIMEOUT;

/// Default time with no connections before the process is stopped.
pub const DEFAULT_IDLE_DURATION: Duration = Duration::from_secs(5 * 60);

/// Default time the managed process gets to exit once a session ends.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Immutable configuration for one start/stop session.
#[derive(Clone)]
pub struct SessionConfig {
    /// Address clients connect to.
    pub source: NetAddr,
    /// Address of the managed server.
    pub target: NetAddr,
    /// Idle time before the process is stopped.
    pub idle_duration: Duration,
    /// Start/stop capability for the managed server.
    pub process: Arc<dyn ManagedProcess>,
    /// Optional diagnostic sink.
    pub events: Option<EventSink>,
    /// Backoff between dial attempts while the server boots.
    pub dial_backoff: BackoffPolicy,
    /// Timeout for a single dial attempt.
    pub connect_timeout: Duration,
    /// How long teardown waits for the managed process to exit.
    pub shutdown_grace: Duration,
}

impl SessionConfig {
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("source", &self.source)
            .field("target", &self.target)
            .field("idle_duration", &self.idle_duration)
            .field("events", &self.events.is_some())
            .field("dial_backoff", &self.dial_backoff)
            .field("connect_timeout", &self.connect_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish_non_exhaustive()
    }
}

/// Builder for [`SessionConfig`].
///
/// Source, target and process are required; everything else has a default.
#[derive(Default)]
pub struct SessionConfigBuilder {
    source: Option<NetAddr>,
    target: Option<NetAddr>,
    idle_duration: Option<Duration>,
    process: Option<Arc<dyn ManagedProcess>>,
    events: Option<EventSink>,
    dial_backoff: Option<BackoffPolicy>,
    connect_timeout: Option<Duration>,
    shutdown_grace: Option<Duration>,
}

impl SessionConfigBuilder {
    pub fn source(mut self, addr: NetAddr) -> Self {
        self.source = Some(addr);
        self
    }

    pub fn target(mut self, addr: NetAddr) -> Self {
        self.target = Some(addr);
        self
    }

    pub fn idle_duration(mut self, idle: Duration) -> Self {
        self.idle_duration = Some(idle);
        self
    }

    pub fn process<P: ManagedProcess>(mut self, process: P) -> Self {
        self.process = Some(Arc::new(process));
        self
    }

    pub fn shared_process(mut self, process: Arc<dyn ManagedProcess>) -> Self {
        self.process = Some(process);
        self
    }

    pub fn events(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    pub fn dial_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.dial_backoff = Some(backoff);
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = Some(grace);
        self
    }

    /// Validate and build the configuration.
    pub fn build(self) -> Result<SessionConfig, ConfigError> {
        Ok(SessionConfig {
            source: self.source.ok_or(ConfigError::MissingOption("source address"))?,
            target: self.target.ok_or(ConfigError::MissingOption("target address"))?,
            process: self
                .process
                .ok_or(ConfigError::MissingOption("managed process (start/stop)"))?,
            idle_duration: self.idle_duration.unwrap_or(DEFAULT_IDLE_DURATION),
            events: self.events,
            dial_backoff: self.dial_backoff.unwrap_or_default(),
            connect_timeout: self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            shutdown_grace: self.shutdown_grace.unwrap_or(DEFAULT_SHUTDOWN_GRACE),
        })
    }
}
