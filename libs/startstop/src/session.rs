//! Start/stop session: the supervisor controller and its entry point.
//!
//! One controller task owns all supervisor state. Everything else talks to it
//! by message:
//!
//! ```text
//!   ListenerAdapter ──Inbound──▶ ┌────────────┐ ──spawn──▶ relay tasks (JoinSet)
//!                                │ Controller │ ◀─joined──┘
//!          IdleTimer ──fired───▶ │  (state)   │ ──spawn──▶ process task (start)
//!                                └────────────┘ ◀─exited──┘
//! ```
//!
//! Events are handled strictly one at a time, so the transition table in
//! [`SupervisorState`] fully determines which states are reachable.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::listener::{Inbound, ListenerAdapter};
use crate::process::ManagedProcess;
use crate::relay::{Relay, RelayError, RelayStats};
use crate::state::{Action, Event, SupervisorState};
use crate::timer::IdleTimer;

/// Capacity of the accept queue between the listener and the controller.
const INBOUND_QUEUE: usize = 64;

type ProcessTask = JoinHandle<anyhow::Result<()>>;

/// A start/stop session for one source/target pair.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Run the session until it is cancelled or fails.
    ///
    /// Never returns `Ok`: cancellation yields [`SessionError::Cancelled`].
    /// The listener, relays and process task are all torn down before this
    /// returns.
    pub async fn run(self, cancel: CancellationToken) -> Result<Infallible, SessionError> {
        let config = self.config;
        let session_cancel = cancel.child_token();

        let adapter = ListenerAdapter::bind(&config.source).await?;
        let local_addr = adapter.local_addr().map_err(|source| SessionError::Bind {
            addr: config.source.to_string(),
            source,
        })?;

        info!(
            source = %config.source,
            bind_addr = %local_addr,
            target = %config.target,
            idle_secs = config.idle_duration.as_secs_f64(),
            "Waiting for connections"
        );
        if let Some(sink) = &config.events {
            let _ = sink.send(SessionEvent::Listening { addr: local_addr });
        }

        let (tx, rx) = mpsc::channel(INBOUND_QUEUE);
        let listener_task = adapter.spawn(tx, session_cancel.clone());

        let mut controller = Controller::new(config, rx, session_cancel.clone());
        let err = controller.run().await;

        match &err {
            SessionError::Cancelled => info!("Session cancelled"),
            e => error!(error = %e.detail(), reason = e.reason_code(), "Session terminated"),
        }

        session_cancel.cancel();
        controller.shutdown().await;
        let _ = listener_task.await;

        Err(err)
    }
}

/// Owner of the supervisor state and everything it drives.
struct Controller {
    state: SupervisorState,
    timer: IdleTimer,
    inbound: mpsc::Receiver<Inbound>,
    relays: JoinSet<Result<RelayStats, RelayError>>,
    relay: Arc<Relay>,
    process: Arc<dyn ManagedProcess>,
    process_task: Option<ProcessTask>,
    config: SessionConfig,
    cancel: CancellationToken,
}

impl Controller {
    fn new(config: SessionConfig, inbound: mpsc::Receiver<Inbound>, cancel: CancellationToken) -> Self {
        let relay = Relay::new(config.target.clone())
            .with_backoff(config.dial_backoff.clone())
            .with_connect_timeout(config.connect_timeout);

        Self {
            state: SupervisorState::new(),
            timer: IdleTimer::new(config.idle_duration),
            inbound,
            relays: JoinSet::new(),
            relay: Arc::new(relay),
            process: Arc::clone(&config.process),
            process_task: None,
            config,
            cancel,
        }
    }

    /// Process events until a terminal error.
    async fn run(&mut self) -> SessionError {
        loop {
            let result = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => Err(SessionError::Cancelled),

                exit = process_exit(&mut self.process_task) => self.on_process_exit(exit),

                Some(joined) = self.relays.join_next(), if !self.relays.is_empty() => {
                    self.on_relay_finished(joined)
                }

                inbound = self.inbound.recv() => match inbound {
                    Some(Inbound::Accepted { stream, peer }) => self.on_accepted(stream, peer),
                    Some(Inbound::Failed(e)) => Err(SessionError::Accept(e)),
                    None => Err(SessionError::Accept(io::Error::other("listener stopped"))),
                },

                _ = self.timer.fired() => self.on_idle_elapsed().await,
            };

            if let Err(e) = result {
                return e;
            }
        }
    }

    fn on_accepted(&mut self, stream: TcpStream, peer: SocketAddr) -> Result<(), SessionError> {
        let actions = self.state.apply(Event::Connected)?;
        let live = self.state.live_connections();
        info!(peer_addr = %peer, live, "Connection opened");
        self.emit(SessionEvent::ConnectionOpened { peer, live });
        self.perform(actions)?;

        let relay = Arc::clone(&self.relay);
        let cancel = self.cancel.clone();
        self.relays.spawn(
            async move { relay.serve(stream, cancel).await }
                .instrument(tracing::info_span!("connection", peer = %peer)),
        );
        Ok(())
    }

    fn on_relay_finished(
        &mut self,
        joined: Result<Result<RelayStats, RelayError>, JoinError>,
    ) -> Result<(), SessionError> {
        match joined {
            Ok(Ok(_)) => {}
            Ok(Err(RelayError::Cancelled)) => debug!("Relay cancelled"),
            Ok(Err(e)) => debug!(error = %e, "Connection error"),
            Err(e) => warn!(error = %e, "Relay task failed"),
        }

        let actions = self.state.apply(Event::Disconnected)?;
        let live = self.state.live_connections();
        info!(live, "Connection closed");
        self.emit(SessionEvent::ConnectionClosed { live });
        self.perform(actions)
    }

    fn on_process_exit(&mut self, exit: anyhow::Result<()>) -> Result<(), SessionError> {
        self.emit(SessionEvent::ProcessExited { requested: false });
        match exit {
            Ok(()) => {
                info!(
                    live = self.state.live_connections(),
                    "Managed process exited on its own"
                );
                let actions = self.state.apply(Event::ProcessExited)?;
                self.perform(actions)
            }
            Err(e) => Err(SessionError::Process(e)),
        }
    }

    async fn on_idle_elapsed(&mut self) -> Result<(), SessionError> {
        // The process may have exited in the same instant the timer fired.
        if self.process_task.as_ref().is_some_and(|task| task.is_finished()) {
            let exit = process_exit(&mut self.process_task).await;
            return self.on_process_exit(exit);
        }

        let actions = self.state.apply(Event::IdleElapsed)?;
        info!(
            idle_secs = self.timer.duration().as_secs_f64(),
            "Idle timeout elapsed"
        );
        for action in actions {
            if action == Action::StopProcess {
                self.stop_process().await?;
            }
        }
        Ok(())
    }

    /// Carry out the non-blocking actions of a transition.
    fn perform(&mut self, actions: Vec<Action>) -> Result<(), SessionError> {
        for action in actions {
            match action {
                Action::StartProcess => self.start_process()?,
                Action::ArmTimer => {
                    self.timer.arm();
                    debug!("Idle timer armed");
                    self.emit(SessionEvent::TimerArmed);
                }
                Action::DisarmTimer => {
                    self.timer.disarm();
                    debug!("Idle timer disarmed");
                    self.emit(SessionEvent::TimerDisarmed);
                }
                Action::StopProcess => {
                    return Err(SessionError::Unreachable(
                        "stop requested outside of an idle timeout",
                    ))
                }
            }
        }
        Ok(())
    }

    fn start_process(&mut self) -> Result<(), SessionError> {
        if self.process_task.is_some() {
            return Err(SessionError::Unreachable(
                "process started while a previous run is still pending",
            ));
        }

        info!("Starting managed process");
        self.emit(SessionEvent::ProcessStarting);

        let process = Arc::clone(&self.process);
        let cancel = self.cancel.clone();
        self.process_task = Some(tokio::spawn(
            async move { process.start(cancel).await }.instrument(tracing::info_span!("process")),
        ));
        Ok(())
    }

    /// Ask the process to stop, then wait for its start task to finish.
    async fn stop_process(&mut self) -> Result<(), SessionError> {
        info!("Stopping managed process");
        self.emit(SessionEvent::ProcessStopping);

        self.process
            .stop(self.cancel.clone())
            .await
            .map_err(SessionError::Stop)?;

        let exit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
            exit = process_exit(&mut self.process_task) => exit,
        };

        match exit {
            Ok(()) => info!("Managed process stopped"),
            Err(e) => {
                let detail = format!("{e:#}");
                warn!(error = %detail, "Managed process exited with error after stop");
            }
        }
        self.emit(SessionEvent::ProcessExited { requested: true });
        Ok(())
    }

    /// Release relays and the process task. Called once the loop has ended
    /// and the session token is cancelled.
    async fn shutdown(&mut self) {
        self.timer.disarm();

        let open = self.relays.len();
        self.relays.shutdown().await;
        if open > 0 {
            debug!(count = open, "Closed open relays");
        }

        if let Some(task) = self.process_task.take() {
            let abort = task.abort_handle();
            match tokio::time::timeout(self.config.shutdown_grace, task).await {
                Ok(Ok(Ok(()))) => info!("Managed process exited"),
                Ok(Ok(Err(e))) => {
                    let detail = format!("{e:#}");
                    warn!(error = %detail, "Managed process exited with error during shutdown");
                }
                Ok(Err(e)) => warn!(error = %e, "Managed process task failed"),
                Err(_) => {
                    warn!(
                        grace_secs = self.config.shutdown_grace.as_secs_f64(),
                        "Managed process did not exit in time, aborting"
                    );
                    abort.abort();
                }
            }
        }
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(sink) = &self.config.events {
            let _ = sink.send(event);
        }
    }
}

/// Wait for the process task to finish; pends forever when none is running.
///
/// Cancel safe. The slot is cleared once the task has been joined.
async fn process_exit(task: &mut Option<ProcessTask>) -> anyhow::Result<()> {
    let Some(handle) = task.as_mut() else {
        return std::future::pending().await;
    };
    let joined = handle.await;
    *task = None;

    match joined {
        Ok(result) => result,
        Err(e) => Err(anyhow::anyhow!("managed process task failed: {e}")),
    }
}
