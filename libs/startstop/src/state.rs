//! Supervisor state and its transition table.
//!
//! The state machine is pure: it takes one [`Event`] at a time and returns
//! the [`Action`]s the controller must carry out. All I/O lives in the
//! controller, which keeps the transition table testable on its own.
//!
//! ```text
//!            connect (start)              last disconnect (arm)
//!   Idle ─────────────────────▶ Serving ─────────────────────▶ Draining
//!    ▲                            ▲   ◀───────────────────────     │
//!    │                            │        connect (disarm)        │
//!    │                            └─ process exit ─▶ Idle*         │
//!    └──────────────────────── idle elapsed (stop) ◀───────────────┘
//!
//!   * inactive with live connections; the next connect restarts
//! ```

use crate::error::SessionError;

/// Inputs that change supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A client connection was accepted.
    Connected,
    /// A relay finished.
    Disconnected,
    /// The idle timer elapsed.
    IdleElapsed,
    /// The managed process exited cleanly without being asked to stop.
    ProcessExited,
}

/// Side effects requested by a transition, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Launch the managed process in the background.
    StartProcess,
    /// Ask the managed process to stop and wait for it to exit.
    StopProcess,
    /// Start the idle countdown.
    ArmTimer,
    /// Cancel the idle countdown.
    DisarmTimer,
}

/// Coarse phase derived from the state fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Process presumed stopped.
    Idle,
    /// Process running with clients attached.
    Serving,
    /// Process running, no clients, idle countdown armed.
    Draining,
}

/// State owned by the supervisor controller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisorState {
    active: bool,
    live_connections: usize,
    timer_armed: bool,
}

impl SupervisorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the managed process is presumed running.
    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn live_connections(&self) -> usize {
        self.live_connections
    }

    pub fn is_timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn phase(&self) -> Phase {
        match (self.active, self.timer_armed) {
            (true, true) => Phase::Draining,
            (true, false) => Phase::Serving,
            (false, _) => Phase::Idle,
        }
    }

    /// An armed timer implies an active process with no live connections.
    pub fn invariant_holds(&self) -> bool {
        !self.timer_armed || (self.active && self.live_connections == 0)
    }

    /// Apply one event and return the actions to perform.
    pub fn apply(&mut self, event: Event) -> Result<Vec<Action>, SessionError> {
        let actions = match event {
            Event::Connected => self.on_connected(),
            Event::Disconnected => self.on_disconnected()?,
            Event::IdleElapsed => self.on_idle_elapsed()?,
            Event::ProcessExited => self.on_process_exited(),
        };

        if !self.invariant_holds() {
            return Err(SessionError::Unreachable(
                "idle timer armed while the process is inactive or serving",
            ));
        }
        Ok(actions)
    }

    fn on_connected(&mut self) -> Vec<Action> {
        let mut actions = Vec::new();
        if self.timer_armed {
            self.timer_armed = false;
            actions.push(Action::DisarmTimer);
        }
        if !self.active {
            self.active = true;
            actions.push(Action::StartProcess);
        }
        self.live_connections += 1;
        actions
    }

    fn on_disconnected(&mut self) -> Result<Vec<Action>, SessionError> {
        self.live_connections = self
            .live_connections
            .checked_sub(1)
            .ok_or(SessionError::Unreachable(
                "connection closed with no live connections",
            ))?;

        // An inactive process has nothing to stop, so there is nothing to arm.
        if self.live_connections == 0 && self.active {
            self.timer_armed = true;
            return Ok(vec![Action::ArmTimer]);
        }
        Ok(Vec::new())
    }

    fn on_idle_elapsed(&mut self) -> Result<Vec<Action>, SessionError> {
        if !self.active {
            return Err(SessionError::Unreachable(
                "idle timer fired while the process is inactive",
            ));
        }
        if !self.timer_armed || self.live_connections > 0 {
            return Err(SessionError::Unreachable(
                "idle timer fired while connections are live",
            ));
        }
        self.timer_armed = false;
        self.active = false;
        Ok(vec![Action::StopProcess])
    }

    fn on_process_exited(&mut self) -> Vec<Action> {
        self.active = false;
        if self.timer_armed {
            self.timer_armed = false;
            return vec![Action::DisarmTimer];
        }
        Vec::new()
    }
}
