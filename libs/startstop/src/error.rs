//! Error types for start/stop sessions.

use std::io;

use thiserror::Error;

/// Errors raised while assembling a [`SessionConfig`](crate::SessionConfig).
///
/// These are returned before any socket is bound or process started.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required option was never set.
    #[error("missing required session option: {0}")]
    MissingOption(&'static str),

    /// An address could not be parsed.
    #[error("invalid address {input:?}: {reason}")]
    InvalidAddress { input: String, reason: String },

    /// The network is known but cannot be relayed as a byte stream.
    #[error("unsupported network {0:?} (only tcp, tcp4 and tcp6 can be relayed)")]
    UnsupportedNetwork(String),
}

/// Terminal errors returned by [`Session::run`](crate::Session::run).
///
/// Relay and dial failures never show up here: they are logged and the
/// session keeps serving.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session was misconfigured.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The source address could not be resolved or bound.
    #[error("failed to bind listener on {addr}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// Accepting an inbound connection failed.
    #[error("listener accept failed")]
    Accept(#[source] io::Error),

    /// The managed process exited with an error.
    #[error("managed process failed")]
    Process(#[source] anyhow::Error),

    /// Requesting the managed process to stop failed.
    #[error("failed to stop managed process")]
    Stop(#[source] anyhow::Error),

    /// The session was cancelled by its caller.
    #[error("session cancelled")]
    Cancelled,

    /// The supervisor reached a state its transition table rules out.
    ///
    /// This is a programming error, kept separate from runtime failures so
    /// tests can assert it never occurs.
    #[error("unreachable supervisor state: {0}")]
    Unreachable(&'static str),
}

impl SessionError {
    /// Whether the session ended because the caller cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SessionError::Cancelled)
    }

    /// This error followed by each of its sources, joined with `": "`.
    pub fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str(": ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }

    /// Short machine-readable reason code for logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            SessionError::Config(_) => "config_invalid",
            SessionError::Bind { .. } => "bind_failed",
            SessionError::Accept(_) => "accept_failed",
            SessionError::Process(_) => "process_failed",
            SessionError::Stop(_) => "stop_failed",
            SessionError::Cancelled => "cancelled",
            SessionError::Unreachable(_) => "unreachable_state",
        }
    }
}
