//! Idle-activated start/stop supervisor with an embedded TCP relay.
//!
//! A [`Session`] listens on a public address and relays every client
//! connection to a locally managed server. The server is started when the
//! first client connects and stopped once no client has been connected for
//! the configured idle duration.
//!
//! ## Architecture
//!
//! ```text
//! Client -> ListenerAdapter -> Controller -> Relay -> managed server
//!                                  |
//!                      IdleTimer / ManagedProcess (start, stop)
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use mcl_startstop::{NetAddr, Session, SessionConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = SessionConfig::builder()
//!     .source("0.0.0.0:25565".parse()?)
//!     .target(NetAddr::tcp("localhost", 25566))
//!     .idle_duration(Duration::from_secs(300))
//!     .process(server)
//!     .build()?;
//!
//! let Err(err) = Session::new(config).run(CancellationToken::new()).await;
//! ```

mod addr;
mod backoff;
mod config;
mod error;
mod events;
mod listener;
mod process;
mod relay;
mod session;
mod state;
mod timer;

pub use addr::{NetAddr, Network};
pub use backoff::BackoffPolicy;
pub use config::{
    SessionConfig, SessionConfigBuilder, DEFAULT_IDLE_DURATION, DEFAULT_SHUTDOWN_GRACE,
};
pub use error::{ConfigError, SessionError};
pub use events::{EventSink, SessionEvent};
pub use listener::{Inbound, ListenerAdapter};
pub use process::{FnProcess, ManagedProcess};
pub use relay::{relay_bidirectional, Relay, RelayError, RelayStats, DEFAULT_CONNECT_TIMEOUT};
pub use session::Session;
pub use state::{Action, Event, Phase, SupervisorState};
pub use timer::IdleTimer;

/// Re-exported so callers can cancel sessions without depending on
/// `tokio-util` directly.
pub use tokio_util::sync::CancellationToken;
