//! Per-connection byte relay between a client and the managed server.
//!
//! A relay owns both ends of a connection pair:
//! - dials the target, retrying with backoff until it answers or the session
//!   is cancelled (the server may still be booting)
//! - copies bytes in both directions until both have ended
//! - forwards a half-close (EOF) in one direction as a write shutdown
//!
//! Errors are returned to the caller for logging only; they never affect
//! other relays or the session.

use std::io;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::addr::NetAddr;
use crate::backoff::BackoffPolicy;

/// Default connect timeout for a single dial attempt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Copy buffer size per direction.
const COPY_BUFFER_SIZE: usize = 16 * 1024;

/// Why a relay ended early.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The session was cancelled while dialing or copying.
    #[error("relay cancelled")]
    Cancelled,

    /// Either side failed mid-copy.
    #[error("relay i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Bytes moved by a finished relay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub bytes_to_target: u64,
    pub bytes_from_target: u64,
}

/// Dials the target and relays accepted connections to it.
#[derive(Debug, Clone)]
pub struct Relay {
    target: NetAddr,
    backoff: BackoffPolicy,
    connect_timeout: Duration,
}

impl Relay {
    pub fn new(target: NetAddr) -> Self {
        Self {
            target,
            backoff: BackoffPolicy::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }

    pub fn target(&self) -> &NetAddr {
        &self.target
    }

    /// Relay `inbound` to the target until both directions end.
    pub async fn serve(
        &self,
        mut inbound: TcpStream,
        cancel: CancellationToken,
    ) -> Result<RelayStats, RelayError> {
        let mut outbound = self.dial(&cancel).await?;
        debug!(target_addr = %self.target, "Connected to target");

        tokio::select! {
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            result = relay_bidirectional(&mut inbound, &mut outbound) => {
                let stats = result?;
                debug!(
                    bytes_to_target = stats.bytes_to_target,
                    bytes_from_target = stats.bytes_from_target,
                    "Relay finished"
                );
                Ok(stats)
            }
        }
    }

    /// Dial the target until it accepts or `cancel` fires.
    pub async fn dial(&self, cancel: &CancellationToken) -> Result<TcpStream, RelayError> {
        let mut attempt: u32 = 0;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                result = self.try_connect() => match result {
                    Ok(stream) => return Ok(stream),
                    Err(e) => {
                        trace!(
                            target_addr = %self.target,
                            attempt,
                            error = %e,
                            "Target not reachable yet"
                        );
                    }
                },
            }

            let delay = self.backoff.delay(attempt);
            attempt = attempt.saturating_add(1);
            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Attempt one connection to each resolved target address.
    async fn try_connect(&self) -> io::Result<TcpStream> {
        let mut last_err = None;
        for addr in self.target.resolve().await? {
            match timeout(self.connect_timeout, TcpStream::connect(addr)).await {
                Ok(Ok(stream)) => {
                    let _ = stream.set_nodelay(true);
                    return Ok(stream);
                }
                Ok(Err(e)) => last_err = Some(e),
                Err(_) => {
                    last_err = Some(io::Error::new(io::ErrorKind::TimedOut, "connect timeout"))
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no target addresses")))
    }
}

/// Copy data between two streams until both directions reach EOF.
///
/// An error in either direction ends the whole relay; the caller drops both
/// streams, which closes them.
pub async fn relay_bidirectional(
    a: &mut TcpStream,
    b: &mut TcpStream,
) -> io::Result<RelayStats> {
    let (a_read, a_write) = a.split();
    let (b_read, b_write) = b.split();

    let (bytes_to_target, bytes_from_target) =
        tokio::try_join!(pipe(a_read, b_write), pipe(b_read, a_write))?;

    Ok(RelayStats {
        bytes_to_target,
        bytes_from_target,
    })
}

/// Copy `reader` into `writer`, then shut the writer down to forward EOF.
async fn pipe<R, W>(mut reader: R, mut writer: W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut total = 0u64;
    let mut buf = vec![0u8; COPY_BUFFER_SIZE];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n]).await?;
        total += n as u64;
    }
    writer.shutdown().await?;
    Ok(total)
}
