//! Accept loop feeding inbound connections to the supervisor.

use std::io;
use std::net::SocketAddr;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::addr::NetAddr;
use crate::error::SessionError;

/// Messages from the accept loop.
#[derive(Debug)]
pub enum Inbound {
    /// A client connected.
    Accepted { stream: TcpStream, peer: SocketAddr },
    /// Accepting failed; the loop has ended.
    Failed(io::Error),
}

/// A bound listening socket.
#[derive(Debug)]
pub struct ListenerAdapter {
    listener: TcpListener,
}

impl ListenerAdapter {
    /// Bind to the first resolved source address that accepts the bind.
    pub async fn bind(addr: &NetAddr) -> Result<Self, SessionError> {
        let bind_err = |source| SessionError::Bind {
            addr: addr.to_string(),
            source,
        };

        let mut last_err = None;
        for candidate in addr.resolve().await.map_err(bind_err)? {
            match TcpListener::bind(candidate).await {
                Ok(listener) => {
                    let local_addr = listener.local_addr().map_err(bind_err)?;
                    info!(bind_addr = %local_addr, "Listener bound");
                    return Ok(Self { listener });
                }
                Err(e) => {
                    debug!(bind_addr = %candidate, error = %e, "Bind attempt failed");
                    last_err = Some(e);
                }
            }
        }

        Err(bind_err(last_err.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no addresses to bind")
        })))
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop on its own task.
    pub fn spawn(self, tx: mpsc::Sender<Inbound>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(tx, cancel))
    }

    /// Accept until cancelled, the receiver goes away, or accept fails.
    pub async fn run(self, tx: mpsc::Sender<Inbound>, cancel: CancellationToken) {
        loop {
            let accepted = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Listener cancelled");
                    return;
                }
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer_addr = %peer, "Accepted connection");
                    if tx.send(Inbound::Accepted { stream, peer }).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    error!(error = %e, "Accept error");
                    let _ = tx.send(Inbound::Failed(e)).await;
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accepted_connections_are_forwarded() {
        let adapter = ListenerAdapter::bind(&"127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let addr = adapter.local_addr().unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let handle = adapter.spawn(tx, cancel.clone());

        let client = TcpStream::connect(addr).await.unwrap();
        match rx.recv().await.unwrap() {
            Inbound::Accepted { peer, .. } => assert_eq!(peer, client.local_addr().unwrap()),
            Inbound::Failed(e) => panic!("unexpected accept failure: {e}"),
        }

        cancel.cancel();
        handle.await.unwrap();
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_bind_conflict_is_a_bind_error() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: NetAddr = taken.local_addr().unwrap().into();

        let err = ListenerAdapter::bind(&addr).await.unwrap_err();
        assert!(matches!(err, SessionError::Bind { .. }));
    }
}
