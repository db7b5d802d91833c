//! The managed-process capability driven by a session.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

/// A long-running process that a session starts on demand and stops when idle.
///
/// `start` runs for the whole lifetime of the process: it returns `Ok` once
/// the process has exited after a requested stop or on its own, and `Err` if
/// it exited abnormally. `stop` only asks the process to shut down; the
/// session observes the actual exit through the pending `start` call.
///
/// Both methods receive the session's cancellation token. When it fires,
/// `start` should bring the process down and return promptly.
#[async_trait]
pub trait ManagedProcess: Send + Sync + 'static {
    /// Run the process until it exits.
    async fn start(&self, cancel: CancellationToken) -> Result<()>;

    /// Request a graceful shutdown without waiting for it to complete.
    async fn stop(&self, cancel: CancellationToken) -> Result<()>;
}

#[async_trait]
impl<P: ManagedProcess + ?Sized> ManagedProcess for Arc<P> {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        (**self).start(cancel).await
    }

    async fn stop(&self, cancel: CancellationToken) -> Result<()> {
        (**self).stop(cancel).await
    }
}

type BoxFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type Callback = Box<dyn Fn(CancellationToken) -> BoxFuture + Send + Sync>;

/// Adapts a pair of async functions into a [`ManagedProcess`].
///
/// ```ignore
/// let process = FnProcess::new(
///     |cancel| async move { run_server(cancel).await },
///     |_cancel| async move { request_shutdown().await },
/// );
/// ```
pub struct FnProcess {
    start: Callback,
    stop: Callback,
}

impl FnProcess {
    pub fn new<S, SF, T, TF>(start: S, stop: T) -> Self
    where
        S: Fn(CancellationToken) -> SF + Send + Sync + 'static,
        SF: Future<Output = Result<()>> + Send + 'static,
        T: Fn(CancellationToken) -> TF + Send + Sync + 'static,
        TF: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            start: Box::new(move |cancel| Box::pin(start(cancel))),
            stop: Box::new(move |cancel| Box::pin(stop(cancel))),
        }
    }
}

#[async_trait]
impl ManagedProcess for FnProcess {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        (self.start)(cancel).await
    }

    async fn stop(&self, cancel: CancellationToken) -> Result<()> {
        (self.stop)(cancel).await
    }
}

impl std::fmt::Debug for FnProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnProcess").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fn_process_dispatches_to_callbacks() {
        let starts = Arc::new(AtomicUsize::new(0));
        let stops = Arc::new(AtomicUsize::new(0));

        let process = {
            let starts = Arc::clone(&starts);
            let stops = Arc::clone(&stops);
            FnProcess::new(
                move |_| {
                    let starts = Arc::clone(&starts);
                    async move {
                        starts.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                },
                move |_| {
                    let stops = Arc::clone(&stops);
                    async move {
                        stops.fetch_add(1, Ordering::SeqCst);
                        anyhow::bail!("not running")
                    }
                },
            )
        };

        let token = CancellationToken::new();
        process.start(token.clone()).await.unwrap();
        let err = process.stop(token).await.unwrap_err();

        assert_eq!(err.to_string(), "not running");
        assert_eq!(starts.load(Ordering::SeqCst), 1);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
