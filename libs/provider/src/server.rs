//! The Java server as a managed process.
//!
//! Launches `java <runtime args> -jar <server.jar> <server args>` and handles:
//! - Graceful stop via the `stop` console command on stdin
//! - Kill after a grace period when the session is cancelled
//! - Exit status capture

use std::ffi::OsString;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use mcl_startstop::{CancellationToken, ManagedProcess};
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::provider::RunOptions;

/// Default time a cancelled server gets to save and exit before it is killed.
pub const DEFAULT_STOP_GRACE: Duration = Duration::from_secs(30);

/// Console command that makes the server save and exit.
const STOP_COMMAND: &[u8] = b"stop\n";

/// A Java Edition server for one prepared instance.
///
/// At most one server process runs at a time; `start` may be called again
/// once the previous run has returned.
pub struct JavaServer {
    program: OsString,
    jar: PathBuf,
    options: RunOptions,
    stop_grace: Duration,
    stdin: Mutex<Option<ChildStdin>>,
    running: AtomicBool,
    stop_requested: AtomicBool,
    pid: AtomicU32,
}

impl JavaServer {
    pub fn new(jar: PathBuf, options: RunOptions) -> Self {
        Self {
            program: OsString::from("java"),
            jar,
            options,
            stop_grace: DEFAULT_STOP_GRACE,
            stdin: Mutex::new(None),
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            pid: AtomicU32::new(0),
        }
    }

    /// Launch a different runtime binary instead of `java` from `PATH`.
    pub fn with_program(mut self, program: impl Into<OsString>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    /// OS process id of the running server.
    pub fn pid(&self) -> Option<u32> {
        match self.pid.load(Ordering::SeqCst) {
            0 => None,
            pid => Some(pid),
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.options.runtime_args)
            .arg("-jar")
            .arg(&self.jar)
            .args(&self.options.server_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if !self.options.working_dir.as_os_str().is_empty() {
            cmd.current_dir(&self.options.working_dir);
        }
        cmd
    }

    async fn run(&self, cancel: CancellationToken) -> Result<()> {
        self.stop_requested.store(false, Ordering::SeqCst);

        info!(
            program = ?self.program,
            jar = %self.jar.display(),
            runtime_args = ?self.options.runtime_args,
            server_args = ?self.options.server_args,
            working_dir = %self.options.working_dir.display(),
            "Starting server"
        );

        let mut child = self
            .command()
            .spawn()
            .with_context(|| format!("failed to launch {:?}", self.program))?;

        *self.stdin.lock().await = child.stdin.take();
        if let Some(pid) = child.id() {
            self.pid.store(pid, Ordering::SeqCst);
            info!(pid, "Server started");
        }

        let status = self.wait(&mut child, &cancel).await;

        self.pid.store(0, Ordering::SeqCst);
        self.stdin.lock().await.take();
        let status = status.context("failed to wait for server")?;

        if status.success() || self.stop_requested.load(Ordering::SeqCst) {
            info!(status = %status, "Server exited");
            Ok(())
        } else {
            bail!("server exited with {status}")
        }
    }

    /// Wait for exit; on cancellation ask nicely, then kill after the grace.
    async fn wait(&self, child: &mut Child, cancel: &CancellationToken) -> std::io::Result<ExitStatus> {
        let exited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };
        if let Some(status) = exited {
            return status;
        }

        debug!("Cancelled, stopping server");
        if let Err(e) = self.request_stop().await {
            let detail = format!("{e:#}");
            warn!(error = %detail, "Failed to send stop command");
        }

        match tokio::time::timeout(self.stop_grace, child.wait()).await {
            Ok(status) => status,
            Err(_) => {
                warn!(
                    grace_secs = self.stop_grace.as_secs_f64(),
                    "Server did not stop in time, killing"
                );
                child.kill().await?;
                child.wait().await
            }
        }
    }

    async fn request_stop(&self) -> Result<()> {
        let mut slot = self.stdin.lock().await;
        let Some(stdin) = slot.as_mut() else {
            debug!("Server not running, nothing to stop");
            return Ok(());
        };

        self.stop_requested.store(true, Ordering::SeqCst);
        let written = async {
            stdin.write_all(STOP_COMMAND).await?;
            stdin.flush().await
        }
        .await;

        match written {
            Ok(()) => Ok(()),
            // The server exited between the check and the write.
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!("Server stdin closed, already exiting");
                Ok(())
            }
            Err(e) => Err(e).context("failed to write stop command"),
        }
    }
}

#[async_trait]
impl ManagedProcess for JavaServer {
    async fn start(&self, cancel: CancellationToken) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            bail!("server already running");
        }
        let result = self.run(cancel).await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    async fn stop(&self, _cancel: CancellationToken) -> Result<()> {
        info!("Sending stop command to server");
        self.request_stop().await
    }
}

impl std::fmt::Debug for JavaServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JavaServer")
            .field("program", &self.program)
            .field("jar", &self.jar)
            .field("options", &self.options)
            .field("pid", &self.pid())
            .finish_non_exhaustive()
    }
}
