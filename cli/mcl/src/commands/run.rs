use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use mcl_provider::{RunOptions, DEFAULT_STOP_GRACE};
use mcl_startstop::{
    CancellationToken, ManagedProcess, NetAddr, Network, Session, SessionConfig, SessionError,
};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::{ensure_fetched, ensure_prepared, requirements, CommandContext, EditionVersion};
use crate::error::CliError;

/// Run a server.
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Edition and optional version, e.g. `java` or `java/1.20.4`.
    target: EditionVersion,

    /// Working directory to run the server from.
    #[arg(long, env = "MCL_WORKING_DIR", default_value = ".")]
    working_dir: PathBuf,

    /// Arguments for the runtime environment (e.g. JVM options), comma separated.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    runtime_args: Vec<String>,

    /// Arguments for the server application, comma separated.
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    server_args: Vec<String>,

    /// Start the server on incoming connections and stop it when idle.
    ///
    /// Format: <from>:<to>[/tcp|tcp4|tcp6]. Clients connect to port <from>;
    /// the server listens on localhost:<to>.
    #[arg(long, env = "MCL_START_STOP")]
    start_stop: Option<String>,

    /// IP to listen on in start/stop mode (default: all interfaces).
    #[arg(long, env = "MCL_START_STOP_IP")]
    start_stop_ip: Option<String>,

    /// Idle time before the server is stopped, e.g. 30s, 5m, 1h.
    #[arg(long, env = "MCL_START_STOP_IDLE", value_parser = parse_duration, default_value = "5m")]
    start_stop_idle: Duration,
}

impl RunCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let start_stop = match &self.start_stop {
            Some(mapping) => {
                let mapping: PortMapping = mapping.parse()?;
                let host = listen_host(self.start_stop_ip.as_deref(), mapping.network)?;
                Some((mapping, host))
            }
            None => None,
        };

        let (provider, inst) = ctx.instance(&self.target).await?;
        let needs = requirements(provider.as_ref(), &inst).await?;
        ensure_fetched(provider.as_ref(), &inst, needs).await?;
        ensure_prepared(provider.as_ref(), &inst, needs).await?;

        let options = RunOptions {
            working_dir: self.working_dir.clone(),
            runtime_args: self.runtime_args.clone(),
            server_args: self.server_args.clone(),
        };
        let server = provider.server(&inst, options).map_err(CliError::from)?;

        let cancel = CancellationToken::new();
        let signal = cancel_on_ctrl_c(cancel.clone());

        let result = match start_stop {
            Some((mapping, host)) => {
                let source = NetAddr::new(mapping.network, host, mapping.from);
                let target = NetAddr::new(mapping.network, "localhost", mapping.to);
                run_start_stop(server, source, target, self.start_stop_idle, cancel).await
            }
            None => run_direct(server, cancel).await,
        };

        signal.abort();
        result
    }
}

/// Run the server in the foreground until it exits or Ctrl-C.
async fn run_direct(server: Arc<dyn ManagedProcess>, cancel: CancellationToken) -> Result<()> {
    server.start(cancel).await.map_err(CliError::Server)?;
    info!("Server exited");
    Ok(())
}

async fn run_start_stop(
    server: Arc<dyn ManagedProcess>,
    source: NetAddr,
    target: NetAddr,
    idle: Duration,
    cancel: CancellationToken,
) -> Result<()> {
    let config = SessionConfig::builder()
        .source(source)
        .target(target)
        .idle_duration(idle)
        .shared_process(server)
        .shutdown_grace(DEFAULT_STOP_GRACE + Duration::from_secs(5))
        .build()
        .map_err(|e| CliError::Session(e.into()))?;

    let Err(err) = Session::new(config).run(cancel).await;
    match err {
        SessionError::Cancelled => {
            info!("Start/stop session ended");
            Ok(())
        }
        err => Err(CliError::Session(err).into()),
    }
}

fn cancel_on_ctrl_c(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received shutdown signal");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for shutdown signal"),
        }
    })
}

/// Host to listen on: the given IP, or the wildcard of the network family.
fn listen_host(ip: Option<&str>, network: Network) -> Result<String, CliError> {
    match ip.filter(|ip| !ip.is_empty()) {
        Some(ip) => {
            let parsed: IpAddr = ip
                .parse()
                .map_err(|_| CliError::InvalidListenIp(ip.to_string()))?;
            Ok(parsed.to_string())
        }
        None => Ok(match network {
            Network::Tcp6 => "::".to_string(),
            Network::Tcp | Network::Tcp4 => "0.0.0.0".to_string(),
        }),
    }
}

/// A `<from>:<to>[/network]` start/stop port mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortMapping {
    pub from: u16,
    pub to: u16,
    pub network: Network,
}

impl FromStr for PortMapping {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CliError::InvalidMapping {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let (ports, network) = match s.split_once('/') {
            Some((ports, network)) => (ports, network),
            None => (s, "tcp"),
        };

        if network.to_ascii_lowercase().starts_with("udp") {
            return Err(invalid("udp is not supported; the relay carries byte streams only"));
        }
        let network: Network = network
            .parse()
            .map_err(|_| invalid("network must be tcp, tcp4 or tcp6"))?;

        let (from, to) = ports
            .split_once(':')
            .ok_or_else(|| invalid("expected <from>:<to>"))?;
        let port = |p: &str| {
            p.parse::<u16>()
                .map_err(|_| invalid("ports must be numbers between 0 and 65535"))
        };

        Ok(Self {
            from: port(from)?,
            to: port(to)?,
            network,
        })
    }
}

/// Parse durations like `30s`, `5m`, `1h30m` or `250ms`. A bare number is
/// taken as seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration".to_string());
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = s;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("invalid duration {s:?}: expected a number"));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|_| format!("invalid duration {s:?}: number too large"))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let unit = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value.saturating_mul(60)),
            "h" => Duration::from_secs(value.saturating_mul(3600)),
            "" => return Err(format!("invalid duration {s:?}: missing unit")),
            other => return Err(format!("invalid duration {s:?}: unknown unit {other:?}")),
        };
        total = total
            .checked_add(unit)
            .ok_or_else(|| format!("invalid duration {s:?}: too long"))?;
        rest = &rest[unit_len..];
    }

    Ok(total)
}
