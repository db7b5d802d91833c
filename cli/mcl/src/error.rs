//! Error handling and display for the CLI.

use colored::Colorize;
use mcl_provider::ProviderError;
use mcl_startstop::SessionError;
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("invalid --start-stop mapping {input:?}: {reason}")]
    InvalidMapping { input: String, reason: String },

    #[error("invalid --start-stop-ip {0:?}: not an IP address")]
    InvalidListenIp(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("server failed: {0:#}")]
    Server(anyhow::Error),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let Some(cli_err) = err.downcast_ref::<CliError>() else {
        return;
    };

    let hint = match cli_err {
        CliError::InvalidMapping { .. } => {
            Some("Hint: use <from>:<to>[/tcp|tcp4|tcp6], e.g. 25565:25566/tcp.")
        }
        CliError::Provider(ProviderError::UnknownEdition(_)) => {
            Some("Hint: the only supported edition is `java`.")
        }
        CliError::Provider(ProviderError::UnknownVersion(_)) => {
            Some("Hint: run `mcl list-versions <edition>` to see available versions.")
        }
        CliError::Provider(ProviderError::ChecksumMismatch { .. })
        | CliError::Provider(ProviderError::SizeMismatch { .. }) => {
            Some("Hint: the download was corrupted; run `mcl fetch` again.")
        }
        CliError::Provider(e) if e.is_transient() => {
            Some("Hint: check your network connection and the store directory permissions.")
        }
        CliError::Session(SessionError::Bind { .. }) => {
            Some("Hint: another process may already be listening on that port.")
        }
        CliError::Server(_) => Some("Hint: check that `java` is installed and on your PATH."),
        _ => None,
    };

    if let Some(hint) = hint {
        eprintln!("\n{}", hint.yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_errors_print_each_cause_once() {
        let bind: anyhow::Error = CliError::Session(SessionError::Bind {
            addr: "tcp://0.0.0.0:25565".to_string(),
            source: std::io::Error::new(std::io::ErrorKind::AddrInUse, "in use"),
        })
        .into();
        assert_eq!(
            format!("{bind:#}"),
            "failed to bind listener on tcp://0.0.0.0:25565: in use"
        );

        let process: anyhow::Error =
            CliError::Session(SessionError::Process(anyhow::anyhow!("server exited with 1")))
                .into();
        assert_eq!(
            format!("{process:#}"),
            "managed process failed: server exited with 1"
        );
    }
}
