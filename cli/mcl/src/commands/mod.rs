//! CLI commands.

mod fetch;
mod list_versions;
mod prepare;
mod resolve_version;
mod run;
mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use mcl_provider::{
    check_requirements, ActionRequirements, Bundle, Instance, Provider, StoreLayout,
    DEFAULT_STRUCTURE,
};
use tracing::info;

use crate::error::CliError;
use crate::logging::LogFormat;

/// mcl - Minecraft launcher for server deployments.
#[derive(Debug, Parser)]
#[command(name = "mcl")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Directory to store server resources.
    #[arg(long, global = true, env = "MCL_STORE_DIR", default_value = ".")]
    store_dir: PathBuf,

    /// Directory structure for server resources; supports {edition} and {version}.
    #[arg(long, global = true, env = "MCL_STORE_STRUCTURE", default_value = DEFAULT_STRUCTURE)]
    store_structure: String,

    /// Log filter used when RUST_LOG is unset (e.g. info, mcl_startstop=debug).
    #[arg(long, global = true, env = "MCL_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Log output format.
    #[arg(long, global = true, env = "MCL_LOG_FORMAT", value_enum, default_value_t)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Fetch server resources for an edition and version.
    Fetch(fetch::FetchCommand),

    /// Prepare fetched server resources.
    Prepare(prepare::PrepareCommand),

    /// Resolve a version alias (e.g. release) to its version.
    ResolveVersion(resolve_version::ResolveVersionCommand),

    /// List available versions for an edition.
    ListVersions(list_versions::ListVersionsCommand),

    /// Run a server, optionally in start/stop mode.
    Run(run::RunCommand),

    /// Print version and build information.
    Version(version::VersionCommand),
}

impl Cli {
    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let ctx = CommandContext {
            bundle: Bundle::with_defaults().map_err(CliError::from)?,
            layout: StoreLayout::new(&self.store_dir, &self.store_structure)
                .map_err(|e| CliError::Provider(e.into()))?,
        };

        match self.command {
            Commands::Fetch(cmd) => cmd.run(ctx).await,
            Commands::Prepare(cmd) => cmd.run(ctx).await,
            Commands::ResolveVersion(cmd) => cmd.run(ctx).await,
            Commands::ListVersions(cmd) => cmd.run(ctx).await,
            Commands::Run(cmd) => cmd.run(ctx).await,
            Commands::Version(cmd) => cmd.run(),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub bundle: Bundle,
    pub layout: StoreLayout,
}

impl CommandContext {
    pub fn provider(&self, edition: &str) -> Result<Arc<dyn Provider>> {
        Ok(self.bundle.get(edition).map_err(CliError::from)?)
    }

    /// Resolve `edition[/version]` to a provider and instance.
    ///
    /// A missing version falls back to the edition's default; aliases are
    /// resolved to a concrete version.
    pub async fn instance(&self, target: &EditionVersion) -> Result<(Arc<dyn Provider>, Instance)> {
        let provider = self.provider(&target.edition)?;

        let requested = match &target.version {
            Some(v) => v.clone(),
            None => {
                let default = provider.default_version().to_string();
                info!(version = %default, "No version specified; using default");
                default
            }
        };

        let version = provider
            .resolve_version(&requested)
            .await
            .map_err(CliError::from)?;
        if version != requested {
            info!(alias = %requested, version = %version, "Version resolved");
        }

        let inst = provider
            .new_instance(&version, &self.layout)
            .map_err(CliError::from)?;
        Ok((provider, inst))
    }
}

/// Ask the provider what the instance still needs. A required fetch always
/// implies a required prepare.
pub async fn requirements(provider: &dyn Provider, inst: &Instance) -> Result<ActionRequirements> {
    Ok(check_requirements(provider, inst)
        .await
        .map_err(CliError::from)?)
}

/// Fetch the instance's resources if `needs` says so.
pub async fn ensure_fetched(
    provider: &dyn Provider,
    inst: &Instance,
    needs: ActionRequirements,
) -> Result<()> {
    let label = format!("{}/{}", inst.edition(), inst.version());

    if needs.fetch_required {
        info!(instance = %label, dir = %inst.base_dir().display(), "Fetching");
        provider.fetch(inst).await.map_err(CliError::from)?;
        info!(instance = %label, "Fetched");
    } else {
        info!(instance = %label, dir = %inst.base_dir().display(), "Already fetched");
    }
    Ok(())
}

/// Prepare the instance's resources if `needs` says so.
pub async fn ensure_prepared(
    provider: &dyn Provider,
    inst: &Instance,
    needs: ActionRequirements,
) -> Result<()> {
    let label = format!("{}/{}", inst.edition(), inst.version());

    if needs.prepare_required {
        info!(instance = %label, "Preparing");
        provider.prepare(inst).await.map_err(CliError::from)?;
        info!(instance = %label, "Prepared");
    } else {
        info!(instance = %label, "Already prepared");
    }
    Ok(())
}

/// An `edition[/version]` argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditionVersion {
    pub edition: String,
    pub version: Option<String>,
}

impl std::str::FromStr for EditionVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (edition, version) = match s.split_once('/') {
            Some((edition, version)) => (edition, Some(version)),
            None => (s, None),
        };

        if edition.is_empty() {
            return Err("edition must not be empty".to_string());
        }

        Ok(Self {
            edition: edition.to_string(),
            version: version.filter(|v| !v.is_empty()).map(str::to_string),
        })
    }
}

impl std::fmt::Display for EditionVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.version {
            Some(version) => write!(f, "{}/{}", self.edition, version),
            None => f.write_str(&self.edition),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mcl_provider::{Edition, ProviderError, RunOptions};
    use mcl_startstop::ManagedProcess;
    use rstest::rstest;

    #[rstest]
    #[case("java", "java", None)]
    #[case("java/1.20.4", "java", Some("1.20.4"))]
    #[case("java/release", "java", Some("release"))]
    #[case("java/", "java", None)]
    fn test_parse_edition_version(
        #[case] input: &str,
        #[case] edition: &str,
        #[case] version: Option<&str>,
    ) {
        let parsed: EditionVersion = input.parse().unwrap();
        assert_eq!(parsed.edition, edition);
        assert_eq!(parsed.version.as_deref(), version);
    }

    #[test]
    fn test_empty_edition_rejected() {
        assert!("/1.20.4".parse::<EditionVersion>().is_err());
    }

    #[test]
    fn test_cli_parses_run_with_start_stop() {
        let cli = Cli::try_parse_from([
            "mcl",
            "--store-dir",
            "/srv/mcl",
            "run",
            "java/1.20.4",
            "--start-stop",
            "25565:25566/tcp",
            "--start-stop-idle",
            "30s",
        ])
        .unwrap();

        assert_eq!(cli.store_dir, PathBuf::from("/srv/mcl"));
        assert!(matches!(cli.command, Commands::Run(_)));
    }

    #[test]
    fn test_cli_requires_edition() {
        assert!(Cli::try_parse_from(["mcl", "fetch"]).is_err());
    }

    /// Provider with nothing on disk whose prepare check only looks at
    /// fetched files, so it reports no prepare needed before a fetch.
    #[derive(Default)]
    struct UnfetchedProvider {
        fetches: AtomicUsize,
        prepares: AtomicUsize,
        prepare_checks: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Provider for UnfetchedProvider {
        fn edition(&self) -> Edition {
            Edition {
                id: "java",
                name: "Minecraft: Java Edition",
            }
        }

        async fn versions(&self) -> Result<Vec<String>, ProviderError> {
            Ok(vec!["1.20.4".to_string()])
        }

        fn default_version(&self) -> &'static str {
            "1.20.4"
        }

        async fn resolve_version(&self, version: &str) -> Result<String, ProviderError> {
            Ok(version.to_string())
        }

        async fn is_fetch_needed(&self, _inst: &Instance) -> Result<bool, ProviderError> {
            Ok(self.fetches.load(Ordering::SeqCst) == 0)
        }

        async fn fetch(&self, _inst: &Instance) -> Result<(), ProviderError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn is_prepare_needed(&self, _inst: &Instance) -> Result<bool, ProviderError> {
            self.prepare_checks.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }

        async fn prepare(&self, _inst: &Instance) -> Result<(), ProviderError> {
            self.prepares.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn server(
            &self,
            _inst: &Instance,
            _options: RunOptions,
        ) -> Result<Arc<dyn ManagedProcess>, ProviderError> {
            Err(ProviderError::UnknownEdition("java".to_string()))
        }
    }

    fn instance() -> Instance {
        Instance::new("java", "1.20.4", PathBuf::from("store/java/1.20.4"))
    }

    #[tokio::test]
    async fn test_required_fetch_forces_prepare() {
        let provider = UnfetchedProvider::default();
        let inst = instance();

        let needs = requirements(&provider, &inst).await.unwrap();
        assert!(needs.fetch_required);
        assert!(needs.prepare_required);

        ensure_fetched(&provider, &inst, needs).await.unwrap();
        ensure_prepared(&provider, &inst, needs).await.unwrap();

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(provider.prepares.load(Ordering::SeqCst), 1);
        assert_eq!(provider.prepare_checks.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fetched_instance_skips_both_steps() {
        let provider = UnfetchedProvider::default();
        provider.fetches.store(1, Ordering::SeqCst);
        let inst = instance();

        let needs = requirements(&provider, &inst).await.unwrap();
        assert_eq!(needs, ActionRequirements::default());

        ensure_fetched(&provider, &inst, needs).await.unwrap();
        ensure_prepared(&provider, &inst, needs).await.unwrap();

        assert_eq!(provider.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(provider.prepares.load(Ordering::SeqCst), 0);
        assert_eq!(provider.prepare_checks.load(Ordering::SeqCst), 1);
    }
}
