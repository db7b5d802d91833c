//! The edition provider abstraction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use mcl_startstop::ManagedProcess;

use crate::error::ProviderError;
use crate::store::StoreLayout;

/// Identity of a Minecraft edition. Constant for a provider; never does I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edition {
    pub id: &'static str,
    pub name: &'static str,
}

/// A resolved edition/version pair and where its resources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    edition: &'static str,
    version: String,
    base_dir: PathBuf,
}

impl Instance {
    pub fn new(edition: &'static str, version: impl Into<String>, base_dir: PathBuf) -> Self {
        Self {
            edition,
            version: version.into(),
            base_dir,
        }
    }

    pub fn edition(&self) -> &'static str {
        self.edition
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }
}

/// How to run a prepared instance.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Directory the server runs in (world data, properties).
    pub working_dir: PathBuf,
    /// Arguments for the runtime environment, e.g. JVM options.
    pub runtime_args: Vec<String>,
    /// Arguments for the server itself.
    pub server_args: Vec<String>,
}

/// Source of server resources for one edition.
#[async_trait]
pub trait Provider: Send + Sync {
    fn edition(&self) -> Edition;

    /// All versions the provider can fetch and run.
    async fn versions(&self) -> Result<Vec<String>, ProviderError>;

    /// Identifier used when no version is given. May be an alias.
    fn default_version(&self) -> &'static str;

    /// Resolve an alias (e.g. `release`) to a concrete version.
    async fn resolve_version(&self, version: &str) -> Result<String, ProviderError>;

    /// Instance for an already resolved version.
    fn new_instance(&self, version: &str, store: &StoreLayout) -> Result<Instance, ProviderError> {
        let id = self.edition().id;
        let base_dir = store.base_dir(id, version)?;
        Ok(Instance::new(id, version, base_dir))
    }

    async fn is_fetch_needed(&self, inst: &Instance) -> Result<bool, ProviderError>;

    /// Download server resources into the instance's base directory.
    async fn fetch(&self, inst: &Instance) -> Result<(), ProviderError>;

    async fn is_prepare_needed(&self, inst: &Instance) -> Result<bool, ProviderError>;

    /// Turn fetched resources into something immediately runnable.
    async fn prepare(&self, inst: &Instance) -> Result<(), ProviderError>;

    /// The managed server for a fetched and prepared instance.
    fn server(
        &self,
        inst: &Instance,
        options: RunOptions,
    ) -> Result<Arc<dyn ManagedProcess>, ProviderError>;
}
