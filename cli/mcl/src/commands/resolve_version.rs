use anyhow::Result;
use clap::Args;

use super::{CommandContext, EditionVersion};
use crate::error::CliError;

/// Resolve a version alias.
#[derive(Debug, Args)]
pub struct ResolveVersionCommand {
    /// Edition and version or alias, e.g. `java/release`.
    target: EditionVersion,
}

impl ResolveVersionCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let provider = ctx.provider(&self.target.edition)?;
        let version = self
            .target
            .version
            .as_deref()
            .unwrap_or_else(|| provider.default_version());

        let resolved = provider
            .resolve_version(version)
            .await
            .map_err(CliError::from)?;
        println!("{resolved}");
        Ok(())
    }
}
