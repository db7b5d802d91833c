use anyhow::Result;
use clap::Args;

use super::CommandContext;
use crate::error::CliError;

/// List versions an edition provides, newest first.
#[derive(Debug, Args)]
pub struct ListVersionsCommand {
    /// Edition identifier, e.g. `java`.
    edition: String,
}

impl ListVersionsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let provider = ctx.provider(&self.edition)?;
        let versions = provider.versions().await.map_err(CliError::from)?;
        for version in versions {
            println!("{version}");
        }
        Ok(())
    }
}
