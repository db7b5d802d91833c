use anyhow::Result;
use clap::Args;

use super::{ensure_fetched, requirements, CommandContext, EditionVersion};

/// Fetch server resources.
#[derive(Debug, Args)]
pub struct FetchCommand {
    /// Edition and optional version, e.g. `java` or `java/1.20.4`.
    target: EditionVersion,
}

impl FetchCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (provider, inst) = ctx.instance(&self.target).await?;
        let needs = requirements(provider.as_ref(), &inst).await?;
        ensure_fetched(provider.as_ref(), &inst, needs).await
    }
}
