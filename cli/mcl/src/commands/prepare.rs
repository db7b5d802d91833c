use anyhow::Result;
use clap::Args;

use super::{ensure_fetched, ensure_prepared, requirements, CommandContext, EditionVersion};

/// Prepare fetched server resources, fetching them first if needed.
#[derive(Debug, Args)]
pub struct PrepareCommand {
    /// Edition and optional version, e.g. `java` or `java/1.20.4`.
    target: EditionVersion,
}

impl PrepareCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (provider, inst) = ctx.instance(&self.target).await?;
        let needs = requirements(provider.as_ref(), &inst).await?;
        ensure_fetched(provider.as_ref(), &inst, needs).await?;
        ensure_prepared(provider.as_ref(), &inst, needs).await
    }
}
