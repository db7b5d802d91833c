use anyhow::Result;
use clap::Args;

/// Print version and build information.
#[derive(Debug, Args)]
pub struct VersionCommand {
    /// Print only the mcl version.
    #[arg(short = 'v', long)]
    version_only: bool,
}

impl VersionCommand {
    pub fn run(self) -> Result<()> {
        let version = env!("CARGO_PKG_VERSION");
        if self.version_only {
            println!("{version}");
            return Ok(());
        }

        let rows = [
            ("Version:", version),
            ("Revision:", option_env!("MCL_REVISION").unwrap_or("unknown")),
            ("Build Date:", option_env!("MCL_BUILD_DATE").unwrap_or("unknown")),
            ("Arch:", std::env::consts::ARCH),
            ("OS:", std::env::consts::OS),
        ];
        let width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        for (label, value) in rows {
            println!("{label:<width$} {value}");
        }
        Ok(())
    }
}
