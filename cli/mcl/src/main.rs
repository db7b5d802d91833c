//! mcl - Minecraft launcher for server deployments
//!
//! Fetches, prepares and runs Minecraft servers. With `run --start-stop` the
//! server is started on the first incoming connection and stopped again once
//! it has been idle.

use clap::Parser;

mod commands;
mod error;
mod logging;

use commands::Cli;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level(), cli.log_format()) {
        error::print_error(&e);
        std::process::exit(1);
    }

    if let Err(e) = cli.run().await {
        error::print_error(&e);
        std::process::exit(1);
    }
}
