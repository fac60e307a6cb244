//! certdash command-line entry point.
//!
//! Binary name: `certdash`
//!
//! Parses CLI arguments, initializes logging and application state, then
//! dispatches to the command handler.

mod cli;
mod notify;
mod state;

use clap::Parser;
use clap_complete::generate;

use cli::{Cli, Commands};
use state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = certdash_observe::filter_for_verbosity(cli.verbose, cli.quiet);
    certdash_observe::init_tracing(filter, cli.otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    // Shell completions don't need app state
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "certdash", &mut std::io::stdout());
        return Ok(());
    }

    let state = AppState::init(cli.backend_overrides()).await?;

    let result = match cli.command {
        Commands::Runs { action } => cli::runs::handle(&state, action, cli.json).await,
        Commands::Watch { page } => cli::watch::watch(&state, &page, cli.json).await,
        Commands::Dashboard { limit } => {
            cli::dashboard::show_dashboard(&state, limit, cli.json).await
        }
        Commands::Info => cli::info::show_info(&state, cli.json),
        Commands::Completions { .. } => unreachable!("handled above"),
    };

    certdash_observe::shutdown_tracing();
    result
}
