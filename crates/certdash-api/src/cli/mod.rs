//! CLI command definitions for the `certdash` binary.
//!
//! Uses clap derive macros. One-shot commands live under `runs`; `watch`
//! opens the live run list and `dashboard` prints the overview.

pub mod dashboard;
pub mod info;
pub mod render;
pub mod runs;
pub mod watch;

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

use certdash_core::dashboard::LATEST_RUNS;

use crate::state::BackendOverrides;

/// Inspect and manage certimate workflow runs.
#[derive(Parser)]
#[command(name = "certdash", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output machine-readable JSON instead of styled text.
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress all output except errors.
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Detailed output (-v for verbose, -vv for debug, -vvv for trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Export tracing spans through OpenTelemetry (stdout exporter).
    #[arg(long, global = true)]
    pub otel: bool,

    /// Backend base URL (overrides config.toml).
    #[arg(long, global = true, env = "CERTDASH_BACKEND_URL")]
    pub backend: Option<String>,

    /// Auth token for the backend (overrides config.toml).
    #[arg(long, global = true, env = "CERTDASH_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn backend_overrides(&self) -> BackendOverrides {
        BackendOverrides {
            url: self.backend.clone(),
            token: self.token.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// One-shot run operations (list, show, cancel, delete).
    Runs {
        #[command(subcommand)]
        action: RunsCommand,
    },

    /// Live run list with realtime status updates.
    Watch {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Certificate and workflow totals plus the newest runs of every workflow.
    Dashboard {
        /// Number of recent runs to show.
        #[arg(long, default_value_t = LATEST_RUNS)]
        limit: u32,
    },

    /// Version and documentation links.
    Info,

    /// Generate shell completions.
    Completions {
        /// Target shell.
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum RunsCommand {
    /// List runs, newest first.
    #[command(alias = "ls")]
    List {
        #[command(flatten)]
        page: PageArgs,
    },

    /// Show one run in full.
    Show {
        /// Run ID.
        id: String,
    },

    /// Cancel a pending or processing run.
    Cancel {
        /// Run ID.
        id: String,
    },

    /// Delete finished runs. In-flight runs are skipped.
    #[command(alias = "rm")]
    Delete {
        /// Run IDs.
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

/// Page selection shared by `runs list` and `watch`.
#[derive(Args, Debug, Clone)]
pub struct PageArgs {
    /// Only runs of this workflow.
    #[arg(long)]
    pub workflow: Option<String>,

    /// 1-based page number.
    #[arg(long, default_value = "1")]
    pub page: u32,

    /// Page size (defaults to `ui.default_per_page` from config.toml).
    #[arg(long)]
    pub per_page: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_watch_with_page_args() {
        let cli = Cli::try_parse_from([
            "certdash", "watch", "--workflow", "wf1", "--page", "2", "--per-page", "5",
        ])
        .unwrap();
        match cli.command {
            Commands::Watch { page } => {
                assert_eq!(page.workflow.as_deref(), Some("wf1"));
                assert_eq!(page.page, 2);
                assert_eq!(page.per_page, Some(5));
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn dashboard_defaults_to_latest_fifteen() {
        let cli = Cli::try_parse_from(["certdash", "dashboard"]).unwrap();
        assert!(matches!(cli.command, Commands::Dashboard { limit: 15 }));

        let cli = Cli::try_parse_from(["certdash", "dashboard", "--limit", "5"]).unwrap();
        assert!(matches!(cli.command, Commands::Dashboard { limit: 5 }));
    }

    #[test]
    fn delete_requires_ids() {
        assert!(Cli::try_parse_from(["certdash", "runs", "rm"]).is_err());
        assert!(Cli::try_parse_from(["certdash", "runs", "rm", "a", "b"]).is_ok());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["certdash", "info", "--json", "-vv", "--backend", "http://x"])
            .unwrap();
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.backend_overrides().url.as_deref(), Some("http://x"));
    }
}
