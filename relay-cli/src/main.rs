//! Relay: contribution / issue-tracker reconciliation CLI.
//!
//! # Usage
//!
//! ```text
//! relay reconcile <org/repo#N> --world <snapshot.json> [--action opened] [--dry-run] [--json]
//! relay reconcile --tracker-link <server:KEY> --world <snapshot.json>
//! relay rescan (--repo <org/repo> | --org <org>) --world <snapshot.json> [--since DATE] [--until DATE]
//!              [--include-closed] [--dry-run] [--json]
//! relay preview <org/repo#N> --world <snapshot.json>
//! relay config check [--config <path>]
//! relay config path
//! ```
//!
//! Every command reads `~/.relay/config.yaml` unless `--config` is given.
//! Logs go to stderr; `--json-logs` switches them to JSON lines.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, preview::PreviewArgs, reconcile::ReconcileArgs, rescan::RescanArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "relay",
    version,
    about = "Keep contributions and their issue-tracker records in step",
    long_about = None,
)]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation pass for a contribution.
    Reconcile(ReconcileArgs),

    /// Reconcile every contribution of a repo or organization.
    Rescan(RescanArgs),

    /// Show the bot comments a pass would post, edit or delete.
    Preview(PreviewArgs),

    /// Inspect the configuration.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    match cli.command {
        Commands::Reconcile(args) => args.run(),
        Commands::Rescan(args) => args.run(),
        Commands::Preview(args) => args.run(),
        Commands::Config { command } => commands::config::run(command),
    }
}

fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
