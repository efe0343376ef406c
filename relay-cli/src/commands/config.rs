//! `relay config`: validate and locate the configuration.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use relay_core::config::{config_path_at, RelayConfig};

use super::load_config;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Load and validate the config, then list its repo rules.
    Check {
        /// Config file [default: ~/.relay/config.yaml].
        #[arg(long, value_name = "FILE")]
        config: Option<PathBuf>,
    },
    /// Print the default config location.
    Path,
}

#[derive(Tabled)]
struct RuleRow {
    #[tabled(rename = "pattern")]
    pattern: String,
    #[tabled(rename = "server")]
    server: String,
    #[tabled(rename = "external")]
    external: String,
    #[tabled(rename = "blended")]
    blended: String,
    #[tabled(rename = "accepts")]
    accepts: String,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Check { config } => {
            let loaded = load_config(config.as_ref())?;
            print_summary(&loaded);
        }
        ConfigCommand::Path => {
            let home = dirs::home_dir().context("could not determine home directory")?;
            println!("{}", config_path_at(&home).display());
        }
    }
    Ok(())
}

fn print_summary(config: &RelayConfig) {
    println!(
        "{} config is valid | {} tracker servers | {} repo rules | cutoff {} | concurrency {}",
        "✓".green(),
        config.tracker_servers.len(),
        config.repo_rules.len(),
        config.rescan.cutoff,
        config.rescan.concurrency,
    );
    for (nick, server) in &config.tracker_servers {
        println!("  {}  {} ({})", nick.0.bold(), server.url, server.description);
    }
    if config.repo_rules.is_empty() {
        println!("No repo rules: every contribution will be a policy conflict.");
        return;
    }
    let rows: Vec<RuleRow> = config
        .repo_rules
        .iter()
        .map(|rule| RuleRow {
            pattern: rule.pattern.clone(),
            server: rule.server.0.clone(),
            external: format!("{} / {}", rule.external.project, rule.external.issue_type),
            blended: format!("{} / {}", rule.blended.project, rule.blended.issue_type),
            accepts: if rule.accepts_contributions { "yes" } else { "no" }.to_string(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}
