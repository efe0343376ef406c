//! `relay reconcile`: one pass for one contribution.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;

use relay_core::types::{ContributionId, TrackerLink};
use relay_engine::{ContributionAction, ReconcileResult, Trigger};

use super::WorldArgs;

/// Arguments for `relay reconcile`.
#[derive(Args, Debug)]
pub struct ReconcileArgs {
    /// Contribution to reconcile, e.g. `openedx/edx-platform#123`.
    #[arg(required_unless_present = "tracker_link", conflicts_with = "tracker_link")]
    pub contribution: Option<ContributionId>,

    /// Reconcile the contribution behind a tracker record, e.g. `openedx:OSPR-12`.
    #[arg(long, value_name = "SERVER:KEY")]
    pub tracker_link: Option<TrackerLink>,

    /// The platform event that triggered this pass.
    #[arg(long, default_value = "rescan")]
    pub action: ContributionAction,

    /// Show what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the result as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub world: WorldArgs,
}

impl ReconcileArgs {
    pub fn run(self) -> Result<()> {
        let session = self.world.open()?;
        let trigger = match (self.contribution, self.tracker_link) {
            (Some(id), _) => Trigger::ContributionChanged {
                id,
                action: self.action,
            },
            (None, Some(link)) => Trigger::TrackerStatusChanged { link },
            (None, None) => bail!("provide a contribution or --tracker-link"),
        };

        let result = session
            .reconciler
            .reconcile(&trigger, self.dry_run)
            .context("reconciliation failed")?;
        if !self.dry_run {
            session.persist()?;
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&result).context("failed to serialize result JSON")?
            );
        } else {
            print_result(&result);
        }

        if result.has_failures() {
            bail!(
                "{} of {} operations failed for {}",
                result.failed.len(),
                result.planned.len(),
                result.contribution
            );
        }
        Ok(())
    }
}

pub fn print_result(result: &ReconcileResult) {
    let prefix = if result.dry_run { "[dry-run] " } else { "" };
    let heading = format!(
        "{} ({}, {})",
        result.contribution, result.category, result.phase
    );
    if result.is_noop() {
        println!("{prefix}✓ {heading}: nothing to do");
        return;
    }

    println!(
        "{prefix}✓ {heading} ({} planned, {} applied, {} skipped, {} failed)",
        result.planned.len(),
        result.applied.len(),
        result.skipped.len(),
        result.failed.len(),
    );
    if result.dry_run {
        for op in &result.planned {
            println!("  ~  {op}");
        }
        return;
    }
    for op in &result.applied {
        println!("  ✎  {op}");
    }
    for skipped in &result.skipped {
        println!("  ·  {} ({})", skipped.operation, skipped.reason);
    }
    for failed in &result.failed {
        let line = format!("  ✗  {} ({}: {})", failed.operation, failed.kind, failed.message);
        println!("{}", line.red());
    }
}
