//! `relay rescan`: reconcile every contribution of a repo or organization.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{ArgGroup, Args};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use relay_core::types::RepoName;
use relay_engine::{rescan, RescanReport, RescanRequest, RescanScope, RescanWindow};

use super::WorldArgs;

/// Arguments for `relay rescan`.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("scope").required(true).args(["repo", "org"])))]
pub struct RescanArgs {
    /// Rescan one repository, e.g. `openedx/edx-platform`.
    #[arg(long)]
    pub repo: Option<String>,

    /// Rescan every repository of an organization.
    #[arg(long)]
    pub org: Option<String>,

    /// Only contributions created on or after this date (YYYY-MM-DD).
    #[arg(long)]
    pub since: Option<NaiveDate>,

    /// Only contributions created on or before this date (YYYY-MM-DD).
    #[arg(long)]
    pub until: Option<NaiveDate>,

    /// Include closed and merged contributions.
    #[arg(long)]
    pub include_closed: bool,

    /// Override `rescan.concurrency` from the config.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Show what would change without writing anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the report as JSON.
    #[arg(long)]
    pub json: bool,

    #[command(flatten)]
    pub world: WorldArgs,
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "contribution")]
    contribution: String,
    #[tabled(rename = "category")]
    category: String,
    #[tabled(rename = "phase")]
    phase: String,
    #[tabled(rename = "planned")]
    planned: usize,
    #[tabled(rename = "applied")]
    applied: usize,
    #[tabled(rename = "skipped")]
    skipped: usize,
    #[tabled(rename = "failed")]
    failed: usize,
}

impl RescanArgs {
    pub fn run(self) -> Result<()> {
        let session = self.world.open()?;
        let scope = match (self.repo, self.org) {
            (Some(repo), _) => RescanScope::Repo(RepoName::from(repo)),
            (None, Some(org)) => RescanScope::Org(org),
            (None, None) => bail!("provide --repo or --org"),
        };
        let request = RescanRequest {
            scope,
            window: RescanWindow {
                since: self.since.map(start_of_day),
                until: self.until.map(end_of_day),
            },
            include_closed: self.include_closed,
            dry_run: self.dry_run,
        };
        let mut settings = session.config.rescan.clone();
        if let Some(concurrency) = self.concurrency {
            settings.concurrency = concurrency;
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to start async runtime")?;
        let report = runtime
            .block_on(rescan(&session.reconciler, request, &settings))
            .context("rescan failed")?;
        if !self.dry_run {
            session.persist()?;
        }

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report JSON")?
            );
        } else {
            print_report(&report);
        }

        if !report.errors.is_empty() || report.failed() > 0 {
            bail!(
                "rescan finished with {} failed contributions and {} failed operations",
                report.errors.len(),
                report.failed()
            );
        }
        Ok(())
    }
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn end_of_day(date: NaiveDate) -> DateTime<Utc> {
    let last = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(last))
}

fn print_report(report: &RescanReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    let since = report
        .window
        .since
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "-".to_string());
    let until = report
        .window
        .until
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "now".to_string());
    println!(
        "{prefix}Rescan of {} | {} → {} | {} contributions | {} outside window",
        report.scope,
        since,
        until,
        report.outcomes.len() + report.errors.len(),
        report.out_of_window,
    );

    if !report.outcomes.is_empty() {
        let rows: Vec<OutcomeRow> = report
            .outcomes
            .iter()
            .map(|o| OutcomeRow {
                contribution: o.contribution.to_string(),
                category: o.category.to_string(),
                phase: o.phase.to_string(),
                planned: o.planned,
                applied: o.applied,
                skipped: o.skipped,
                failed: o.failed,
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    for error in &report.errors {
        println!("{}", format!("  ✗  {}: {}", error.contribution, error.error).red());
    }
    println!(
        "{prefix}{} planned, {} applied, {} skipped, {} failed",
        report.planned(),
        report.applied(),
        report.skipped(),
        report.failed(),
    );
}
