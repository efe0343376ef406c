//! Rescan coordinator: re-run the pipeline over a window of contributions.
//!
//! Passes fan out over a worker pool bounded by `rescan.concurrency`. Each
//! pass runs on the blocking pool since the ports are blocking. A failed
//! pass is reported and never stops the others.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeZone, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use relay_core::config::RescanSettings;
use relay_core::types::{ContributionId, ContributionSummary, RepoName};

use crate::apply::ReconcileResult;
use crate::classify::{Category, Phase};
use crate::error::ReconcileError;
use crate::pipeline::{Reconciler, Trigger};

/// Creation-time bounds. Both ends inclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RescanWindow {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl RescanWindow {
    /// Clamp `since` to the historical cutoff.
    pub fn effective(&self, settings: &RescanSettings) -> RescanWindow {
        let cutoff = Utc.from_utc_datetime(&settings.cutoff.and_time(NaiveTime::default()));
        RescanWindow {
            since: Some(self.since.map_or(cutoff, |since| since.max(cutoff))),
            until: self.until,
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since.map_or(true, |since| at >= since) && self.until.map_or(true, |until| at <= until)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RescanScope {
    Repo(RepoName),
    /// Every repo of an organization.
    Org(String),
}

impl fmt::Display for RescanScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RescanScope::Repo(repo) => write!(f, "repo {repo}"),
            RescanScope::Org(org) => write!(f, "org {org}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RescanRequest {
    pub scope: RescanScope,
    pub window: RescanWindow,
    pub include_closed: bool,
    pub dry_run: bool,
}

/// Per-contribution summary of a successful pass.
#[derive(Debug, Clone, Serialize)]
pub struct RescanOutcome {
    pub contribution: ContributionId,
    pub category: Category,
    pub phase: Phase,
    pub planned: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
    pub fingerprint: String,
}

impl From<&ReconcileResult> for RescanOutcome {
    fn from(result: &ReconcileResult) -> Self {
        RescanOutcome {
            contribution: result.contribution.clone(),
            category: result.category,
            phase: result.phase,
            planned: result.planned.len(),
            applied: result.applied.len(),
            skipped: result.skipped.len(),
            failed: result.failed.len(),
            fingerprint: result.fingerprint.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RescanFailure {
    pub contribution: ContributionId,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RescanReport {
    pub scope: RescanScope,
    /// The window actually used, cutoff applied.
    pub window: RescanWindow,
    pub dry_run: bool,
    pub outcomes: Vec<RescanOutcome>,
    pub errors: Vec<RescanFailure>,
    /// Listed contributions outside the window.
    pub out_of_window: usize,
}

impl RescanReport {
    pub fn planned(&self) -> usize {
        self.outcomes.iter().map(|o| o.planned).sum()
    }

    pub fn applied(&self) -> usize {
        self.outcomes.iter().map(|o| o.applied).sum()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().map(|o| o.skipped).sum()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().map(|o| o.failed).sum()
    }
}

/// Rescan every contribution in `request.scope` created inside the window.
pub async fn rescan(
    reconciler: &Reconciler,
    request: RescanRequest,
    settings: &RescanSettings,
) -> Result<RescanReport, ReconcileError> {
    let window = request.window.effective(settings);
    let listed = {
        let reconciler = reconciler.clone();
        let scope = request.scope.clone();
        let include_closed = request.include_closed;
        tokio::task::spawn_blocking(move || list(&reconciler, &scope, include_closed))
            .await
            .map_err(|err| ReconcileError::Join(format!("listing join error: {err}")))??
    };

    let total = listed.len();
    let mut ids: Vec<ContributionId> = listed
        .into_iter()
        .filter(|summary| window.contains(summary.created_at))
        .map(|summary| summary.id)
        .collect();
    ids.sort();
    ids.dedup();
    let out_of_window = total - ids.len();
    tracing::info!(
        scope = %request.scope,
        contributions = ids.len(),
        out_of_window,
        dry_run = request.dry_run,
        "rescan starting",
    );

    let semaphore = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let mut set = JoinSet::new();
    for id in ids {
        let permit = Arc::clone(&semaphore)
            .acquire_owned()
            .await
            .map_err(|err| ReconcileError::Join(format!("semaphore closed: {err}")))?;
        let reconciler = reconciler.clone();
        let dry_run = request.dry_run;
        set.spawn_blocking(move || {
            let _permit = permit;
            let trigger = Trigger::rescan(id.clone());
            let outcome = catch_unwind(AssertUnwindSafe(|| reconciler.reconcile(&trigger, dry_run)))
                .unwrap_or_else(|_| Err(ReconcileError::Join(format!("pass for {id} panicked"))));
            (id, outcome)
        });
    }

    let mut outcomes = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = set.join_next().await {
        let (id, outcome) =
            joined.map_err(|err| ReconcileError::Join(format!("rescan join error: {err}")))?;
        match outcome {
            Ok(result) => outcomes.push(RescanOutcome::from(&result)),
            Err(err) => {
                tracing::error!(contribution = %id, error = %err, "rescan pass failed");
                errors.push(RescanFailure {
                    contribution: id,
                    error: err.to_string(),
                });
            }
        }
    }
    outcomes.sort_by(|a, b| a.contribution.cmp(&b.contribution));
    errors.sort_by(|a, b| a.contribution.cmp(&b.contribution));

    let report = RescanReport {
        scope: request.scope,
        window,
        dry_run: request.dry_run,
        outcomes,
        errors,
        out_of_window,
    };
    tracing::info!(
        contributions = report.outcomes.len(),
        errors = report.errors.len(),
        planned = report.planned(),
        applied = report.applied(),
        skipped = report.skipped(),
        failed = report.failed(),
        "rescan finished",
    );
    Ok(report)
}

fn list(
    reconciler: &Reconciler,
    scope: &RescanScope,
    include_closed: bool,
) -> Result<Vec<ContributionSummary>, ReconcileError> {
    let platform = reconciler.platform();
    let repos = match scope {
        RescanScope::Repo(repo) => vec![repo.clone()],
        RescanScope::Org(org) => platform
            .list_repos(org)
            .map_err(|source| ReconcileError::Lookup {
                what: format!("repos of {org}"),
                source,
            })?,
    };
    let mut listed = Vec::new();
    for repo in repos {
        let mut found = platform
            .list_contributions(&repo, include_closed)
            .map_err(|source| ReconcileError::Lookup {
                what: format!("contributions of {repo}"),
                source,
            })?;
        listed.append(&mut found);
    }
    Ok(listed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn settings() -> RescanSettings {
        RescanSettings {
            cutoff: NaiveDate::from_ymd_opt(2018, 1, 1).unwrap(),
            concurrency: 2,
        }
    }

    #[test]
    fn window_is_clamped_to_cutoff() {
        let window = RescanWindow::default().effective(&settings());
        let cutoff = Utc.with_ymd_and_hms(2018, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(window.since, Some(cutoff));
        assert!(!window.contains(Utc.with_ymd_and_hms(2017, 12, 31, 23, 59, 59).unwrap()));
        assert!(window.contains(cutoff));
    }

    #[test]
    fn later_since_wins_over_cutoff() {
        let since = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
        let window = RescanWindow {
            since: Some(since),
            until: None,
        }
        .effective(&settings());
        assert_eq!(window.since, Some(since));
    }

    #[test]
    fn until_is_inclusive() {
        let until = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let window = RescanWindow {
            since: None,
            until: Some(until),
        };
        assert!(window.contains(until));
        assert!(!window.contains(until + chrono::Duration::seconds(1)));
    }
}
