//! Desired-state calculator.
//!
//! | Category        | Phase            | Record | Status                       | Labels (contribution / tracker) |
//! |-----------------|------------------|--------|------------------------------|---------------------------------|
//! | Bot, Internal   | any              | no     | untouched                    | untouched                       |
//! | Refused         | any              | no     | n/a                          | none / n/a                      |
//! | Blended         | Draft            | yes    | draft                        | blended / blended               |
//! | Blended         | Open             | yes    | triage (replaces draft only) | blended / blended               |
//! | RegularExternal | Draft            | yes    | draft                        | open-source-contribution / -    |
//! | RegularExternal | Open, no CLA     | yes    | CLA review                   | open-source-contribution / -    |
//! | RegularExternal | Open, CLA        | yes    | triage                       | open-source-contribution / -    |
//! | any with record | Closed           | kept   | unchanged, recorded          | + mirrored status label         |
//! | any with record | Reopened         | kept   | recorded pre-close status    | status label dropped            |
//!
//! Every category, hands-off ones included, gets a CLA commit status when the
//! repo has a check configured. Authors with core contributor rights get the
//! `core contributor` label unless the contribution is hands-off.

use std::collections::BTreeSet;

use relay_core::config::{ClaCheck, RepoPolicy, StatusNames};
use relay_core::types::{
    CheckState, CommitStatus, Contribution, ServerNick, TrackerFields, TrackerKey,
};
use relay_renderer::CommentKind;

use crate::classify::{Category, Phase, BLENDED_LABEL, CORE_CONTRIBUTOR_LABEL, OSPR_LABEL};
use crate::observe::ObservedState;

/// The tracker record a contribution should have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredTracker {
    pub server: ServerNick,
    pub project: String,
    pub issue_type: String,
    /// Status a freshly created record starts in.
    pub initial_status: String,
    /// Target status of an existing record. `None` leaves the status alone.
    pub status: Option<String>,
    pub fields: TrackerFields,
    pub epic: Option<TrackerKey>,
    pub labels: BTreeSet<String>,
    /// Tracker labels the engine may remove.
    pub managed_labels: BTreeSet<String>,
}

/// Target state of both records for one pass. Never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredState {
    pub category: Category,
    pub phase: Phase,
    pub tracker: Option<DesiredTracker>,
    /// The linked record is in the wrong place and must be replaced.
    pub requires_recreate: bool,
    pub contribution_labels: BTreeSet<String>,
    /// Contribution labels the engine may remove. Everything else is human.
    pub managed_contribution_labels: BTreeSet<String>,
    /// Every comment kind that should exist, lead included.
    pub comments: BTreeSet<CommentKind>,
    pub lead: Option<CommentKind>,
    /// `None` when the repo has no CLA check.
    pub cla_status: Option<CommitStatus>,
}

impl DesiredState {
    fn hands_off(category: Category, phase: Phase, cla_status: Option<CommitStatus>) -> Self {
        DesiredState {
            category,
            phase,
            cla_status,
            tracker: None,
            requires_recreate: false,
            contribution_labels: BTreeSet::new(),
            managed_contribution_labels: BTreeSet::new(),
            comments: BTreeSet::new(),
            lead: None,
        }
    }
}

/// Compute the desired state from a classified contribution and what was observed.
pub fn desired_state(
    category: Category,
    phase: Phase,
    observed: &ObservedState,
    policy: &RepoPolicy,
) -> DesiredState {
    let cla_status = policy
        .cla_check
        .as_ref()
        .map(|check| cla_status(category, observed.cla_signed, check));
    if category.is_hands_off() {
        return DesiredState::hands_off(category, phase, cla_status);
    }
    let contribution = &observed.contribution;
    let draft = contribution.draft;
    let closed = phase == Phase::Closed;

    let tracker = category
        .project_target(policy)
        .map(|target| (target, observed.tracker.link(), observed.tracker.record()));

    let mut requires_recreate = false;
    let desired_tracker = tracker.map(|(target, link, existing)| {
        // A record on another server or in another project can't be moved.
        let recreate = match (link, existing) {
            (Some(link), Some(record)) => {
                link.server != policy.server
                    || record.project != target.project
                    || record.issue_type != target.issue_type
            }
            _ => false,
        };
        requires_recreate = recreate;
        let existing = existing.filter(|_| !recreate);

        let (want, replaceable) = wanted_status(category, draft, observed.cla_signed, &policy.statuses);
        let initial_status = want.to_string();

        let status = match (phase, existing) {
            (_, None) | (Phase::Closed, _) => None,
            (Phase::Reopened, Some(record)) => {
                let base = record.fields.prior_status.as_deref().unwrap_or(&record.status);
                let target = settle(base, want, &replaceable);
                (target != record.status).then(|| target.to_string())
            }
            (Phase::Draft | Phase::Open, Some(record)) => {
                let target = settle(&record.status, want, &replaceable);
                (target != record.status).then(|| target.to_string())
            }
        };

        let current_status = existing
            .map(|r| r.status.clone())
            .unwrap_or_else(|| initial_status.clone());
        let prior_status = match phase {
            Phase::Closed => existing
                .and_then(|r| r.fields.prior_status.clone())
                .or_else(|| Some(current_status.clone())),
            _ => None,
        };

        let epic = match category {
            Category::Blended => observed
                .blended_epic
                .clone()
                .or_else(|| existing.and_then(|r| r.epic.clone())),
            _ => existing.and_then(|r| r.epic.clone()),
        };

        let mut labels = BTreeSet::new();
        if category == Category::Blended {
            labels.insert(BLENDED_LABEL.to_string());
        }

        DesiredTracker {
            server: policy.server.clone(),
            project: target.project.clone(),
            issue_type: target.issue_type.clone(),
            initial_status,
            status,
            fields: TrackerFields {
                summary: contribution.title.clone(),
                description: record_description(contribution),
                origin_url: contribution.html_url.clone(),
                contribution_number: contribution.id.number,
                repo: contribution.id.repo.0.clone(),
                contributor: contribution.author.clone(),
                institution: observed.institution.clone(),
                lines_added: contribution.additions,
                lines_removed: contribution.deletions,
                prior_status,
            },
            epic,
            labels,
            managed_labels: [BLENDED_LABEL.to_string()].into_iter().collect(),
        }
    });

    // Contribution labels.
    let mut contribution_labels = BTreeSet::new();
    if let Some(label) = category.contribution_label() {
        contribution_labels.insert(label.to_string());
    }
    if observed.core_contributor {
        contribution_labels.insert(CORE_CONTRIBUTOR_LABEL.to_string());
    }
    if closed {
        let status = desired_tracker.as_ref().map(|t| {
            observed
                .tracker
                .record()
                .filter(|_| !requires_recreate)
                .map(|r| r.status.clone())
                .unwrap_or_else(|| t.initial_status.clone())
        });
        if let Some(label) = status.and_then(|s| policy.status_label(&s)) {
            contribution_labels.insert(label);
        }
    }
    let mut managed_contribution_labels: BTreeSet<String> =
        [OSPR_LABEL.to_string(), BLENDED_LABEL.to_string()].into_iter().collect();
    managed_contribution_labels.extend(policy.status_labels.iter().cloned());

    // Comments.
    let mut comments = BTreeSet::new();
    let existing_lead = observed.ledger.lead().map(|e| e.kind);
    let lead = match category {
        Category::RegularExternal if closed => match existing_lead {
            Some(kind @ (CommentKind::Welcome | CommentKind::WelcomeClosed)) => Some(kind),
            _ => Some(CommentKind::WelcomeClosed),
        },
        Category::RegularExternal => Some(CommentKind::Welcome),
        Category::Blended => Some(CommentKind::BlendedWelcome),
        Category::Refused if !closed => Some(CommentKind::NoContributions),
        _ => None,
    };
    comments.extend(lead);
    if category == Category::RegularExternal && !closed {
        if !observed.cla_signed {
            comments.insert(CommentKind::NeedsCla);
        }
        if draft {
            comments.insert(CommentKind::DraftNotice);
        }
    }
    if closed && matches!(category, Category::RegularExternal | Category::Blended) {
        comments.insert(CommentKind::Survey);
    }

    DesiredState {
        category,
        phase,
        tracker: desired_tracker,
        requires_recreate,
        contribution_labels,
        managed_contribution_labels,
        comments,
        lead,
        cla_status,
    }
}

/// The CLA commit status a contribution should carry.
fn cla_status(category: Category, cla_signed: bool, check: &ClaCheck) -> CommitStatus {
    let (state, description, linked) = match category {
        Category::Bot => (CheckState::Success, "Bots don't need contributor agreements", false),
        Category::Refused => (
            CheckState::Failure,
            "This repo does not accept outside contributions except under contract",
            false,
        ),
        Category::Internal => (CheckState::Success, "The author is authorized to contribute", true),
        _ if cla_signed => (CheckState::Success, "The author is authorized to contribute", true),
        _ => (CheckState::Failure, "We need a signed Contributor Agreement", true),
    };
    CommitStatus {
        context: check.context.clone(),
        state,
        description: description.to_string(),
        target_url: linked.then(|| check.detail_url.clone()),
    }
}

/// Record body: where the contribution came from, then its description.
fn record_description(contribution: &Contribution) -> String {
    format!(
        "(From {} by {})\n------\n\n{}",
        contribution.html_url,
        contribution.author_url,
        contribution.body.as_deref().unwrap_or_default()
    )
}

/// The status the engine wants for an open contribution, and the statuses
/// it may replace to get there.
fn wanted_status<'a>(
    category: Category,
    draft: bool,
    cla_signed: bool,
    statuses: &'a StatusNames,
) -> (&'a str, Vec<&'a str>) {
    if draft {
        return (
            statuses.draft.as_str(),
            vec![statuses.triage.as_str(), statuses.cla_review.as_str()],
        );
    }
    match category {
        Category::RegularExternal if !cla_signed => {
            (statuses.cla_review.as_str(), vec![statuses.draft.as_str()])
        }
        Category::RegularExternal => (
            statuses.triage.as_str(),
            vec![statuses.draft.as_str(), statuses.cla_review.as_str()],
        ),
        _ => (statuses.triage.as_str(), vec![statuses.draft.as_str()]),
    }
}

/// `want` if `base` is one of the engine's own statuses it may replace,
/// otherwise `base`: anything else is human progress.
fn settle<'a>(base: &'a str, want: &'a str, replaceable: &[&str]) -> &'a str {
    if replaceable.contains(&base) {
        want
    } else {
        base
    }
}
