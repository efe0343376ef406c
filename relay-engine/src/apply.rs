//! Apply a [`Plan`] through the write ports.
//!
//! Each operation is attempted on its own. A failure is recorded and the
//! rest of the plan still runs, except for operations that need a record
//! this plan failed to create, or a status transition that failed.

use std::fmt;

use serde::Serialize;

use relay_core::config::RepoPolicy;
use relay_core::error::{RemoteError, RemoteErrorKind};
use relay_core::ports::{ReviewPlatformPort, TrackerPort};
use relay_core::types::{ContributionId, TrackerLink};
use relay_renderer::{CommentContext, CommentData, CommentKind, CommentRenderer, RenderError};

use crate::classify::{Category, Phase};
use crate::ledger::CommentLedger;
use crate::observe::ObservedState;
use crate::plan::{Operation, Plan, RecordRef};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    PermissionDenied,
    Transient,
    Render,
}

impl From<RemoteErrorKind> for FailureKind {
    fn from(kind: RemoteErrorKind) -> Self {
        match kind {
            RemoteErrorKind::NotFound => FailureKind::NotFound,
            RemoteErrorKind::PermissionDenied => FailureKind::PermissionDenied,
            RemoteErrorKind::Transient => FailureKind::Transient,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::PermissionDenied => write!(f, "permission denied"),
            FailureKind::Transient => write!(f, "transient"),
            FailureKind::Render => write!(f, "render"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedOperation {
    pub operation: Operation,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedOperation {
    pub operation: Operation,
    pub reason: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct ReconcileResult {
    pub contribution: ContributionId,
    pub category: Category,
    pub phase: Phase,
    pub dry_run: bool,
    /// Fingerprint of the plan, identical between a dry run and a live run
    /// over the same observed state.
    pub fingerprint: String,
    pub planned: Vec<Operation>,
    pub applied: Vec<Operation>,
    pub skipped: Vec<SkippedOperation>,
    pub failed: Vec<FailedOperation>,
}

impl ReconcileResult {
    /// Nothing needed doing.
    pub fn is_noop(&self) -> bool {
        self.planned.is_empty()
    }

    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Everything `apply` reads besides the plan.
pub struct ApplyContext<'a> {
    pub platform: &'a dyn ReviewPlatformPort,
    pub tracker: &'a dyn TrackerPort,
    pub renderer: &'a CommentRenderer,
    pub policy: &'a RepoPolicy,
    pub observed: &'a ObservedState,
}

enum Failure {
    Remote(RemoteError),
    Render(RenderError),
}

impl Failure {
    fn kind(&self) -> FailureKind {
        match self {
            Failure::Remote(err) => err.kind.into(),
            Failure::Render(_) => FailureKind::Render,
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Remote(err) => err.fmt(f),
            Failure::Render(err) => err.fmt(f),
        }
    }
}

impl From<RemoteError> for Failure {
    fn from(err: RemoteError) -> Self {
        Failure::Remote(err)
    }
}

impl From<RenderError> for Failure {
    fn from(err: RenderError) -> Self {
        Failure::Render(err)
    }
}

/// Apply `plan`. With `dry_run`, log what would happen and write nothing.
pub fn apply(plan: &Plan, ctx: &ApplyContext<'_>, dry_run: bool) -> ReconcileResult {
    let id = &plan.contribution;
    let mut result = ReconcileResult {
        contribution: id.clone(),
        category: plan.category,
        phase: plan.phase,
        dry_run,
        fingerprint: plan.fingerprint(),
        planned: plan.operations.clone(),
        applied: Vec::new(),
        skipped: Vec::new(),
        failed: Vec::new(),
    };

    let mut ledger = ctx.observed.ledger.clone();
    let mut created: Option<TrackerLink> = None;
    let mut create_failed = false;
    let mut transition_failed = false;

    for op in &plan.operations {
        if dry_run {
            tracing::info!(contribution = %id, op = %op, "[dry-run] would apply");
            continue;
        }
        if create_failed && op.depends_on_create() {
            tracing::warn!(contribution = %id, op = %op, "skipped: tracker record was not created");
            result.skipped.push(SkippedOperation {
                operation: op.clone(),
                reason: "tracker record was not created".to_string(),
            });
            continue;
        }
        if transition_failed && op.depends_on_transition() {
            tracing::warn!(contribution = %id, op = %op, "skipped: status transition failed");
            result.skipped.push(SkippedOperation {
                operation: op.clone(),
                reason: "status transition failed".to_string(),
            });
            continue;
        }
        if let Operation::PostComment { kind, .. } = op {
            if ledger.has_comment(*kind) {
                result.skipped.push(SkippedOperation {
                    operation: op.clone(),
                    reason: format!("{kind} comment already present"),
                });
                continue;
            }
        }

        match execute(op, ctx, &mut ledger, created.as_ref()) {
            Ok(new_link) => {
                if let Some(link) = new_link {
                    tracing::info!(contribution = %id, op = %op, key = %link.key, "applied");
                    created = Some(link);
                } else {
                    tracing::info!(contribution = %id, op = %op, "applied");
                }
                result.applied.push(op.clone());
            }
            Err(err) => {
                match op {
                    Operation::CreateRecord { .. } => create_failed = true,
                    Operation::TransitionStatus { .. } => transition_failed = true,
                    _ => {}
                }
                tracing::error!(
                    contribution = %id,
                    op = %op,
                    kind = %err.kind(),
                    error = %err,
                    "operation failed",
                );
                result.failed.push(FailedOperation {
                    operation: op.clone(),
                    kind: err.kind(),
                    message: err.to_string(),
                });
            }
        }
    }
    result
}

/// Run one operation. Returns the link of a newly created record.
fn execute(
    op: &Operation,
    ctx: &ApplyContext<'_>,
    ledger: &mut CommentLedger,
    created: Option<&TrackerLink>,
) -> Result<Option<TrackerLink>, Failure> {
    let id = &ctx.observed.contribution.id;
    match op {
        Operation::CreateRecord { server, record } => {
            let key = ctx.tracker.create_record(server, record)?;
            return Ok(Some(TrackerLink {
                server: server.clone(),
                key,
            }));
        }
        Operation::DeleteRecord { link } => ctx.tracker.delete_record(link)?,
        Operation::UpdateFields {
            link,
            changes,
            notify,
        } => ctx.tracker.update_fields(link, changes, *notify)?,
        Operation::TransitionStatus { link, to, .. } => ctx.tracker.transition(link, to)?,
        Operation::AddTrackerLabels { link, labels } => ctx.tracker.add_labels(link, labels)?,
        Operation::RemoveTrackerLabels { link, labels } => {
            ctx.tracker.remove_labels(link, labels)?
        }
        Operation::AddContributionLabels { labels } => ctx.platform.add_labels(id, labels)?,
        Operation::RemoveContributionLabels { labels } => {
            ctx.platform.remove_labels(id, labels)?
        }
        Operation::PostComment {
            kind,
            tracker,
            draft,
        } => {
            let link = if kind.is_lead() {
                resolve(tracker.as_ref(), created)
            } else {
                live_link(ctx, created)
            };
            let body = render_comment(ctx.renderer, ctx.observed, ctx.policy, *kind, link.as_ref(), *draft)?;
            let comment = ctx.platform.post_comment(id, &body)?;
            ledger.record(*kind, comment, body);
        }
        Operation::EditComment {
            comment,
            kind,
            tracker,
            draft,
        } => {
            let link = resolve(tracker.as_ref(), created);
            let body = render_comment(ctx.renderer, ctx.observed, ctx.policy, *kind, link.as_ref(), *draft)?;
            ctx.platform.edit_comment(id, comment, &body)?;
        }
        Operation::DeleteComment { comment, .. } => ctx.platform.delete_comment(id, comment)?,
        Operation::SetClaStatus { status } => ctx.platform.set_commit_status(id, status)?,
    }
    Ok(None)
}

fn resolve(tracker: Option<&RecordRef>, created: Option<&TrackerLink>) -> Option<TrackerLink> {
    match tracker? {
        RecordRef::Existing(link) => Some(link.clone()),
        RecordRef::Created => created.cloned(),
    }
}

/// The record non-lead comments may mention.
fn live_link(ctx: &ApplyContext<'_>, created: Option<&TrackerLink>) -> Option<TrackerLink> {
    created
        .cloned()
        .or_else(|| ctx.observed.tracker.link().cloned())
}

/// Render a full comment body, marker and data block included.
///
/// `tracker` goes into both the visible text and, for lead kinds, the data block.
pub fn render_comment(
    renderer: &CommentRenderer,
    observed: &ObservedState,
    policy: &RepoPolicy,
    kind: CommentKind,
    tracker: Option<&TrackerLink>,
    draft: bool,
) -> Result<String, RenderError> {
    let mut ctx = CommentContext::from_contribution(&observed.contribution)
        .with_cla(observed.cla_signed)
        .with_survey_url(policy.survey_url.as_deref());
    if let Some(link) = tracker {
        ctx = ctx.with_tracker(&link.key, &policy.server_info);
    }
    let data = CommentData {
        tracker: tracker.cloned(),
        draft,
    };
    renderer.render(kind, &ctx, &data)
}
