//! Diff: desired vs observed → an ordered list of idempotent [`Operation`]s.
//!
//! Order: record create/delete, field updates, status, tracker labels,
//! contribution labels, comments, CLA commit status.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use relay_core::types::{
    CommentId, CommitStatus, ContributionId, FieldChange, NewTrackerRecord, ServerNick, TrackerKey, TrackerLink,
    TrackerRecord,
};
use relay_renderer::{parse_data, CommentKind};

use crate::classify::{Category, Phase};
use crate::desired::{DesiredState, DesiredTracker};
use crate::observe::ObservedState;

/// The record a comment's data block should point at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordRef {
    Existing(TrackerLink),
    /// The record created earlier in the same plan.
    Created,
}

impl fmt::Display for RecordRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordRef::Existing(link) => link.fmt(f),
            RecordRef::Created => write!(f, "<new record>"),
        }
    }
}

/// One write against either remote system. Every variant is safe to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    CreateRecord {
        server: ServerNick,
        record: NewTrackerRecord,
    },
    /// Only emitted to retire a record replaced by `CreateRecord`.
    DeleteRecord { link: TrackerLink },
    UpdateFields {
        link: TrackerLink,
        changes: Vec<FieldChange>,
        notify: bool,
    },
    TransitionStatus {
        link: TrackerLink,
        from: String,
        to: String,
    },
    AddTrackerLabels {
        link: TrackerLink,
        labels: BTreeSet<String>,
    },
    RemoveTrackerLabels {
        link: TrackerLink,
        labels: BTreeSet<String>,
    },
    AddContributionLabels { labels: BTreeSet<String> },
    RemoveContributionLabels { labels: BTreeSet<String> },
    PostComment {
        kind: CommentKind,
        /// Lead comments only.
        tracker: Option<RecordRef>,
        draft: bool,
    },
    /// Rewrite the lead comment (kind, link or draft flag changed).
    EditComment {
        comment: CommentId,
        kind: CommentKind,
        tracker: Option<RecordRef>,
        draft: bool,
    },
    DeleteComment {
        comment: CommentId,
        kind: CommentKind,
    },
    SetClaStatus { status: CommitStatus },
}

impl Operation {
    /// Operations that make no sense if this plan's `CreateRecord` failed.
    pub fn depends_on_create(&self) -> bool {
        match self {
            Operation::DeleteRecord { .. } => true,
            Operation::PostComment { tracker, .. } | Operation::EditComment { tracker, .. } => {
                matches!(tracker, Some(RecordRef::Created))
            }
            _ => false,
        }
    }

    /// Operations that must wait for this plan's `TransitionStatus` to succeed.
    pub fn depends_on_transition(&self) -> bool {
        match self {
            Operation::UpdateFields { changes, .. } => {
                changes.contains(&FieldChange::PriorStatus(None))
            }
            _ => false,
        }
    }

    pub fn is_comment(&self) -> bool {
        matches!(
            self,
            Operation::PostComment { .. }
                | Operation::EditComment { .. }
                | Operation::DeleteComment { .. }
        )
    }
}

fn join(labels: &BTreeSet<String>) -> String {
    labels.iter().cloned().collect::<Vec<_>>().join(", ")
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::CreateRecord { server, record } => {
                write!(
                    f,
                    "create {} in {} on {} with status {:?}",
                    record.issue_type, record.project, server, record.status
                )?;
                if !record.labels.is_empty() {
                    write!(f, ", labels [{}]", join(&record.labels))?;
                }
                if let Some(epic) = &record.epic {
                    write!(f, ", epic {epic}")?;
                }
                Ok(())
            }
            Operation::DeleteRecord { link } => write!(f, "delete record {link}"),
            Operation::UpdateFields {
                link,
                changes,
                notify,
            } => {
                let changes: Vec<String> = changes.iter().map(|c| c.to_string()).collect();
                write!(f, "update {link}: {}", changes.join(", "))?;
                if *notify {
                    write!(f, " (notify)")?;
                }
                Ok(())
            }
            Operation::TransitionStatus { link, from, to } => {
                write!(f, "transition {link}: {from:?} -> {to:?}")
            }
            Operation::AddTrackerLabels { link, labels } => {
                write!(f, "add labels to {link}: [{}]", join(labels))
            }
            Operation::RemoveTrackerLabels { link, labels } => {
                write!(f, "remove labels from {link}: [{}]", join(labels))
            }
            Operation::AddContributionLabels { labels } => {
                write!(f, "add labels: [{}]", join(labels))
            }
            Operation::RemoveContributionLabels { labels } => {
                write!(f, "remove labels: [{}]", join(labels))
            }
            Operation::PostComment {
                kind,
                tracker,
                draft,
            } => {
                write!(f, "post {kind} comment")?;
                write_lead(f, tracker, *draft, kind.is_lead())
            }
            Operation::EditComment {
                comment,
                kind,
                tracker,
                draft,
            } => {
                write!(f, "edit comment {comment} as {kind}")?;
                write_lead(f, tracker, *draft, true)
            }
            Operation::DeleteComment { comment, kind } => {
                write!(f, "delete {kind} comment {comment}")
            }
            Operation::SetClaStatus { status } => write!(
                f,
                "set {} status: {} ({:?})",
                status.context, status.state, status.description
            ),
        }
    }
}

fn write_lead(
    f: &mut fmt::Formatter<'_>,
    tracker: &Option<RecordRef>,
    draft: bool,
    lead: bool,
) -> fmt::Result {
    if !lead {
        return Ok(());
    }
    match tracker {
        Some(tracker) => write!(f, " (tracker {tracker}")?,
        None => write!(f, " (no tracker")?,
    }
    if draft {
        write!(f, ", draft")?;
    }
    write!(f, ")")
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// Everything one pass intends to do to one contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub contribution: ContributionId,
    pub category: Category,
    pub phase: Phase,
    pub operations: Vec<Operation>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// SHA-256 of the plan's text form. Equal plans have equal fingerprints.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.to_string().as_bytes());
        hex::encode(h.finalize())
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}, {})", self.contribution, self.category, self.phase)?;
        for op in &self.operations {
            writeln!(f, "  - {op}")?;
        }
        Ok(())
    }
}

/// Diff `desired` against `observed`.
pub fn build(desired: &DesiredState, observed: &ObservedState) -> Plan {
    let mut plan = Plan {
        contribution: observed.contribution.id.clone(),
        category: desired.category,
        phase: desired.phase,
        operations: Vec::new(),
    };
    let cla_status = desired
        .cla_status
        .as_ref()
        .filter(|status| observed.cla_status.as_ref() != Some(*status))
        .map(|status| Operation::SetClaStatus {
            status: status.clone(),
        });
    if desired.category.is_hands_off() {
        plan.operations.extend(cla_status);
        return plan;
    }
    let ops = &mut plan.operations;
    let linked = match (observed.tracker.link(), observed.tracker.record()) {
        (Some(link), Some(record)) => Some((link, record)),
        _ => None,
    };

    // 1. Record existence.
    let lead_tracker = match (&desired.tracker, linked) {
        (Some(tracker), None) => {
            ops.push(create(tracker));
            Some(RecordRef::Created)
        }
        (Some(tracker), Some((link, _))) if desired.requires_recreate => {
            ops.push(create(tracker));
            ops.push(Operation::DeleteRecord { link: link.clone() });
            Some(RecordRef::Created)
        }
        (_, Some((link, _))) => Some(RecordRef::Existing(link.clone())),
        (None, None) => None,
    };

    // 2-4. Fields, status and tracker labels of a record kept in place.
    if let (Some(tracker), Some((link, record))) = (&desired.tracker, linked) {
        if !desired.requires_recreate {
            let transition = tracker
                .status
                .as_ref()
                .filter(|status| **status != record.status)
                .map(|status| Operation::TransitionStatus {
                    link: link.clone(),
                    from: record.status.clone(),
                    to: status.clone(),
                });
            // The recorded pre-close status is only cleared once the record
            // is back in it, so it must not be written before the transition.
            let (deferred, changes): (Vec<_>, Vec<_>) = field_changes(tracker, record)
                .into_iter()
                .partition(|c| transition.is_some() && *c == FieldChange::PriorStatus(None));
            push_update(ops, link, changes);
            ops.extend(transition);
            push_update(ops, link, deferred);
            let (add, remove) = label_diff(&tracker.labels, &tracker.managed_labels, &record.labels);
            if !add.is_empty() {
                ops.push(Operation::AddTrackerLabels {
                    link: link.clone(),
                    labels: add,
                });
            }
            if !remove.is_empty() {
                ops.push(Operation::RemoveTrackerLabels {
                    link: link.clone(),
                    labels: remove,
                });
            }
        }
    }

    // 5. Contribution labels.
    let (add, remove) = label_diff(
        &desired.contribution_labels,
        &desired.managed_contribution_labels,
        &observed.contribution.labels,
    );
    if !add.is_empty() {
        ops.push(Operation::AddContributionLabels { labels: add });
    }
    if !remove.is_empty() {
        ops.push(Operation::RemoveContributionLabels { labels: remove });
    }

    // 6. Comments: lead first, so it stays the first bot comment.
    let ledger = &observed.ledger;
    let draft = observed.contribution.draft;
    let mut edited_lead: Option<&CommentId> = None;
    if let Some(kind) = desired.lead {
        match ledger.lead() {
            None => ops.push(Operation::PostComment {
                kind,
                tracker: lead_tracker.clone(),
                draft,
            }),
            Some(entry) => {
                let data = parse_data(&entry.body).unwrap_or_default();
                let link_changed = match &lead_tracker {
                    Some(RecordRef::Created) => true,
                    Some(RecordRef::Existing(link)) => data.tracker.as_ref() != Some(link),
                    None => data.tracker.is_some(),
                };
                let changed = if desired.phase == Phase::Closed {
                    link_changed
                } else {
                    link_changed || entry.kind != kind || data.draft != draft
                };
                if changed {
                    edited_lead = Some(&entry.id);
                    ops.push(Operation::EditComment {
                        comment: entry.id.clone(),
                        kind,
                        tracker: lead_tracker.clone(),
                        draft,
                    });
                }
            }
        }
    }
    for kind in &desired.comments {
        if Some(*kind) == desired.lead || ledger.has_comment(*kind) {
            continue;
        }
        ops.push(Operation::PostComment {
            kind: *kind,
            tracker: None,
            draft: false,
        });
    }
    for entry in ledger.entries() {
        if desired.comments.contains(&entry.kind)
            || !entry.kind.is_retractable()
            || edited_lead == Some(&entry.id)
        {
            continue;
        }
        ops.push(Operation::DeleteComment {
            comment: entry.id.clone(),
            kind: entry.kind,
        });
    }
    for entry in ledger.duplicates() {
        if entry.kind.is_retractable() {
            ops.push(Operation::DeleteComment {
                comment: entry.id.clone(),
                kind: entry.kind,
            });
        }
    }

    // 7. CLA commit status.
    ops.extend(cla_status);

    plan
}

fn push_update(ops: &mut Vec<Operation>, link: &TrackerLink, changes: Vec<FieldChange>) {
    if changes.is_empty() {
        return;
    }
    let notify = changes.iter().any(FieldChange::notifies);
    ops.push(Operation::UpdateFields {
        link: link.clone(),
        changes,
        notify,
    });
}

fn create(tracker: &DesiredTracker) -> Operation {
    Operation::CreateRecord {
        server: tracker.server.clone(),
        record: NewTrackerRecord {
            project: tracker.project.clone(),
            issue_type: tracker.issue_type.clone(),
            status: tracker.initial_status.clone(),
            labels: tracker.labels.clone(),
            fields: tracker.fields.clone(),
            epic: tracker.epic.clone(),
        },
    }
}

/// Changed fields only; never assign a field the value it already holds.
fn field_changes(tracker: &DesiredTracker, record: &TrackerRecord) -> Vec<FieldChange> {
    let want = &tracker.fields;
    let have = &record.fields;
    let mut changes = Vec::new();
    if want.summary != have.summary {
        changes.push(FieldChange::Summary(want.summary.clone()));
    }
    if want.description != have.description {
        changes.push(FieldChange::Description(want.description.clone()));
    }
    if want.origin_url != have.origin_url {
        changes.push(FieldChange::OriginUrl(want.origin_url.clone()));
    }
    if want.contribution_number != have.contribution_number {
        changes.push(FieldChange::ContributionNumber(want.contribution_number));
    }
    if want.repo != have.repo {
        changes.push(FieldChange::Repo(want.repo.clone()));
    }
    if want.contributor != have.contributor {
        changes.push(FieldChange::Contributor(want.contributor.clone()));
    }
    if want.institution != have.institution {
        changes.push(FieldChange::Institution(want.institution.clone()));
    }
    if want.lines_added != have.lines_added {
        changes.push(FieldChange::LinesAdded(want.lines_added));
    }
    if want.lines_removed != have.lines_removed {
        changes.push(FieldChange::LinesRemoved(want.lines_removed));
    }
    if want.prior_status != have.prior_status {
        changes.push(FieldChange::PriorStatus(want.prior_status.clone()));
    }
    if tracker.epic != record.epic {
        changes.push(FieldChange::Epic(tracker.epic.clone()));
    }
    changes
}

/// `(additions, removals)`; removals are limited to `managed`.
fn label_diff(
    desired: &BTreeSet<String>,
    managed: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> (BTreeSet<String>, BTreeSet<String>) {
    let add = desired.difference(current).cloned().collect();
    let remove = current
        .iter()
        .filter(|label| managed.contains(*label) && !desired.contains(*label))
        .cloned()
        .collect();
    (add, remove)
}

/// The key a preview shows for a record that does not exist yet.
pub fn placeholder_key(project: &str) -> TrackerKey {
    TrackerKey::from(format!("{project}-NEW"))
}
