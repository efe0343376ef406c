//! Observed state: everything read from the remote systems at pass start.

use relay_core::config::RepoPolicy;
use relay_core::error::RemoteErrorKind;
use relay_core::ports::{DirectoryPort, ReviewPlatformPort, TrackerPort};
use relay_core::types::{
    CommitStatus, Contribution, ContributionId, TrackerKey, TrackerLink, TrackerRecord,
};

use crate::classify::blended_id;
use crate::error::ReconcileError;
use crate::ledger::CommentLedger;

/// What the lead comment's link resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerObservation {
    /// No link recorded.
    Unlinked,
    Linked {
        link: TrackerLink,
        record: TrackerRecord,
    },
    /// A link is recorded but the record is gone.
    Broken(TrackerLink),
}

impl TrackerObservation {
    pub fn record(&self) -> Option<&TrackerRecord> {
        match self {
            TrackerObservation::Linked { record, .. } => Some(record),
            _ => None,
        }
    }

    /// The live link, if any. Broken links do not count.
    pub fn link(&self) -> Option<&TrackerLink> {
        match self {
            TrackerObservation::Linked { link, .. } => Some(link),
            _ => None,
        }
    }
}

/// A read-only snapshot of both sides for one contribution.
#[derive(Debug, Clone)]
pub struct ObservedState {
    pub contribution: Contribution,
    pub ledger: CommentLedger,
    pub tracker: TrackerObservation,
    pub institution: Option<String>,
    /// Missing directory data reads as not signed.
    pub cla_signed: bool,
    pub core_contributor: bool,
    pub blended_epic: Option<TrackerKey>,
    /// Current CLA commit status. Always `None` when the repo has no check.
    pub cla_status: Option<CommitStatus>,
}

/// Read the contribution, its bot comments, the linked record and the
/// directory facts about its author.
pub fn observe(
    id: &ContributionId,
    policy: &RepoPolicy,
    platform: &dyn ReviewPlatformPort,
    tracker: &dyn TrackerPort,
    directory: &dyn DirectoryPort,
) -> Result<ObservedState, ReconcileError> {
    let contribution = platform
        .fetch_contribution(id)
        .map_err(|e| ReconcileError::remote(id, e))?;
    let comments = platform
        .list_comments(id)
        .map_err(|e| ReconcileError::remote(id, e))?;
    let ledger = CommentLedger::scan(platform.bot_login(), &comments);

    let tracker_state = match ledger.tracker_link() {
        None => TrackerObservation::Unlinked,
        Some(link) => match tracker.fetch_record(&link) {
            Ok(Some(record)) => TrackerObservation::Linked { link, record },
            Ok(None) => TrackerObservation::Broken(link),
            Err(err) if err.kind == RemoteErrorKind::NotFound => TrackerObservation::Broken(link),
            Err(err) => return Err(ReconcileError::remote(id, err)),
        },
    };
    if let TrackerObservation::Broken(link) = &tracker_state {
        tracing::warn!(contribution = %id, link = %link, "linked tracker record is gone");
    }

    let institution = directory.institution_of(&contribution.author);
    let cla_signed = directory
        .cla_signed(&contribution.author, institution.as_deref())
        .unwrap_or(false);
    let core_contributor = directory.is_core_contributor(&contribution.author, &id.repo);

    let cla_status = match &policy.cla_check {
        Some(check) => platform
            .commit_status(id, &check.context)
            .map_err(|e| ReconcileError::remote(id, e))?,
        None => None,
    };

    let blended_epic = match blended_id(&contribution, policy) {
        Some(blended) => match tracker.find_blended_epic(&policy.server, blended) {
            Ok(epic) => epic,
            Err(err) => {
                tracing::warn!(contribution = %id, blended, error = %err, "epic lookup failed");
                None
            }
        },
        None => None,
    };

    Ok(ObservedState {
        contribution,
        ledger,
        tracker: tracker_state,
        institution,
        cla_signed,
        core_contributor,
        blended_epic,
        cla_status,
    })
}
