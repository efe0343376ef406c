//! Port traits for the collaborators the engine reads from and writes to.
//!
//! All calls are blocking from the engine's point of view. Retries, caching
//! and pagination belong to the implementations, never to the engine.

use std::collections::BTreeSet;

use crate::config::RepoPolicy;
use crate::error::{PolicyError, RemoteError};
use crate::types::{
    Comment, CommentId, CommitStatus, Contribution, ContributionId, ContributionSummary, FieldChange,
    NewTrackerRecord, RepoName, ServerNick, TrackerKey, TrackerLink, TrackerRecord,
};

/// The code-review platform (contributions, their labels and comments).
pub trait ReviewPlatformPort: Send + Sync {
    /// Login the engine posts comments as; used to recognise its own comments.
    fn bot_login(&self) -> &str;

    fn fetch_contribution(&self, id: &ContributionId) -> Result<Contribution, RemoteError>;

    /// List contributions of a repo, open only unless `include_closed`.
    fn list_contributions(
        &self,
        repo: &RepoName,
        include_closed: bool,
    ) -> Result<Vec<ContributionSummary>, RemoteError>;

    /// List the repos of an organization.
    fn list_repos(&self, org: &str) -> Result<Vec<RepoName>, RemoteError>;

    fn list_comments(&self, id: &ContributionId) -> Result<Vec<Comment>, RemoteError>;

    fn post_comment(&self, id: &ContributionId, body: &str) -> Result<CommentId, RemoteError>;

    fn edit_comment(
        &self,
        id: &ContributionId,
        comment: &CommentId,
        body: &str,
    ) -> Result<(), RemoteError>;

    fn delete_comment(&self, id: &ContributionId, comment: &CommentId) -> Result<(), RemoteError>;

    /// Add labels that are not already present. Others are left alone.
    fn add_labels(&self, id: &ContributionId, labels: &BTreeSet<String>)
        -> Result<(), RemoteError>;

    /// Remove labels that are present. Absent labels are not an error.
    fn remove_labels(
        &self,
        id: &ContributionId,
        labels: &BTreeSet<String>,
    ) -> Result<(), RemoteError>;

    /// The latest status posted under `context` on the contribution's head commit.
    fn commit_status(
        &self,
        id: &ContributionId,
        context: &str,
    ) -> Result<Option<CommitStatus>, RemoteError>;

    /// Post a status on the head commit, replacing any with the same context.
    fn set_commit_status(&self, id: &ContributionId, status: &CommitStatus)
        -> Result<(), RemoteError>;
}

/// The issue tracker.
pub trait TrackerPort: Send + Sync {
    /// `Ok(None)` when the key no longer resolves to a live record.
    fn fetch_record(&self, link: &TrackerLink) -> Result<Option<TrackerRecord>, RemoteError>;

    fn create_record(
        &self,
        server: &ServerNick,
        record: &NewTrackerRecord,
    ) -> Result<TrackerKey, RemoteError>;

    fn delete_record(&self, link: &TrackerLink) -> Result<(), RemoteError>;

    /// Assign field values. `notify` asks the tracker to tell watchers.
    fn update_fields(
        &self,
        link: &TrackerLink,
        changes: &[FieldChange],
        notify: bool,
    ) -> Result<(), RemoteError>;

    fn transition(&self, link: &TrackerLink, status: &str) -> Result<(), RemoteError>;

    fn add_labels(&self, link: &TrackerLink, labels: &BTreeSet<String>) -> Result<(), RemoteError>;

    fn remove_labels(
        &self,
        link: &TrackerLink,
        labels: &BTreeSet<String>,
    ) -> Result<(), RemoteError>;

    /// The epic tracking a blended project, if one exists.
    fn find_blended_epic(
        &self,
        server: &ServerNick,
        blended_id: u64,
    ) -> Result<Option<TrackerKey>, RemoteError>;
}

/// Who people are and what they have signed.
///
/// Lookups are total: missing data is `None`/`false`, never an error.
pub trait DirectoryPort: Send + Sync {
    fn institution_of(&self, login: &str) -> Option<String>;

    /// Whether `institution` counts as internal for the repo's organization.
    fn is_internal_institution(&self, institution: &str, org: &str) -> bool;

    /// `Some(true)` if a CLA is on file for the person or their institution,
    /// `None` if the directory has no data.
    fn cla_signed(&self, login: &str, institution: Option<&str>) -> Option<bool>;

    fn is_bot(&self, login: &str) -> bool;

    /// Whether the person holds commit rights on `repo` as a core contributor.
    fn is_core_contributor(&self, login: &str, repo: &RepoName) -> bool;
}

/// Resolves a repo to its tracker server, projects and workflow names.
pub trait PolicyLookup: Send + Sync {
    fn policy_for(&self, repo: &RepoName) -> Result<RepoPolicy, PolicyError>;
}
