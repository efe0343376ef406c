//! Domain types shared by the reconciliation engine and its ports.
//!
//! Nothing here is persisted by the engine. Every value is read from one of
//! the two remote systems of record at the start of a pass.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Full repository name on the review platform, `org/repo`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RepoName(pub String);

impl RepoName {
    /// The owning organization (the part before the first `/`).
    pub fn org(&self) -> &str {
        self.0.split_once('/').map(|(org, _)| org).unwrap_or(&self.0)
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Nickname of a configured tracker server (e.g. `openedx`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerNick(pub String);

impl fmt::Display for ServerNick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ServerNick {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ServerNick {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Key of a tracker record, e.g. `OSPR-1234`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackerKey(pub String);

impl TrackerKey {
    /// The project part of the key (`OSPR` for `OSPR-1234`).
    pub fn project(&self) -> &str {
        self.0.rsplit_once('-').map(|(p, _)| p).unwrap_or(&self.0)
    }
}

impl fmt::Display for TrackerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TrackerKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrackerKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Identifier of a comment on the review platform.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CommentId(pub String);

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for CommentId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for CommentId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Identities
// ---------------------------------------------------------------------------

/// Immutable identity of a contribution: repository plus number.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContributionId {
    pub repo: RepoName,
    pub number: u64,
}

impl ContributionId {
    pub fn new(repo: impl Into<RepoName>, number: u64) -> Self {
        Self {
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for ContributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

impl FromStr for ContributionId {
    type Err = String;

    /// Parses `org/repo#123`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (repo, number) = s
            .rsplit_once('#')
            .ok_or_else(|| format!("expected org/repo#number, got '{s}'"))?;
        let named = repo
            .split_once('/')
            .is_some_and(|(org, name)| !org.is_empty() && !name.is_empty());
        if !named {
            return Err(format!("expected org/repo#number, got '{s}'"));
        }
        let number = number
            .parse::<u64>()
            .map_err(|e| format!("invalid contribution number in '{s}': {e}"))?;
        Ok(Self::new(repo, number))
    }
}

/// The link between a contribution and its tracker record.
///
/// Recorded only inside the lead bot comment on the contribution.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackerLink {
    pub server: ServerNick,
    pub key: TrackerKey,
}

impl fmt::Display for TrackerLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.server, self.key)
    }
}

impl FromStr for TrackerLink {
    type Err = String;

    /// Parses `server:KEY-12`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (server, key) = s
            .split_once(':')
            .filter(|(server, key)| !server.is_empty() && !key.is_empty())
            .ok_or_else(|| format!("expected server:KEY, got '{s}'"))?;
        Ok(Self {
            server: ServerNick::from(server),
            key: TrackerKey::from(key),
        })
    }
}

// ---------------------------------------------------------------------------
// Contribution
// ---------------------------------------------------------------------------

/// Open/closed/merged state as reported by the review platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContributionState {
    #[default]
    Open,
    Closed,
    Merged,
}

impl ContributionState {
    pub fn is_closed(self) -> bool {
        !matches!(self, ContributionState::Open)
    }
}

impl fmt::Display for ContributionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContributionState::Open => write!(f, "open"),
            ContributionState::Closed => write!(f, "closed"),
            ContributionState::Merged => write!(f, "merged"),
        }
    }
}

/// One code change request, as read from the review platform.
///
/// The label set is shared with humans; the engine never assumes it owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub id: ContributionId,
    pub author: String,
    #[serde(default)]
    pub author_url: String,
    /// Platform author association (`FIRST_TIME_CONTRIBUTOR`, ...), if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author_association: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub state: ContributionState,
    #[serde(default)]
    pub base_branch: String,
    #[serde(default)]
    pub html_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub additions: u64,
    #[serde(default)]
    pub deletions: u64,
    #[serde(default)]
    pub labels: BTreeSet<String>,
}

impl Contribution {
    pub fn is_merged(&self) -> bool {
        self.state == ContributionState::Merged
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }
}

/// Listing entry used by rescans before the full contribution is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionSummary {
    pub id: ContributionId,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub state: ContributionState,
}

/// A comment on a contribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub author: String,
    pub body: String,
}

/// Outcome reported by a commit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Success,
    Failure,
}

impl fmt::Display for CheckState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckState::Success => write!(f, "success"),
            CheckState::Failure => write!(f, "failure"),
        }
    }
}

/// A named status check shown on a contribution, keyed by `context`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitStatus {
    pub context: String,
    pub state: CheckState,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Tracker record
// ---------------------------------------------------------------------------

/// The fixed set of custom fields the engine maintains on a tracker record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TrackerFields {
    pub summary: String,
    pub description: String,
    pub origin_url: String,
    pub contribution_number: u64,
    pub repo: String,
    pub contributor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub institution: Option<String>,
    pub lines_added: u64,
    pub lines_removed: u64,
    /// Status observed when the contribution was closed; cleared on reopen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_status: Option<String>,
}

/// An issue in the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    pub key: TrackerKey,
    pub project: String,
    pub issue_type: String,
    pub status: String,
    #[serde(default)]
    pub labels: BTreeSet<String>,
    pub fields: TrackerFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<TrackerKey>,
}

impl TrackerRecord {
    /// The contribution this record was created for, recovered from its fields.
    pub fn contribution_id(&self) -> Option<ContributionId> {
        if self.fields.repo.is_empty() || self.fields.contribution_number == 0 {
            return None;
        }
        Some(ContributionId::new(
            self.fields.repo.as_str(),
            self.fields.contribution_number,
        ))
    }
}

/// Everything needed to create a tracker record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTrackerRecord {
    pub project: String,
    pub issue_type: String,
    pub status: String,
    pub labels: BTreeSet<String>,
    pub fields: TrackerFields,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epic: Option<TrackerKey>,
}

/// A single field assignment on an existing record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum FieldChange {
    Summary(String),
    Description(String),
    OriginUrl(String),
    ContributionNumber(u64),
    Repo(String),
    Contributor(String),
    Institution(Option<String>),
    LinesAdded(u64),
    LinesRemoved(u64),
    PriorStatus(Option<String>),
    Epic(Option<TrackerKey>),
}

impl FieldChange {
    pub fn name(&self) -> &'static str {
        match self {
            FieldChange::Summary(_) => "summary",
            FieldChange::Description(_) => "description",
            FieldChange::OriginUrl(_) => "origin_url",
            FieldChange::ContributionNumber(_) => "contribution_number",
            FieldChange::Repo(_) => "repo",
            FieldChange::Contributor(_) => "contributor",
            FieldChange::Institution(_) => "institution",
            FieldChange::LinesAdded(_) => "lines_added",
            FieldChange::LinesRemoved(_) => "lines_removed",
            FieldChange::PriorStatus(_) => "prior_status",
            FieldChange::Epic(_) => "epic",
        }
    }

    /// Whether watchers of the record should be notified about this change.
    ///
    /// Only human-meaningful text changes notify.
    pub fn notifies(&self) -> bool {
        matches!(self, FieldChange::Summary(_) | FieldChange::Description(_))
    }

    /// Apply this assignment to a record in place.
    pub fn apply_to(&self, record: &mut TrackerRecord) {
        let fields = &mut record.fields;
        match self {
            FieldChange::Summary(v) => fields.summary = v.clone(),
            FieldChange::Description(v) => fields.description = v.clone(),
            FieldChange::OriginUrl(v) => fields.origin_url = v.clone(),
            FieldChange::ContributionNumber(v) => fields.contribution_number = *v,
            FieldChange::Repo(v) => fields.repo = v.clone(),
            FieldChange::Contributor(v) => fields.contributor = v.clone(),
            FieldChange::Institution(v) => fields.institution = v.clone(),
            FieldChange::LinesAdded(v) => fields.lines_added = *v,
            FieldChange::LinesRemoved(v) => fields.lines_removed = *v,
            FieldChange::PriorStatus(v) => fields.prior_status = v.clone(),
            FieldChange::Epic(v) => record.epic = v.clone(),
        }
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldChange::Summary(v)
            | FieldChange::Description(v)
            | FieldChange::OriginUrl(v)
            | FieldChange::Repo(v)
            | FieldChange::Contributor(v) => write!(f, "{}={:?}", self.name(), v),
            FieldChange::ContributionNumber(v)
            | FieldChange::LinesAdded(v)
            | FieldChange::LinesRemoved(v) => write!(f, "{}={}", self.name(), v),
            FieldChange::Institution(v) | FieldChange::PriorStatus(v) => match v {
                Some(v) => write!(f, "{}={:?}", self.name(), v),
                None => write!(f, "{}=<none>", self.name()),
            },
            FieldChange::Epic(v) => match v {
                Some(v) => write!(f, "{}={}", self.name(), v),
                None => write!(f, "{}=<none>", self.name()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
