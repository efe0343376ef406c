//! In-memory implementation of every port.
//!
//! A [`MemoryWorld`] holds a serializable [`WorldState`] snapshot of both
//! remote systems and the directory. It is what the CLI replays against and
//! what tests drive. Every write is appended to a log, and any operation can
//! be made to fail on demand.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use relay_core::error::{RemoteError, RemoteErrorKind};
use relay_core::ports::{DirectoryPort, ReviewPlatformPort, TrackerPort};
use relay_core::types::{
    Comment, CommentId, CommitStatus, Contribution, ContributionId, ContributionSummary, FieldChange,
    NewTrackerRecord, RepoName, ServerNick, TrackerKey, TrackerLink, TrackerRecord,
};

// ---------------------------------------------------------------------------
// Snapshot document
// ---------------------------------------------------------------------------

/// Who people are. Missing entries mean "no data".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryData {
    /// login → institution
    #[serde(default)]
    pub institutions: BTreeMap<String, String>,
    /// org → institutions counted as internal there
    #[serde(default)]
    pub internal: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    pub cla_people: BTreeSet<String>,
    #[serde(default)]
    pub cla_institutions: BTreeSet<String>,
    #[serde(default)]
    pub bots: BTreeSet<String>,
    /// login → repos (`org/repo`) or whole orgs with core contributor rights
    #[serde(default)]
    pub core_contributors: BTreeMap<String, BTreeSet<String>>,
}

/// One logged write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteEvent {
    pub op: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
}

/// Serializable state of a whole world.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldState {
    #[serde(default = "default_bot_login")]
    pub bot_login: String,
    #[serde(default)]
    pub contributions: Vec<Contribution>,
    /// `org/repo#N` → comments in posting order
    #[serde(default)]
    pub comments: BTreeMap<String, Vec<Comment>>,
    /// `org/repo#N` → commit statuses, one per context
    #[serde(default)]
    pub statuses: BTreeMap<String, Vec<CommitStatus>>,
    #[serde(default)]
    pub records: BTreeMap<ServerNick, BTreeMap<TrackerKey, TrackerRecord>>,
    /// server → blended project id → epic key
    #[serde(default)]
    pub epics: BTreeMap<ServerNick, BTreeMap<u64, TrackerKey>>,
    #[serde(default)]
    pub directory: DirectoryData,
    #[serde(default)]
    pub next_comment_id: u64,
    #[serde(default)]
    pub next_record_id: u64,
    #[serde(default)]
    pub writes: Vec<WriteEvent>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            bot_login: default_bot_login(),
            contributions: Vec::new(),
            comments: BTreeMap::new(),
            statuses: BTreeMap::new(),
            records: BTreeMap::new(),
            epics: BTreeMap::new(),
            directory: DirectoryData::default(),
            next_comment_id: 0,
            next_record_id: 0,
            writes: Vec::new(),
        }
    }
}

fn default_bot_login() -> String {
    "relay-bot".to_string()
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("world snapshot JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// MemoryWorld
// ---------------------------------------------------------------------------

pub struct MemoryWorld {
    bot_login: String,
    state: Mutex<WorldState>,
    failures: Mutex<BTreeMap<String, RemoteErrorKind>>,
}

impl MemoryWorld {
    pub fn new(state: WorldState) -> Self {
        Self {
            bot_login: state.bot_login.clone(),
            state: Mutex::new(state),
            failures: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let state: WorldState = serde_json::from_str(&raw)?;
        Ok(Self::new(state))
    }

    /// Write the current state back, via a `.tmp` sibling and rename.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        let json = serde_json::to_string_pretty(&*self.state())?;
        let tmp = path.with_extension("json.tmp");
        let io = |source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&tmp, json).map_err(io)?;
        std::fs::rename(&tmp, path).map_err(io)?;
        Ok(())
    }

    pub fn snapshot(&self) -> WorldState {
        self.state().clone()
    }

    /// Change the world outside the ports. Not logged; the bot login is
    /// fixed at construction.
    pub fn update(&self, f: impl FnOnce(&mut WorldState)) {
        f(&mut self.state());
    }

    /// Make every later call of `op` (a port method name) fail with `kind`.
    pub fn fail(&self, op: &str, kind: RemoteErrorKind) {
        self.failures_guard().insert(op.to_string(), kind);
    }

    pub fn clear_failures(&self) {
        self.failures_guard().clear();
    }

    pub fn writes(&self) -> Vec<WriteEvent> {
        self.state().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.state().writes.clear();
    }

    pub fn count_writes(&self, op: &str) -> usize {
        self.state().writes.iter().filter(|w| w.op == op).count()
    }

    // -- direct access, for tests and human-action simulation ---------------

    pub fn contribution(&self, id: &ContributionId) -> Option<Contribution> {
        self.state().contributions.iter().find(|c| &c.id == id).cloned()
    }

    /// Insert or replace a contribution. Not logged.
    pub fn put_contribution(&self, contribution: Contribution) {
        let mut state = self.state();
        state.contributions.retain(|c| c.id != contribution.id);
        state.contributions.push(contribution);
    }

    pub fn comments(&self, id: &ContributionId) -> Vec<Comment> {
        self.state()
            .comments
            .get(&id.to_string())
            .cloned()
            .unwrap_or_default()
    }

    /// A comment posted outside the ports, by anyone. Not logged.
    pub fn put_comment(&self, id: &ContributionId, author: &str, body: &str) -> CommentId {
        let mut state = self.state();
        state.next_comment_id += 1;
        let comment_id = CommentId::from(state.next_comment_id.to_string());
        state.comments.entry(id.to_string()).or_default().push(Comment {
            id: comment_id.clone(),
            author: author.to_string(),
            body: body.to_string(),
        });
        comment_id
    }

    pub fn commit_statuses(&self, id: &ContributionId) -> Vec<CommitStatus> {
        self.state()
            .statuses
            .get(&id.to_string())
            .cloned()
            .unwrap_or_default()
    }

    pub fn record(&self, link: &TrackerLink) -> Option<TrackerRecord> {
        self.state()
            .records
            .get(&link.server)
            .and_then(|records| records.get(&link.key))
            .cloned()
    }

    pub fn records(&self) -> Vec<TrackerRecord> {
        self.state()
            .records
            .values()
            .flat_map(|records| records.values().cloned())
            .collect()
    }

    /// Insert or replace a record. Not logged.
    pub fn put_record(&self, server: &ServerNick, record: TrackerRecord) {
        self.state()
            .records
            .entry(server.clone())
            .or_default()
            .insert(record.key.clone(), record);
    }

    /// A human moving a record through its workflow. Not logged.
    pub fn set_status(&self, link: &TrackerLink, status: &str) {
        if let Some(record) = self
            .state()
            .records
            .get_mut(&link.server)
            .and_then(|records| records.get_mut(&link.key))
        {
            record.status = status.to_string();
        }
    }

    // -- internals -----------------------------------------------------------

    fn state(&self) -> MutexGuard<'_, WorldState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn failures_guard(&self) -> MutexGuard<'_, BTreeMap<String, RemoteErrorKind>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(&self, op: &str, target: &str) -> Result<(), RemoteError> {
        match self.failures_guard().get(op) {
            Some(kind) => Err(RemoteError::new(
                *kind,
                format!("{op} {target}"),
                "injected failure",
            )),
            None => Ok(()),
        }
    }

    fn log(state: &mut WorldState, op: &str, target: impl ToString, detail: impl Into<String>) {
        state.writes.push(WriteEvent {
            op: op.to_string(),
            target: target.to_string(),
            detail: detail.into(),
        });
    }

    fn with_record<T>(
        &self,
        op: &str,
        link: &TrackerLink,
        f: impl FnOnce(&mut TrackerRecord) -> T,
    ) -> Result<T, RemoteError> {
        let mut state = self.state();
        let record = state
            .records
            .get_mut(&link.server)
            .and_then(|records| records.get_mut(&link.key))
            .ok_or_else(|| RemoteError::not_found(format!("{op} {link}"), "no such record"))?;
        Ok(f(record))
    }

    fn with_contribution<T>(
        &self,
        op: &str,
        id: &ContributionId,
        f: impl FnOnce(&mut Contribution) -> T,
    ) -> Result<T, RemoteError> {
        let mut state = self.state();
        let contribution = state
            .contributions
            .iter_mut()
            .find(|c| &c.id == id)
            .ok_or_else(|| RemoteError::not_found(format!("{op} {id}"), "no such contribution"))?;
        Ok(f(contribution))
    }
}

fn join(labels: &BTreeSet<String>) -> String {
    labels.iter().cloned().collect::<Vec<_>>().join(",")
}

// ---------------------------------------------------------------------------
// Ports
// ---------------------------------------------------------------------------

impl ReviewPlatformPort for MemoryWorld {
    fn bot_login(&self) -> &str {
        &self.bot_login
    }

    fn fetch_contribution(&self, id: &ContributionId) -> Result<Contribution, RemoteError> {
        self.check("fetch_contribution", &id.to_string())?;
        self.contribution(id).ok_or_else(|| {
            RemoteError::not_found(format!("fetch_contribution {id}"), "no such contribution")
        })
    }

    fn list_contributions(
        &self,
        repo: &RepoName,
        include_closed: bool,
    ) -> Result<Vec<ContributionSummary>, RemoteError> {
        self.check("list_contributions", &repo.0)?;
        Ok(self
            .state()
            .contributions
            .iter()
            .filter(|c| c.id.repo == *repo && (include_closed || !c.state.is_closed()))
            .map(|c| ContributionSummary {
                id: c.id.clone(),
                author: c.author.clone(),
                created_at: c.created_at,
                state: c.state,
            })
            .collect())
    }

    fn list_repos(&self, org: &str) -> Result<Vec<RepoName>, RemoteError> {
        self.check("list_repos", org)?;
        let repos: BTreeSet<RepoName> = self
            .state()
            .contributions
            .iter()
            .filter(|c| c.id.repo.org().eq_ignore_ascii_case(org))
            .map(|c| c.id.repo.clone())
            .collect();
        Ok(repos.into_iter().collect())
    }

    fn list_comments(&self, id: &ContributionId) -> Result<Vec<Comment>, RemoteError> {
        self.check("list_comments", &id.to_string())?;
        Ok(self.comments(id))
    }

    fn post_comment(&self, id: &ContributionId, body: &str) -> Result<CommentId, RemoteError> {
        self.check("post_comment", &id.to_string())?;
        let mut state = self.state();
        state.next_comment_id += 1;
        let comment_id = CommentId::from(state.next_comment_id.to_string());
        let author = state.bot_login.clone();
        state.comments.entry(id.to_string()).or_default().push(Comment {
            id: comment_id.clone(),
            author,
            body: body.to_string(),
        });
        Self::log(&mut state, "post_comment", id, comment_id.0.clone());
        Ok(comment_id)
    }

    fn edit_comment(
        &self,
        id: &ContributionId,
        comment: &CommentId,
        body: &str,
    ) -> Result<(), RemoteError> {
        self.check("edit_comment", &id.to_string())?;
        let mut state = self.state();
        let found = state
            .comments
            .get_mut(&id.to_string())
            .and_then(|comments| comments.iter_mut().find(|c| &c.id == comment))
            .map(|c| c.body = body.to_string())
            .is_some();
        if !found {
            return Err(RemoteError::not_found(
                format!("edit_comment {id} {comment}"),
                "no such comment",
            ));
        }
        Self::log(&mut state, "edit_comment", id, comment.0.clone());
        Ok(())
    }

    fn delete_comment(&self, id: &ContributionId, comment: &CommentId) -> Result<(), RemoteError> {
        self.check("delete_comment", &id.to_string())?;
        let mut state = self.state();
        let comments = state.comments.entry(id.to_string()).or_default();
        let before = comments.len();
        comments.retain(|c| &c.id != comment);
        if comments.len() == before {
            return Err(RemoteError::not_found(
                format!("delete_comment {id} {comment}"),
                "no such comment",
            ));
        }
        Self::log(&mut state, "delete_comment", id, comment.0.clone());
        Ok(())
    }

    fn add_labels(&self, id: &ContributionId, labels: &BTreeSet<String>) -> Result<(), RemoteError> {
        self.check("add_labels", &id.to_string())?;
        self.with_contribution("add_labels", id, |c| c.labels.extend(labels.iter().cloned()))?;
        Self::log(&mut self.state(), "add_labels", id, join(labels));
        Ok(())
    }

    fn remove_labels(
        &self,
        id: &ContributionId,
        labels: &BTreeSet<String>,
    ) -> Result<(), RemoteError> {
        self.check("remove_labels", &id.to_string())?;
        self.with_contribution("remove_labels", id, |c| {
            c.labels.retain(|l| !labels.contains(l))
        })?;
        Self::log(&mut self.state(), "remove_labels", id, join(labels));
        Ok(())
    }

    fn commit_status(
        &self,
        id: &ContributionId,
        context: &str,
    ) -> Result<Option<CommitStatus>, RemoteError> {
        self.check("commit_status", &id.to_string())?;
        Ok(self
            .commit_statuses(id)
            .into_iter()
            .find(|s| s.context == context))
    }

    fn set_commit_status(
        &self,
        id: &ContributionId,
        status: &CommitStatus,
    ) -> Result<(), RemoteError> {
        self.check("set_commit_status", &id.to_string())?;
        self.with_contribution("set_commit_status", id, |_| ())?;
        let mut state = self.state();
        let statuses = state.statuses.entry(id.to_string()).or_default();
        statuses.retain(|s| s.context != status.context);
        statuses.push(status.clone());
        Self::log(
            &mut state,
            "set_commit_status",
            id,
            format!("{} {}", status.context, status.state),
        );
        Ok(())
    }
}

impl TrackerPort for MemoryWorld {
    fn fetch_record(&self, link: &TrackerLink) -> Result<Option<TrackerRecord>, RemoteError> {
        self.check("fetch_record", &link.to_string())?;
        Ok(self.record(link))
    }

    fn create_record(
        &self,
        server: &ServerNick,
        record: &NewTrackerRecord,
    ) -> Result<TrackerKey, RemoteError> {
        self.check("create_record", &server.0)?;
        let mut state = self.state();
        state.next_record_id += 1;
        let key = TrackerKey::from(format!("{}-{}", record.project, state.next_record_id));
        let created = TrackerRecord {
            key: key.clone(),
            project: record.project.clone(),
            issue_type: record.issue_type.clone(),
            status: record.status.clone(),
            labels: record.labels.clone(),
            fields: record.fields.clone(),
            epic: record.epic.clone(),
        };
        state
            .records
            .entry(server.clone())
            .or_default()
            .insert(key.clone(), created);
        Self::log(&mut state, "create_record", format!("{server}:{key}"), record.status.clone());
        Ok(key)
    }

    fn delete_record(&self, link: &TrackerLink) -> Result<(), RemoteError> {
        self.check("delete_record", &link.to_string())?;
        let mut state = self.state();
        let removed = state
            .records
            .get_mut(&link.server)
            .and_then(|records| records.remove(&link.key));
        if removed.is_none() {
            return Err(RemoteError::not_found(format!("delete_record {link}"), "no such record"));
        }
        Self::log(&mut state, "delete_record", link, "");
        Ok(())
    }

    fn update_fields(
        &self,
        link: &TrackerLink,
        changes: &[FieldChange],
        notify: bool,
    ) -> Result<(), RemoteError> {
        self.check("update_fields", &link.to_string())?;
        self.with_record("update_fields", link, |record| {
            for change in changes {
                change.apply_to(record);
            }
        })?;
        let detail: Vec<&str> = changes.iter().map(FieldChange::name).collect();
        let detail = format!("{}{}", detail.join(","), if notify { " notify" } else { "" });
        Self::log(&mut self.state(), "update_fields", link, detail);
        Ok(())
    }

    fn transition(&self, link: &TrackerLink, status: &str) -> Result<(), RemoteError> {
        self.check("transition", &link.to_string())?;
        self.with_record("transition", link, |record| record.status = status.to_string())?;
        Self::log(&mut self.state(), "transition", link, status);
        Ok(())
    }

    fn add_labels(&self, link: &TrackerLink, labels: &BTreeSet<String>) -> Result<(), RemoteError> {
        self.check("add_tracker_labels", &link.to_string())?;
        self.with_record("add_tracker_labels", link, |record| {
            record.labels.extend(labels.iter().cloned())
        })?;
        Self::log(&mut self.state(), "add_tracker_labels", link, join(labels));
        Ok(())
    }

    fn remove_labels(
        &self,
        link: &TrackerLink,
        labels: &BTreeSet<String>,
    ) -> Result<(), RemoteError> {
        self.check("remove_tracker_labels", &link.to_string())?;
        self.with_record("remove_tracker_labels", link, |record| {
            record.labels.retain(|l| !labels.contains(l))
        })?;
        Self::log(&mut self.state(), "remove_tracker_labels", link, join(labels));
        Ok(())
    }

    fn find_blended_epic(
        &self,
        server: &ServerNick,
        blended_id: u64,
    ) -> Result<Option<TrackerKey>, RemoteError> {
        self.check("find_blended_epic", &server.0)?;
        Ok(self
            .state()
            .epics
            .get(server)
            .and_then(|epics| epics.get(&blended_id))
            .cloned())
    }
}

impl DirectoryPort for MemoryWorld {
    fn institution_of(&self, login: &str) -> Option<String> {
        self.state().directory.institutions.get(login).cloned()
    }

    fn is_internal_institution(&self, institution: &str, org: &str) -> bool {
        self.state()
            .directory
            .internal
            .get(org)
            .map(|institutions| institutions.contains(institution))
            .unwrap_or(false)
    }

    fn cla_signed(&self, login: &str, institution: Option<&str>) -> Option<bool> {
        let state = self.state();
        let directory = &state.directory;
        if directory.cla_people.contains(login)
            || institution.is_some_and(|i| directory.cla_institutions.contains(i))
        {
            return Some(true);
        }
        directory.institutions.contains_key(login).then_some(false)
    }

    fn is_bot(&self, login: &str) -> bool {
        login.ends_with("[bot]") || self.state().directory.bots.contains(login)
    }

    fn is_core_contributor(&self, login: &str, repo: &RepoName) -> bool {
        self.state()
            .directory
            .core_contributors
            .get(login)
            .is_some_and(|scopes| {
                scopes
                    .iter()
                    .any(|s| s.eq_ignore_ascii_case(&repo.0) || s.eq_ignore_ascii_case(repo.org()))
            })
    }
}

// ---------------------------------------------------------------------------
// Test fixtures
// ---------------------------------------------------------------------------
