//! Typed configuration: tracker servers, repo rules, workflow status names.
//!
//! # Storage layout
//!
//! ```text
//! ~/.relay/
//!   config.yaml   (mode 0600)
//! ```
//!
//! # API pattern
//!
//! Like every path-touching function in this crate, loading has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Repo rules are evaluated in file order, first match wins. Patterns are
//! globs over `org/repo` where `*` matches any run of characters and `?`
//! matches one.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, PolicyError};
use crate::ports::PolicyLookup;
use crate::types::{RepoName, ServerNick};

/// Default blended-project title marker, e.g. `[BD-42]`.
pub const DEFAULT_BLENDED_MARKER: &str = r"\[\s*BD-(\d+)\s*\]";

// ---------------------------------------------------------------------------
// 1. Document types
// ---------------------------------------------------------------------------

/// Connection details for one tracker server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerServer {
    pub url: String,
    /// Used in bot comments: "I've created an issue in {description}".
    #[serde(default = "default_server_description")]
    pub description: String,
}

/// Where records of one category are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectTarget {
    pub project: String,
    pub issue_type: String,
}

/// Maps a set of repos (by glob) to a tracker server and projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRule {
    pub pattern: String,
    pub server: ServerNick,
    pub external: ProjectTarget,
    pub blended: ProjectTarget,
    #[serde(default = "default_true")]
    pub accepts_contributions: bool,
}

/// Names of the workflow statuses the engine itself assigns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusNames {
    #[serde(default = "default_draft_status")]
    pub draft: String,
    #[serde(default = "default_cla_review_status")]
    pub cla_review: String,
    #[serde(default = "default_triage_status")]
    pub triage: String,
}

impl Default for StatusNames {
    fn default() -> Self {
        Self {
            draft: default_draft_status(),
            cla_review: default_cla_review_status(),
            triage: default_triage_status(),
        }
    }
}

/// Rescan bounds and fan-out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescanSettings {
    /// Contributions created before this date are never reconciled.
    #[serde(default = "default_cutoff")]
    pub cutoff: NaiveDate,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for RescanSettings {
    fn default() -> Self {
        Self {
            cutoff: default_cutoff(),
            concurrency: default_concurrency(),
        }
    }
}

/// Commit status reporting whether a contribution's author may contribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaCheck {
    #[serde(default = "default_cla_context")]
    pub context: String,
    /// Linked from the status for people who still need an agreement.
    #[serde(default = "default_cla_detail_url")]
    pub detail_url: String,
}

impl Default for ClaCheck {
    fn default() -> Self {
        Self {
            context: default_cla_context(),
            detail_url: default_cla_detail_url(),
        }
    }
}

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub tracker_servers: BTreeMap<ServerNick, TrackerServer>,
    #[serde(default)]
    pub repo_rules: Vec<RepoRule>,
    #[serde(default = "default_blended_marker")]
    pub blended_marker: String,
    #[serde(default)]
    pub statuses: StatusNames,
    /// Workflow statuses mirrored onto closed contributions as labels.
    #[serde(default)]
    pub status_labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub survey_url: Option<String>,
    #[serde(default)]
    pub rescan: RescanSettings,
    /// Absent when the review platform has no commit statuses to set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cla_check: Option<ClaCheck>,
    /// Directory of `.tera` files overriding the embedded comment templates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_dir: Option<PathBuf>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            tracker_servers: BTreeMap::new(),
            repo_rules: Vec::new(),
            blended_marker: default_blended_marker(),
            statuses: StatusNames::default(),
            status_labels: Vec::new(),
            survey_url: None,
            rescan: RescanSettings::default(),
            cla_check: None,
            template_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// 2. Resolved policy
// ---------------------------------------------------------------------------

/// Everything the engine needs to know about one repo, resolved once per pass.
#[derive(Debug, Clone)]
pub struct RepoPolicy {
    pub repo: RepoName,
    pub server: ServerNick,
    pub server_info: TrackerServer,
    pub external: ProjectTarget,
    pub blended: ProjectTarget,
    pub accepts_contributions: bool,
    pub blended_marker: Regex,
    pub statuses: StatusNames,
    pub status_labels: BTreeSet<String>,
    pub survey_url: Option<String>,
    pub cla_check: Option<ClaCheck>,
}

impl RepoPolicy {
    /// Contribution label mirroring a tracker status, if that status is mirrored.
    pub fn status_label(&self, status: &str) -> Option<String> {
        let label = status.to_lowercase();
        self.status_labels.contains(&label).then_some(label)
    }
}

impl RelayConfig {
    /// Check cross-references, patterns and numeric bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Regex::new(&self.blended_marker).map_err(|e| {
            ConfigError::Invalid(format!("blended_marker '{}': {e}", self.blended_marker))
        })?;
        if self.cla_check.as_ref().is_some_and(|c| c.context.trim().is_empty()) {
            return Err(ConfigError::Invalid(
                "cla_check.context must not be empty".to_string(),
            ));
        }
        if self.rescan.concurrency == 0 {
            return Err(ConfigError::Invalid(
                "rescan.concurrency must be at least 1".to_string(),
            ));
        }
        for rule in &self.repo_rules {
            glob_regex(&rule.pattern).map_err(|e| ConfigError::Invalid(e.to_string()))?;
            if !self.tracker_servers.contains_key(&rule.server) {
                return Err(ConfigError::Invalid(format!(
                    "repo rule '{}' names unknown tracker server '{}'",
                    rule.pattern, rule.server
                )));
            }
        }
        Ok(())
    }

    /// The first rule whose pattern matches `repo`.
    pub fn rule_for(&self, repo: &RepoName) -> Result<Option<&RepoRule>, PolicyError> {
        for rule in &self.repo_rules {
            if glob_regex(&rule.pattern)?.is_match(&repo.0) {
                return Ok(Some(rule));
            }
        }
        Ok(None)
    }
}

impl PolicyLookup for RelayConfig {
    fn policy_for(&self, repo: &RepoName) -> Result<RepoPolicy, PolicyError> {
        let rule = self.rule_for(repo)?.ok_or_else(|| PolicyError::NoRule {
            repo: repo.0.clone(),
        })?;
        let server_info = self
            .tracker_servers
            .get(&rule.server)
            .cloned()
            .ok_or_else(|| PolicyError::UnknownServer {
                repo: repo.0.clone(),
                server: rule.server.0.clone(),
            })?;
        let blended_marker =
            Regex::new(&self.blended_marker).map_err(|e| PolicyError::BadPattern {
                pattern: self.blended_marker.clone(),
                message: e.to_string(),
            })?;
        Ok(RepoPolicy {
            repo: repo.clone(),
            server: rule.server.clone(),
            server_info,
            external: rule.external.clone(),
            blended: rule.blended.clone(),
            accepts_contributions: rule.accepts_contributions,
            blended_marker,
            statuses: self.statuses.clone(),
            status_labels: self.status_labels.iter().map(|s| s.to_lowercase()).collect(),
            survey_url: self.survey_url.clone(),
            cla_check: self.cla_check.clone(),
        })
    }
}

/// Compile a repo glob into an anchored, case-insensitive regex.
pub fn glob_regex(pattern: &str) -> Result<Regex, PolicyError> {
    let mut re = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| PolicyError::BadPattern {
        pattern: pattern.to_string(),
        message: e.to_string(),
    })
}

// ---------------------------------------------------------------------------
// 3. Load / save
// ---------------------------------------------------------------------------

/// `<home>/.relay/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".relay").join("config.yaml")
}

/// Load and validate the config from an explicit file.
///
/// Returns `ConfigError::NotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<RelayConfig, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::NotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: RelayConfig = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.relay/config.yaml`.
pub fn load_at(home: &Path) -> Result<RelayConfig, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<RelayConfig, ConfigError> {
    load_at(&home()?)
}

/// Atomically save the config to `<home>/.relay/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &RelayConfig) -> Result<(), ConfigError> {
    let path = config_path_at(home);
    let Some(dir) = path.parent() else {
        return Err(ConfigError::Invalid("config path has no parent".to_string()));
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
        set_dir_permissions(dir)?;
    }
    let yaml = serde_yaml::to_string(config)?;
    let tmp = path.with_file_name("config.yaml.tmp");
    std::fs::write(&tmp, yaml)?;
    set_file_permissions(&tmp)?;
    std::fs::rename(&tmp, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &RelayConfig) -> Result<(), ConfigError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

fn default_true() -> bool {
    true
}

fn default_server_description() -> String {
    "the issue tracker".to_string()
}

fn default_draft_status() -> String {
    "Waiting on Author".to_string()
}

fn default_cla_review_status() -> String {
    "Community Manager Review".to_string()
}

fn default_triage_status() -> String {
    "Needs Triage".to_string()
}

fn default_cla_context() -> String {
    "openedx/cla".to_string()
}

fn default_cla_detail_url() -> String {
    "https://openedx.atlassian.net/wiki/spaces/COMM/pages/941457737/How+to+start+contributing+to+the+Open+edX+code+base".to_string()
}

fn default_blended_marker() -> String {
    DEFAULT_BLENDED_MARKER.to_string()
}

fn default_cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap_or_default()
}

fn default_concurrency() -> usize {
    4
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
