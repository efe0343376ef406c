//! Config loading, validation and repo policy resolution against real files.

use assert_fs::prelude::*;
use predicates::prelude::predicate;
use relay_core::{
    config::{self, config_path_at},
    types::RepoName,
    ConfigError, PolicyError, PolicyLookup,
};
use rstest::rstest;

const CONFIG: &str = r#"
tracker_servers:
  openedx:
    url: https://openedx.atlassian.net
    description: the Open edX Jira
  partner:
    url: https://partner.example.org
repo_rules:
  - pattern: "openedx/closed-*"
    server: openedx
    external: { project: OSPR, issue_type: Pull Request Review }
    blended: { project: BLENDED, issue_type: Pull Request Review }
    accepts_contributions: false
  - pattern: "openedx/*"
    server: openedx
    external: { project: OSPR, issue_type: Pull Request Review }
    blended: { project: BLENDED, issue_type: Pull Request Review }
  - pattern: "partner/app-?"
    server: partner
    external: { project: PART, issue_type: Task }
    blended: { project: PARTB, issue_type: Task }
status_labels: [Merged, Rejected]
survey_url: https://survey.example.org/
rescan:
  cutoff: 2020-06-01
  concurrency: 8
"#;

fn write_config(home: &assert_fs::TempDir, yaml: &str) {
    home.child(".relay/config.yaml")
        .write_str(yaml)
        .expect("write config");
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_names_the_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    let msg = err.to_string();
    assert!(msg.contains("config.yaml"), "must contain file path, got: {msg}");
}

#[test]
fn load_rule_without_projects_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        "tracker_servers:\n  openedx:\n    url: https://x\nrepo_rules:\n  - pattern: \"*\"\n    server: openedx\n",
    );

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[test]
fn load_runs_validation() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, &CONFIG.replace("server: partner", "server: nowhere"));

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("unknown tracker server 'nowhere'"));
}

#[test]
fn load_reads_every_section() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, CONFIG);

    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.tracker_servers.len(), 2);
    assert_eq!(loaded.repo_rules.len(), 3);
    assert!(!loaded.repo_rules[0].accepts_contributions);
    assert!(loaded.repo_rules[1].accepts_contributions);
    assert_eq!(loaded.rescan.concurrency, 8);
    assert_eq!(loaded.rescan.cutoff.to_string(), "2020-06-01");
    assert_eq!(loaded.statuses.triage, "Needs Triage");
}

// ---------------------------------------------------------------------------
// 2. Atomic save
// ---------------------------------------------------------------------------

#[test]
fn save_leaves_no_tmp_file_behind() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, CONFIG);
    let loaded = config::load_at(home.path()).expect("load");

    config::save_at(home.path(), &loaded).expect("save");

    home.child(".relay/config.yaml").assert(predicate::path::exists());
    home.child(".relay/config.yaml.tmp")
        .assert(predicate::path::missing());
    assert_eq!(config::load_at(home.path()).expect("reload"), loaded);
}

#[cfg(unix)]
#[test]
fn save_restricts_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let home = assert_fs::TempDir::new().expect("tempdir");
    config::save_at(home.path(), &Default::default()).expect("save");

    let mode = std::fs::metadata(config_path_at(home.path()))
        .expect("metadata")
        .permissions()
        .mode();
    assert_eq!(mode & 0o777, 0o600);
}

// ---------------------------------------------------------------------------
// 3. Policy resolution
// ---------------------------------------------------------------------------

#[rstest]
#[case("openedx/edx-platform", "openedx", "OSPR", true)]
#[case("OpenEdx/XBlock", "openedx", "OSPR", true)]
#[case("openedx/closed-archive", "openedx", "OSPR", false)]
#[case("partner/app-1", "partner", "PART", true)]
fn policy_follows_first_matching_rule(
    #[case] repo: &str,
    #[case] server: &str,
    #[case] project: &str,
    #[case] accepts: bool,
) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, CONFIG);
    let loaded = config::load_at(home.path()).expect("load");

    let policy = loaded.policy_for(&RepoName::from(repo)).expect("policy");
    assert_eq!(policy.server.0, server);
    assert_eq!(policy.external.project, project);
    assert_eq!(policy.accepts_contributions, accepts);
}

#[rstest]
#[case("partner/app-10")]
#[case("elsewhere/repo")]
fn unmatched_repo_has_no_policy(#[case] repo: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, CONFIG);
    let loaded = config::load_at(home.path()).expect("load");

    let err = loaded.policy_for(&RepoName::from(repo)).unwrap_err();
    assert!(matches!(err, PolicyError::NoRule { .. }), "got: {err}");
}

#[test]
fn resolved_policy_carries_workflow_settings() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, CONFIG);
    let loaded = config::load_at(home.path()).expect("load");

    let policy = loaded
        .policy_for(&RepoName::from("openedx/edx-platform"))
        .expect("policy");
    assert_eq!(policy.server_info.description, "the Open edX Jira");
    assert_eq!(policy.survey_url.as_deref(), Some("https://survey.example.org/"));
    assert_eq!(policy.status_label("Merged").as_deref(), Some("merged"));
    assert_eq!(policy.status_label("Needs Triage"), None);
    assert!(policy.blended_marker.is_match("[BD-42] add X"));

    let partner = loaded
        .policy_for(&RepoName::from("partner/app-2"))
        .expect("policy");
    assert_eq!(partner.server_info.description, "the issue tracker");
}
