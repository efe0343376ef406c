//! Classifier: contribution attributes → [`Category`] and [`Phase`].

use std::fmt;

use serde::{Deserialize, Serialize};

use relay_core::config::{ProjectTarget, RepoPolicy};
use relay_core::ports::DirectoryPort;
use relay_core::types::{Contribution, TrackerRecord};

/// Contribution label marking a regular external contribution.
pub const OSPR_LABEL: &str = "open-source-contribution";
/// Label (on both sides) marking a blended-project contribution.
pub const BLENDED_LABEL: &str = "blended";
/// Added for authors with core contributor rights on the repo. Never removed.
pub const CORE_CONTRIBUTOR_LABEL: &str = "core contributor";

/// Who a contribution is from, as far as review policy is concerned.
///
/// Exactly one applies to any contribution; decided once per pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Bot,
    Internal,
    Blended,
    Refused,
    RegularExternal,
}

impl Category {
    /// Bot and internal contributions are never touched, apart from the
    /// CLA commit status.
    pub fn is_hands_off(self) -> bool {
        matches!(self, Category::Bot | Category::Internal)
    }

    /// The label the engine puts on the contribution for this category.
    pub fn contribution_label(self) -> Option<&'static str> {
        match self {
            Category::Blended => Some(BLENDED_LABEL),
            Category::RegularExternal => Some(OSPR_LABEL),
            _ => None,
        }
    }

    /// Where this category's tracker record lives, if it needs one.
    pub fn project_target(self, policy: &RepoPolicy) -> Option<&ProjectTarget> {
        match self {
            Category::Blended => Some(&policy.blended),
            Category::RegularExternal => Some(&policy.external),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Bot => write!(f, "bot"),
            Category::Internal => write!(f, "internal"),
            Category::Blended => write!(f, "blended"),
            Category::Refused => write!(f, "refused"),
            Category::RegularExternal => write!(f, "external"),
        }
    }
}

/// Lifecycle stage, orthogonal to [`Category`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Draft,
    Open,
    Closed,
    Reopened,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Draft => write!(f, "draft"),
            Phase::Open => write!(f, "open"),
            Phase::Closed => write!(f, "closed"),
            Phase::Reopened => write!(f, "reopened"),
        }
    }
}

/// Classify a contribution. First matching rule wins.
pub fn classify(
    contribution: &Contribution,
    policy: &RepoPolicy,
    directory: &dyn DirectoryPort,
) -> Category {
    if directory.is_bot(&contribution.author) {
        return Category::Bot;
    }
    let org = contribution.id.repo.org();
    if let Some(institution) = directory.institution_of(&contribution.author) {
        if directory.is_internal_institution(&institution, org) {
            return Category::Internal;
        }
    }
    if is_blended(contribution, policy) {
        return Category::Blended;
    }
    if !policy.accepts_contributions {
        return Category::Refused;
    }
    // A contribution closed without ever being labelled was never treated
    // as external; don't start now.
    if contribution.state.is_closed() && !contribution.has_label(OSPR_LABEL) {
        return Category::Internal;
    }
    Category::RegularExternal
}

pub fn is_blended(contribution: &Contribution, policy: &RepoPolicy) -> bool {
    policy.blended_marker.is_match(&contribution.title)
}

/// The blended project id captured by the marker's first group, e.g. 42 for `[BD-42]`.
pub fn blended_id(contribution: &Contribution, policy: &RepoPolicy) -> Option<u64> {
    policy
        .blended_marker
        .captures(&contribution.title)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// Derive the lifecycle phase.
///
/// `reopened` is set when the triggering event says the contribution was
/// just reopened. A recorded pre-close status on the linked record means the
/// reopen has not been processed yet, whatever the trigger.
pub fn derive_phase(
    contribution: &Contribution,
    reopened: bool,
    record: Option<&TrackerRecord>,
) -> Phase {
    if contribution.state.is_closed() {
        return Phase::Closed;
    }
    let pending_reopen = record
        .map(|r| r.fields.prior_status.is_some())
        .unwrap_or(false);
    if reopened || pending_reopen {
        Phase::Reopened
    } else if contribution.draft {
        Phase::Draft
    } else {
        Phase::Open
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::test_support::{contribution, policy, world};
    use relay_core::types::{ContributionState, TrackerFields, TrackerKey};
    use rstest::rstest;
    use std::collections::BTreeSet;

    #[rstest]
    #[case("bot-account", "Fix [BD-3]", ContributionState::Open, &[], Category::Bot)]
    #[case("staffer", "Fix typo", ContributionState::Open, &[], Category::Internal)]
    #[case("staffer", "[BD-3] Fix", ContributionState::Open, &[], Category::Internal)]
    #[case("outsider", "[BD-3] Fix", ContributionState::Open, &[], Category::Blended)]
    #[case("outsider", "[BD-3] Fix", ContributionState::Closed, &[], Category::Blended)]
    #[case("outsider", "Fix typo", ContributionState::Open, &[], Category::RegularExternal)]
    #[case("outsider", "Fix typo", ContributionState::Merged, &[OSPR_LABEL], Category::RegularExternal)]
    #[case("outsider", "Fix typo", ContributionState::Closed, &[], Category::Internal)]
    #[case("nobody-knows", "Fix typo", ContributionState::Open, &["other"], Category::RegularExternal)]
    fn classification_order(
        #[case] author: &str,
        #[case] title: &str,
        #[case] state: ContributionState,
        #[case] labels: &[&str],
        #[case] expected: Category,
    ) {
        let world = world();
        let mut c = contribution(1, author, title);
        c.state = state;
        c.labels = labels.iter().map(|l| l.to_string()).collect::<BTreeSet<_>>();
        assert_eq!(classify(&c, &policy(), &world), expected);
    }

    #[test]
    fn refused_repo_is_refused_unless_blended() {
        let world = world();
        let mut policy = policy();
        policy.accepts_contributions = false;
        let c = contribution(1, "outsider", "Fix typo");
        assert_eq!(classify(&c, &policy, &world), Category::Refused);
        let c = contribution(1, "outsider", "[BD-9] Fix typo");
        assert_eq!(classify(&c, &policy, &world), Category::Blended);
    }

    #[test]
    fn blended_id_is_captured() {
        let c = contribution(1, "outsider", "[ BD-42 ] add X");
        assert_eq!(blended_id(&c, &policy()), Some(42));
        let c = contribution(1, "outsider", "add X");
        assert_eq!(blended_id(&c, &policy()), None);
    }

    #[test]
    fn phase_derivation() {
        let mut c = contribution(1, "outsider", "Fix");
        assert_eq!(derive_phase(&c, false, None), Phase::Open);
        c.draft = true;
        assert_eq!(derive_phase(&c, false, None), Phase::Draft);
        assert_eq!(derive_phase(&c, true, None), Phase::Reopened);
        c.state = ContributionState::Merged;
        assert_eq!(derive_phase(&c, true, None), Phase::Closed);
    }

    #[test]
    fn recorded_prior_status_means_reopen_pending() {
        let c = contribution(1, "outsider", "Fix");
        let record = TrackerRecord {
            key: TrackerKey::from("OSPR-1"),
            project: "OSPR".into(),
            issue_type: "Pull Request Review".into(),
            status: "Merged".into(),
            labels: BTreeSet::new(),
            fields: TrackerFields {
                prior_status: Some("In Review".into()),
                ..TrackerFields::default()
            },
            epic: None,
        };
        assert_eq!(derive_phase(&c, false, Some(&record)), Phase::Reopened);
    }
}
