#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use relay_core::config::{ClaCheck, ProjectTarget, RelayConfig, RepoRule, TrackerServer};
use relay_core::ports::{DirectoryPort, PolicyLookup, ReviewPlatformPort, TrackerPort};
use relay_core::types::{
    Contribution, ContributionId, ContributionState, ServerNick, TrackerKey, TrackerLink, TrackerRecord,
};
use relay_engine::{ContributionAction, MemoryWorld, ReconcileResult, Reconciler, Trigger, WorldState};
use relay_renderer::{parse_data, parse_kind, CommentKind, CommentRenderer};

pub const BOT: &str = "relay-bot";

pub fn config() -> RelayConfig {
    let mut config = RelayConfig::default();
    config.tracker_servers.insert(
        ServerNick::from("openedx"),
        TrackerServer {
            url: "https://openedx.atlassian.net".to_string(),
            description: "the Open edX Jira".to_string(),
        },
    );
    config.repo_rules = vec![
        RepoRule {
            pattern: "openedx/closed-*".to_string(),
            server: ServerNick::from("openedx"),
            external: target("OSPR"),
            blended: target("BLENDED"),
            accepts_contributions: false,
        },
        RepoRule {
            pattern: "openedx/*".to_string(),
            server: ServerNick::from("openedx"),
            external: target("OSPR"),
            blended: target("BLENDED"),
            accepts_contributions: true,
        },
    ];
    config.status_labels = vec!["Merged".to_string(), "Rejected".to_string()];
    config.survey_url = Some("https://survey.example.org/".to_string());
    config
}

fn target(project: &str) -> ProjectTarget {
    ProjectTarget {
        project: project.to_string(),
        issue_type: "Pull Request Review".to_string(),
    }
}

/// A world with a handful of well-known people:
///
/// - `bot-account`: a bot
/// - `staffer`: internal to `openedx`, no CLA on file
/// - `outsider`: external, covered by an institutional CLA
/// - `newcomer`: external, no CLA
/// - `maintainer`: external, CLA, core contributor across `openedx`
pub fn world_state() -> WorldState {
    let mut state = WorldState::default();
    state.bot_login = BOT.to_string();
    let d = &mut state.directory;
    d.bots.insert("bot-account".to_string());
    d.institutions.insert("staffer".to_string(), "Acme Staff".to_string());
    d.institutions.insert("outsider".to_string(), "Outside U".to_string());
    d.institutions.insert("newcomer".to_string(), "Independent".to_string());
    d.internal
        .entry("openedx".to_string())
        .or_default()
        .insert("Acme Staff".to_string());
    d.institutions.insert("maintainer".to_string(), "Outside U".to_string());
    d.cla_institutions.insert("Outside U".to_string());
    d.core_contributors
        .insert("maintainer".to_string(), set(&["openedx"]));
    state.epics.insert(
        ServerNick::from("openedx"),
        [(42u64, TrackerKey::from("BLENDED-EPIC-42"))].into_iter().collect(),
    );
    state
}

pub fn contribution(repo: &str, number: u64, author: &str, title: &str) -> Contribution {
    let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Contribution {
        id: ContributionId::new(repo, number),
        author: author.to_string(),
        author_url: format!("https://github.com/{author}"),
        author_association: None,
        title: title.to_string(),
        body: Some("Please review.".to_string()),
        draft: false,
        state: ContributionState::Open,
        base_branch: "master".to_string(),
        html_url: format!("https://github.com/{repo}/pull/{number}"),
        created_at: at,
        updated_at: at,
        closed_at: None,
        additions: 10,
        deletions: 2,
        labels: BTreeSet::new(),
    }
}

pub struct Harness {
    pub world: Arc<MemoryWorld>,
    pub config: RelayConfig,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(world_state(), config())
    }

    pub fn with(state: WorldState, config: RelayConfig) -> Self {
        let world = Arc::new(MemoryWorld::new(state));
        let reconciler = Reconciler::new(
            world.clone() as Arc<dyn ReviewPlatformPort>,
            world.clone() as Arc<dyn TrackerPort>,
            world.clone() as Arc<dyn DirectoryPort>,
            Arc::new(config.clone()) as Arc<dyn PolicyLookup>,
            Arc::new(CommentRenderer::new().expect("renderer")),
        );
        Self {
            world,
            config,
            reconciler,
        }
    }

    /// A harness whose repos report the CLA commit status.
    pub fn with_cla_check() -> Self {
        let mut config = config();
        config.cla_check = Some(ClaCheck::default());
        Self::with(world_state(), config)
    }

    pub fn add(&self, contribution: Contribution) -> ContributionId {
        let id = contribution.id.clone();
        self.world.put_contribution(contribution);
        id
    }

    /// Change a contribution the way a person on the platform would.
    pub fn edit(&self, id: &ContributionId, f: impl FnOnce(&mut Contribution)) {
        let mut contribution = self.world.contribution(id).expect("contribution exists");
        f(&mut contribution);
        self.world.put_contribution(contribution);
    }

    pub fn run(&self, id: &ContributionId) -> ReconcileResult {
        self.run_trigger(&Trigger::rescan(id.clone()), false)
    }

    pub fn run_action(&self, id: &ContributionId, action: ContributionAction) -> ReconcileResult {
        let trigger = Trigger::ContributionChanged {
            id: id.clone(),
            action,
        };
        self.run_trigger(&trigger, false)
    }

    pub fn dry_run(&self, id: &ContributionId) -> ReconcileResult {
        self.run_trigger(&Trigger::rescan(id.clone()), true)
    }

    pub fn run_trigger(&self, trigger: &Trigger, dry_run: bool) -> ReconcileResult {
        self.reconciler.reconcile(trigger, dry_run).expect("pass runs")
    }

    /// Bot comment kinds in posting order.
    pub fn bot_comments(&self, id: &ContributionId) -> Vec<CommentKind> {
        self.world
            .comments(id)
            .iter()
            .filter(|c| c.author == BOT)
            .filter_map(|c| parse_kind(&c.body))
            .collect()
    }

    /// The link in the first bot comment's data block.
    pub fn link(&self, id: &ContributionId) -> Option<TrackerLink> {
        self.world
            .comments(id)
            .iter()
            .filter(|c| c.author == BOT)
            .find_map(|c| parse_data(&c.body))
            .and_then(|data| data.tracker)
    }

    pub fn record(&self, id: &ContributionId) -> Option<TrackerRecord> {
        self.link(id).and_then(|link| self.world.record(&link))
    }

    pub fn labels(&self, id: &ContributionId) -> BTreeSet<String> {
        self.world.contribution(id).expect("contribution exists").labels
    }
}

pub fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}
