//! Reconciliation pipeline entrypoint shared by event handling, rescans and the CLI.
//!
//! One pass: observe → classify → desired state → plan → apply. Every pass
//! starts from a fresh read of both remote systems.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use relay_core::config::RepoPolicy;
use relay_core::ports::{DirectoryPort, PolicyLookup, ReviewPlatformPort, TrackerPort};
use relay_core::types::{ContributionId, TrackerLink};
use relay_renderer::CommentRenderer;

use crate::apply::{apply, ApplyContext, ReconcileResult};
use crate::classify::{classify, derive_phase};
use crate::desired::{desired_state, DesiredState};
use crate::error::ReconcileError;
use crate::observe::{observe, ObservedState};
use crate::plan::{self, Plan};

/// What happened to a contribution, as reported by the review platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionAction {
    Opened,
    Edited,
    Synchronize,
    ReadyForReview,
    ConvertedToDraft,
    Closed,
    Reopened,
    /// Not an event: a rescan or manual run.
    Rescan,
}

impl FromStr for ContributionAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "opened" => Ok(Self::Opened),
            "edited" => Ok(Self::Edited),
            "synchronize" => Ok(Self::Synchronize),
            "ready_for_review" => Ok(Self::ReadyForReview),
            "converted_to_draft" => Ok(Self::ConvertedToDraft),
            "closed" => Ok(Self::Closed),
            "reopened" => Ok(Self::Reopened),
            "rescan" => Ok(Self::Rescan),
            other => Err(format!("unknown contribution action '{other}'")),
        }
    }
}

impl fmt::Display for ContributionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Opened => "opened",
            Self::Edited => "edited",
            Self::Synchronize => "synchronize",
            Self::ReadyForReview => "ready_for_review",
            Self::ConvertedToDraft => "converted_to_draft",
            Self::Closed => "closed",
            Self::Reopened => "reopened",
            Self::Rescan => "rescan",
        };
        f.write_str(s)
    }
}

/// Why a pass runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "trigger", rename_all = "snake_case")]
pub enum Trigger {
    ContributionChanged {
        id: ContributionId,
        action: ContributionAction,
    },
    /// A tracker record moved through its workflow.
    TrackerStatusChanged { link: TrackerLink },
}

impl Trigger {
    pub fn rescan(id: ContributionId) -> Self {
        Trigger::ContributionChanged {
            id,
            action: ContributionAction::Rescan,
        }
    }

    fn reopened(&self) -> bool {
        matches!(
            self,
            Trigger::ContributionChanged {
                action: ContributionAction::Reopened,
                ..
            }
        )
    }
}

/// Everything one pass computed before writing anything.
#[derive(Debug, Clone)]
pub struct PlannedPass {
    pub policy: RepoPolicy,
    pub observed: ObservedState,
    pub desired: DesiredState,
    pub plan: Plan,
}

/// The engine: the ports it talks through plus the comment renderer.
///
/// Cheap to clone; clones share the same ports.
#[derive(Clone)]
pub struct Reconciler {
    platform: Arc<dyn ReviewPlatformPort>,
    tracker: Arc<dyn TrackerPort>,
    directory: Arc<dyn DirectoryPort>,
    policies: Arc<dyn PolicyLookup>,
    renderer: Arc<CommentRenderer>,
}

impl Reconciler {
    pub fn new(
        platform: Arc<dyn ReviewPlatformPort>,
        tracker: Arc<dyn TrackerPort>,
        directory: Arc<dyn DirectoryPort>,
        policies: Arc<dyn PolicyLookup>,
        renderer: Arc<CommentRenderer>,
    ) -> Self {
        Self {
            platform,
            tracker,
            directory,
            policies,
            renderer,
        }
    }

    pub fn platform(&self) -> &dyn ReviewPlatformPort {
        self.platform.as_ref()
    }

    pub fn renderer(&self) -> &CommentRenderer {
        &self.renderer
    }

    /// The contribution a trigger is about.
    pub fn resolve(&self, trigger: &Trigger) -> Result<ContributionId, ReconcileError> {
        match trigger {
            Trigger::ContributionChanged { id, .. } => Ok(id.clone()),
            Trigger::TrackerStatusChanged { link } => {
                let record = self
                    .tracker
                    .fetch_record(link)
                    .map_err(|source| ReconcileError::Lookup {
                        what: format!("tracker record {link}"),
                        source,
                    })?
                    .ok_or_else(|| ReconcileError::UnlinkedRecord {
                        link: link.to_string(),
                        reason: "does not exist".to_string(),
                    })?;
                record
                    .contribution_id()
                    .ok_or_else(|| ReconcileError::UnlinkedRecord {
                        link: link.to_string(),
                        reason: "names no contribution".to_string(),
                    })
            }
        }
    }

    /// Observe and diff without writing.
    pub fn plan(&self, trigger: &Trigger) -> Result<PlannedPass, ReconcileError> {
        let id = self.resolve(trigger)?;
        let policy = self.policies.policy_for(&id.repo).map_err(|err| {
            tracing::warn!(contribution = %id, error = %err, "policy conflict");
            ReconcileError::policy(&id, err)
        })?;
        let observed = observe(
            &id,
            &policy,
            self.platform.as_ref(),
            self.tracker.as_ref(),
            self.directory.as_ref(),
        )?;
        let category = classify(&observed.contribution, &policy, self.directory.as_ref());
        let phase = derive_phase(
            &observed.contribution,
            trigger.reopened(),
            observed.tracker.record(),
        );
        let desired = desired_state(category, phase, &observed, &policy);
        let plan = plan::build(&desired, &observed);
        tracing::debug!(
            contribution = %id,
            category = %category,
            phase = %phase,
            operations = plan.operations.len(),
            "planned",
        );
        Ok(PlannedPass {
            policy,
            observed,
            desired,
            plan,
        })
    }

    /// Run one full pass for `trigger`.
    pub fn reconcile(
        &self,
        trigger: &Trigger,
        dry_run: bool,
    ) -> Result<ReconcileResult, ReconcileError> {
        let pass = self.plan(trigger)?;
        tracing::info!(
            contribution = %pass.plan.contribution,
            category = %pass.plan.category,
            phase = %pass.plan.phase,
            operations = pass.plan.operations.len(),
            dry_run,
            "reconciling",
        );
        let ctx = ApplyContext {
            platform: self.platform.as_ref(),
            tracker: self.tracker.as_ref(),
            renderer: &self.renderer,
            policy: &pass.policy,
            observed: &pass.observed,
        };
        Ok(apply(&pass.plan, &ctx, dry_run))
    }
}
