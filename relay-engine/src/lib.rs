//! # relay-engine
//!
//! Reconciles a contribution on the review platform with its record in the
//! issue tracker.
//!
//! Call [`Reconciler::reconcile`] for one contribution, or [`rescan`] to run
//! the same pass over every contribution of a repo or organization. Each pass
//! observes both systems, classifies the contribution, computes the state it
//! should be in and applies the difference.

pub mod apply;
pub mod classify;
pub mod desired;
pub mod error;
pub mod ledger;
pub mod memory;
pub mod observe;
pub mod pipeline;
pub mod plan;
pub mod preview;
pub mod rescan;

pub use apply::{FailedOperation, FailureKind, ReconcileResult, SkippedOperation};
pub use classify::{Category, Phase};
pub use error::ReconcileError;
pub use memory::{MemoryWorld, WorldState};
pub use pipeline::{ContributionAction, PlannedPass, Reconciler, Trigger};
pub use plan::{Operation, Plan};
pub use preview::{preview_comments, CommentAction, CommentPreview};
pub use rescan::{rescan, RescanReport, RescanRequest, RescanScope, RescanWindow};
