//! Error types for relay-engine.

use thiserror::Error;

use relay_core::error::{PolicyError, RemoteError};
use relay_core::types::ContributionId;

/// Failures that stop a pass before any write is attempted.
///
/// Failures of individual write operations are not errors; they are
/// reported in [`crate::apply::ReconcileResult::failed`].
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// Desired state could not be computed (unmapped repo, unknown server).
    #[error("policy conflict for {contribution}: {reason}")]
    PolicyConflict {
        contribution: ContributionId,
        reason: String,
    },

    /// Observed state could not be read.
    #[error("reading {contribution}: {source}")]
    Remote {
        contribution: ContributionId,
        #[source]
        source: RemoteError,
    },

    /// A lookup not tied to one contribution failed (rescan listings,
    /// tracker records named by an event).
    #[error("looking up {what}: {source}")]
    Lookup {
        what: String,
        #[source]
        source: RemoteError,
    },

    /// A tracker event names a record that does not exist or is not linked.
    #[error("tracker record {link} {reason}")]
    UnlinkedRecord { link: String, reason: String },

    /// A rescan worker panicked or was cancelled.
    #[error("rescan worker failed: {0}")]
    Join(String),
}

impl ReconcileError {
    pub(crate) fn policy(contribution: &ContributionId, err: PolicyError) -> Self {
        ReconcileError::PolicyConflict {
            contribution: contribution.clone(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn remote(contribution: &ContributionId, source: RemoteError) -> Self {
        ReconcileError::Remote {
            contribution: contribution.clone(),
            source,
        }
    }

    /// Whether retrying the same pass later could succeed without operator action.
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcileError::Remote { source, .. } | ReconcileError::Lookup { source, .. } => {
                source.is_retryable()
            }
            ReconcileError::Join(_) => true,
            _ => false,
        }
    }
}
