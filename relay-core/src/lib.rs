//! Relay core library: domain types, configuration, ports, errors.
//!
//! Public API surface:
//! - [`types`]: identities, contributions, tracker records
//! - [`config`]: [`RelayConfig`] load / save / policy resolution
//! - [`ports`]: traits for the review platform, tracker and directory
//! - [`error`]: [`ConfigError`], [`PolicyError`], [`RemoteError`]

pub mod config;
pub mod error;
pub mod ports;
pub mod types;

pub use config::{ClaCheck, ProjectTarget, RelayConfig, RepoPolicy, RepoRule, StatusNames, TrackerServer};
pub use error::{ConfigError, PolicyError, RemoteError, RemoteErrorKind};
pub use ports::{DirectoryPort, PolicyLookup, ReviewPlatformPort, TrackerPort};
pub use types::{
    CheckState, Comment, CommentId, CommitStatus, Contribution, ContributionId, ContributionState, ContributionSummary,
    FieldChange, NewTrackerRecord, RepoName, ServerNick, TrackerFields, TrackerKey, TrackerLink,
    TrackerRecord,
};
