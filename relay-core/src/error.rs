//! Error types for relay-core.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load, with the offending file.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// The document parsed but is not usable.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A configuration gap that prevents computing desired state for a repo.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    #[error("no repo rule matches {repo}")]
    NoRule { repo: String },

    #[error("repo rule for {repo} names unknown tracker server '{server}'")]
    UnknownServer { repo: String, server: String },

    #[error("invalid pattern '{pattern}': {message}")]
    BadPattern { pattern: String, message: String },
}

/// How a remote call failed, from the engine's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteErrorKind {
    /// The referenced resource no longer exists.
    NotFound,
    /// The credentials lack permission for this call.
    PermissionDenied,
    /// Network failure or 5xx; the caller's retry policy decides.
    Transient,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteErrorKind::NotFound => write!(f, "not found"),
            RemoteErrorKind::PermissionDenied => write!(f, "permission denied"),
            RemoteErrorKind::Transient => write!(f, "transient"),
        }
    }
}

/// A failed call against one of the two remote systems.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} during {operation}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    /// What was being attempted, e.g. `fetch record OSPR-12`.
    pub operation: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(
        kind: RemoteErrorKind,
        operation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NotFound, operation, message)
    }

    pub fn permission_denied(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::PermissionDenied, operation, message)
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transient, operation, message)
    }

    /// Only transient failures are worth retrying, and only by the caller.
    pub fn is_retryable(&self) -> bool {
        self.kind == RemoteErrorKind::Transient
    }
}
