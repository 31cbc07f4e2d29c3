// src/error.rs

//! Crate-wide error type.
//!
//! Every user-facing failure carries the offending package identity in its
//! message. Aggregate failures wrap the primary cause so callers can unwrap
//! back to the original error.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Install of an identity that the project already references.
    #[error("package '{identity}' is already installed in project '{project}'")]
    PackageAlreadyInstalled { identity: String, project: String },

    /// Identity not resolvable in any configured source.
    #[error("package '{identity}' was not found in any source")]
    PackageNotFound { identity: String },

    /// Id-only install with no permissible version in any source.
    #[error("no latest version of '{id}' satisfies the current policy")]
    NoLatestVersion { id: String },

    /// Uninstall refused because other references still depend on the package.
    #[error("unable to uninstall '{identity}' because '{dependent}' depends on it")]
    PackageHasDependents { identity: String, dependent: String },

    /// Chosen versions cannot jointly satisfy all range constraints. The
    /// detail names both sides of the violated requirement.
    #[error("dependency conflict on '{id}': {detail}")]
    DependencyConflict { id: String, detail: String },

    /// Id-only install would lower the version of an already-installed package.
    #[error("installing '{id}' would downgrade it from {installed} to {proposed}")]
    UnexpectedDowngrade {
        id: String,
        installed: String,
        proposed: String,
    },

    /// Package has framework-specific content but none of it fits the project.
    #[error("package '{identity}' has no items compatible with framework '{framework}'")]
    NoCompatibleItems { identity: String, framework: String },

    /// MinClientVersion or package-type gate.
    #[error("package '{identity}' requires capabilities this client does not provide: {reason}")]
    VersionNotSatisfied { identity: String, reason: String },

    /// Corrupt manifest XML. No partial parse is accepted.
    #[error("failed to parse manifest '{path}': {detail}")]
    ManifestParseError { path: PathBuf, detail: String },

    /// Every configured source failed for an operation that needed one.
    #[error("all package sources failed: {detail}")]
    SourceUnavailable { detail: String },

    /// Cooperative cancellation.
    #[error("operation was cancelled")]
    Cancelled,

    #[error("invalid version '{input}': {detail}")]
    VersionParse { input: String, detail: String },

    #[error("invalid version range '{input}': {detail}")]
    RangeParse { input: String, detail: String },

    #[error("invalid target framework '{input}'")]
    FrameworkParse { input: String },

    #[error("invalid package payload for '{identity}': {detail}")]
    PackageRead { identity: String, detail: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// A wrapper that preserves the primary cause of a compound failure.
    #[error("{context}")]
    Aggregate {
        context: String,
        #[source]
        inner: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with operation context, keeping it reachable as `inner`.
    pub fn aggregate(context: impl Into<String>, inner: Error) -> Self {
        Error::Aggregate {
            context: context.into(),
            inner: Box::new(inner),
        }
    }

    /// Unwrap through any aggregate layers to the primary cause.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Aggregate { inner, .. } => inner.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_unwraps_to_original() {
        let inner = Error::PackageNotFound {
            identity: "jQuery/1.4.4".to_string(),
        };
        let wrapped = Error::aggregate(
            "executing install plan",
            Error::aggregate("action 2 of 3", inner),
        );

        match wrapped.root_cause() {
            Error::PackageNotFound { identity } => assert_eq!(identity, "jQuery/1.4.4"),
            other => panic!("unexpected root cause: {other:?}"),
        }
    }

    #[test]
    fn test_messages_name_the_identity() {
        let err = Error::PackageHasDependents {
            identity: "jQuery".to_string(),
            dependent: "jQuery.Validation/1.13.1".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("jQuery"));
        assert!(msg.contains("jQuery.Validation/1.13.1"));
    }
}
