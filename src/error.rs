//! Error types for nlmkit operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nlmkit operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing profiles, sessions and notebooks.
#[derive(Error, Debug)]
pub enum Error {
    /// No profile was named and none is active.
    #[error("no active profile")]
    NoActiveProfile,

    /// A profile with the derived id already exists.
    #[error("profile '{0}' already exists")]
    DuplicateProfile(String),

    /// Operation on an unknown profile id.
    #[error("profile not found: {0}")]
    ProfileNotFound(String),

    /// Interactive login did not complete in time.
    #[error("login for profile {profile} timed out after {timeout_secs}s")]
    AuthTimeout {
        /// Profile being authenticated.
        profile: String,
        /// Bound that was exceeded.
        timeout_secs: u64,
    },

    /// The stored session of a profile is missing or signed out.
    #[error("profile {0} has no authenticated session")]
    NotAuthenticated(String),

    /// Browser launch, navigation or interaction failed.
    #[error("automation error: {0}")]
    AuthAutomation(String),

    /// A document could not be written.
    #[error("failed to persist {}: {source}", path.display())]
    Persistence {
        /// Target path of the write.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Legacy layout migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// A notebook with this id already exists in the library.
    #[error("notebook '{0}' already exists")]
    DuplicateNotebook(String),

    /// Operation on an unknown notebook id.
    #[error("notebook not found: {0}")]
    NotebookNotFound(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// JSON document could not be parsed or produced.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Build a persistence error for `path`.
    pub fn persistence(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Persistence {
            path: path.into(),
            source,
        }
    }

    /// Returns true if retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::AuthTimeout { .. } | Error::AuthAutomation(_))
    }

    /// Suggested command the user can run to recover, if any.
    pub fn remediation(&self) -> Option<String> {
        match self {
            Error::NoActiveProfile => Some("nlmkit setup --name <name>".into()),
            Error::ProfileNotFound(_) => Some("nlmkit list".into()),
            Error::DuplicateProfile(id) => Some(format!("nlmkit setup --profile {}", id)),
            Error::AuthTimeout { profile, .. } => Some(format!(
                "nlmkit reauth --profile {} --timeout <minutes>",
                profile
            )),
            Error::NotAuthenticated(id) => Some(format!("nlmkit setup --profile {}", id)),
            Error::AuthAutomation(_) => Some("nlmkit validate".into()),
            Error::NotebookNotFound(_) => Some("nlmkit notebook list".into()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(Error::AuthAutomation("launch".into()).is_retryable());
        assert!(Error::AuthTimeout {
            profile: "alice".into(),
            timeout_secs: 60
        }
        .is_retryable());
        assert!(!Error::NoActiveProfile.is_retryable());
        assert!(!Error::DuplicateProfile("alice".into()).is_retryable());
    }

    #[test]
    fn test_remediation_hints() {
        assert_eq!(
            Error::NoActiveProfile.remediation().as_deref(),
            Some("nlmkit setup --name <name>")
        );
        let hint = Error::AuthTimeout {
            profile: "bob".into(),
            timeout_secs: 600,
        }
        .remediation()
        .unwrap();
        assert!(hint.contains("--profile bob"));
        assert_eq!(
            Error::NotAuthenticated("carol".into())
                .remediation()
                .as_deref(),
            Some("nlmkit setup --profile carol")
        );
        assert!(!Error::NotAuthenticated("carol".into()).is_retryable());
        assert!(Error::Config("x".into()).remediation().is_none());
    }
}
