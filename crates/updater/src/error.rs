use std::path::PathBuf;
use std::time::Duration;

use crate::state::UpdateStatus;

/// Convenient result alias for updater operations.
pub type Result<T> = std::result::Result<T, UpdaterError>;

/// Errors that can occur while checking for or downloading an update.
#[derive(thiserror::Error, Debug)]
pub enum UpdaterError {
    /// The request never produced a response, or the body stream broke off.
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// The server answered with something other than `200 OK`.
    #[error("{url} returned HTTP status {status}")]
    HttpStatus { url: String, status: u16 },
    /// A structured document could not be decoded.
    #[error("failed to decode {what}: {source}")]
    Decode {
        /// Which document was being decoded (release metadata, update.json).
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    /// Failed to stat, open, read or write a local file.
    #[error("filesystem operation on {} failed: {source}", .path.display())]
    FileSystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The downloaded artefact hash did not match the manifest.
    #[error("hash mismatch (expected {expected}, got {actual})")]
    HashMismatch {
        /// Expected SHA-256 digest.
        expected: String,
        /// Actual SHA-256 digest.
        actual: String,
    },
    /// The downloaded artefact is not the size the manifest promised.
    #[error("size mismatch (expected {expected} bytes, got {actual} bytes)")]
    SizeMismatch { expected: u64, actual: u64 },
    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,
    /// The download deadline passed before the transfer finished.
    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),
    /// A version string is not a semantic version.
    #[error("invalid version {version:?}: {source}")]
    InvalidVersion {
        version: String,
        #[source]
        source: semver::Error,
    },
    /// The manifest signature uses an algorithm this client cannot check.
    #[error("unsupported signature format: {0}")]
    UnsupportedSignature(String),
    /// A trusted manifest entry came without a content hash.
    #[error("trusted manifest entry for {0} carries no signature")]
    MissingSignature(String),
    /// The release has no artefact for the requested platform.
    #[error("no artefact published for platform {0}")]
    PlatformUnavailable(String),
    /// The operation is not allowed in the current update state.
    #[error("cannot {attempted} while update state is {current}")]
    InvalidState {
        current: UpdateStatus,
        attempted: &'static str,
    },
    /// Generic error.
    #[error("{0}")]
    Other(String),
}

impl UpdaterError {
    /// True when the operation was aborted by the caller or by its deadline.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, UpdaterError::Cancelled | UpdaterError::TimedOut(_))
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UpdaterError::FileSystem {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transport(url: impl Into<String>, source: reqwest::Error) -> Self {
        UpdaterError::Transport {
            url: url.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_mismatch_mentions_both_digests() {
        let error = UpdaterError::HashMismatch {
            expected: "abc".into(),
            actual: "xyz".into(),
        };
        let display = error.to_string();
        assert!(display.contains("abc"));
        assert!(display.contains("xyz"));
    }

    #[test]
    fn cancellation_covers_deadline() {
        assert!(UpdaterError::Cancelled.is_cancellation());
        assert!(UpdaterError::TimedOut(Duration::from_secs(1)).is_cancellation());
        assert!(!UpdaterError::Other("boom".into()).is_cancellation());
    }

    #[test]
    fn invalid_state_names_both_sides() {
        let error = UpdaterError::InvalidState {
            current: UpdateStatus::Downloading,
            attempted: "check for updates",
        };
        assert_eq!(
            error.to_string(),
            "cannot check for updates while update state is downloading"
        );
    }
}
