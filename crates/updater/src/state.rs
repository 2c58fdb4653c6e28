use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::downloader::Progress;
use crate::manifest::ManifestTrust;

/// Coarse status of the update state machine.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum UpdateStatus {
    /// Nothing has happened yet in this session.
    #[default]
    Idle,
    /// Querying the release host.
    Checking,
    /// A newer release exists.
    Available,
    /// The running build is the latest release.
    UpToDate,
    /// Transferring the artefact.
    Downloading,
    /// The artefact is on disk (see [`UpdateState::verified`]).
    Downloaded,
    /// The last operation failed; [`UpdateState::error`] says why.
    Error,
}

impl UpdateStatus {
    /// True while a check or download is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, UpdateStatus::Checking | UpdateStatus::Downloading)
    }
}

impl fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            UpdateStatus::Idle => "idle",
            UpdateStatus::Checking => "checking",
            UpdateStatus::Available => "available",
            UpdateStatus::UpToDate => "up to date",
            UpdateStatus::Downloading => "downloading",
            UpdateStatus::Downloaded => "downloaded",
            UpdateStatus::Error => "error",
        };
        f.write_str(label)
    }
}

/// Snapshot of the update subsystem, as shown to the UI.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub status: UpdateStatus,
    /// Version of the running build.
    pub current_version: String,
    /// Version of the latest release, once a check succeeded.
    pub latest_version: Option<String>,
    /// Human-readable failure summary while `status` is `Error`.
    pub error: Option<String>,
    pub release_notes: Option<String>,
    pub release_notes_url: Option<String>,
    /// Platform key used to pick the artefact.
    pub platform_key: Option<String>,
    /// Whether the latest release ships an artefact for this platform.
    pub platform_available: bool,
    /// Where the release manifest came from.
    pub trust: Option<ManifestTrust>,
    pub progress: Option<Progress>,
    pub downloaded_path: Option<PathBuf>,
    /// Whether the downloaded artefact passed a hash check. Best-effort
    /// manifests carry no hash, so their downloads stay unverified.
    pub verified: bool,
}

impl UpdateState {
    pub(crate) fn new(current_version: impl Into<String>) -> Self {
        Self {
            current_version: current_version.into(),
            ..Default::default()
        }
    }
}
