use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdaterError};

/// Signature prefix of the only digest algorithm produced by the publisher.
pub const SHA256_PREFIX: &str = "sha256:";

/// File name of the manifest asset attached to a release.
pub const MANIFEST_FILE_NAME: &str = "update.json";

/// Release manifest (`update.json`) describing one release and its artefacts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Info {
    /// Semantic version string without a leading `v`.
    pub version: String,
    /// Publication timestamp.
    #[serde(rename = "releaseDate", default)]
    pub release_date: DateTime<Utc>,
    /// Free-form release notes.
    #[serde(rename = "releaseNotes", default)]
    pub release_notes: String,
    /// Link to the human-readable release page.
    #[serde(rename = "releaseNotesURL", default)]
    pub release_notes_url: String,
    /// Artefacts keyed by platform key (`darwin-arm64`, `windows-amd64`, ...).
    #[serde(default)]
    pub platforms: BTreeMap<String, Platform>,
}

impl Info {
    /// Artefact entry for `key`, if the release ships one.
    pub fn platform(&self, key: &str) -> Option<&Platform> {
        self.platforms.get(key)
    }

    /// Parse the semantic version contained in the manifest.
    pub fn parsed_version(&self) -> Result<semver::Version> {
        crate::version::parse_version(&self.version)
    }
}

/// Downloadable artefact for a single platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Platform {
    /// Absolute download URL.
    pub url: String,
    /// Content hash formatted as `<algorithm>:<hex-digest>`; empty when unknown.
    #[serde(default)]
    pub signature: String,
    /// Expected size (in bytes) of the artefact.
    #[serde(default)]
    pub size: u64,
}

impl Platform {
    /// Build an entry carrying a SHA-256 content hash.
    pub fn with_sha256(url: impl Into<String>, hex_digest: &str, size: u64) -> Self {
        Self {
            url: url.into(),
            signature: format!("{SHA256_PREFIX}{hex_digest}"),
            size,
        }
    }

    /// The hex SHA-256 digest from the signature, or `None` when it is empty.
    pub fn sha256_digest(&self) -> Result<Option<&str>> {
        if self.signature.is_empty() {
            return Ok(None);
        }
        self.signature
            .strip_prefix(SHA256_PREFIX)
            .filter(|digest| !digest.is_empty())
            .map(Some)
            .ok_or_else(|| UpdaterError::UnsupportedSignature(self.signature.clone()))
    }

    /// Last path segment of the download URL, used as the local file name.
    pub fn file_name(&self) -> Option<&str> {
        let path = self.url.split(['?', '#']).next().unwrap_or_default();
        path.rsplit('/').next().filter(|name| !name.is_empty())
    }
}

/// How much a resolved manifest can be trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ManifestTrust {
    /// Published `update.json` with per-platform hashes.
    Trusted,
    /// Synthesised from release metadata; no hashes.
    BestEffort,
}

/// A resolved release manifest, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Release {
    /// Decoded verbatim from the release's `update.json` asset.
    Trusted(Info),
    /// Derived from the release metadata and asset names.
    BestEffort(Info),
}

impl Release {
    pub fn info(&self) -> &Info {
        match self {
            Release::Trusted(info) | Release::BestEffort(info) => info,
        }
    }

    pub fn into_info(self) -> Info {
        match self {
            Release::Trusted(info) | Release::BestEffort(info) => info,
        }
    }

    pub fn trust(&self) -> ManifestTrust {
        match self {
            Release::Trusted(_) => ManifestTrust::Trusted,
            Release::BestEffort(_) => ManifestTrust::BestEffort,
        }
    }

    pub fn is_trusted(&self) -> bool {
        matches!(self, Release::Trusted(_))
    }
}
