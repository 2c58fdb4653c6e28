//! Self-update support for FreelanceFlow: release discovery, artefact
//! download and content-hash verification.
//!
//! A release is described by an `update.json` manifest ([`Info`]) that the
//! `gen-update-info` tool attaches to each GitHub release. The resolver looks
//! for that manifest and falls back to a best-effort manifest derived from
//! the release's asset names when it is missing. [`UpdateClient`] ties the
//! pieces together into a small state machine that a UI can poll; it stops at
//! a verified file on disk and leaves installation to the caller.
//!
//! ```ignore
//! use updater::{CancellationToken, UpdateClient, UpdateStatus, UpdaterConfig};
//!
//! # async fn demo() -> updater::Result<()> {
//! let client = UpdateClient::from_config(UpdaterConfig::new(env!("CARGO_PKG_VERSION")))?;
//!
//! let state = client.check().await?;
//! if state.status == UpdateStatus::Available && state.platform_available {
//!     let artifact = client.download(&CancellationToken::new()).await?;
//!     if !artifact.verification.is_verified() {
//!         println!("downloaded {} without a published hash", artifact.version);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod config;
mod downloader;
mod error;
mod manifest;
mod platform;
mod resolver;
mod state;
mod version;

pub use client::{ArtifactVerification, DownloadedArtifact, UpdateClient};
pub use config::{UpdaterConfig, DEFAULT_API_BASE_URL, DEFAULT_OWNER, DEFAULT_REPO};
pub use downloader::{sha256_file, verify_hash, Downloader, Progress};
pub use error::{Result, UpdaterError};
pub use manifest::{Info, ManifestTrust, Platform, Release, MANIFEST_FILE_NAME, SHA256_PREFIX};
pub use platform::{classify, host_platform_key, platform_key_for, PLATFORM_TABLE};
pub use resolver::{
    GithubAsset, GithubRelease, GithubReleaseResolver, GithubReleaseResolverBuilder, ReleaseSource,
};
pub use state::{UpdateState, UpdateStatus};
pub use version::{compare_versions, is_newer, normalize_version, parse_version};

pub use tokio_util::sync::CancellationToken;
