use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use semver::Version;
use tokio_util::sync::CancellationToken;

use crate::config::UpdaterConfig;
use crate::downloader::{verify_hash, Downloader};
use crate::error::{Result, UpdaterError};
use crate::manifest::{ManifestTrust, Release};
use crate::resolver::{GithubReleaseResolver, ReleaseSource};
use crate::state::{UpdateState, UpdateStatus};
use crate::version::{is_newer, parse_version};

/// Drives update checks and downloads and keeps the state the UI polls.
///
/// Every transition happens under one lock, so a stray concurrent call is
/// rejected with [`UpdaterError::InvalidState`] instead of interleaving.
pub struct UpdateClient<S> {
    source: S,
    downloader: Downloader,
    config: UpdaterConfig,
    current_version: Version,
    inner: Mutex<Inner>,
}

struct Inner {
    state: UpdateState,
    release: Option<Release>,
}

impl Inner {
    fn fail(&mut self, err: UpdaterError) -> UpdaterError {
        tracing::warn!("update failed: {err}");
        self.state.status = UpdateStatus::Error;
        self.state.error = Some(err.to_string());
        err
    }

    /// Drop the resolved release and everything the snapshot derived from it.
    fn forget_release(&mut self) {
        self.release = None;
        let state = &mut self.state;
        state.latest_version = None;
        state.release_notes = None;
        state.release_notes_url = None;
        state.platform_available = false;
        state.trust = None;
        state.progress = None;
        state.downloaded_path = None;
        state.verified = false;
    }
}

/// Marks a `Checking`/`Downloading` state as owned by one call.
///
/// If the call's future is dropped before it calls [`InFlight::complete`],
/// the state moves to `Error` so later calls are not locked out.
struct InFlight<'a> {
    inner: &'a Mutex<Inner>,
    status: UpdateStatus,
    armed: bool,
}

impl InFlight<'_> {
    fn complete(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.state.status != self.status {
            return;
        }
        tracing::info!("{} abandoned by its caller", self.status);
        if self.status == UpdateStatus::Checking {
            inner.forget_release();
        }
        inner.fail(UpdaterError::Cancelled);
    }
}

/// What is known about a downloaded artefact's integrity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactVerification {
    /// The SHA-256 digest matched the manifest.
    Verified { sha256: String },
    /// The manifest carried no hash, so nothing was checked.
    Unverified,
}

impl ArtifactVerification {
    pub fn is_verified(&self) -> bool {
        matches!(self, ArtifactVerification::Verified { .. })
    }
}

/// An artefact that finished downloading.
#[derive(Debug, Clone)]
pub struct DownloadedArtifact {
    pub path: PathBuf,
    pub version: String,
    pub platform_key: String,
    pub verification: ArtifactVerification,
}

/// Everything needed to fetch the selected artefact, captured at the
/// `Available -> Downloading` transition.
struct DownloadPlan {
    url: String,
    file_name: Option<String>,
    size: u64,
    sha256: Option<String>,
    version: String,
    platform_key: String,
}

impl UpdateClient<GithubReleaseResolver> {
    /// Client that resolves releases through the configured GitHub API.
    pub fn from_config(config: UpdaterConfig) -> Result<Self> {
        let http = config.http_client()?;
        let source = GithubReleaseResolver::builder()
            .api_base_url(config.api_base_url.clone())
            .client(http.clone())
            .build();
        Self::new(source, Downloader::new(http), config)
    }
}

impl<S> UpdateClient<S>
where
    S: ReleaseSource,
{
    /// Create a client in the `Idle` state.
    pub fn new(source: S, downloader: Downloader, config: UpdaterConfig) -> Result<Self> {
        let current_version = parse_version(&config.current_version)?;
        let mut state = UpdateState::new(current_version.to_string());
        state.platform_key = config.resolved_platform_key();

        Ok(Self {
            source,
            downloader,
            config,
            current_version,
            inner: Mutex::new(Inner {
                state,
                release: None,
            }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the current state. Never touches the network.
    pub fn get_update_state(&self) -> UpdateState {
        self.lock().state.clone()
    }

    /// The release found by the last successful check.
    pub fn latest_release(&self) -> Option<Release> {
        self.lock().release.clone()
    }

    /// Version of the running build.
    pub fn current_version(&self) -> &Version {
        &self.current_version
    }

    /// Ask the release host for the latest release and compare versions.
    pub async fn check(&self) -> Result<UpdateState> {
        let in_flight = self.transition(UpdateStatus::Checking, "check for updates")?;

        let owner = &self.config.owner;
        let repo = &self.config.repo;
        tracing::info!("checking {owner}/{repo} for updates (running {})", self.current_version);

        let outcome = match self.source.fetch_latest_release(owner, repo).await {
            Ok(release) => release
                .info()
                .parsed_version()
                .map(|version| (release, version)),
            Err(err) => Err(err),
        };
        in_flight.complete();

        let mut inner = self.lock();
        let (release, latest) = match outcome {
            Ok(found) => found,
            Err(err) => {
                inner.forget_release();
                return Err(inner.fail(err));
            }
        };

        let info = release.info();
        let newer = is_newer(&latest, &self.current_version);
        let platform_available = inner
            .state
            .platform_key
            .as_deref()
            .is_some_and(|key| info.platform(key).is_some());

        let state = &mut inner.state;
        state.status = if newer {
            UpdateStatus::Available
        } else {
            UpdateStatus::UpToDate
        };
        state.latest_version = Some(info.version.clone());
        state.error = None;
        state.release_notes = Some(info.release_notes.clone());
        state.release_notes_url = Some(info.release_notes_url.clone());
        state.platform_available = platform_available;
        state.trust = Some(release.trust());
        state.progress = None;
        state.downloaded_path = None;
        state.verified = false;

        if newer {
            tracing::info!(
                "update {} available (platform artefact {})",
                info.version,
                if platform_available { "present" } else { "missing" }
            );
        } else {
            tracing::info!("already up to date (latest release {})", info.version);
        }

        inner.release = Some(release);
        Ok(inner.state.clone())
    }

    /// Download the selected artefact into the configured download directory,
    /// named after the last segment of its URL.
    pub async fn download(&self, cancel: &CancellationToken) -> Result<DownloadedArtifact> {
        let (plan, in_flight) = self.begin_download()?;
        let Some(file_name) = plan.file_name.clone() else {
            in_flight.complete();
            let err = UpdaterError::Other(format!("cannot derive a file name from {}", plan.url));
            return Err(self.lock().fail(err));
        };
        let dest = self.config.download_dir.join(file_name);
        self.run_download(cancel, plan, in_flight, &dest).await
    }

    /// Download the selected artefact to `dest` and verify it when the
    /// manifest carries a hash.
    ///
    /// Requires the `Available` state with an artefact for this platform;
    /// otherwise the state is left untouched and an error is returned.
    /// Dropping the returned future mid-transfer leaves the state in `Error`.
    pub async fn download_to(
        &self,
        cancel: &CancellationToken,
        dest: &Path,
    ) -> Result<DownloadedArtifact> {
        let (plan, in_flight) = self.begin_download()?;
        self.run_download(cancel, plan, in_flight, dest).await
    }

    fn begin_download(&self) -> Result<(DownloadPlan, InFlight<'_>)> {
        let mut inner = self.lock();
        let plan = match Self::plan(&inner) {
            Ok(plan) => plan,
            Err(err @ UpdaterError::InvalidState { .. })
            | Err(err @ UpdaterError::PlatformUnavailable(_)) => return Err(err),
            Err(err) => return Err(inner.fail(err)),
        };

        let state = &mut inner.state;
        state.status = UpdateStatus::Downloading;
        state.progress = None;
        state.downloaded_path = None;
        state.verified = false;
        Ok((plan, self.in_flight(UpdateStatus::Downloading)))
    }

    async fn run_download(
        &self,
        cancel: &CancellationToken,
        plan: DownloadPlan,
        in_flight: InFlight<'_>,
        dest: &Path,
    ) -> Result<DownloadedArtifact> {
        tracing::info!("downloading {} for {}", plan.version, plan.platform_key);
        let result = self.fetch_and_verify(cancel, &plan, dest).await;
        in_flight.complete();

        let mut inner = self.lock();
        match result {
            Ok(verification) => {
                let state = &mut inner.state;
                state.status = UpdateStatus::Downloaded;
                state.error = None;
                state.downloaded_path = Some(dest.to_path_buf());
                state.verified = verification.is_verified();
                tracing::info!(
                    "downloaded {} to {} ({})",
                    plan.version,
                    dest.display(),
                    if state.verified { "verified" } else { "unverified" }
                );
                Ok(DownloadedArtifact {
                    path: dest.to_path_buf(),
                    version: plan.version,
                    platform_key: plan.platform_key,
                    verification,
                })
            }
            Err(err) => Err(inner.fail(err)),
        }
    }

    fn transition(&self, to: UpdateStatus, attempted: &'static str) -> Result<InFlight<'_>> {
        let mut inner = self.lock();
        let current = inner.state.status;
        if current.is_busy() {
            return Err(UpdaterError::InvalidState { current, attempted });
        }
        inner.state.status = to;
        Ok(self.in_flight(to))
    }

    fn in_flight(&self, status: UpdateStatus) -> InFlight<'_> {
        InFlight {
            inner: &self.inner,
            status,
            armed: true,
        }
    }

    fn plan(inner: &Inner) -> Result<DownloadPlan> {
        let current = inner.state.status;
        let release = match (&inner.release, current) {
            (Some(release), UpdateStatus::Available) => release,
            _ => {
                return Err(UpdaterError::InvalidState {
                    current,
                    attempted: "download an update",
                })
            }
        };

        let platform_key = inner
            .state
            .platform_key
            .clone()
            .ok_or_else(|| UpdaterError::PlatformUnavailable("unknown host platform".into()))?;
        let info = release.info();
        let platform = info
            .platform(&platform_key)
            .ok_or_else(|| UpdaterError::PlatformUnavailable(platform_key.clone()))?;

        let sha256 = match release.trust() {
            ManifestTrust::Trusted => Some(
                platform
                    .sha256_digest()?
                    .ok_or_else(|| UpdaterError::MissingSignature(platform_key.clone()))?
                    .to_string(),
            ),
            ManifestTrust::BestEffort => None,
        };

        Ok(DownloadPlan {
            url: platform.url.clone(),
            file_name: platform.file_name().map(str::to_string),
            size: platform.size,
            sha256,
            version: info.version.clone(),
            platform_key,
        })
    }

    async fn fetch_and_verify(
        &self,
        cancel: &CancellationToken,
        plan: &DownloadPlan,
        dest: &Path,
    ) -> Result<ArtifactVerification> {
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| UpdaterError::fs(parent, err))?;
        }

        let written = self
            .downloader
            .download(cancel, &plan.url, dest, |progress| {
                self.lock().state.progress = Some(progress);
            })
            .await?;

        let Some(expected) = plan.sha256.clone() else {
            tracing::warn!(
                "{} comes from a best-effort manifest; hash verification skipped",
                dest.display()
            );
            return Ok(ArtifactVerification::Unverified);
        };

        if plan.size > 0 && written != plan.size {
            discard(dest).await;
            return Err(UpdaterError::SizeMismatch {
                expected: plan.size,
                actual: written,
            });
        }

        let path = dest.to_path_buf();
        let digest = expected.clone();
        let checked = tokio::task::spawn_blocking(move || verify_hash(&path, &digest))
            .await
            .map_err(|err| UpdaterError::Other(format!("hash verification task failed: {err}")))?;
        if let Err(err) = checked {
            if matches!(err, UpdaterError::HashMismatch { .. }) {
                tracing::warn!("removing {}: {err}", dest.display());
                discard(dest).await;
            }
            return Err(err);
        }

        Ok(ArtifactVerification::Verified { sha256: expected })
    }
}

async fn discard(path: &Path) {
    if let Err(err) = tokio::fs::remove_file(path).await {
        tracing::warn!("failed to remove rejected download {}: {err}", path.display());
    }
}
