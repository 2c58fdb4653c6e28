//! Configuration for the update client.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UpdaterError};

/// Public GitHub REST API.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";
/// Repository owner the application is released from.
pub const DEFAULT_OWNER: &str = "royzhu";
/// Repository the application is released from.
pub const DEFAULT_REPO: &str = "freelance-flow";

/// Configuration for the update client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdaterConfig {
    /// Base URL of the release hosting API (overridable for tests and
    /// self-hosted instances)
    pub api_base_url: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub repo: String,
    /// Version of the running build
    pub current_version: String,
    /// User-Agent sent with every request
    pub user_agent: String,
    /// Platform key override; detected from the host when unset
    pub platform_key: Option<String>,
    /// Directory downloads are written to
    pub download_dir: PathBuf,
    /// Connect timeout for HTTP requests
    pub request_timeout: Option<Duration>,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            user_agent: concat!("freelance-flow-updater/", env!("CARGO_PKG_VERSION")).to_string(),
            platform_key: None,
            download_dir: std::env::temp_dir().join("freelance-flow-updates"),
            request_timeout: None,
        }
    }
}

impl UpdaterConfig {
    /// Create a config for the given running version
    pub fn new(current_version: impl Into<String>) -> Self {
        let mut config = Self::default();
        config.current_version = current_version.into();
        config
    }

    /// Set the release hosting API base URL
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// Set the repository to check
    pub fn repository(mut self, owner: impl Into<String>, repo: impl Into<String>) -> Self {
        self.owner = owner.into();
        self.repo = repo.into();
        self
    }

    /// Set the User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Pin the platform key instead of detecting it
    pub fn platform_key(mut self, key: impl Into<String>) -> Self {
        self.platform_key = Some(key.into());
        self
    }

    /// Set the download directory
    pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    /// Set the HTTP connect timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Platform key used to select artefacts: the override, or the host's.
    pub fn resolved_platform_key(&self) -> Option<String> {
        self.platform_key
            .clone()
            .or_else(|| crate::platform::host_platform_key().map(str::to_string))
    }

    /// Build the HTTP client shared by the resolver and the downloader.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().user_agent(self.user_agent.clone());
        if let Some(timeout) = self.request_timeout {
            builder = builder.connect_timeout(timeout);
        }
        builder
            .build()
            .map_err(|err| UpdaterError::Other(format!("failed to build HTTP client: {err}")))
    }
}
