use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;

use crate::config::DEFAULT_API_BASE_URL;
use crate::error::{Result, UpdaterError};
use crate::manifest::{Info, Platform, Release, MANIFEST_FILE_NAME};
use crate::platform::classify;
use crate::version::normalize_version;

/// Abstraction over discovering the latest release of a project.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Resolve the manifest of the latest release of `owner/repo`.
    async fn fetch_latest_release(&self, owner: &str, repo: &str) -> Result<Release>;
}

/// Release metadata as returned by `GET /repos/{owner}/{repo}/releases/latest`.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub html_url: String,
    #[serde(default)]
    pub assets: Vec<GithubAsset>,
}

/// A file attached to a release.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubAsset {
    pub name: String,
    #[serde(default)]
    pub size: u64,
    pub browser_download_url: String,
}

impl GithubRelease {
    /// The attached `update.json`, if the release carries one.
    pub fn manifest_asset(&self) -> Option<&GithubAsset> {
        self.assets
            .iter()
            .find(|asset| asset.name == MANIFEST_FILE_NAME)
    }

    /// Synthesise a manifest from the release itself.
    ///
    /// Only assets whose names classify to a platform key are kept, and none
    /// of them carries a signature because nobody hashed them at publish time.
    pub fn best_effort_manifest(&self) -> Info {
        let mut platforms = BTreeMap::new();
        for asset in &self.assets {
            if let Some(key) = classify(&asset.name) {
                platforms.insert(
                    key.to_string(),
                    Platform {
                        url: asset.browser_download_url.clone(),
                        signature: String::new(),
                        size: asset.size,
                    },
                );
            }
        }

        Info {
            version: normalize_version(&self.tag_name).to_string(),
            release_date: self.published_at.unwrap_or_default(),
            release_notes: self.body.clone().unwrap_or_default(),
            release_notes_url: self.html_url.clone(),
            platforms,
        }
    }
}

/// Builder for [`GithubReleaseResolver`].
#[derive(Default)]
pub struct GithubReleaseResolverBuilder {
    api_base_url: Option<String>,
    client: Option<Client>,
}

impl GithubReleaseResolverBuilder {
    /// Set the API base URL (e.g. `https://api.github.com` or a mock server).
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Provide a custom reqwest client instance.
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the resolver.
    pub fn build(self) -> GithubReleaseResolver {
        let api_base_url = self
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        let client = self.client.unwrap_or_else(Client::new);

        GithubReleaseResolver {
            api_base_url,
            client,
        }
    }
}

/// Resolves releases through the GitHub REST API.
#[derive(Clone)]
pub struct GithubReleaseResolver {
    api_base_url: String,
    client: Client,
}

impl GithubReleaseResolver {
    /// Create a new builder.
    pub fn builder() -> GithubReleaseResolverBuilder {
        GithubReleaseResolverBuilder::default()
    }

    /// Base URL requests are sent to.
    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    fn latest_release_url(&self, owner: &str, repo: &str) -> String {
        format!("{}/repos/{owner}/{repo}/releases/latest", self.api_base_url)
    }

    /// Fetch and decode the raw release metadata.
    pub async fn fetch_release_metadata(&self, owner: &str, repo: &str) -> Result<GithubRelease> {
        let url = self.latest_release_url(owner, repo);
        let body = self
            .get_bytes(&url, Some("application/vnd.github+json"))
            .await?;
        serde_json::from_slice(&body).map_err(|source| UpdaterError::Decode {
            what: "release metadata",
            source,
        })
    }

    async fn fetch_manifest(&self, url: &str) -> Result<Info> {
        let body = self.get_bytes(url, None).await?;
        serde_json::from_slice(&body).map_err(|source| UpdaterError::Decode {
            what: MANIFEST_FILE_NAME,
            source,
        })
    }

    async fn get_bytes(&self, url: &str, accept: Option<&str>) -> Result<Vec<u8>> {
        tracing::debug!("GET {url}");
        let mut request = self.client.get(url);
        if let Some(accept) = accept {
            request = request.header(header::ACCEPT, accept);
        }

        let response = request
            .send()
            .await
            .map_err(|err| UpdaterError::transport(url, err))?;
        if response.status() != StatusCode::OK {
            return Err(UpdaterError::HttpStatus {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| UpdaterError::transport(url, err))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ReleaseSource for GithubReleaseResolver {
    async fn fetch_latest_release(&self, owner: &str, repo: &str) -> Result<Release> {
        let release = self.fetch_release_metadata(owner, repo).await?;

        if let Some(asset) = release.manifest_asset() {
            let info = self.fetch_manifest(&asset.browser_download_url).await?;
            tracing::info!(
                "resolved {owner}/{repo} {} from {MANIFEST_FILE_NAME} ({} platforms)",
                info.version,
                info.platforms.len()
            );
            return Ok(Release::Trusted(info));
        }

        let info = release.best_effort_manifest();
        tracing::info!(
            "{owner}/{repo} {} has no {MANIFEST_FILE_NAME}; using release assets ({} platforms, unsigned)",
            info.version,
            info.platforms.len()
        );
        Ok(Release::BestEffort(info))
    }
}
