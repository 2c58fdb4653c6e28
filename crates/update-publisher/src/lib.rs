//! Builds the `update.json` manifest that FreelanceFlow clients resolve
//! release artefacts from.
//!
//! Every artefact is hashed with SHA-256 and filed under the platform key its
//! name classifies to, using the same table the client-side resolver falls
//! back on.

mod error;

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use updater::{classify, normalize_version, Info, Platform, DEFAULT_OWNER, DEFAULT_REPO};

pub use error::{PublishError, Result};

/// Host release pages and downloads are served from.
pub const DEFAULT_RELEASE_HOST: &str = "https://github.com";

/// Inputs for one manifest.
#[derive(Debug, Clone)]
pub struct GenerateOptions {
    /// Release version; a leading `v` is dropped.
    pub version: String,
    pub notes: String,
    pub owner: String,
    pub repo: String,
    /// Scheme and host prefixed to download and release-page URLs.
    pub release_host: String,
    pub release_date: DateTime<Utc>,
    /// Artefact files to publish.
    pub artifacts: Vec<PathBuf>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            version: String::new(),
            notes: String::new(),
            owner: DEFAULT_OWNER.to_string(),
            repo: DEFAULT_REPO.to_string(),
            release_host: DEFAULT_RELEASE_HOST.to_string(),
            release_date: Utc::now(),
            artifacts: Vec::new(),
        }
    }
}

impl GenerateOptions {
    fn base_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.release_host.trim_end_matches('/'),
            self.owner,
            self.repo
        )
    }
}

/// Build the manifest for `options`.
///
/// Artefacts that cannot be stat'ed, or whose names match no platform, are
/// skipped with a warning. A file that exists but cannot be read is an error.
pub fn generate(options: &GenerateOptions) -> Result<Info> {
    let version = normalize_version(&options.version);
    if version.is_empty() {
        return Err(PublishError::MissingVersion);
    }

    let base_url = options.base_url();
    let mut platforms = BTreeMap::new();

    for path in &options.artifacts {
        if let Err(err) = path.metadata() {
            tracing::warn!("skipping {}: {err}", path.display());
            continue;
        }

        let (digest, size) = hash_file(path).map_err(|source| PublishError::Hash {
            path: path.clone(),
            source,
        })?;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let Some(key) = classify(&file_name) else {
            tracing::warn!("skipping {file_name}: no platform matches its name");
            continue;
        };

        let url = format!("{base_url}/releases/download/v{version}/{file_name}");
        tracing::debug!("{key}: {url} ({size} bytes, sha256 {digest})");
        if platforms
            .insert(key.to_string(), Platform::with_sha256(url, &digest, size))
            .is_some()
        {
            tracing::warn!("{file_name} replaces an earlier artefact for {key}");
        }
    }

    Ok(Info {
        version: version.to_string(),
        release_date: options.release_date,
        release_notes: options.notes.clone(),
        release_notes_url: format!("{base_url}/releases/tag/v{version}"),
        platforms,
    })
}

/// SHA-256 hex digest and size, both taken from one open handle.
fn hash_file(path: &Path) -> io::Result<(String, u64)> {
    let mut file = File::open(path)?;
    let size = file.metadata()?.len();
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok((hex::encode(hasher.finalize()), size))
}

/// Write `info` to `path` as indented JSON followed by a newline.
///
/// The file is created owner-read/write only, or truncated when it exists.
pub fn write_manifest(path: &Path, info: &Info) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(info)?;
    json.push(b'\n');

    let write_err = |source| PublishError::Write {
        path: path.to_path_buf(),
        source,
    };
    let mut file = owner_only(path).map_err(write_err)?;
    file.write_all(&json).map_err(write_err)?;
    file.flush().map_err(write_err)
}

fn owner_only(path: &Path) -> io::Result<File> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;

    // `mode` is ignored when the file already exists.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(file)
}
