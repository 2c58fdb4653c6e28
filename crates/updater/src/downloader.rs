use std::path::Path;
use std::time::Duration;

use futures::StreamExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::{Result, UpdaterError};

/// Progress of a streaming download, reported after every written chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    /// Declared `Content-Length`; `None` when the server did not send one.
    pub total: Option<u64>,
    /// Bytes written to disk so far.
    pub downloaded: u64,
}

impl Progress {
    /// Completed fraction in `0.0..=1.0`, when the total is known.
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) | None => None,
            Some(total) => Some((self.downloaded as f64 / total as f64).min(1.0)),
        }
    }
}

/// Streams release artefacts to disk.
#[derive(Clone)]
pub struct Downloader {
    client: Client,
    timeout: Option<Duration>,
}

impl Downloader {
    /// Create a downloader on top of an existing HTTP client.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Abort transfers that take longer than `timeout` in total.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Stream `url` into `dest`, calling `on_progress` after every chunk.
    ///
    /// `dest` is created (or truncated) with owner-only permissions. When the
    /// transfer is cancelled or times out, whatever was written so far stays
    /// on disk; removing it is up to the caller. Returns the number of bytes
    /// written.
    pub async fn download<F>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<u64>
    where
        F: FnMut(Progress) + Send,
    {
        let transfer = self.transfer(cancel, url, dest, &mut on_progress);
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, transfer)
                .await
                .unwrap_or(Err(UpdaterError::TimedOut(limit))),
            None => transfer.await,
        }
    }

    async fn transfer<F>(
        &self,
        cancel: &CancellationToken,
        url: &str,
        dest: &Path,
        on_progress: &mut F,
    ) -> Result<u64>
    where
        F: FnMut(Progress) + Send,
    {
        tracing::debug!("downloading {url} to {}", dest.display());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(UpdaterError::Cancelled),
            response = self.client.get(url).send() => {
                response.map_err(|err| UpdaterError::transport(url, err))?
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            // Dropping the response releases the connection and its body.
            drop(response);
            return Err(UpdaterError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut file = create_owner_only(dest).await?;
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(
                        "download of {url} cancelled after {downloaded} bytes"
                    );
                    return Err(UpdaterError::Cancelled);
                }
                next = stream.next() => next,
            };
            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|err| UpdaterError::transport(url, err))?;

            file.write_all(&chunk)
                .await
                .map_err(|err| UpdaterError::fs(dest, err))?;
            downloaded += chunk.len() as u64;
            on_progress(Progress { total, downloaded });
        }

        file.flush().await.map_err(|err| UpdaterError::fs(dest, err))?;
        tracing::debug!("downloaded {downloaded} bytes from {url}");
        Ok(downloaded)
    }
}

/// Open `path` for writing, truncated and readable by its owner only.
///
/// The mode given at open time only applies to new files, so an existing
/// file has its permissions narrowed explicitly.
async fn create_owner_only(path: &Path) -> Result<tokio::fs::File> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);
    let file = options
        .open(path)
        .await
        .map_err(|err| UpdaterError::fs(path, err))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))
            .await
            .map_err(|err| UpdaterError::fs(path, err))?;
    }
    Ok(file)
}

/// Lowercase hex SHA-256 digest of the full content of `path`.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|err| UpdaterError::fs(path, err))?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher).map_err(|err| UpdaterError::fs(path, err))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Check that the SHA-256 digest of `path` is exactly `expected_hex`.
///
/// The comparison is case-sensitive; digests are lowercase by convention.
pub fn verify_hash(path: &Path, expected_hex: &str) -> Result<()> {
    let actual = sha256_file(path)?;
    if actual != expected_hex {
        return Err(UpdaterError::HashMismatch {
            expected: expected_hex.to_string(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use std::sync::{Arc, Mutex};
    use std::time::Instant;
    use tempfile::tempdir;

    const PAYLOAD: &[u8] = b"FreelanceFlow update payload: 0123456789 abcdefghijk!";

    fn digest(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    fn downloader() -> Downloader {
        Downloader::new(Client::new())
    }

    #[tokio::test]
    async fn streams_payload_and_reports_progress() {
        assert_eq!(PAYLOAD.len(), 53);
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(GET).path("/FreelanceFlow-darwin-arm64.dmg");
                then.status(200)
                    .header("content-length", PAYLOAD.len().to_string())
                    .body(PAYLOAD);
            })
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("artifact.dmg");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);

        let written = downloader()
            .download(
                &CancellationToken::new(),
                &server.url("/FreelanceFlow-darwin-arm64.dmg"),
                &dest,
                move |progress| sink.lock().unwrap().push(progress),
            )
            .await
            .expect("download succeeds");

        mock.assert_async().await;
        assert_eq!(written, 53);
        assert_eq!(std::fs::read(&dest).unwrap(), PAYLOAD);

        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty(), "progress was never reported");
        assert!(seen.iter().all(|p| p.total == Some(53)));
        assert!(seen.windows(2).all(|w| w[0].downloaded <= w[1].downloaded));
        assert_eq!(seen.last().unwrap().downloaded, 53);
    }

    #[tokio::test]
    async fn truncates_existing_destination() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/short.bin");
                then.status(200).body("short");
            })
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("short.bin");
        std::fs::write(&dest, vec![b'x'; 4096]).unwrap();

        downloader()
            .download(
                &CancellationToken::new(),
                &server.url("/short.bin"),
                &dest,
                |_| {},
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), b"short");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn writes_owner_only_file() {
        use std::os::unix::fs::PermissionsExt;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/app.tar.gz");
                then.status(200).body(PAYLOAD);
            })
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("app.tar.gz");
        downloader()
            .download(
                &CancellationToken::new(),
                &server.url("/app.tar.gz"),
                &dest,
                |_| {},
            )
            .await
            .unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn narrows_permissions_of_existing_file() {
        use std::os::unix::fs::PermissionsExt;

        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/app.tar.gz");
                then.status(200).body(PAYLOAD);
            })
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("app.tar.gz");
        std::fs::write(&dest, b"stale").unwrap();
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o644)).unwrap();

        downloader()
            .download(
                &CancellationToken::new(),
                &server.url("/app.tar.gz"),
                &dest,
                |_| {},
            )
            .await
            .unwrap();

        let mode = std::fs::metadata(&dest).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(std::fs::read(&dest).unwrap(), PAYLOAD);
    }

    #[tokio::test]
    async fn non_ok_status_is_reported_with_code() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing.exe");
                then.status(404).body("Not Found");
            })
            .await;

        let dir = tempdir().unwrap();
        let dest = dir.path().join("missing.exe");
        let err = downloader()
            .download(
                &CancellationToken::new(),
                &server.url("/missing.exe"),
                &dest,
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::HttpStatus { status: 404, .. }));
        assert!(!dest.exists(), "no file is created for a failed response");
    }

    #[tokio::test]
    async fn unreachable_host_is_a_transport_error() {
        let dir = tempdir().unwrap();
        let err = downloader()
            .download(
                &CancellationToken::new(),
                "http://127.0.0.1:9/never.bin",
                &dir.path().join("never.bin"),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::Transport { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn cancelled_token_aborts_before_request() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let dir = tempdir().unwrap();
        let err = downloader()
            .download(&cancel, "http://127.0.0.1:9/x", &dir.path().join("x"), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::Cancelled));
    }

    #[tokio::test]
    async fn cancellation_mid_transfer_is_prompt() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow.bin");
                then.status(200)
                    .body(PAYLOAD)
                    .delay(Duration::from_secs(10));
            })
            .await;

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.cancel();
        });

        let dir = tempdir().unwrap();
        let started = Instant::now();
        let err = downloader()
            .download(&cancel, &server.url("/slow.bin"), &dir.path().join("slow.bin"), |_| {})
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::Cancelled), "got {err:?}");
        assert!(err.is_cancellation());
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn deadline_reports_timeout() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow.bin");
                then.status(200)
                    .body(PAYLOAD)
                    .delay(Duration::from_secs(10));
            })
            .await;

        let dir = tempdir().unwrap();
        let err = downloader()
            .with_timeout(Duration::from_millis(200))
            .download(
                &CancellationToken::new(),
                &server.url("/slow.bin"),
                &dir.path().join("slow.bin"),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(err, UpdaterError::TimedOut(_)), "got {err:?}");
        assert!(err.is_cancellation());
    }

    #[test]
    fn verify_hash_accepts_matching_digest() {
        let dir = tempdir().unwrap();
        for (i, content) in [&b""[..], b"a", b"Hash test content", PAYLOAD]
            .iter()
            .enumerate()
        {
            let path = dir.path().join(format!("file-{i}"));
            std::fs::write(&path, content).unwrap();
            verify_hash(&path, &digest(content)).unwrap();
            assert_eq!(sha256_file(&path).unwrap(), digest(content));
        }
    }

    #[test]
    fn verify_hash_reports_both_digests_on_mismatch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifact");
        std::fs::write(&path, b"content one").unwrap();

        let expected = digest(b"content two");
        match verify_hash(&path, &expected) {
            Err(UpdaterError::HashMismatch {
                expected: e,
                actual,
            }) => {
                assert_eq!(e, expected);
                assert_eq!(actual, digest(b"content one"));
            }
            other => panic!("expected hash mismatch, got {other:?}"),
        }
    }

    #[test]
    fn verify_hash_is_case_sensitive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("artifact");
        std::fs::write(&path, b"abc").unwrap();

        let upper = digest(b"abc").to_uppercase();
        assert!(matches!(
            verify_hash(&path, &upper),
            Err(UpdaterError::HashMismatch { .. })
        ));
    }

    #[test]
    fn verify_hash_on_missing_file_is_filesystem_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist");
        let err = verify_hash(&path, &digest(b"")).unwrap_err();
        assert!(matches!(err, UpdaterError::FileSystem { .. }), "got {err:?}");
    }

    #[test]
    fn progress_fraction() {
        let half = Progress {
            total: Some(200),
            downloaded: 100,
        };
        assert_eq!(half.fraction(), Some(0.5));
        let unknown = Progress {
            total: None,
            downloaded: 100,
        };
        assert_eq!(unknown.fraction(), None);
    }
}
