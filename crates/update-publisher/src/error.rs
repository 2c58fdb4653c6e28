use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PublishError>;

/// Reasons manifest generation can fail.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("release version is required")]
    MissingVersion,

    #[error("failed to hash {}: {source}", .path.display())]
    Hash {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to encode manifest: {0}")]
    Encode(#[from] serde_json::Error),
}
