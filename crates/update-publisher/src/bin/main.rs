//! `gen-update-info`: writes the `update.json` manifest for a release.
//!
//! ```text
//! gen-update-info --version 1.2.0 --notes "Bug fixes" \
//!     dist/FreelanceFlow-1.2.0-darwin-arm64.dmg \
//!     dist/FreelanceFlow-1.2.0-windows-amd64.exe
//! ```

use std::path::PathBuf;

use chrono::Utc;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};
use update_publisher::{generate, write_manifest, GenerateOptions, DEFAULT_RELEASE_HOST};
use updater::{DEFAULT_OWNER, DEFAULT_REPO};

/// Command-line arguments for the manifest generator
#[derive(Parser, Debug)]
#[command(about, long_about = None, disable_version_flag = true)]
struct Args {
    /// Release version (e.g. 1.0.0)
    #[arg(long)]
    version: String,

    /// Release notes
    #[arg(long, default_value = "")]
    notes: String,

    /// Repository owner
    #[arg(long, default_value = DEFAULT_OWNER)]
    owner: String,

    /// Repository name
    #[arg(long, default_value = DEFAULT_REPO)]
    repo: String,

    /// Output file path
    #[arg(long, default_value = "update.json")]
    output: PathBuf,

    /// Host serving release downloads and pages
    #[arg(long, default_value = DEFAULT_RELEASE_HOST)]
    release_host: String,

    /// Enable debug logging
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Release artefacts to hash and publish
    artifacts: Vec<PathBuf>,
}

impl From<Args> for GenerateOptions {
    fn from(args: Args) -> Self {
        Self {
            version: args.version,
            notes: args.notes,
            owner: args.owner,
            repo: args.repo,
            release_host: args.release_host,
            release_date: Utc::now(),
            artifacts: args.artifacts,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if args.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    fmt().with_env_filter(filter).init();

    let output = args.output.clone();
    let info = generate(&args.into())?;
    write_manifest(&output, &info)?;

    tracing::info!(
        "Generated {} for version {} ({} platforms)",
        output.display(),
        info.version,
        info.platforms.len()
    );
    Ok(())
}
