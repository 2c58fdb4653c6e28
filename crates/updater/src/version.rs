use std::cmp::Ordering;

use semver::Version;

use crate::error::{Result, UpdaterError};

/// Strip surrounding whitespace and a single leading `v`/`V` tag prefix.
pub fn normalize_version(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('v')
        .or_else(|| trimmed.strip_prefix('V'))
        .unwrap_or(trimmed)
}

/// Parse a release version, tolerating a `v` prefix and a short core (`1.2`).
pub fn parse_version(raw: &str) -> Result<Version> {
    let normalized = normalize_version(raw);

    // Pad `1` / `1.2` to a full `major.minor.patch` core before the
    // pre-release or build suffix.
    let split = normalized.find(['-', '+']).unwrap_or(normalized.len());
    let (core, suffix) = normalized.split_at(split);
    let padded = match core.split('.').count() {
        1 if !core.is_empty() => format!("{core}.0.0{suffix}"),
        2 => format!("{core}.0{suffix}"),
        _ => normalized.to_string(),
    };

    Version::parse(&padded).map_err(|source| UpdaterError::InvalidVersion {
        version: raw.to_string(),
        source,
    })
}

/// Semantic precedence of two versions; build metadata does not take part.
pub fn compare_versions(a: &Version, b: &Version) -> Ordering {
    a.cmp_precedence(b)
}

/// True when `candidate` takes precedence over `current`.
pub fn is_newer(candidate: &Version, current: &Version) -> bool {
    compare_versions(candidate, current) == Ordering::Greater
}
