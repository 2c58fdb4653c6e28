//! File-name based platform classification.
//!
//! Release artefacts carry their target in the file name
//! (`FreelanceFlow-1.2.0-darwin-arm64.dmg`). Both the manifest generator and
//! the resolver's fallback path map names onto the same platform keys through
//! [`classify`].

/// Recognised `(os substring, arch substring) -> platform key` pairs.
///
/// Rows are tried in order; the first row whose substrings both occur in the
/// lower-cased file name wins.
pub const PLATFORM_TABLE: &[(&str, &str, &str)] = &[
    ("darwin", "amd64", "darwin-amd64"),
    ("darwin", "arm64", "darwin-arm64"),
    ("windows", "amd64", "windows-amd64"),
    ("windows", "arm64", "windows-arm64"),
    ("linux", "amd64", "linux-amd64"),
    ("linux", "arm64", "linux-arm64"),
];

/// Map an artefact file name onto a platform key, if it names a known pair.
pub fn classify(file_name: &str) -> Option<&'static str> {
    let name = file_name.to_ascii_lowercase();
    PLATFORM_TABLE
        .iter()
        .find(|(os, arch, _)| name.contains(os) && name.contains(arch))
        .map(|(_, _, key)| *key)
}

/// Platform key of the machine this process runs on.
pub fn host_platform_key() -> Option<&'static str> {
    platform_key_for(std::env::consts::OS, std::env::consts::ARCH)
}

/// Platform key for a Rust target `os`/`arch` pair (`macos`, `aarch64`, ...).
pub fn platform_key_for(os: &str, arch: &str) -> Option<&'static str> {
    let os = match os {
        "macos" => "darwin",
        "windows" => "windows",
        "linux" => "linux",
        _ => return None,
    };
    let arch = match arch {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        _ => return None,
    };

    PLATFORM_TABLE
        .iter()
        .find(|(o, a, _)| *o == os && *a == arch)
        .map(|(_, _, key)| *key)
}
