use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A `major.minor.patch` version parsed from a release tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    pub fn minor_line(self) -> (u64, u64) {
        (self.major, self.minor)
    }

    pub fn same_minor_line(self, other: SemVer) -> bool {
        self.minor_line() == other.minor_line()
    }
}

impl fmt::Display for SemVer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// A downloadable file attached to a release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReleaseAsset {
    pub name: String,
    pub url: String,
    pub size: u64,
}

/// A published, non-draft, non-prerelease release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Release {
    pub tag: String,
    pub version: SemVer,
    pub assets: Vec<ReleaseAsset>,
}

/// Repository metadata used when the configuration has no override.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepoInfo {
    pub description: Option<String>,
    pub license: Option<String>,
}

/// The closed set of OS/architecture slots a formula can cover.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "macos_arm64")]
    MacosArm64,
    #[serde(rename = "macos_x86_64")]
    MacosX86_64,
    #[serde(rename = "linux_arm64")]
    LinuxArm64,
    #[serde(rename = "linux_x86_64")]
    LinuxX86_64,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::MacosArm64,
        Platform::MacosX86_64,
        Platform::LinuxArm64,
        Platform::LinuxX86_64,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Platform::MacosArm64 => "macos_arm64",
            Platform::MacosX86_64 => "macos_x86_64",
            Platform::LinuxArm64 => "linux_arm64",
            Platform::LinuxX86_64 => "linux_x86_64",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Identity of a formula file on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ManifestKey {
    Latest,
    Pinned { major: u64, minor: u64 },
}

/// An asset picked for a platform slot, with its verified digest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedAsset {
    pub url: String,
    pub sha256: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FormulaMetadata {
    pub name: String,
    pub description: String,
    pub license: String,
    pub homepage: String,
    pub binary_name: String,
}

impl FormulaMetadata {
    /// Base name of the formula files, shared by the latest and pinned variants.
    pub fn formula_name(&self) -> &str {
        &self.binary_name
    }
}

/// Everything needed to render one formula file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestRecord {
    pub key: ManifestKey,
    pub tag: String,
    pub version: SemVer,
    pub assets: BTreeMap<Platform, ResolvedAsset>,
    pub metadata: FormulaMetadata,
}
