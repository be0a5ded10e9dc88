use std::path::PathBuf;

use thiserror::Error;

use crate::engine::models::{Platform, SemVer};

/// Problems with the project configuration. Always fatal for the run.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("project '{0}' not found in config")]
    UnknownProject(String),
}

/// Failures talking to the release source.
#[derive(Debug, Clone, Error)]
pub enum SourceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("repository or release not found: {0}")]
    NotFound(String),

    #[error("GitHub API rate limit exceeded; set GITHUB_TOKEN")]
    RateLimited,

    #[error("unexpected response: {0}")]
    Parse(String),
}

impl SourceError {
    /// Whether retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Request(_) => true,
            SourceError::Status { status, .. } => *status >= 500 || *status == 429,
            SourceError::NotFound(_) | SourceError::RateLimited | SourceError::Parse(_) => false,
        }
    }
}

/// A required platform slot had no matching asset for a version.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no asset for {} in {version}", format_platforms(.missing))]
pub struct AssetResolutionError {
    pub version: SemVer,
    pub missing: Vec<Platform>,
}

fn format_platforms(platforms: &[Platform]) -> String {
    platforms
        .iter()
        .map(|p| p.key())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures scoped to a single project; the run continues with the others.
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("no valid releases found")]
    NoReleases,

    #[error("no formula could be generated ({0} version(s) skipped)")]
    NothingGenerated(usize),

    #[error("formula store error: {0}")]
    Store(String),
}
