use std::sync::Mutex;
use std::time::{Duration, Instant};

use backon::{ExponentialBuilder, Retryable};
use futures_util::StreamExt;
use log::{debug, info, warn};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue, USER_AGENT};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

use crate::engine::models::{Release, ReleaseAsset, RepoInfo};
use crate::error::SourceError;
use crate::selector::parse_version;
use crate::util::{format_speed, short_digest};

pub mod cache;

use cache::ChecksumCache;

const GITHUB_API: &str = "https://api.github.com";
const RELEASES_PER_PAGE: u32 = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const RETRY_ATTEMPTS: usize = 3;
const RETRY_MIN_DELAY: Duration = Duration::from_millis(500);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(8);

/// Where releases, repository metadata and asset digests come from.
#[allow(async_fn_in_trait)]
pub trait ReleaseSource {
    /// Published releases with parseable versions, in API order.
    async fn releases(&self, repo: &str) -> Result<Vec<Release>, SourceError>;

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, SourceError>;

    /// Lowercase hex SHA-256 of the asset's content.
    async fn checksum(&self, asset: &ReleaseAsset) -> Result<String, SourceError>;
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Deserialize)]
struct GithubAsset {
    name: String,
    browser_download_url: String,
    #[serde(default)]
    size: u64,
}

#[derive(Debug, Deserialize)]
struct GithubRepo {
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    license: Option<GithubLicense>,
}

#[derive(Debug, Deserialize)]
struct GithubLicense {
    #[serde(default)]
    spdx_id: Option<String>,
}

/// GitHub REST client with retries and a checksum cache.
pub struct GithubSource {
    client: Client,
    api_base: String,
    cache: Mutex<ChecksumCache>,
}

impl GithubSource {
    pub fn new(token: Option<String>, cache: ChecksumCache) -> Result<Self, String> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("tapgen/", env!("CARGO_PKG_VERSION"))),
        );
        if let Some(token) = token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            match HeaderValue::from_str(&format!("token {token}")) {
                Ok(mut value) => {
                    value.set_sensitive(true);
                    headers.insert(AUTHORIZATION, value);
                }
                Err(err) => warn!("github: ignoring malformed GITHUB_TOKEN ({err})"),
            }
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()
            .map_err(|e| format!("failed to build HTTP client: {e}"))?;
        Ok(Self {
            client,
            api_base: GITHUB_API.to_string(),
            cache: Mutex::new(cache),
        })
    }

    /// Hand the cache back so the caller can persist it.
    pub fn into_cache(self) -> ChecksumCache {
        self.cache
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, SourceError> {
        let url = format!("{}/{endpoint}", self.api_base);
        let url = url.as_str();
        with_retry(url, move || async move {
            let resp = self
                .client
                .get(url)
                .header(ACCEPT, "application/vnd.github.v3+json")
                .send()
                .await
                .map_err(|e| SourceError::Request(format!("GET {url} failed: {e}")))?;
            check_status(url, endpoint, resp.status())?;
            resp.json::<T>()
                .await
                .map_err(|e| SourceError::Parse(format!("{endpoint}: {e}")))
        })
        .await
    }

    async fn hash_download(&self, asset: &ReleaseAsset) -> Result<String, SourceError> {
        let url = asset.url.as_str();
        info!("github: downloading {}", asset.name);
        with_retry(url, move || async move {
            let started = Instant::now();
            let resp = self
                .client
                .get(url)
                .header(ACCEPT, "application/octet-stream")
                .send()
                .await
                .map_err(|e| SourceError::Request(format!("download {url} failed: {e}")))?;
            check_status(url, url, resp.status())?;

            let mut hasher = Sha256::new();
            let mut downloaded: u64 = 0;
            let mut stream = resp.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| SourceError::Request(format!("stream error: {e}")))?;
                hasher.update(&chunk);
                downloaded += chunk.len() as u64;
            }
            if asset.size > 0 && downloaded != asset.size {
                return Err(SourceError::Request(format!(
                    "download incomplete: received {downloaded} of {} bytes",
                    asset.size
                )));
            }

            let elapsed = started.elapsed().as_secs_f32().max(f32::EPSILON);
            debug!(
                "github: {} hashed {} bytes at {}",
                asset.name,
                downloaded,
                format_speed(downloaded as f32 / elapsed)
            );
            Ok(format!("{:x}", hasher.finalize()))
        })
        .await
    }

    fn cached(&self, asset: &ReleaseAsset) -> Option<String> {
        self.cache
            .lock()
            .ok()
            .and_then(|mut cache| cache.get(&asset.url, asset.size))
    }

    fn remember(&self, asset: &ReleaseAsset, digest: &str) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(&asset.url, asset.size, digest);
        }
    }
}

impl ReleaseSource for GithubSource {
    async fn releases(&self, repo: &str) -> Result<Vec<Release>, SourceError> {
        let raw: Vec<GithubRelease> = self
            .get_json(&format!("repos/{repo}/releases?per_page={RELEASES_PER_PAGE}"))
            .await?;
        let releases = convert_releases(raw);
        debug!("github: {repo} has {} usable release(s)", releases.len());
        Ok(releases)
    }

    async fn repo_info(&self, repo: &str) -> Result<RepoInfo, SourceError> {
        let raw: GithubRepo = self.get_json(&format!("repos/{repo}")).await?;
        Ok(RepoInfo {
            description: raw.description,
            license: raw.license.and_then(|l| l.spdx_id),
        })
    }

    async fn checksum(&self, asset: &ReleaseAsset) -> Result<String, SourceError> {
        if let Some(digest) = self.cached(asset) {
            debug!("github: cached checksum for {}", asset.name);
            return Ok(digest);
        }
        let digest = self.hash_download(asset).await?;
        info!("github: {} sha256 {}...", asset.name, short_digest(&digest));
        self.remember(asset, &digest);
        Ok(digest)
    }
}

/// Drop drafts, prereleases and tags that are not plain versions.
fn convert_releases(raw: Vec<GithubRelease>) -> Vec<Release> {
    raw.into_iter()
        .filter(|r| !r.draft && !r.prerelease)
        .filter_map(|r| {
            let Some(version) = parse_version(&r.tag_name) else {
                debug!("github: skipping unversioned tag {}", r.tag_name);
                return None;
            };
            Some(Release {
                version,
                assets: r
                    .assets
                    .into_iter()
                    .map(|a| ReleaseAsset {
                        name: a.name,
                        url: a.browser_download_url,
                        size: a.size,
                    })
                    .collect(),
                tag: r.tag_name,
            })
        })
        .collect()
}

fn check_status(url: &str, what: &str, status: StatusCode) -> Result<(), SourceError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::NOT_FOUND => Err(SourceError::NotFound(what.to_string())),
        StatusCode::FORBIDDEN => Err(SourceError::RateLimited),
        _ => Err(SourceError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }),
    }
}

/// Run `op`, retrying transient failures with exponential backoff.
async fn with_retry<T, F, Fut>(what: &str, op: F) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let backoff = ExponentialBuilder::default()
        .with_min_delay(RETRY_MIN_DELAY)
        .with_max_delay(RETRY_MAX_DELAY)
        .with_max_times(RETRY_ATTEMPTS);
    op.retry(backoff)
        .sleep(tokio::time::sleep)
        .when(SourceError::is_transient)
        .notify(|err: &SourceError, delay: Duration| {
            warn!("github: {what}: {err}; retrying in {delay:?}");
        })
        .await
}
