use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::config::GithubConfig;
use crate::error::{Error, Result};

use super::{RawAsset, is_sidecar, sort_by_url};

const USER_AGENT: &str = concat!("armbian-catalog/", env!("CARGO_PKG_VERSION"));

/// Release-asset listing of one upstream repository.
pub trait ReleaseFeed {
    fn assets(&self, repository: &str) -> Result<Vec<FeedAsset>>;
}

/// The `gh release view --json assets` shape, shared by every feed.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct FeedAsset {
    pub size: u64,
    pub url: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

pub fn feed_for(cfg: &GithubConfig) -> Result<Box<dyn ReleaseFeed>> {
    if let Some(dir) = cfg.feeds_dir.clone() {
        return Ok(Box::new(FeedDir { dir }));
    }
    let token = std::env::var(&cfg.token_env)
        .ok()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    Ok(Box::new(GithubApiFeed::new(
        &cfg.api_base,
        &cfg.owner,
        token,
    )?))
}

pub fn collect(feed: &dyn ReleaseFeed, repository: &str) -> Result<Vec<RawAsset>> {
    let mut out: Vec<RawAsset> = feed
        .assets(repository)?
        .into_iter()
        .map(|a| RawAsset {
            size: a.size,
            url: a.url,
            timestamp: a.created_at,
            repository: repository.to_string(),
        })
        .filter(|a| !is_sidecar(a.filename()))
        .collect();
    sort_by_url(&mut out);
    Ok(out)
}

/// Reads `<dir>/<repository>.json`, as written by
/// `gh release view --repo <owner>/<repository> --json assets`.
pub struct FeedDir {
    pub dir: PathBuf,
}

impl ReleaseFeed for FeedDir {
    fn assets(&self, repository: &str) -> Result<Vec<FeedAsset>> {
        let path = self.dir.join(format!("{repository}.json"));
        let data = fs::read_to_string(&path).map_err(|e| {
            Error::msg(format!("failed to read release feed {}: {e}", path.display()))
        })?;
        parse_feed_json(&data)
            .map_err(|e| e.context(format!("invalid release feed {}", path.display())))
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FeedDoc {
    Wrapped { assets: Vec<FeedAsset> },
    Bare(Vec<FeedAsset>),
}

pub fn parse_feed_json(data: &str) -> Result<Vec<FeedAsset>> {
    let doc: FeedDoc = serde_json::from_str(data)?;
    Ok(match doc {
        FeedDoc::Wrapped { assets } => assets,
        FeedDoc::Bare(assets) => assets,
    })
}

#[derive(Debug, Deserialize)]
struct ApiRelease {
    #[serde(default)]
    assets: Vec<ApiAsset>,
}

#[derive(Debug, Deserialize)]
struct ApiAsset {
    size: u64,
    browser_download_url: String,
    created_at: String,
}

pub struct GithubApiFeed {
    client: reqwest::blocking::Client,
    api_base: String,
    owner: String,
    token: Option<String>,
}

impl GithubApiFeed {
    pub fn new(api_base: &str, owner: &str, token: Option<String>) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            owner: owner.to_string(),
            token,
        })
    }
}

/// The newest published release only, the same slice of a repository that
/// `gh release view` exports.
pub fn latest_release_url(api_base: &str, owner: &str, repository: &str) -> String {
    format!(
        "{}/repos/{owner}/{repository}/releases/latest",
        api_base.trim_end_matches('/')
    )
}

/// Assets of one release object as returned by the releases API.
pub fn parse_release(data: &str) -> Result<Vec<FeedAsset>> {
    let release: ApiRelease = serde_json::from_str(data)?;
    Ok(release
        .assets
        .into_iter()
        .map(|a| FeedAsset {
            size: a.size,
            url: a.browser_download_url,
            created_at: a.created_at,
        })
        .collect())
}

impl ReleaseFeed for GithubApiFeed {
    fn assets(&self, repository: &str) -> Result<Vec<FeedAsset>> {
        let url = latest_release_url(&self.api_base, &self.owner, repository);
        debug!(url = %url, "fetching latest release");
        let mut req = self
            .client
            .get(&url)
            .header("Accept", "application/vnd.github+json");
        if let Some(t) = self.token.as_deref() {
            req = req.bearer_auth(t);
        }
        let res = req
            .send()
            .map_err(|e| Error::msg(format!("failed to fetch release of {repository}: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "GitHub API returned {} for {}/{}",
                res.status(),
                self.owner,
                repository
            )));
        }
        let body = res
            .text()
            .map_err(|e| Error::msg(format!("failed to read release of {repository}: {e}")))?;
        let out = parse_release(&body)
            .map_err(|e| e.context(format!("invalid release of {}/{repository}", self.owner)))?;
        info!(repository, count = out.len(), "fetched release assets");
        Ok(out)
    }
}
