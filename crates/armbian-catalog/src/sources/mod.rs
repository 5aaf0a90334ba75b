//! Discovery of published artifacts: the canonical rsync mirror plus the
//! release assets of the upstream GitHub repositories.

use tracing::info;

use crate::config::CatalogConfig;
use crate::error::{Error, Result};

pub mod github;
pub mod mirror;

/// Repository label used for files served from the mirror archive.
pub const ARCHIVE_REPOSITORY: &str = "archive";

/// One discovered file, before any parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAsset {
    pub size: u64,
    pub url: String,
    /// ISO-8601, UTC.
    pub timestamp: String,
    /// `archive` for the mirror, the repository short name for release feeds.
    pub repository: String,
}

impl RawAsset {
    pub fn filename(&self) -> &str {
        let path = self.url.split(['?', '#']).next().unwrap_or(&self.url);
        path.rsplit('/').next().unwrap_or(path)
    }

    pub fn from_github(&self) -> bool {
        self.repository != ARCHIVE_REPOSITORY
    }
}

/// Signature, checksum, torrent and text sidecars never enter the catalog.
pub fn is_sidecar(name: &str) -> bool {
    [".txt", ".asc", ".sha", ".torrent"]
        .iter()
        .any(|ext| name.ends_with(ext))
}

pub fn sort_by_url(assets: &mut [RawAsset]) {
    assets.sort_by(|a, b| {
        a.url
            .cmp(&b.url)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.size.cmp(&b.size))
    });
}

/// Mirror first, then every release feed in configured order. Any source
/// failing aborts the whole collection.
pub fn collect(cfg: &CatalogConfig) -> Result<Vec<RawAsset>> {
    let mut out = mirror::collect(&cfg.mirror)?;
    info!(count = out.len(), "mirror assets");

    let feed = github::feed_for(&cfg.github)?;
    for repo in &cfg.github.repositories {
        let assets = github::collect(feed.as_ref(), repo)?;
        info!(repository = %repo, count = assets.len(), "release assets");
        out.extend(assets);
    }

    if out.is_empty() {
        return Err(Error::msg(
            "no assets discovered in mirror listing or release feeds",
        ));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_ignores_query_strings() {
        let a = RawAsset {
            size: 1,
            url: "https://github.com/armbian/os/releases/download/25.8.1/Armbian_x.img.xz?raw=1"
                .into(),
            timestamp: String::new(),
            repository: "os".into(),
        };
        assert_eq!(a.filename(), "Armbian_x.img.xz");
        assert!(a.from_github());
    }

    #[test]
    fn sidecars_are_recognised() {
        assert!(is_sidecar("Armbian_x.img.xz.asc"));
        assert!(is_sidecar("Armbian_x.img.xz.sha"));
        assert!(is_sidecar("Armbian_x.img.xz.torrent"));
        assert!(is_sidecar("Armbian_x.img.txt"));
        assert!(!is_sidecar("Armbian_x.img.xz"));
    }
}
