//! "Promoted" means advertised as a recommended download. The project keeps
//! an allow-list of extended regexes, one per line; an asset is promoted when
//! any path view of it matches any pattern.

use std::fs;
use std::path::Path;

use regex::Regex;
use tracing::{info, warn};

use crate::config::PromotionConfig;
use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;

#[derive(Debug, Default)]
pub struct PromotionRules {
    patterns: Vec<Regex>,
    url_prefixes: Vec<String>,
    community_marker: String,
}

impl PromotionRules {
    /// Lines that fail to compile are skipped with a warning; blank lines
    /// are ignored.
    pub fn from_patterns<'a>(
        lines: impl IntoIterator<Item = &'a str>,
        cfg: &PromotionConfig,
    ) -> Self {
        let mut patterns = Vec::new();
        for line in lines {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match Regex::new(line) {
                Ok(re) => patterns.push(re),
                Err(e) => warn!(
                    pattern = %sanitize_log_line(line),
                    "skipping invalid promotion pattern: {e}"
                ),
            }
        }
        Self {
            patterns,
            url_prefixes: cfg.url_prefixes.clone(),
            community_marker: cfg.community_marker.clone(),
        }
    }

    pub fn load(cfg: &PromotionConfig) -> Result<Self> {
        let Some(path) = cfg.allowlist.as_deref() else {
            info!("no promotion allow-list configured; nothing is promoted");
            return Ok(Self::from_patterns([], cfg));
        };
        let rules = Self::from_path(path, cfg)?;
        info!(patterns = rules.patterns.len(), "loaded promotion allow-list");
        Ok(rules)
    }

    fn from_path(path: &Path, cfg: &PromotionConfig) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            Error::msg(format!(
                "failed to read promotion allow-list {}: {e}",
                path.display()
            ))
        })?;
        Ok(Self::from_patterns(data.lines(), cfg))
    }

    /// Path views of one asset: the bare filename, `<board>/archive/<file>`,
    /// and the URL relative to each known prefix. A view equal to the full
    /// URL is never a candidate.
    pub fn candidates(&self, filename: &str, board: &str, url: &str) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        let mut push = |c: String| {
            if c != url && !c.is_empty() && !out.contains(&c) {
                out.push(c);
            }
        };
        push(filename.to_string());
        push(format!("{board}/archive/{filename}"));
        for prefix in &self.url_prefixes {
            push(url.strip_prefix(prefix.as_str()).unwrap_or(url).to_string());
        }
        out
    }

    pub fn is_promoted(&self, filename: &str, board: &str, url: &str) -> bool {
        if filename.contains("trunk") && !filename.starts_with(&self.community_marker) {
            return false;
        }
        self.candidates(filename, board, url)
            .iter()
            .any(|c| self.patterns.iter().any(|p| p.is_match(c)))
    }
}
