//! Board definitions (`config/boards/*.{conf,csc,wip,tvb}`) and the
//! reusable-board alias table.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::diagnostics::Diagnostics;
use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;

/// Board file extensions, each naming a support tier.
pub const SUPPORT_TIERS: &[&str] = &["conf", "csc", "wip", "tvb"];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardRecord {
    pub slug: String,
    pub name: Option<String>,
    pub vendor: Option<String>,
    pub support_tier: String,
}

#[derive(Debug, Default, Clone)]
pub struct BoardRegistry {
    boards: BTreeMap<String, BoardRecord>,
}

impl BoardRegistry {
    pub fn from_records(records: impl IntoIterator<Item = BoardRecord>) -> Self {
        let boards = records
            .into_iter()
            .map(|b| (b.slug.to_lowercase(), b))
            .collect();
        Self { boards }
    }

    pub fn get(&self, slug: &str) -> Option<&BoardRecord> {
        self.boards.get(&slug.to_lowercase())
    }

    pub fn name(&self, slug: &str) -> Option<&str> {
        self.get(slug)?.name.as_deref()
    }

    pub fn vendor(&self, slug: &str) -> Option<&str> {
        self.get(slug)?.vendor.as_deref()
    }

    pub fn support_tier(&self, slug: &str) -> Option<&str> {
        self.get(slug).map(|b| b.support_tier.as_str())
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }
}

/// Scan every board file under `dir`. Boards without a name or vendor are
/// kept and reported through `diag`.
pub fn load_registry(dir: &Path, diag: &mut Diagnostics) -> Result<BoardRegistry> {
    if !dir.is_dir() {
        return Err(Error::msg(format!(
            "board directory {} does not exist",
            dir.display()
        )));
    }

    let mut records = Vec::new();
    for entry in walkdir::WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| Error::msg(format!("walkdir error: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let Some(tier) = path
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| SUPPORT_TIERS.contains(e))
        else {
            continue;
        };
        let Some(slug) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let text = fs::read(path)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?;

        let record = BoardRecord {
            slug: slug.to_lowercase(),
            name: read_variable(&text, "BOARD_NAME"),
            vendor: read_variable(&text, "BOARD_VENDOR").map(|v| v.to_lowercase()),
            support_tier: tier.to_string(),
        };
        if record.name.is_none() {
            diag.missing_board_field(&record.slug, "name");
        }
        if record.vendor.is_none() {
            diag.missing_board_field(&record.slug, "vendor");
        }
        records.push(record);
    }

    let registry = BoardRegistry::from_records(records);
    info!(boards = registry.len(), dir = %dir.display(), "loaded board definitions");
    Ok(registry)
}

/// Last assignment of `KEY="value"` in a shell-style board file. Trailing
/// comments and surrounding quotes are dropped; empty values count as unset.
pub fn read_variable(text: &str, key: &str) -> Option<String> {
    let mut found = None;
    for line in text.lines() {
        let line = line.trim_start();
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some(rest) = line.strip_prefix(key) else {
            continue;
        };
        let Some(raw) = rest.trim_start().strip_prefix('=') else {
            continue;
        };
        let value = unquote(raw.trim());
        found = if value.is_empty() {
            None
        } else {
            Some(value)
        };
    }
    found
}

fn unquote(raw: &str) -> String {
    for q in ['"', '\''] {
        if let Some(inner) = raw.strip_prefix(q) {
            return match inner.find(q) {
                Some(end) => inner[..end].trim().to_string(),
                None => inner.trim().to_string(),
            };
        }
    }
    match raw.find(" #").or_else(|| raw.find('#')) {
        Some(i) => raw[..i].trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// One board re-published under another board's identity.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ReusableBoardAlias {
    #[serde(rename = "board")]
    pub alias_slug: String,
    #[serde(rename = "base")]
    pub base_slug: String,
    #[serde(default, rename = "branch")]
    pub branch_filter: Option<String>,
    #[serde(default, rename = "extension")]
    pub extension_filter: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub support: Option<String>,
}

impl ReusableBoardAlias {
    pub fn matches(&self, board: &str, branch: &str, extension: &str) -> bool {
        if !self.base_slug.eq_ignore_ascii_case(board) {
            return false;
        }
        if let Some(b) = self.branch_filter.as_deref() {
            if b != branch {
                return false;
            }
        }
        if let Some(e) = self.extension_filter.as_deref() {
            if e.trim_start_matches('.') != extension.trim_start_matches('.') {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Default, Clone)]
pub struct AliasTable {
    aliases: Vec<ReusableBoardAlias>,
}

impl AliasTable {
    pub fn new(mut aliases: Vec<ReusableBoardAlias>) -> Self {
        for a in &mut aliases {
            a.alias_slug = a.alias_slug.to_lowercase();
            a.base_slug = a.base_slug.to_lowercase();
            a.vendor = a.vendor.take().map(|v| v.to_lowercase());
        }
        Self { aliases }
    }

    pub fn matching<'a>(
        &'a self,
        board: &'a str,
        branch: &'a str,
        extension: &'a str,
    ) -> impl Iterator<Item = &'a ReusableBoardAlias> + 'a {
        self.aliases
            .iter()
            .filter(move |a| a.matches(board, branch, extension))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

/// Missing or unreadable alias files disable aliasing; they never fail the run.
pub fn load_aliases(path: Option<&Path>) -> AliasTable {
    let Some(path) = path else {
        return AliasTable::default();
    };
    let data = match fs::read_to_string(path) {
        Ok(d) => d,
        Err(e) => {
            debug!(path = %path.display(), "no reusable board file: {e}");
            return AliasTable::default();
        }
    };
    match parse_aliases(&data) {
        Ok(table) => {
            info!(aliases = table.len(), "loaded reusable board aliases");
            table
        }
        Err(e) => {
            warn!(
                path = %path.display(),
                "ignoring malformed reusable board file: {}",
                sanitize_log_line(&e.to_string())
            );
            AliasTable::default()
        }
    }
}

pub fn parse_aliases(data: &str) -> Result<AliasTable> {
    if data.trim().is_empty() {
        return Ok(AliasTable::default());
    }
    let aliases: Vec<ReusableBoardAlias> = serde_yaml::from_str(data)?;
    Ok(AliasTable::new(aliases))
}
