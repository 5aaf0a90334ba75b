use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use toml::Value;

use crate::error::{Error, Result};
use crate::filename::{APPLICATIONS, COMMUNITY_PREFIX};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CatalogConfig {
    pub mirror: MirrorConfig,
    pub github: GithubConfig,
    pub boards: BoardsConfig,
    pub promotion: PromotionConfig,
    pub crm: CrmConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// rsync root listed recursively for `*/archive/Armbian*` files.
    pub rsync_root: String,
    /// Public HTTP base the listed paths are served under.
    pub download_base: String,
    /// Pre-fetched `rsync --list-only` output used instead of running rsync.
    pub listing_file: Option<PathBuf>,
    pub exclude_applications: Vec<String>,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            rsync_root: "rsync://fi.mirror.armbian.de/dl/".into(),
            download_base: "https://dl.armbian.com/".into(),
            listing_file: None,
            exclude_applications: APPLICATIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    pub owner: String,
    pub repositories: Vec<String>,
    /// Repository whose redirects live under `nightly/`.
    pub nightly_repository: String,
    pub token_env: String,
    /// Directory of `<repo>.json` files in `gh release view --json assets` shape.
    pub feeds_dir: Option<PathBuf>,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            owner: "armbian".into(),
            repositories: vec!["os".into(), "distribution".into(), "community".into()],
            nightly_repository: "os".into(),
            token_env: "GITHUB_TOKEN".into(),
            feeds_dir: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BoardsConfig {
    pub dir: PathBuf,
    pub reusable_file: Option<PathBuf>,
}

impl Default for BoardsConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("config/boards"),
            reusable_file: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromotionConfig {
    pub allowlist: Option<PathBuf>,
    /// Prefixes stripped from asset URLs to build the relative candidates
    /// matched against the allow-list.
    pub url_prefixes: Vec<String>,
    pub community_marker: String,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            allowlist: None,
            url_prefixes: vec![
                "https://dl.armbian.com/".into(),
                "https://cache.armbian.com/artifacts/".into(),
                "https://github.com/armbian/".into(),
            ],
            community_marker: COMMUNITY_PREFIX.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrmConfig {
    pub enabled: bool,
    pub token_url: String,
    pub api_base: String,
    pub client_id_env: String,
    pub client_secret_env: String,
    pub refresh_token_env: String,
    pub page_size: u32,
    /// Hard ceiling on pages fetched per module.
    pub max_pages: u32,
    pub companies_module: String,
    pub vendor_field: String,
    pub name_field: String,
    pub website_field: String,
    pub description_field: String,
    pub support_module: String,
    pub boards_field: String,
    pub until_field: String,
    pub status_field: String,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_url: "https://accounts.zoho.eu/oauth/v2/token".into(),
            api_base: "https://www.zohoapis.eu/crm/v2".into(),
            client_id_env: "CRM_CLIENT_ID".into(),
            client_secret_env: "CRM_CLIENT_SECRET".into(),
            refresh_token_env: "CRM_REFRESH_TOKEN".into(),
            page_size: 200,
            max_pages: 50,
            companies_module: "Accounts".into(),
            vendor_field: "Vendor_Slug".into(),
            name_field: "Account_Name".into(),
            website_field: "Website".into(),
            description_field: "Description".into(),
            support_module: "Deals".into(),
            boards_field: "Boards".into(),
            until_field: "Support_Until".into(),
            status_field: "Stage".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub path: PathBuf,
    /// Optional copy of the pipe-delimited table the JSON is derived from.
    pub table: Option<PathBuf>,
    pub redirect_base: String,
    pub cache_base: String,
    pub logo_base: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("armbian-images.json"),
            table: None,
            redirect_base: "https://dl.armbian.com/".into(),
            cache_base: "https://cache.armbian.com/artifacts/".into(),
            logo_base: "https://cache.armbian.com/images/vendors/150".into(),
        }
    }
}

fn merge_values(base: &mut Value, child: Value) {
    match (base, child) {
        (Value::Table(base_tbl), Value::Table(child_tbl)) => {
            for (k, v) in child_tbl {
                match base_tbl.get_mut(&k) {
                    Some(existing) => merge_values(existing, v),
                    None => {
                        base_tbl.insert(k, v);
                    }
                }
            }
        }
        (base_slot, child_val) => {
            *base_slot = child_val;
        }
    }
}

fn resolve_ref_path(from_file: &Path, reference: &str) -> PathBuf {
    let p = PathBuf::from(reference);
    if p.is_absolute() {
        p
    } else {
        from_file.parent().unwrap_or_else(|| Path::new(".")).join(p)
    }
}

fn load_value_inner(path: &Path, stack: &mut HashSet<PathBuf>) -> Result<Value> {
    let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
    if !stack.insert(canonical.clone()) {
        return Err(Error::msg(format!(
            "config extends cycle detected at {}",
            canonical.display()
        )));
    }

    let data = fs::read_to_string(path)
        .map_err(|e| Error::msg(format!("failed to read config {}: {e}", path.display())))?;
    let mut value: Value = toml::from_str(&data)
        .map_err(|e| Error::msg(format!("TOML parse error in {}: {e}", path.display())))?;

    let mut out = Value::Table(Default::default());
    if let Some(ext) = value.get("extends").and_then(Value::as_str) {
        out = load_value_inner(&resolve_ref_path(path, ext), stack)?;
    }
    if let Some(tbl) = value.as_table_mut() {
        tbl.remove("extends");
    }
    merge_values(&mut out, value);

    stack.remove(&canonical);
    Ok(out)
}

pub fn load(path: &Path) -> Result<CatalogConfig> {
    let mut stack = HashSet::<PathBuf>::new();
    let value = load_value_inner(path, &mut stack)?;
    value
        .try_into()
        .map_err(|e| Error::msg(format!("invalid config {}: {e}", path.display())))
}

pub fn load_or_default(path: Option<&Path>) -> Result<CatalogConfig> {
    match path {
        Some(p) => load(p),
        None => Ok(CatalogConfig::default()),
    }
}
