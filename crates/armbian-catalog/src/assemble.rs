//! Rendering of discovered assets into catalog rows, the pipe-delimited
//! table, and the final `{"assets": [...]}` document.

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::boards::{AliasTable, BoardRegistry, ReusableBoardAlias};
use crate::config::OutputConfig;
use crate::enrich::{EnrichmentResolver, enrich};
use crate::error::{Error, Result};
use crate::filename::{self, ImageName};
use crate::log_sanitize::sanitize_cell;
use crate::promotion::PromotionRules;
use crate::sources::RawAsset;

pub const COLUMNS: &[&str] = &[
    "board_slug",
    "board_name",
    "board_vendor",
    "board_support",
    "armbian_version",
    "file_url",
    "file_url_asc",
    "file_url_sha",
    "file_url_torrent",
    "redi_url",
    "redi_url_asc",
    "redi_url_sha",
    "redi_url_torrent",
    "file_updated",
    "file_size",
    "distro_release",
    "kernel_branch",
    "image_variant",
    "preinstalled_application",
    "storage_variant",
    "kernel_version",
    "file_extension",
    "download_repository",
    "promoted",
    "company_name",
    "company_website",
    "company_logo",
    "platinum",
    "platinum_expired",
    "platinum_until",
];

const DELIMITER: char = '|';

/// One output record; field order follows [`COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetRow {
    pub board_slug: String,
    pub board_name: String,
    pub board_vendor: String,
    pub board_support: String,
    pub armbian_version: String,
    pub file_url: String,
    pub file_url_asc: String,
    pub file_url_sha: String,
    pub file_url_torrent: String,
    pub redi_url: String,
    pub redi_url_asc: String,
    pub redi_url_sha: String,
    pub redi_url_torrent: String,
    pub file_updated: String,
    pub file_size: String,
    pub distro_release: String,
    pub kernel_branch: String,
    pub image_variant: String,
    pub preinstalled_application: String,
    pub storage_variant: String,
    pub kernel_version: String,
    pub file_extension: String,
    pub download_repository: String,
    pub promoted: bool,
    pub company_name: String,
    pub company_website: String,
    pub company_logo: String,
    pub platinum: bool,
    pub platinum_expired: bool,
    pub platinum_until: String,
}

impl AssetRow {
    pub fn cells(&self) -> Vec<String> {
        let b = |v: bool| v.to_string();
        vec![
            self.board_slug.clone(),
            self.board_name.clone(),
            self.board_vendor.clone(),
            self.board_support.clone(),
            self.armbian_version.clone(),
            self.file_url.clone(),
            self.file_url_asc.clone(),
            self.file_url_sha.clone(),
            self.file_url_torrent.clone(),
            self.redi_url.clone(),
            self.redi_url_asc.clone(),
            self.redi_url_sha.clone(),
            self.redi_url_torrent.clone(),
            self.file_updated.clone(),
            self.file_size.clone(),
            self.distro_release.clone(),
            self.kernel_branch.clone(),
            self.image_variant.clone(),
            self.preinstalled_application.clone(),
            self.storage_variant.clone(),
            self.kernel_version.clone(),
            self.file_extension.clone(),
            self.download_repository.clone(),
            b(self.promoted),
            self.company_name.clone(),
            self.company_website.clone(),
            self.company_logo.clone(),
            b(self.platinum),
            b(self.platinum_expired),
            self.platinum_until.clone(),
        ]
    }
}

/// Board identity a row is published under: the parsed board itself or one
/// of its reusable aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Identity {
    slug: String,
    name: String,
    vendor: String,
    support: String,
}

pub struct Assembler<'a> {
    pub boards: &'a BoardRegistry,
    pub aliases: &'a AliasTable,
    pub resolver: &'a dyn EnrichmentResolver,
    pub promotion: &'a PromotionRules,
    pub output: &'a OutputConfig,
    pub nightly_repository: &'a str,
    pub today: NaiveDate,
}

impl Assembler<'_> {
    /// Base row followed by one row per matching alias. Assets whose
    /// filename yields no board produce nothing.
    pub fn rows_for(&self, asset: &RawAsset) -> Vec<AssetRow> {
        let parsed = filename::parse(asset.filename());
        if parsed.board.is_empty() {
            return Vec::new();
        }

        let base = self.base_identity(&parsed.board);
        let mut rows = vec![self.row(asset, &parsed, &base)];
        for alias in self
            .aliases
            .matching(&parsed.board, &parsed.branch, &parsed.extension)
        {
            let identity = self.alias_identity(alias, &base);
            rows.push(self.row(asset, &parsed, &identity));
        }
        rows
    }

    fn base_identity(&self, slug: &str) -> Identity {
        Identity {
            slug: slug.to_string(),
            name: self.boards.name(slug).unwrap_or_default().to_string(),
            vendor: self.boards.vendor(slug).unwrap_or_default().to_string(),
            support: self.boards.support_tier(slug).unwrap_or_default().to_string(),
        }
    }

    // override, then the alias's own board file, then the base board
    fn alias_identity(&self, alias: &ReusableBoardAlias, base: &Identity) -> Identity {
        let own = self.boards.get(&alias.alias_slug);
        Identity {
            slug: alias.alias_slug.clone(),
            name: pick(
                alias.name.as_ref(),
                own.and_then(|b| b.name.as_ref()),
                &base.name,
            ),
            vendor: pick(
                alias.vendor.as_ref(),
                own.and_then(|b| b.vendor.as_ref()),
                &base.vendor,
            ),
            support: pick(
                alias.support.as_ref(),
                own.map(|b| &b.support_tier),
                &base.support,
            ),
        }
    }

    fn row(&self, asset: &RawAsset, parsed: &ImageName, id: &Identity) -> AssetRow {
        let file = asset.filename();
        let sidecar_base = if asset.from_github() {
            cache_url(&self.output.cache_base, &id.slug, file)
        } else {
            asset.url.clone()
        };
        let redi = redirect_url(
            &self.output.redirect_base,
            &id.slug,
            asset.repository == self.nightly_repository,
            parsed,
        );
        let extra = enrich(
            self.resolver,
            &id.vendor,
            &id.slug,
            &self.output.logo_base,
            self.today,
        );

        AssetRow {
            board_slug: id.slug.clone(),
            board_name: id.name.clone(),
            board_vendor: id.vendor.clone(),
            board_support: id.support.clone(),
            armbian_version: parsed.version.clone(),
            file_url: asset.url.clone(),
            file_url_asc: format!("{sidecar_base}.asc"),
            file_url_sha: format!("{sidecar_base}.sha"),
            file_url_torrent: format!("{sidecar_base}.torrent"),
            redi_url_asc: format!("{redi}.asc"),
            redi_url_sha: format!("{redi}.sha"),
            redi_url_torrent: format!("{redi}.torrent"),
            redi_url: redi,
            file_updated: asset.timestamp.clone(),
            file_size: asset.size.to_string(),
            distro_release: parsed.distro.clone(),
            kernel_branch: parsed.branch.clone(),
            image_variant: parsed.variant.clone(),
            preinstalled_application: parsed.application.clone(),
            storage_variant: parsed.storage.clone(),
            kernel_version: parsed.kernel_version.clone(),
            file_extension: parsed.extension.clone(),
            download_repository: asset.repository.clone(),
            promoted: self.promotion.is_promoted(file, &id.slug, &asset.url),
            company_name: extra.company_name,
            company_website: extra.company_website,
            company_logo: extra.company_logo,
            platinum: extra.platinum.platinum,
            platinum_expired: extra.platinum.expired,
            platinum_until: extra.platinum.until,
        }
    }
}

/// `https://dl.armbian.com/[nightly/]<board>/<Distro>_<branch>_<variant><suffix>`
pub fn redirect_url(base: &str, board: &str, nightly: bool, parsed: &ImageName) -> String {
    format!(
        "{}/{}{}/{}_{}_{}{}",
        base.trim_end_matches('/'),
        if nightly { "nightly/" } else { "" },
        board,
        capitalize(&parsed.distro),
        parsed.branch,
        parsed.variant,
        filename::redirect_variant_suffix(&parsed.extension),
    )
}

/// CDN copy of a GitHub release asset.
pub fn cache_url(base: &str, board: &str, file: &str) -> String {
    format!("{}/{}/archive/{}", base.trim_end_matches('/'), board, file)
}

fn pick(over: Option<&String>, own: Option<&String>, base: &str) -> String {
    over.or(own).map(String::as_str).unwrap_or(base).to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn quote_cell(raw: &str) -> String {
    format!("\"{}\"", sanitize_cell(raw).replace('"', "\"\""))
}

/// Header of quoted column names followed by one quoted, pipe-delimited
/// line per row.
pub fn render_table(rows: &[AssetRow]) -> String {
    let mut out = String::new();
    let header: Vec<String> = COLUMNS.iter().map(|c| quote_cell(c)).collect();
    out.push_str(&header.join("|"));
    out.push('\n');
    for row in rows {
        let cells: Vec<String> = row.cells().iter().map(|c| quote_cell(c)).collect();
        out.push_str(&cells.join("|"));
        out.push('\n');
    }
    out
}

fn split_line(line: &str) -> Result<Vec<String>> {
    let mut cells = Vec::new();
    let mut cur = String::new();
    let mut chars = line.chars().peekable();
    let mut in_quotes = false;
    while let Some(c) = chars.next() {
        match (c, in_quotes) {
            ('"', true) if chars.peek() == Some(&'"') => {
                chars.next();
                cur.push('"');
            }
            ('"', true) => in_quotes = false,
            ('"', false) if cur.is_empty() => in_quotes = true,
            (DELIMITER, false) => cells.push(std::mem::take(&mut cur)),
            (c, _) => cur.push(c),
        }
    }
    if in_quotes {
        return Err(Error::msg(format!("unterminated quote in table line: {line}")));
    }
    cells.push(cur);
    Ok(cells)
}

/// Generic delimited-table to JSON: the header names the keys, every value
/// is a string.
pub fn table_to_json(table: &str) -> Result<Value> {
    let mut lines = table.lines().filter(|l| !l.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Value::Array(Vec::new()));
    };
    let keys = split_line(header)?;
    let mut out = Vec::new();
    for (i, line) in lines.enumerate() {
        let cells = split_line(line)?;
        if cells.len() != keys.len() {
            return Err(Error::msg(format!(
                "table row {} has {} cells, header has {}",
                i + 1,
                cells.len(),
                keys.len()
            )));
        }
        let obj: Map<String, Value> = keys
            .iter()
            .cloned()
            .zip(cells.into_iter().map(Value::String))
            .collect();
        out.push(Value::Object(obj));
    }
    Ok(Value::Array(out))
}

pub fn catalog_document(table: &str) -> Result<Value> {
    let assets = table_to_json(table)?;
    let mut doc = Map::new();
    doc.insert("assets".into(), assets);
    Ok(Value::Object(doc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromotionConfig;
    use crate::enrich::NoEnrichment;

    fn parsed(name: &str) -> ImageName {
        filename::parse(name)
    }

    #[test]
    fn redirect_urls() {
        let base = "https://dl.armbian.com/";
        let p = parsed("Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31_minimal.img.xz");
        assert_eq!(
            redirect_url(base, "orangepi3b", false, &p),
            "https://dl.armbian.com/orangepi3b/Bookworm_current_minimal"
        );
        assert_eq!(
            redirect_url(base, "orangepi3b", true, &p),
            "https://dl.armbian.com/nightly/orangepi3b/Bookworm_current_minimal"
        );

        let p = parsed("Armbian_25.8.1_Uefi-x86_noble_current_6.12.41_minimal.hyperv.zip.xz");
        assert_eq!(
            redirect_url(base, "uefi-x86", false, &p),
            "https://dl.armbian.com/uefi-x86/Noble_current_minimal-hyperv"
        );

        let p = parsed(
            "Armbian_25.8.1_Sm8250-xiaomi-elish_noble_current_6.12.41_gnome_desktop.boot_sm8250-xiaomi-elish-boe.img.xz",
        );
        assert_eq!(
            redirect_url(base, "sm8250-xiaomi-elish", false, &p),
            "https://dl.armbian.com/sm8250-xiaomi-elish/Noble_current_server-boe"
        );
    }

    #[test]
    fn github_assets_use_cache_for_sidecars() {
        let boards = BoardRegistry::default();
        let aliases = AliasTable::default();
        let promotion = PromotionRules::from_patterns([], &PromotionConfig::default());
        let output = OutputConfig::default();
        let asm = Assembler {
            boards: &boards,
            aliases: &aliases,
            resolver: &NoEnrichment,
            promotion: &promotion,
            output: &output,
            nightly_repository: "os",
            today: NaiveDate::from_ymd_opt(2026, 1, 1).expect("date"),
        };
        let name = "Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.xz";
        let asset = RawAsset {
            size: 42,
            url: format!("https://github.com/armbian/os/releases/download/25.8.1/{name}"),
            timestamp: "2025-08-20T12:00:00Z".into(),
            repository: "os".into(),
        };
        let rows = asm.rows_for(&asset);
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.file_url, asset.url);
        assert_eq!(
            row.file_url_sha,
            format!("https://cache.armbian.com/artifacts/orangepi3b/archive/{name}.sha")
        );
        assert_eq!(
            row.redi_url,
            "https://dl.armbian.com/nightly/orangepi3b/Bookworm_current_server"
        );
        assert_eq!(row.redi_url_torrent, format!("{}.torrent", row.redi_url));
        assert_eq!(row.file_size, "42");
        assert!(!row.promoted);
        assert_eq!(row.board_name, "");
    }

    #[test]
    fn table_round_trips_through_json() {
        let row = AssetRow {
            board_slug: "orangepi3b".into(),
            board_name: "Orange \"Pi\" 3B | rev 2".into(),
            promoted: true,
            ..AssetRow::default()
        };
        let table = render_table(&[row]);
        assert!(table.starts_with("\"board_slug\"|\"board_name\"|"));

        let doc = catalog_document(&table).expect("document");
        let assets = doc["assets"].as_array().expect("assets array");
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0]["board_slug"], "orangepi3b");
        assert_eq!(assets[0]["board_name"], "Orange \"Pi\" 3B | rev 2");
        assert_eq!(assets[0]["promoted"], "true");
        assert_eq!(assets[0]["platinum"], "false");
        let keys: Vec<&str> = assets[0]
            .as_object()
            .map(|o| o.keys().map(String::as_str).collect())
            .unwrap_or_default();
        assert_eq!(keys, COLUMNS);
    }

    #[test]
    fn ragged_tables_are_rejected() {
        let err = table_to_json("\"a\"|\"b\"\n\"1\"\n").unwrap_err().to_string();
        assert!(err.contains("row 1"), "unexpected err: {err}");
        assert!(split_line("\"open").is_err());
        assert_eq!(table_to_json("").expect("empty"), Value::Array(Vec::new()));
    }
}
