//! Raspberry Pi Imager repository export.
//!
//! Reads a generated catalog and rewrites the Raspberry Pi images in it as
//! an `{"os_list": [...]}` document the Raspberry Pi Imager understands.

use std::fs;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::log_sanitize::sanitize_log_line;

pub const DEFAULT_CATALOG_URL: &str = "https://github.armbian.com/armbian-images.json";
pub const DEFAULT_OUTPUT: &str = "rpi-imager.json";

const UBUNTU_RELEASES: &[&str] = &["jammy", "noble", "plucky"];
const RPI_BOARDS: &[&str] = &["rpi4b"];
const RPI_DEVICES: &[&str] = &["pi5-64bit", "pi4-64bit", "pi3-64bit"];
const EXCLUDE_PATTERNS: &[&str] = &["homeassistant", "openhab", "kali", "omv", "trunk"];
const IMAGE_EXTENSIONS: &[&str] = &[".img.xz", ".img"];
const ICON_URL: &str = "https://www.armbian.com/armbian-logo-40x40.png";
const WEBSITE: &str = "https://www.armbian.com";

const VARIANT_DISPLAY_NAMES: &[(&str, &str)] = &[
    ("gnome", "Gnome Desktop"),
    ("minimal", "Minimal"),
    ("xfce", "Xfce Desktop"),
    ("kde-neon", "KDE Neon Desktop"),
    ("cinnamon", "Cinnamon Desktop"),
    ("mate", "Mate Desktop"),
    ("i3-wm", "I3 Window Manager"),
    ("server", "Server"),
];

/// The subset of a catalog row this export reads.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CatalogEntry {
    pub board_slug: String,
    pub file_url: String,
    pub file_url_sha: String,
    pub armbian_version: String,
    pub distro_release: String,
    pub kernel_branch: String,
    pub image_variant: String,
    pub preinstalled_application: String,
    pub file_size: String,
    pub file_updated: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDoc {
    Wrapped { assets: Vec<CatalogEntry> },
    Bare(Vec<CatalogEntry>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OsEntry {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icon: String,
    pub website: String,
    pub release_date: String,
    pub extract_size: u64,
    pub extract_sha256: String,
    pub image_download_size: u64,
    pub image_download_sha256: String,
    pub devices: Vec<String>,
    pub init_format: String,
}

#[derive(Debug, Default, Serialize)]
pub struct OsList {
    pub os_list: Vec<OsEntry>,
}

pub fn parse_catalog(data: &str) -> Result<Vec<CatalogEntry>> {
    let doc: CatalogDoc = serde_json::from_str(data)?;
    Ok(match doc {
        CatalogDoc::Wrapped { assets } => assets,
        CatalogDoc::Bare(assets) => assets,
    })
}

/// A cached file wins over the URL.
pub fn load_catalog(url: &str, cached: Option<&Path>) -> Result<Vec<CatalogEntry>> {
    let data = match cached {
        Some(path) => {
            info!(path = %path.display(), "using cached catalog");
            fs::read_to_string(path)
                .map_err(|e| Error::msg(format!("failed to read {}: {e}", path.display())))?
        }
        None => {
            info!(url, "fetching catalog");
            let client = http_client(60)?;
            let res = client
                .get(url)
                .send()
                .map_err(|e| Error::msg(format!("catalog fetch failed: {e}")))?;
            if !res.status().is_success() {
                return Err(Error::msg(format!(
                    "catalog fetch failed with status {}",
                    res.status()
                )));
            }
            res.text()
                .map_err(|e| Error::msg(format!("failed to read catalog body: {e}")))?
        }
    };
    parse_catalog(&data)
}

fn http_client(timeout_secs: u64) -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))
}

/// An entry that passed every filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selected {
    pub filename: String,
    pub url: String,
    pub sha_url: String,
    pub version: String,
    pub distro: String,
    pub variant: String,
    pub release_date: String,
    pub download_size: u64,
}

fn is_rpi_board(slug: &str) -> bool {
    let slug = slug.to_lowercase();
    RPI_BOARDS.iter().any(|b| slug.contains(b))
}

fn matches_excluded(s: &str) -> bool {
    let s = s.to_lowercase();
    EXCLUDE_PATTERNS.iter().any(|p| s.contains(p))
}

pub fn select(entry: &CatalogEntry) -> Option<Selected> {
    if entry.file_url.is_empty() {
        debug!(board = %entry.board_slug, "skipping: no file url");
        return None;
    }
    if !is_rpi_board(&entry.board_slug) {
        return None;
    }
    if matches_excluded(&entry.preinstalled_application) {
        debug!(board = %entry.board_slug, "skipping: application image");
        return None;
    }
    let filename = entry.file_url.rsplit('/').next().unwrap_or(&entry.file_url);
    if !IMAGE_EXTENSIONS.iter().any(|ext| filename.ends_with(ext)) {
        debug!(filename, "skipping: not an image file");
        return None;
    }
    if matches_excluded(filename) {
        debug!(filename, "skipping: excluded filename");
        return None;
    }

    let or = |v: &str, fallback: &str| {
        if v.is_empty() {
            fallback.to_string()
        } else {
            v.to_string()
        }
    };
    Some(Selected {
        filename: filename.to_string(),
        url: entry.file_url.clone(),
        sha_url: entry.file_url_sha.clone(),
        version: or(&entry.armbian_version, "unknown"),
        distro: or(&entry.distro_release, "unknown"),
        variant: or(&entry.image_variant, "server"),
        release_date: release_date(&entry.file_updated),
        download_size: entry.file_size.trim().parse().unwrap_or(0),
    })
}

pub fn variant_display_name(variant: &str) -> String {
    let lower = variant.to_lowercase();
    VARIANT_DISPLAY_NAMES
        .iter()
        .find(|(k, _)| *k == lower)
        .map(|(_, v)| v.to_string())
        .unwrap_or_else(|| capitalize(variant))
}

pub fn release_type(distro: &str) -> &'static str {
    if UBUNTU_RELEASES.contains(&distro) {
        "Ubuntu"
    } else {
        "Debian"
    }
}

/// `YYYY-MM-DD` of an RFC 3339 timestamp; unparsable values keep their
/// first ten characters.
pub fn release_date(ts: &str) -> String {
    if ts.is_empty() {
        return String::new();
    }
    match chrono::DateTime::parse_from_rfc3339(ts) {
        Ok(dt) => dt.format("%Y-%m-%d").to_string(),
        Err(_) => ts.chars().take(10).collect(),
    }
}

// "xfce" -> "Xfce", "KDE" -> "Kde"
fn capitalize(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Size and SHA-256 of the image as written to the card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractDigest {
    pub size: u64,
    pub sha256: String,
}

pub fn os_entry(sel: &Selected, extract: &ExtractDigest, download_sha256: &str) -> OsEntry {
    OsEntry {
        name: format!(
            "Armbian {} {} {}",
            capitalize(&sel.distro),
            variant_display_name(&sel.variant),
            sel.version
        ),
        description: format!(
            "Ultralight custom {} OS for single board computers",
            release_type(&sel.distro)
        ),
        url: sel.url.clone(),
        icon: ICON_URL.to_string(),
        website: WEBSITE.to_string(),
        release_date: sel.release_date.clone(),
        extract_size: extract.size,
        extract_sha256: extract.sha256.clone(),
        image_download_size: sel.download_size,
        image_download_sha256: download_sha256.to_string(),
        devices: RPI_DEVICES.iter().map(|d| d.to_string()).collect(),
        init_format: "systemd".to_string(),
    }
}

/// Hash and count the decompressed stream (`xz` when `compressed`).
pub fn extract_digest(reader: impl Read, compressed: bool) -> Result<ExtractDigest> {
    if compressed {
        digest_stream(xz2::read::XzDecoder::new(reader))
    } else {
        digest_stream(reader)
    }
}

fn digest_stream(mut reader: impl Read) -> Result<ExtractDigest> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 256];
    let mut size = 0u64;
    loop {
        let n = reader
            .read(&mut buf)
            .map_err(|e| Error::msg(format!("failed to read image stream: {e}")))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }
    Ok(ExtractDigest {
        size,
        sha256: hex::encode(hasher.finalize()),
    })
}

/// First whitespace-separated token of a `.sha` sidecar, when it looks like
/// a SHA-256 digest.
pub fn parse_sha_sidecar(text: &str) -> Option<String> {
    let hash = text.split_whitespace().next()?.to_lowercase();
    (hash.len() == 64 && hash.chars().all(|c| c.is_ascii_hexdigit())).then_some(hash)
}

/// Where image bytes and sidecars come from.
pub trait ImageSource {
    fn download_sha256(&self, sha_url: &str) -> Option<String>;
    fn extract(&self, sel: &Selected) -> Result<ExtractDigest>;
}

pub struct HttpImageSource {
    client: reqwest::blocking::Client,
}

impl HttpImageSource {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: http_client(600)?,
        })
    }
}

impl ImageSource for HttpImageSource {
    fn download_sha256(&self, sha_url: &str) -> Option<String> {
        if sha_url.is_empty() {
            return None;
        }
        let text = self
            .client
            .get(sha_url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.text());
        match text {
            Ok(t) => parse_sha_sidecar(&t),
            Err(e) => {
                warn!(url = sha_url, "could not fetch checksum: {e}");
                None
            }
        }
    }

    fn extract(&self, sel: &Selected) -> Result<ExtractDigest> {
        info!(url = %sel.url, "downloading image");
        let res = self
            .client
            .get(&sel.url)
            .send()
            .map_err(|e| Error::msg(format!("download of {} failed: {e}", sel.filename)))?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "download of {} failed with status {}",
                sel.filename,
                res.status()
            )));
        }
        extract_digest(res, sel.filename.ends_with(".xz"))
    }
}

/// Build the list. Without a source nothing is downloaded and the
/// sizes/hashes stay empty. An image that fails to download is skipped.
pub fn generate(entries: &[CatalogEntry], source: Option<&dyn ImageSource>) -> OsList {
    info!(total = entries.len(), "catalog entries");
    let mut out = OsList::default();
    for sel in entries.iter().filter_map(select) {
        let Some(source) = source else {
            info!(filename = %sel.filename, "dry run; not downloading");
            out.os_list.push(os_entry(&sel, &ExtractDigest::default(), ""));
            continue;
        };
        let download_sha = source.download_sha256(&sel.sha_url).unwrap_or_default();
        match source.extract(&sel) {
            Ok(extract) => {
                info!(
                    filename = %sel.filename,
                    size = extract.size,
                    sha256 = %extract.sha256,
                    "extracted image"
                );
                out.os_list.push(os_entry(&sel, &extract, &download_sha));
            }
            Err(e) => warn!(
                filename = %sel.filename,
                "skipping image: {}",
                sanitize_log_line(&e.to_string())
            ),
        }
    }
    info!(entries = out.os_list.len(), "generated imager entries");
    out
}

pub fn to_json(list: &OsList) -> Result<String> {
    Ok(serde_json::to_string_pretty(list)?)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn entry(slug: &str, url: &str) -> CatalogEntry {
        CatalogEntry {
            board_slug: slug.into(),
            file_url: url.into(),
            file_url_sha: format!("{url}.sha"),
            armbian_version: "25.8.1".into(),
            distro_release: "noble".into(),
            kernel_branch: "current".into(),
            image_variant: "gnome".into(),
            file_size: "1234".into(),
            file_updated: "2025-08-20T12:00:00Z".into(),
            ..CatalogEntry::default()
        }
    }

    const RPI_URL: &str =
        "https://dl.armbian.com/rpi4b/archive/Armbian_25.8.1_Rpi4b_noble_current_6.12.41_gnome_desktop.img.xz";

    #[test]
    fn filters_boards_apps_and_extensions() {
        assert!(select(&entry("rpi4b", RPI_URL)).is_some());
        assert!(select(&entry("orangepi3b", RPI_URL)).is_none());
        assert!(select(&entry("rpi4b", "")).is_none());

        let mut app = entry("rpi4b", RPI_URL);
        app.preinstalled_application = "homeassistant".into();
        assert!(select(&app).is_none());

        let trunk = entry(
            "rpi4b",
            "https://x/Armbian_25.11.0-trunk.3_Rpi4b_noble_current_6.12.41.img.xz",
        );
        assert!(select(&trunk).is_none());
        assert!(select(&entry("rpi4b", "https://x/Armbian_25.8.1_Rpi4b.img.xz.sha")).is_none());
        assert!(select(&entry("rpi4b", "https://x/Armbian_25.8.1_Rpi4b.img")).is_some());
    }

    #[test]
    fn entry_fields() {
        let sel = select(&entry("rpi4b", RPI_URL)).expect("selected");
        let e = os_entry(&sel, &ExtractDigest::default(), "");
        assert_eq!(e.name, "Armbian Noble Gnome Desktop 25.8.1");
        assert_eq!(
            e.description,
            "Ultralight custom Ubuntu OS for single board computers"
        );
        assert_eq!(e.release_date, "2025-08-20");
        assert_eq!(e.image_download_size, 1234);
        assert_eq!(e.devices, vec!["pi5-64bit", "pi4-64bit", "pi3-64bit"]);
        assert_eq!(e.init_format, "systemd");

        assert_eq!(release_type("bookworm"), "Debian");
        assert_eq!(variant_display_name("budgie"), "Budgie");
        assert_eq!(variant_display_name("i3-wm"), "I3 Window Manager");
        assert_eq!(release_date("2025-08-20 bogus"), "2025-08-20");
    }

    #[test]
    fn digests_decompressed_stream() {
        let payload = b"armbian image bytes".repeat(1000);
        let mut enc = xz2::write::XzEncoder::new(Vec::new(), 6);
        enc.write_all(&payload).expect("compress");
        let compressed = enc.finish().expect("finish xz");

        let got = extract_digest(compressed.as_slice(), true).expect("digest");
        assert_eq!(got.size, payload.len() as u64);
        assert_eq!(got.sha256, hex::encode(Sha256::digest(&payload)));

        let plain = extract_digest(payload.as_slice(), false).expect("digest");
        assert_eq!(plain, got);
    }

    #[test]
    fn sha_sidecar_format() {
        let hash = "A".repeat(64);
        assert_eq!(
            parse_sha_sidecar(&format!("{hash} *Armbian.img.xz\n")),
            Some("a".repeat(64))
        );
        assert_eq!(parse_sha_sidecar("nothex  file"), None);
        assert_eq!(parse_sha_sidecar(""), None);
    }

    struct FakeSource;

    impl ImageSource for FakeSource {
        fn download_sha256(&self, _sha_url: &str) -> Option<String> {
            Some("ab".repeat(32))
        }

        fn extract(&self, sel: &Selected) -> Result<ExtractDigest> {
            if sel.filename.contains("broken") {
                return Err(Error::msg("connection reset"));
            }
            Ok(ExtractDigest {
                size: 42,
                sha256: "cd".repeat(32),
            })
        }
    }

    #[test]
    fn generate_skips_failed_downloads() {
        let doc = serde_json::json!({
            "assets": [
                {"board_slug": "rpi4b", "file_url": RPI_URL, "file_size": "10"},
                {"board_slug": "rpi4b", "file_url": "https://x/Armbian_broken_Rpi4b.img.xz"},
                {"board_slug": "rock5b", "file_url": "https://x/Armbian_25.8.1_Rock5b.img.xz"}
            ]
        });
        let entries = parse_catalog(&doc.to_string()).expect("catalog");
        assert_eq!(entries.len(), 3);

        let list = generate(&entries, Some(&FakeSource));
        assert_eq!(list.os_list.len(), 1);
        assert_eq!(list.os_list[0].extract_size, 42);
        assert_eq!(list.os_list[0].image_download_sha256, "ab".repeat(32));

        let dry = generate(&entries, None);
        assert_eq!(dry.os_list.len(), 2);
        assert_eq!(dry.os_list[0].extract_sha256, "");

        let json = to_json(&dry).expect("json");
        assert!(json.contains("\"os_list\""));
    }
}
