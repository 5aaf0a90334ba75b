use std::fs;
use std::io::ErrorKind;
use std::process::Command;

use chrono::NaiveDateTime;
use tracing::{debug, info};

use crate::config::MirrorConfig;
use crate::error::{Error, Result};
use crate::filename;
use crate::log_sanitize::sanitize_log_line;

use super::{ARCHIVE_REPOSITORY, RawAsset, is_sidecar, sort_by_url};

pub fn collect(cfg: &MirrorConfig) -> Result<Vec<RawAsset>> {
    let listing = match cfg.listing_file.as_deref() {
        Some(path) => {
            info!(path = %path.display(), "reading mirror listing");
            fs::read_to_string(path).map_err(|e| {
                Error::msg(format!(
                    "failed to read mirror listing {}: {e}",
                    path.display()
                ))
            })?
        }
        None => run_rsync_listing(&cfg.rsync_root)?,
    };
    let mut assets = parse_listing(&listing, &cfg.download_base, &cfg.exclude_applications);
    sort_by_url(&mut assets);
    Ok(assets)
}

fn run_rsync_listing(root: &str) -> Result<String> {
    info!(root, "listing mirror with rsync");
    let out = Command::new("rsync")
        .arg("--list-only")
        .arg("--recursive")
        .arg(root)
        .output()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::msg("required tool 'rsync' not found in PATH")
            } else {
                Error::msg(format!("failed to run rsync: {e}"))
            }
        })?;
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        return Err(Error::msg(format!(
            "rsync listing of {root} failed ({}): {}",
            out.status,
            sanitize_log_line(stderr.trim())
        )));
    }
    String::from_utf8(out.stdout)
        .map_err(|e| Error::msg(format!("rsync listing is not valid UTF-8: {e}")))
}

/// Parse `rsync --list-only` output (`perms size date time path`), keeping
/// regular files at `<board>/archive/Armbian*`.
pub fn parse_listing(text: &str, download_base: &str, exclude_apps: &[String]) -> Vec<RawAsset> {
    let base = download_base.trim_end_matches('/');
    let mut out = Vec::new();
    for line in text.lines() {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 5 || !parts[0].starts_with('-') {
            continue;
        }
        let path = parts[4..].join(" ");
        if !is_archive_image(&path) {
            continue;
        }
        let name = path.rsplit('/').next().unwrap_or(&path);
        if is_sidecar(name) {
            continue;
        }
        let app = filename::parse(name).application;
        if !app.is_empty() && exclude_apps.iter().any(|a| a == &app) {
            continue;
        }
        let Some(size) = parse_size(parts[1]) else {
            debug!(line = %sanitize_log_line(line), "skipping listing line with bad size");
            continue;
        };
        let Some(timestamp) = parse_timestamp(parts[2], parts[3]) else {
            debug!(line = %sanitize_log_line(line), "skipping listing line with bad date");
            continue;
        };
        out.push(RawAsset {
            size,
            url: format!("{base}/{path}"),
            timestamp,
            repository: ARCHIVE_REPOSITORY.to_string(),
        });
    }
    out
}

fn is_archive_image(path: &str) -> bool {
    let segs: Vec<&str> = path.split('/').collect();
    matches!(segs.as_slice(), [board, "archive", name] if !board.is_empty() && name.starts_with("Armbian"))
}

fn parse_size(raw: &str) -> Option<u64> {
    let digits: String = raw.chars().filter(|c| *c != ',' && *c != '.').collect();
    digits.parse().ok()
}

fn parse_timestamp(date: &str, time: &str) -> Option<String> {
    let dt = NaiveDateTime::parse_from_str(&format!("{date} {time}"), "%Y/%m/%d %H:%M:%S").ok()?;
    Some(dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "\
drwxr-xr-x          4,096 2025/08/20 10:00:00 orangepi3b
drwxr-xr-x          4,096 2025/08/20 10:00:00 orangepi3b/archive
-rw-r--r--    612,345,678 2025/08/20 12:34:56 orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.xz
-rw-r--r--            833 2025/08/20 12:34:56 orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.xz.asc
-rw-r--r--            158 2025/08/20 12:34:56 orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.xz.sha
-rw-r--r--         41,001 2025/08/20 12:34:56 orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.xz.torrent
-rw-r--r--          1,024 2025/08/20 12:34:56 orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.txt
-rw-r--r--    712,000,000 2025/08/21 08:00:01 orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31-omv.img.xz
-rw-r--r--          2,048 2025/08/21 08:00:01 orangepi3b/README.txt
-rw-r--r--          2,048 2025/08/21 08:00:01 orangepi3b/archive/nested/Armbian_x.img.xz
lrwxrwxrwx             40 2025/08/21 08:00:01 orangepi3b/archive/Armbian_latest.img.xz
";

    fn apps() -> Vec<String> {
        vec!["omv".into(), "kali".into()]
    }

    #[test]
    fn keeps_only_archive_images() {
        let got = parse_listing(LISTING, "https://dl.armbian.com/", &apps());
        assert_eq!(got.len(), 1);
        assert_eq!(
            got[0],
            RawAsset {
                size: 612_345_678,
                url: "https://dl.armbian.com/orangepi3b/archive/Armbian_25.8.1_Orangepi3b_bookworm_current_6.6.31.img.xz".into(),
                timestamp: "2025-08-20T12:34:56Z".into(),
                repository: "archive".into(),
            }
        );
    }

    #[test]
    fn application_images_pass_when_not_excluded() {
        let got = parse_listing(LISTING, "https://dl.armbian.com", &[]);
        assert_eq!(got.len(), 2);
        assert!(got[1].url.ends_with("-omv.img.xz"));
    }

    #[test]
    fn sizes_lose_thousands_separators() {
        assert_eq!(parse_size("1,234,567"), Some(1_234_567));
        assert_eq!(parse_size("1.234.567"), Some(1_234_567));
        assert_eq!(parse_size("abc"), None);
    }

    #[test]
    fn bad_dates_are_skipped() {
        assert_eq!(parse_timestamp("2025/13/40", "00:00:00"), None);
        assert_eq!(
            parse_timestamp("2025/01/02", "03:04:05").as_deref(),
            Some("2025-01-02T03:04:05Z")
        );
    }
}
