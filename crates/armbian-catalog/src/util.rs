use std::fs;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{Error, Result};

pub fn ensure_dir(p: &Path) -> Result<()> {
    fs::create_dir_all(p)
        .map_err(|e| Error::msg(format!("failed to create dir {}: {e}", p.display())))
}

pub fn write_text(p: &Path, s: &str) -> Result<()> {
    if let Some(parent) = p.parent().filter(|d| !d.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    fs::write(p, s).map_err(|e| Error::msg(format!("failed to write {}: {e}", p.display())))
}

/// Pretty JSON with a trailing newline.
pub fn to_json_pretty(v: &serde_json::Value) -> Result<String> {
    let mut s = serde_json::to_string_pretty(v)
        .map_err(|e| Error::msg(format!("json encode error: {e}")))?;
    s.push('\n');
    Ok(s)
}

/// Write `s` to a temporary file beside `p`. Nothing appears at `p` until
/// [`commit`] renames it into place; dropping the handle removes it.
pub fn stage_text(p: &Path, s: &str) -> Result<NamedTempFile> {
    let dir = match p.parent().filter(|d| !d.as_os_str().is_empty()) {
        Some(d) => {
            ensure_dir(d)?;
            d
        }
        None => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir)
        .map_err(|e| Error::msg(format!("failed to stage {}: {e}", p.display())))?;
    tmp.write_all(s.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| Error::msg(format!("failed to stage {}: {e}", p.display())))?;
    Ok(tmp)
}

pub fn commit(staged: NamedTempFile, p: &Path) -> Result<()> {
    staged
        .persist(p)
        .map(|_| ())
        .map_err(|e| Error::msg(format!("failed to write {}: {}", p.display(), e.error)))
}

/// Log to stderr; `RUST_LOG` overrides `default_level`.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_files_appear_only_on_commit() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let out = tmp.path().join("a/b/out.json");
        let json = to_json_pretty(&serde_json::json!({"assets": []})).expect("encode");
        let staged = stage_text(&out, &json).expect("stage");
        assert!(!out.exists());

        commit(staged, &out).expect("commit");
        let data = fs::read_to_string(&out).expect("read back");
        assert!(data.ends_with("}\n"));
        assert!(data.contains("\"assets\""));
        assert_eq!(fs::read_dir(tmp.path().join("a/b")).expect("list").count(), 1);
    }

    #[test]
    fn dropped_stage_leaves_nothing_behind() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let out = tmp.path().join("table.txt");
        drop(stage_text(&out, "x\n").expect("stage"));
        assert_eq!(fs::read_dir(tmp.path()).expect("list").count(), 0);
    }
}
