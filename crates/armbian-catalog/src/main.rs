use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, ValueEnum};
use tracing::info;

use armbian_catalog::config::{self, CatalogConfig};
use armbian_catalog::{Result, pipeline, util};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Generate the Armbian image catalog (`armbian-images.json`).
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Where to write the JSON catalog
    #[arg(env = "OUTPUT")]
    output: Option<PathBuf>,
    /// Catalog config TOML (supports `extends`)
    #[arg(long, env = "CATALOG_CONFIG")]
    config: Option<PathBuf>,
    /// rsync root of the download mirror
    #[arg(long, env = "MIRROR_ROOT")]
    mirror_root: Option<String>,
    /// Pre-fetched `rsync --list-only` output used instead of running rsync
    #[arg(long, env = "MIRROR_LISTING")]
    mirror_listing: Option<PathBuf>,
    /// Directory holding the board definition files
    #[arg(long, env = "BOARDS_DIR")]
    boards_dir: Option<PathBuf>,
    /// Reusable board alias file (YAML)
    #[arg(long, env = "REUSABLE_BOARDS")]
    reusable_boards: Option<PathBuf>,
    /// Promotion allow-list, one regex per line
    #[arg(long, env = "PROMOTION_ALLOWLIST")]
    promotion_allowlist: Option<PathBuf>,
    /// Directory of `<repo>.json` release feeds used instead of the GitHub API
    #[arg(long, env = "RELEASE_FEEDS_DIR")]
    release_feeds_dir: Option<PathBuf>,
    /// Enable CRM company and platinum-support enrichment
    #[arg(long, env = "CRM_ENABLED", value_parser = clap::builder::BoolishValueParser::new())]
    crm_enabled: Option<bool>,
    /// Date used for platinum expiry checks (YYYY-MM-DD, default: today UTC)
    #[arg(long, env = "CATALOG_TODAY")]
    today: Option<NaiveDate>,
    /// Also write the pipe-delimited table the JSON is derived from
    #[arg(long, env = "CATALOG_TABLE")]
    table: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Args {
    fn apply(self, cfg: &mut CatalogConfig) {
        if let Some(v) = self.output {
            cfg.output.path = v;
        }
        if let Some(v) = self.mirror_root {
            cfg.mirror.rsync_root = v;
        }
        if let Some(v) = self.mirror_listing {
            cfg.mirror.listing_file = Some(v);
        }
        if let Some(v) = self.boards_dir {
            cfg.boards.dir = v;
        }
        if let Some(v) = self.reusable_boards {
            cfg.boards.reusable_file = Some(v);
        }
        if let Some(v) = self.promotion_allowlist {
            cfg.promotion.allowlist = Some(v);
        }
        if let Some(v) = self.release_feeds_dir {
            cfg.github.feeds_dir = Some(v);
        }
        if let Some(v) = self.crm_enabled {
            cfg.crm.enabled = v;
        }
        if let Some(v) = self.table {
            cfg.output.table = Some(v);
        }
    }
}

fn main() -> Result<()> {
    // .env first so clap's env fallbacks see it
    dotenv::dotenv().ok();
    let args = Args::parse();
    util::init_tracing("info", matches!(args.log_format, LogFormat::Json));

    let mut cfg = config::load_or_default(args.config.as_deref())?;
    let today = args
        .today
        .unwrap_or_else(|| chrono::Utc::now().date_naive());
    args.apply(&mut cfg);
    info!(%today, output = %cfg.output.path.display(), "generating image catalog");

    let catalog = pipeline::run(&cfg, today)?;
    pipeline::write_outputs(&cfg, &catalog)?;
    catalog.log_summary();
    Ok(())
}
