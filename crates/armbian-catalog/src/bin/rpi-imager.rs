use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use armbian_catalog::rpi_imager::{self, HttpImageSource, ImageSource};
use armbian_catalog::{Result, util};

/// Generate Raspberry Pi Imager JSON from the Armbian image catalog.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Don't download images, just show what would be processed
    #[arg(long)]
    dry_run: bool,
    /// Use a cached catalog file instead of fetching it
    #[arg(long)]
    cached_json: Option<PathBuf>,
    /// Output JSON file path
    #[arg(long, default_value = rpi_imager::DEFAULT_OUTPUT)]
    output: PathBuf,
    /// Catalog URL
    #[arg(long, default_value = rpi_imager::DEFAULT_CATALOG_URL)]
    url: String,
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    util::init_tracing(if args.verbose { "debug" } else { "info" }, false);

    let entries = rpi_imager::load_catalog(&args.url, args.cached_json.as_deref())?;
    let http;
    let source: Option<&dyn ImageSource> = if args.dry_run {
        None
    } else {
        http = HttpImageSource::new()?;
        Some(&http)
    };

    let list = rpi_imager::generate(&entries, source);
    let mut json = rpi_imager::to_json(&list)?;
    json.push('\n');
    util::write_text(&args.output, &json)?;
    info!(
        entries = list.os_list.len(),
        path = %args.output.display(),
        "saved imager list"
    );
    Ok(())
}
