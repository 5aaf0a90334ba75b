//! One batch run: discover, parse, reconcile, render. Nothing is written
//! until the whole catalog exists in memory.

use chrono::NaiveDate;
use serde_json::Value;
use tracing::{debug, info};

use crate::assemble::{self, Assembler, AssetRow};
use crate::boards::{self, AliasTable, BoardRegistry};
use crate::config::CatalogConfig;
use crate::diagnostics::Diagnostics;
use crate::enrich::{self, EnrichmentResolver};
use crate::error::Result;
use crate::log_sanitize::sanitize_log_line;
use crate::promotion::PromotionRules;
use crate::sources::{self, RawAsset};
use crate::util;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub discovered: usize,
    /// Assets whose filename yielded no board.
    pub dropped: usize,
    pub base_rows: usize,
    pub alias_rows: usize,
}

#[derive(Debug)]
pub struct Catalog {
    pub rows: Vec<AssetRow>,
    pub table: String,
    pub document: Value,
    pub summary: RunSummary,
    pub diagnostics: Diagnostics,
}

impl Catalog {
    pub fn json(&self) -> Result<String> {
        util::to_json_pretty(&self.document)
    }

    pub fn log_summary(&self) {
        let s = &self.summary;
        info!(
            discovered = s.discovered,
            dropped = s.dropped,
            base_rows = s.base_rows,
            alias_rows = s.alias_rows,
            warnings = self.diagnostics.len(),
            "catalog assembled"
        );
        self.diagnostics.flush();
    }
}

/// Everything the assembly step reads, already loaded.
pub struct Inputs<'a> {
    pub boards: &'a BoardRegistry,
    pub aliases: &'a AliasTable,
    pub resolver: &'a dyn EnrichmentResolver,
    pub promotion: &'a PromotionRules,
    pub today: NaiveDate,
}

/// Assemble rows in input order and render the table and document.
pub fn build(
    cfg: &CatalogConfig,
    assets: &[RawAsset],
    inputs: &Inputs<'_>,
    diagnostics: Diagnostics,
) -> Result<Catalog> {
    let assembler = Assembler {
        boards: inputs.boards,
        aliases: inputs.aliases,
        resolver: inputs.resolver,
        promotion: inputs.promotion,
        output: &cfg.output,
        nightly_repository: &cfg.github.nightly_repository,
        today: inputs.today,
    };

    let mut summary = RunSummary {
        discovered: assets.len(),
        ..RunSummary::default()
    };
    let mut rows = Vec::with_capacity(assets.len());
    for asset in assets {
        let produced = assembler.rows_for(asset);
        if produced.is_empty() {
            debug!(url = %sanitize_log_line(&asset.url), "dropping asset without board");
            summary.dropped += 1;
            continue;
        }
        summary.base_rows += 1;
        summary.alias_rows += produced.len() - 1;
        rows.extend(produced);
    }

    let table = assemble::render_table(&rows);
    let document = assemble::catalog_document(&table)?;
    Ok(Catalog {
        rows,
        table,
        document,
        summary,
        diagnostics,
    })
}

/// Load every input named by `cfg` and build the catalog.
pub fn run(cfg: &CatalogConfig, today: NaiveDate) -> Result<Catalog> {
    let mut diag = Diagnostics::default();

    let registry = boards::load_registry(&cfg.boards.dir, &mut diag)?;
    let aliases = boards::load_aliases(cfg.boards.reusable_file.as_deref());
    let promotion = PromotionRules::load(&cfg.promotion)?;
    let assets = sources::collect(cfg)?;
    let resolver = enrich::resolver_for(&cfg.crm, &mut diag);

    let inputs = Inputs {
        boards: &registry,
        aliases: &aliases,
        resolver: resolver.as_ref(),
        promotion: &promotion,
        today,
    };
    build(cfg, &assets, &inputs, diag)
}

/// Stage every artifact, then move the JSON document and the optional
/// table into place. A failure before the JSON lands leaves no output.
pub fn write_outputs(cfg: &CatalogConfig, catalog: &Catalog) -> Result<()> {
    let json = util::stage_text(&cfg.output.path, &catalog.json()?)?;
    let table = match cfg.output.table.as_deref() {
        Some(path) => Some((util::stage_text(path, &catalog.table)?, path)),
        None => None,
    };

    util::commit(json, &cfg.output.path)?;
    info!(
        path = %cfg.output.path.display(),
        assets = catalog.rows.len(),
        "wrote image catalog"
    );
    if let Some((staged, path)) = table {
        util::commit(staged, path)?;
        info!(path = %path.display(), "wrote asset table");
    }
    Ok(())
}
