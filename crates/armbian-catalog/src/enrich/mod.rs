//! Vendor/company and platinum-support enrichment.
//!
//! The pipeline only talks to [`EnrichmentResolver`]; whether the tables
//! behind it came from the CRM or are empty is decided once, up front.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use tracing::{info, warn};

use crate::config::CrmConfig;
use crate::diagnostics::Diagnostics;
use crate::log_sanitize::sanitize_log_line;

pub mod crm;
pub mod platinum;

pub use platinum::{PlatinumStatus, PlatinumSupportRecord};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompanyRecord {
    /// Lowercased vendor slug, the join key against board vendors.
    pub vendor_slug: String,
    pub name: String,
    pub website: String,
    pub description: String,
}

pub trait EnrichmentResolver {
    fn company(&self, vendor: &str) -> Option<&CompanyRecord>;
    fn platinum_until(&self, board: &str) -> Option<&str>;
}

/// Used when the CRM is disabled or unreachable.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoEnrichment;

impl EnrichmentResolver for NoEnrichment {
    fn company(&self, _vendor: &str) -> Option<&CompanyRecord> {
        None
    }

    fn platinum_until(&self, _board: &str) -> Option<&str> {
        None
    }
}

#[derive(Debug, Default, Clone)]
pub struct StaticEnrichment {
    companies: BTreeMap<String, CompanyRecord>,
    platinum: BTreeMap<String, String>,
}

impl StaticEnrichment {
    pub fn new(
        companies: impl IntoIterator<Item = CompanyRecord>,
        support: &[PlatinumSupportRecord],
        diag: &mut Diagnostics,
    ) -> Self {
        let mut by_vendor = BTreeMap::new();
        for mut c in companies {
            c.vendor_slug = c.vendor_slug.trim().to_lowercase();
            if c.vendor_slug.is_empty() {
                continue;
            }
            by_vendor.entry(c.vendor_slug.clone()).or_insert(c);
        }
        Self {
            companies: by_vendor,
            platinum: platinum::latest_expiry_by_board(support, diag),
        }
    }

    pub fn company_count(&self) -> usize {
        self.companies.len()
    }

    pub fn platinum_count(&self) -> usize {
        self.platinum.len()
    }
}

impl EnrichmentResolver for StaticEnrichment {
    fn company(&self, vendor: &str) -> Option<&CompanyRecord> {
        self.companies.get(&vendor.to_lowercase())
    }

    fn platinum_until(&self, board: &str) -> Option<&str> {
        self.platinum.get(&board.to_lowercase()).map(String::as_str)
    }
}

/// Enrichment fields for one output row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enrichment {
    pub company_name: String,
    pub company_website: String,
    pub company_logo: String,
    pub platinum: PlatinumStatus,
}

pub fn enrich(
    resolver: &dyn EnrichmentResolver,
    vendor: &str,
    board: &str,
    logo_base: &str,
    today: NaiveDate,
) -> Enrichment {
    let mut out = Enrichment::default();
    if !vendor.is_empty() {
        out.company_logo = company_logo_url(logo_base, vendor);
        if let Some(c) = resolver.company(vendor) {
            out.company_name = c.name.clone();
            out.company_website = c.website.clone();
        }
    }
    out.platinum = PlatinumStatus::resolve(resolver.platinum_until(board), today);
    out
}

/// Logos are published by convention under the vendor slug; never fetched.
pub fn company_logo_url(logo_base: &str, vendor: &str) -> String {
    format!(
        "{}/{}.png",
        logo_base.trim_end_matches('/'),
        vendor.to_lowercase()
    )
}

/// Build the resolver for this run. Missing credentials or any CRM failure
/// fall back to [`NoEnrichment`].
pub fn resolver_for(cfg: &CrmConfig, diag: &mut Diagnostics) -> Box<dyn EnrichmentResolver> {
    if !cfg.enabled {
        info!("CRM enrichment disabled");
        return Box::new(NoEnrichment);
    }
    let Some(creds) = crm::Credentials::from_env(cfg) else {
        warn!("CRM credentials not set; company and platinum fields stay empty");
        return Box::new(NoEnrichment);
    };
    match crm::CrmClient::connect(cfg, &creds).and_then(|client| client.fetch_all()) {
        Ok((companies, support)) => {
            let resolver = StaticEnrichment::new(companies, &support, diag);
            info!(
                companies = resolver.company_count(),
                platinum_boards = resolver.platinum_count(),
                "CRM enrichment loaded"
            );
            Box::new(resolver)
        }
        Err(e) => {
            warn!(
                "CRM enrichment unavailable: {}",
                sanitize_log_line(&e.to_string())
            );
            Box::new(NoEnrichment)
        }
    }
}
