use std::time::Duration;

use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::CrmConfig;
use crate::error::{Error, Result};

use super::{CompanyRecord, PlatinumSupportRecord};

pub struct Credentials {
    client_id: String,
    client_secret: String,
    refresh_token: String,
}

impl Credentials {
    pub fn from_env(cfg: &CrmConfig) -> Option<Self> {
        let get = |name: &str| {
            std::env::var(name)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Some(Self {
            client_id: get(&cfg.client_id_env)?,
            client_secret: get(&cfg.client_secret_env)?,
            refresh_token: get(&cfg.refresh_token_env)?,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
}

pub struct CrmClient<'a> {
    cfg: &'a CrmConfig,
    client: reqwest::blocking::Client,
    access_token: String,
}

impl<'a> CrmClient<'a> {
    /// Exchange the refresh token for an access token.
    pub fn connect(cfg: &'a CrmConfig, creds: &Credentials) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;

        let url = Url::parse_with_params(
            &cfg.token_url,
            &[
                ("refresh_token", creds.refresh_token.as_str()),
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("grant_type", "refresh_token"),
            ],
        )
        .map_err(|e| Error::msg(format!("invalid CRM token URL '{}': {e}", cfg.token_url)))?;

        let res = client
            .post(url)
            .send()
            .map_err(|e| Error::msg(format!("CRM token request failed: {e}")))?;
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "CRM token request failed with status {}",
                res.status()
            )));
        }
        let token: TokenResponse = res
            .json()
            .map_err(|e| Error::msg(format!("unexpected CRM token response: {e}")))?;
        let access_token = match (token.access_token, token.error) {
            (Some(t), _) if !t.is_empty() => t,
            (_, Some(err)) => return Err(Error::msg(format!("CRM token rejected: {err}"))),
            _ => return Err(Error::msg("CRM token response carried no access token")),
        };

        Ok(Self {
            cfg,
            client,
            access_token,
        })
    }

    pub fn fetch_all(&self) -> Result<(Vec<CompanyRecord>, Vec<PlatinumSupportRecord>)> {
        let companies = self
            .fetch_module(&self.cfg.companies_module)?
            .iter()
            .filter_map(|r| company_from_record(self.cfg, r))
            .collect();
        let support = self
            .fetch_module(&self.cfg.support_module)?
            .iter()
            .filter_map(|r| support_from_record(self.cfg, r))
            .collect();
        Ok((companies, support))
    }

    fn fetch_module(&self, module: &str) -> Result<Vec<Value>> {
        let base = format!("{}/{}", self.cfg.api_base.trim_end_matches('/'), module);
        paginate(module, self.cfg.max_pages, |page| {
            let url = Url::parse_with_params(
                &base,
                &[
                    ("page", page.to_string()),
                    ("per_page", self.cfg.page_size.to_string()),
                ],
            )
            .map_err(|e| Error::msg(format!("invalid CRM URL '{base}': {e}")))?;
            debug!(module, page, "fetching CRM page");

            let res = self
                .client
                .get(url)
                .header(
                    "Authorization",
                    format!("Zoho-oauthtoken {}", self.access_token),
                )
                .send()
                .map_err(|e| Error::msg(format!("CRM request for {module} failed: {e}")))?;
            if res.status() == reqwest::StatusCode::NO_CONTENT {
                return Ok(None);
            }
            if !res.status().is_success() {
                return Err(Error::msg(format!(
                    "CRM request for {module} failed with status {}",
                    res.status()
                )));
            }
            res.json()
                .map(Some)
                .map_err(|e| Error::msg(format!("unexpected CRM response for {module}: {e}")))
        })
    }
}

/// Page through one module until it reports no more records, answers with
/// no content (`None`), or the page ceiling is reached.
pub fn paginate<F>(module: &str, max_pages: u32, mut fetch_page: F) -> Result<Vec<Value>>
where
    F: FnMut(u32) -> Result<Option<Value>>,
{
    let mut out = Vec::new();
    for page in 1..=max_pages {
        let Some(body) = fetch_page(page)? else {
            return Ok(out);
        };
        let (records, more) = parse_page(&body)?;
        out.extend(records);
        if !more {
            return Ok(out);
        }
    }
    warn!(module, max_pages, "CRM pagination stopped at page ceiling");
    Ok(out)
}

/// `{"data": [...], "info": {"more_records": bool}}`
pub fn parse_page(body: &Value) -> Result<(Vec<Value>, bool)> {
    let Some(data) = body.get("data").and_then(Value::as_array) else {
        return Err(Error::msg("CRM response has no 'data' array"));
    };
    let more = body
        .get("info")
        .and_then(|i| i.get("more_records"))
        .and_then(Value::as_bool)
        .unwrap_or(false);
    Ok((data.clone(), more))
}

/// Text of a CRM field: strings as-is, lookups by their `name`, multi-select
/// lists joined with `,`.
pub fn field_text(record: &Value, field: &str) -> String {
    fn text(v: &Value) -> String {
        match v {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Array(items) => items
                .iter()
                .map(text)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(map) => map.get("name").map(text).unwrap_or_default(),
            Value::Null => String::new(),
        }
    }
    record.get(field).map(text).unwrap_or_default()
}

pub fn company_from_record(cfg: &CrmConfig, record: &Value) -> Option<CompanyRecord> {
    let vendor_slug = field_text(record, &cfg.vendor_field).to_lowercase();
    if vendor_slug.is_empty() {
        return None;
    }
    Some(CompanyRecord {
        vendor_slug,
        name: field_text(record, &cfg.name_field),
        website: field_text(record, &cfg.website_field),
        description: field_text(record, &cfg.description_field),
    })
}

pub fn support_from_record(cfg: &CrmConfig, record: &Value) -> Option<PlatinumSupportRecord> {
    let boards = field_text(record, &cfg.boards_field);
    if boards.is_empty() {
        return None;
    }
    Some(PlatinumSupportRecord {
        boards,
        until: field_text(record, &cfg.until_field),
        status: field_text(record, &cfg.status_field),
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn page_shape() {
        let body = json!({"data": [{"id": 1}, {"id": 2}], "info": {"more_records": true}});
        let (records, more) = parse_page(&body).expect("page");
        assert_eq!(records.len(), 2);
        assert!(more);

        let (_, more) = parse_page(&json!({"data": []})).expect("page");
        assert!(!more);

        let err = parse_page(&json!({"status": "error"})).unwrap_err().to_string();
        assert!(err.contains("data"), "unexpected err: {err}");
    }

    fn page(ids: &[u32], more: bool) -> Value {
        json!({
            "data": ids.iter().map(|id| json!({"id": id})).collect::<Vec<_>>(),
            "info": {"more_records": more}
        })
    }

    #[test]
    fn pagination_stops_at_page_ceiling() {
        let mut requested = Vec::new();
        let got = paginate("Accounts", 3, |n| {
            requested.push(n);
            Ok(Some(page(&[n], true)))
        })
        .expect("paginate");
        assert_eq!(requested, vec![1, 2, 3]);
        assert_eq!(got.len(), 3);
    }

    #[test]
    fn pagination_stops_when_no_more_records() {
        let mut requested = Vec::new();
        let got = paginate("Accounts", 50, |n| {
            requested.push(n);
            Ok(Some(page(&[n * 10, n * 10 + 1], n < 2)))
        })
        .expect("paginate");
        assert_eq!(requested, vec![1, 2]);
        assert_eq!(got.len(), 4);
    }

    #[test]
    fn pagination_stops_on_no_content() {
        let mut requested = Vec::new();
        let got = paginate("Deals", 50, |n| {
            requested.push(n);
            Ok((n == 1).then(|| page(&[1], true)))
        })
        .expect("paginate");
        assert_eq!(requested, vec![1, 2]);
        assert_eq!(got, vec![json!({"id": 1})]);

        let empty = paginate("Deals", 50, |_| Ok(None)).expect("paginate");
        assert!(empty.is_empty());
    }

    #[test]
    fn pagination_propagates_bad_pages() {
        let err = paginate("Deals", 5, |_| Ok(Some(json!({"status": "error"}))))
            .unwrap_err()
            .to_string();
        assert!(err.contains("data"), "unexpected err: {err}");
    }

    #[test]
    fn maps_company_records() {
        let cfg = CrmConfig::default();
        let rec = json!({
            "Account_Name": "Radxa Computer",
            "Website": "https://radxa.com",
            "Vendor_Slug": " Radxa ",
            "Description": null,
            "Owner": {"name": "someone", "id": "1"}
        });
        assert_eq!(
            company_from_record(&cfg, &rec),
            Some(CompanyRecord {
                vendor_slug: "radxa".into(),
                name: "Radxa Computer".into(),
                website: "https://radxa.com".into(),
                description: String::new(),
            })
        );
        assert_eq!(company_from_record(&cfg, &json!({"Account_Name": "x"})), None);
    }

    #[test]
    fn maps_support_records_with_multi_select_boards() {
        let cfg = CrmConfig::default();
        let rec = json!({
            "Boards": ["rock5b", "rock5a"],
            "Support_Until": "2027-01-31",
            "Stage": "Closed Won"
        });
        let got = support_from_record(&cfg, &rec).expect("support record");
        assert_eq!(got.boards, "rock5b,rock5a");
        assert_eq!(got.until, "2027-01-31");
        assert!(!got.is_cancelled());
        assert_eq!(support_from_record(&cfg, &json!({"Stage": "Open"})), None);
    }
}
