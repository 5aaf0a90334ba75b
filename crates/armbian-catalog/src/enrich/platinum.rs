use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::diagnostics::Diagnostics;

/// One support-pipeline entry. `boards` may list several slugs separated by
/// `,` or `;`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatinumSupportRecord {
    pub boards: String,
    pub until: String,
    pub status: String,
}

impl PlatinumSupportRecord {
    pub fn is_cancelled(&self) -> bool {
        let s = self.status.trim();
        s.eq_ignore_ascii_case("cancelled") || s.eq_ignore_ascii_case("canceled")
    }

    pub fn board_slugs(&self) -> impl Iterator<Item = String> + '_ {
        self.boards
            .split([',', ';'])
            .map(|b| b.trim().to_lowercase())
            .filter(|b| !b.is_empty())
    }
}

/// Strict zero-padded `YYYY-MM-DD` that is also a real calendar date. Only
/// these may take part in the string-ordered max below.
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let b = raw.as_bytes();
    let shape_ok = b.len() == 10
        && b.iter().enumerate().all(|(i, c)| match i {
            4 | 7 => *c == b'-',
            _ => c.is_ascii_digit(),
        });
    if !shape_ok {
        return None;
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()
}

/// Board slug to the latest expiry among non-cancelled records.
pub fn latest_expiry_by_board(
    records: &[PlatinumSupportRecord],
    diag: &mut Diagnostics,
) -> BTreeMap<String, String> {
    let mut out: BTreeMap<String, String> = BTreeMap::new();
    for r in records.iter().filter(|r| !r.is_cancelled()) {
        let until = r.until.trim();
        if parse_iso_date(until).is_none() {
            diag.warn(format!(
                "platinum support for '{}' has invalid date '{}'",
                r.boards.trim(),
                until
            ));
            continue;
        }
        for board in r.board_slugs() {
            match out.get_mut(&board) {
                Some(existing) if existing.as_str() >= until => {}
                Some(existing) => *existing = until.to_string(),
                None => {
                    out.insert(board, until.to_string());
                }
            }
        }
    }
    out
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlatinumStatus {
    pub platinum: bool,
    pub expired: bool,
    pub until: String,
}

impl PlatinumStatus {
    /// Active through the expiry day itself (UTC, date only).
    pub fn resolve(until: Option<&str>, today: NaiveDate) -> Self {
        let Some(until) = until else {
            return Self::default();
        };
        let Some(date) = parse_iso_date(until) else {
            return Self::default();
        };
        let active = date >= today;
        Self {
            platinum: active,
            expired: !active,
            until: until.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(boards: &str, until: &str, status: &str) -> PlatinumSupportRecord {
        PlatinumSupportRecord {
            boards: boards.into(),
            until: until.into(),
            status: status.into(),
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn cancelled_records_are_excluded_before_the_max() {
        let mut diag = Diagnostics::default();
        let map = latest_expiry_by_board(
            &[rec("x", "2099-01-01", "Open"), rec("x", "2100-01-01", "Cancelled")],
            &mut diag,
        );
        assert_eq!(map.get("x").map(String::as_str), Some("2099-01-01"));

        let status = PlatinumStatus::resolve(map.get("x").map(String::as_str), day(2026, 10, 16));
        assert!(status.platinum);
        assert!(!status.expired);
        assert_eq!(status.until, "2099-01-01");
    }

    #[test]
    fn latest_date_wins_across_multi_board_rows() {
        let mut diag = Diagnostics::default();
        let map = latest_expiry_by_board(
            &[
                rec("rock5b, orangepi5;  Bananapim5", "2026-03-01", "Won"),
                rec("orangepi5", "2027-06-30", "Open"),
                rec("rock5b", "2025-12-31", "canceled"),
                rec("rock5b", "2024-01-01", "Open"),
            ],
            &mut diag,
        );
        assert_eq!(map.get("rock5b").map(String::as_str), Some("2026-03-01"));
        assert_eq!(map.get("orangepi5").map(String::as_str), Some("2027-06-30"));
        assert_eq!(map.get("bananapim5").map(String::as_str), Some("2026-03-01"));
        assert!(diag.is_empty());
    }

    #[test]
    fn malformed_dates_are_rejected_not_sorted() {
        let mut diag = Diagnostics::default();
        let map = latest_expiry_by_board(
            &[
                rec("x", "2026-1-5", "Open"),
                rec("x", "31.12.2099", "Open"),
                rec("x", "2026-02-30", "Open"),
                rec("x", "2025-05-05", "Open"),
            ],
            &mut diag,
        );
        assert_eq!(map.get("x").map(String::as_str), Some("2025-05-05"));
        assert_eq!(diag.len(), 3);
    }

    #[test]
    fn expiry_is_inclusive_and_past_dates_expire() {
        let today = day(2026, 10, 16);
        let s = PlatinumStatus::resolve(Some("2026-10-16"), today);
        assert!(s.platinum && !s.expired);

        let s = PlatinumStatus::resolve(Some("2026-10-15"), today);
        assert!(!s.platinum && s.expired);
        assert_eq!(s.until, "2026-10-15");

        assert_eq!(PlatinumStatus::resolve(None, today), PlatinumStatus::default());
    }
}
