//! Registration-path counting.
//!
//! Turns raw registration-sheet rows into conversion / front-sale /
//! individual-reservation counts for a target path and date range.
//! These counts are the denominator of every CPA/CPO the decision
//! engine computes.

pub mod columns;
pub mod dates;

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use common::{Error, SheetLocation};
use serde::Deserialize;
use sheets_client::SheetsClient;
use tracing::warn;

pub use columns::{detect_columns, ColumnLayout, DetectedColumns};
pub use dates::parse_sheet_date;

/// Column defaults and staleness tolerance for registration sheets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CounterConfig {
    /// Default date column (0-based) when header detection fails.
    pub default_date_col: usize,
    /// Default registration-path column when header detection fails.
    pub default_path_col: usize,
    /// Fixed date column for individual-reservation counting.
    pub reservation_date_col: usize,
    /// Fixed path column for individual-reservation counting.
    pub reservation_path_col: usize,
    /// Flag the sheet stale when its newest date is older than this.
    pub staleness_tolerance_days: i64,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            default_date_col: 0,
            default_path_col: 3,
            reservation_date_col: 1,
            reservation_path_col: 4,
            staleness_tolerance_days: 2,
        }
    }
}

/// A count plus the data-quality flags callers are expected to log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PathCount {
    pub count: u32,
    /// The sheet's newest date is older than the tolerance.
    pub stale: bool,
    /// Header detection failed and default columns were used.
    pub column_fallback: bool,
}

fn cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map(String::as_str).unwrap_or("")
}

/// Resolve a date cell against the window. Month/day cells carry no
/// year, so a window crossing New Year must also try the opening year
/// before a late-December cell can be ruled out of range.
fn resolve_date(cell: &str, from: NaiveDate, to: NaiveDate) -> Option<NaiveDate> {
    let primary = parse_sheet_date(cell, to.year());
    if from.year() == to.year() {
        return primary;
    }
    match primary {
        Some(d) if d >= from && d <= to => Some(d),
        _ => parse_sheet_date(cell, from.year()),
    }
}

fn date_in_range(row: &[String], layout: ColumnLayout, from: NaiveDate, to: NaiveDate) -> bool {
    match resolve_date(cell(row, layout.date_col), from, to) {
        Some(d) => d >= from && d <= to,
        None => false,
    }
}

/// Ordinary counting: each row contributes at most one match.
pub fn count_single(
    rows: &[Vec<String>],
    layout: ColumnLayout,
    target_path: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> u32 {
    rows.iter()
        .filter(|row| cell(row, layout.path_col).trim() == target_path)
        .filter(|row| date_in_range(row, layout, from, to))
        .count() as u32
}

/// Individual-reservation counting: a single cell may encode multiple
/// reservations as newline-separated sub-values, each compared
/// independently. The one place row-to-count cardinality is not 1:1.
pub fn count_multi(
    rows: &[Vec<String>],
    layout: ColumnLayout,
    target_path: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> u32 {
    rows.iter()
        .filter(|row| date_in_range(row, layout, from, to))
        .map(|row| {
            cell(row, layout.path_col)
                .split('\n')
                .filter(|sub| sub.trim() == target_path)
                .count() as u32
        })
        .sum()
}

/// Newest parseable date in the sheet, no later than `reference`.
/// Month/day cells that land past the reference are rolled back a
/// year so a January reading does not mistake December for the future.
pub fn latest_date(
    rows: &[Vec<String>],
    date_col: usize,
    reference: NaiveDate,
) -> Option<NaiveDate> {
    rows.iter()
        .filter_map(|row| {
            let raw = cell(row, date_col);
            match parse_sheet_date(raw, reference.year()) {
                Some(d) if d > reference => parse_sheet_date(raw, reference.year() - 1),
                other => other,
            }
        })
        .max()
}

/// Counts registrations out of spreadsheet tabs via the cached client.
#[derive(Debug)]
pub struct RegistrationCounter {
    sheets: Arc<SheetsClient>,
    config: CounterConfig,
}

impl RegistrationCounter {
    pub fn new(sheets: Arc<SheetsClient>, config: CounterConfig) -> Self {
        Self { sheets, config }
    }

    fn staleness(&self, rows: &[Vec<String>], date_col: usize, reference: NaiveDate) -> bool {
        let cutoff = reference - Duration::days(self.config.staleness_tolerance_days);
        match latest_date(rows, date_col, reference) {
            Some(newest) => newest < cutoff,
            None => true,
        }
    }

    /// Count conversions or front sales: auto-detected columns, one
    /// match per row.
    pub async fn count_registrations(
        &self,
        location: &SheetLocation,
        target_path: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PathCount, Error> {
        let rows = self
            .sheets
            .read_range(&location.document_id, &location.tab, "")
            .await?;
        let Some((header, data)) = rows.split_first() else {
            return Ok(PathCount {
                count: 0,
                stale: true,
                column_fallback: false,
            });
        };

        let defaults = ColumnLayout {
            date_col: self.config.default_date_col,
            path_col: self.config.default_path_col,
        };
        let detected = detect_columns(header, defaults);
        if detected.fallback {
            warn!(
                "header detection failed on {}:{}, counting with default columns",
                location.document_id, location.tab
            );
        }

        let stale = self.staleness(data, detected.layout.date_col, to);
        if stale {
            warn!(
                "sheet {}:{} looks stale (newest date older than {} days)",
                location.document_id, location.tab, self.config.staleness_tolerance_days
            );
        }

        let count = count_single(data, detected.layout, target_path, from, to);
        Ok(PathCount {
            count,
            stale,
            column_fallback: detected.fallback,
        })
    }

    /// Count individual reservations: fixed per-channel columns,
    /// newline-separated multi-value cells.
    pub async fn count_reservations(
        &self,
        location: &SheetLocation,
        target_path: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<PathCount, Error> {
        let rows = self
            .sheets
            .read_range(&location.document_id, &location.tab, "")
            .await?;
        let data = if rows.is_empty() { &rows[..] } else { &rows[1..] };

        let layout = ColumnLayout {
            date_col: self.config.reservation_date_col,
            path_col: self.config.reservation_path_col,
        };
        let stale = self.staleness(data, layout.date_col, to);
        let count = count_multi(data, layout, target_path, from, to);
        Ok(PathCount {
            count,
            stale,
            column_fallback: false,
        })
    }
}
