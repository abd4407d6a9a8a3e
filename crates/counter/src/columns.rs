//! Header-based column detection for registration sheets.
//!
//! Sheet owners occasionally reorder columns; counting against a fixed
//! position would then silently read the wrong data. The header row is
//! matched against known synonyms, falling back to the configured
//! defaults (with a warning) only when nothing matches.

use tracing::warn;

/// Positions (0-based) of the date and registration-path columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date_col: usize,
    pub path_col: usize,
}

/// Outcome of header detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectedColumns {
    pub layout: ColumnLayout,
    /// True when detection failed and the defaults were used instead.
    pub fallback: bool,
}

const DATE_HEADERS: &[&str] = &["日付", "登録日", "年月日", "date", "day"];
const PATH_HEADERS: &[&str] = &[
    "登録経路",
    "経路",
    "流入経路",
    "registration path",
    "path",
    "route",
];

fn find_header(header: &[String], synonyms: &[&str]) -> Option<usize> {
    header.iter().position(|cell| {
        let cell = cell.trim().to_lowercase();
        !cell.is_empty() && synonyms.iter().any(|s| cell.contains(s))
    })
}

/// Locate the date and path columns from the header row. Either column
/// failing to match pushes that column to its default; a successful
/// match that differs from the default logs a drift warning.
pub fn detect_columns(header: &[String], defaults: ColumnLayout) -> DetectedColumns {
    let date = find_header(header, DATE_HEADERS);
    let path = find_header(header, PATH_HEADERS);

    if let Some(col) = date {
        if col != defaults.date_col {
            warn!(
                "date column drifted: detected {} (default {})",
                col, defaults.date_col
            );
        }
    }
    if let Some(col) = path {
        if col != defaults.path_col {
            warn!(
                "registration-path column drifted: detected {} (default {})",
                col, defaults.path_col
            );
        }
    }

    let fallback = date.is_none() || path.is_none();
    DetectedColumns {
        layout: ColumnLayout {
            date_col: date.unwrap_or(defaults.date_col),
            path_col: path.unwrap_or(defaults.path_col),
        },
        fallback,
    }
}
