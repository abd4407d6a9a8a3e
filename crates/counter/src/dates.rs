//! Flexible parsing for hand-entered sheet dates.

use chrono::NaiveDate;

/// Parse a date cell. Accepts `YYYY/M/D`, `YYYY-M-D`, `YYYY.M.D` and
/// `M/D` (resolved against `assume_year`); a trailing time of day is
/// ignored. Returns `None` for anything else.
pub fn parse_sheet_date(cell: &str, assume_year: i32) -> Option<NaiveDate> {
    let token = cell.trim().split_whitespace().next()?;
    if token.is_empty() {
        return None;
    }

    for sep in ['/', '-', '.'] {
        let parts: Vec<&str> = token.split(sep).collect();
        match parts.as_slice() {
            [y, m, d] => {
                let year: i32 = y.parse().ok()?;
                let month: u32 = m.parse().ok()?;
                let day: u32 = d.parse().ok()?;
                return NaiveDate::from_ymd_opt(year, month, day);
            }
            [m, d] if sep == '/' => {
                let month: u32 = m.parse().ok()?;
                let day: u32 = d.parse().ok()?;
                return NaiveDate::from_ymd_opt(assume_year, month, day);
            }
            _ => continue,
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_full_dates() {
        assert_eq!(parse_sheet_date("2024/5/1", 2000), Some(d(2024, 5, 1)));
        assert_eq!(parse_sheet_date("2024-05-01", 2000), Some(d(2024, 5, 1)));
        assert_eq!(parse_sheet_date("2024.12.31", 2000), Some(d(2024, 12, 31)));
    }

    #[test]
    fn test_month_day_uses_assumed_year() {
        assert_eq!(parse_sheet_date("5/1", 2024), Some(d(2024, 5, 1)));
    }

    #[test]
    fn test_time_suffix_ignored() {
        assert_eq!(
            parse_sheet_date("2024/5/1 13:45:00", 2000),
            Some(d(2024, 5, 1))
        );
    }

    #[test]
    fn test_garbage_is_none() {
        assert_eq!(parse_sheet_date("", 2024), None);
        assert_eq!(parse_sheet_date("next tuesday", 2024), None);
        assert_eq!(parse_sheet_date("2024/13/1", 2024), None);
        assert_eq!(parse_sheet_date("5-1", 2024), None);
    }
}
