//! Metrics aggregation over platform report rows.

use std::collections::HashMap;

use common::ReportRow;

/// Per-ad totals for a report window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AdTotals {
    pub spend: i64,
    pub impressions: i64,
    pub conversions: u32,
}

/// Merge report rows — regular and alternate delivery mode — into
/// per-ad totals.
pub fn aggregate(rows: &[ReportRow]) -> HashMap<String, AdTotals> {
    let mut totals: HashMap<String, AdTotals> = HashMap::new();
    for row in rows {
        let entry = totals.entry(row.ad_id.clone()).or_default();
        entry.spend += row.spend;
        entry.impressions += row.impressions;
        entry.conversions += row.conversions;
    }
    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use common::DeliveryMode;

    fn row(ad: &str, mode: DeliveryMode, spend: i64, imps: i64, conv: u32) -> ReportRow {
        ReportRow {
            ad_id: ad.into(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            spend,
            impressions: imps,
            conversions: conv,
            delivery_mode: mode,
        }
    }

    #[test]
    fn test_merges_delivery_modes() {
        let rows = vec![
            row("a1", DeliveryMode::Regular, 1000, 500, 2),
            row("a1", DeliveryMode::Alternate, 300, 120, 1),
            row("a2", DeliveryMode::Regular, 50, 10, 0),
        ];
        let totals = aggregate(&rows);
        assert_eq!(
            totals["a1"],
            AdTotals {
                spend: 1300,
                impressions: 620,
                conversions: 3
            }
        );
        assert_eq!(
            totals["a2"],
            AdTotals {
                spend: 50,
                impressions: 10,
                conversions: 0
            }
        );
    }

    #[test]
    fn test_empty_rows() {
        assert!(aggregate(&[]).is_empty());
    }
}
