//! Core domain types shared across the engine crates.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// The four fields encoded in a well-formed ad display name:
/// `YYYYMMDD_creator_creative_lp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedAdName {
    pub date: NaiveDate,
    pub creator: String,
    pub creative_name: String,
    pub lp_name: String,
}

impl ParsedAdName {
    /// Parse a display name. Returns `None` for anything that does not
    /// follow the naming convention; callers treat those ads as
    /// unevaluable rather than erroring.
    pub fn parse(display_name: &str) -> Option<Self> {
        let mut parts = display_name.trim().splitn(4, '_');
        let date_raw = parts.next()?;
        let creator = parts.next()?;
        let creative_name = parts.next()?;
        let lp_name = parts.next()?;

        if date_raw.len() != 8 || !date_raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let date = NaiveDate::parse_from_str(date_raw, "%Y%m%d").ok()?;

        if creator.is_empty() || creative_name.is_empty() || lp_name.is_empty() {
            return None;
        }

        Some(Self {
            date,
            creator: creator.to_string(),
            creative_name: creative_name.to_string(),
            lp_name: lp_name.to_string(),
        })
    }
}

/// Raw ad payload as returned by the platform API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdRecord {
    pub ad_id: String,
    pub name: String,
    pub ad_group_id: String,
    pub campaign_id: String,
    /// Effective daily budget: the campaign's when pooled, otherwise
    /// the ad group's. Derived server-side.
    pub daily_budget: i64,
    /// True when the budget lives at the campaign level.
    #[serde(default)]
    pub pooled_budget: bool,
}

/// A currently-enabled ad, validated and enriched with its parsed name.
/// Recomputed fresh every run; never persisted.
#[derive(Debug, Clone)]
pub struct EligibleAd {
    pub ad_id: String,
    pub display_name: String,
    pub ad_group_id: String,
    pub campaign_id: String,
    pub daily_budget: i64,
    pub pooled_budget: bool,
    pub parsed_name: Option<ParsedAdName>,
}

impl EligibleAd {
    /// Validate a raw record at the boundary. Malformed records (empty
    /// ids, negative budget) are rejected rather than carried into the
    /// decision logic.
    pub fn from_record(record: AdRecord) -> Result<Self, crate::Error> {
        if record.ad_id.is_empty() || record.ad_group_id.is_empty() || record.campaign_id.is_empty()
        {
            return Err(crate::Error::Parse(format!(
                "ad record with empty identifier: {:?}",
                record
            )));
        }
        if record.daily_budget < 0 {
            return Err(crate::Error::Parse(format!(
                "ad {} has negative daily budget {}",
                record.ad_id, record.daily_budget
            )));
        }
        let parsed_name = ParsedAdName::parse(&record.name);
        Ok(Self {
            ad_id: record.ad_id,
            display_name: record.name,
            ad_group_id: record.ad_group_id,
            campaign_id: record.campaign_id,
            daily_budget: record.daily_budget,
            pooled_budget: record.pooled_budget,
            parsed_name,
        })
    }
}

/// Where a report row's deliveries were counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    Regular,
    Alternate,
}

/// One per-ad, per-day row from the platform's performance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRow {
    pub ad_id: String,
    pub date: NaiveDate,
    pub spend: i64,
    pub impressions: i64,
    pub conversions: u32,
    pub delivery_mode: DeliveryMode,
}

/// Marketing funnel type, resolved once at config load. Evaluators
/// dispatch on this enum, never on the channel name string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Channels with a front-funnel sale metric (front-CPO gate first).
    FrontCpo,
    /// CPA-only channels, e.g. the seminar funnel.
    CpaOnly,
}

/// A spreadsheet tab location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLocation {
    pub document_id: String,
    pub tab: String,
}

/// Per-channel thresholds and sheet locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appeal {
    pub channel: String,
    pub kind: ChannelKind,
    pub target_cpa: i64,
    pub allowable_cpa: i64,
    pub target_front_cpo: i64,
    pub allowable_front_cpo: i64,
    /// When unset, the Stage 2 reservation gate is skipped entirely.
    pub allowable_reservation_cpo: Option<i64>,
    pub conversion_sheet: SheetLocation,
    pub front_sale_sheet: SheetLocation,
}

impl Appeal {
    /// The registration path a conversion row must carry to count for
    /// an ad landing on `lp_name`.
    pub fn registration_path(&self, lp_name: &str) -> String {
        format!("{}/{}", self.channel, lp_name)
    }

    /// The per-creative path used for individual-reservation counting.
    pub fn reservation_path(&self, lp_name: &str, creative_name: &str) -> String {
        format!("{}/{}/{}", self.channel, lp_name, creative_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_well_formed_name() {
        let parsed = ParsedAdName::parse("20240501_tanaka_springA_lp03").unwrap();
        assert_eq!(parsed.date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap());
        assert_eq!(parsed.creator, "tanaka");
        assert_eq!(parsed.creative_name, "springA");
        assert_eq!(parsed.lp_name, "lp03");
    }

    #[test]
    fn test_parse_rejects_bad_date() {
        assert!(ParsedAdName::parse("2024051_tanaka_a_b").is_none());
        assert!(ParsedAdName::parse("20241301_tanaka_a_b").is_none());
        assert!(ParsedAdName::parse("notadate_tanaka_a_b").is_none());
    }

    #[test]
    fn test_parse_rejects_missing_fields() {
        assert!(ParsedAdName::parse("20240501_tanaka_a").is_none());
        assert!(ParsedAdName::parse("20240501__a_b").is_none());
        assert!(ParsedAdName::parse("").is_none());
    }

    #[test]
    fn test_lp_name_may_contain_underscores() {
        // splitn(4) keeps the remainder intact.
        let parsed = ParsedAdName::parse("20240501_sato_creativeB_lp_spring_03").unwrap();
        assert_eq!(parsed.lp_name, "lp_spring_03");
    }

    #[test]
    fn test_from_record_rejects_empty_ids() {
        let record = AdRecord {
            ad_id: String::new(),
            name: "x".into(),
            ad_group_id: "g1".into(),
            campaign_id: "c1".into(),
            daily_budget: 1000,
            pooled_budget: false,
        };
        assert!(EligibleAd::from_record(record).is_err());
    }

    #[test]
    fn test_from_record_keeps_unparsable_name() {
        let record = AdRecord {
            ad_id: "a1".into(),
            name: "legacy ad".into(),
            ad_group_id: "g1".into(),
            campaign_id: "c1".into(),
            daily_budget: 1000,
            pooled_budget: true,
        };
        let ad = EligibleAd::from_record(record).unwrap();
        assert!(ad.parsed_name.is_none());
        assert!(ad.pooled_budget);
    }
}
