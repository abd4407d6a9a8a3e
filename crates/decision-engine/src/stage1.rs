//! Stage 1 — same-day CPA-based tiered budget increase.

use common::{Appeal, EligibleAd};
use serde::Deserialize;

use crate::types::{DayMetrics, IncreaseAction, IncreaseDecision};

/// Budget-tier ceilings, per-tier minimum conversions, and the
/// platform's absolute budget bounds.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub low_ceiling: i64,
    pub mid_ceiling: i64,
    pub high_ceiling: i64,
    pub mid_min_conversions: u32,
    pub high_min_conversions: u32,
    pub increase_multiplier: f64,
    pub platform_min_budget: i64,
    pub platform_max_budget: i64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            low_ceiling: 10_000,
            mid_ceiling: 30_000,
            high_ceiling: 50_000,
            mid_min_conversions: 2,
            high_min_conversions: 3,
            increase_multiplier: 1.2,
            platform_min_budget: 1_000,
            platform_max_budget: 1_000_000,
        }
    }
}

/// Evaluates the same-day increase rules for one ad.
#[derive(Debug, Clone)]
pub struct IncreaseEvaluator {
    tiers: TierConfig,
}

impl IncreaseEvaluator {
    pub fn new(tiers: TierConfig) -> Self {
        Self { tiers }
    }

    fn decide(
        &self,
        ad: &EligibleAd,
        today: DayMetrics,
        cpa: Option<f64>,
        action: IncreaseAction,
        reason: String,
        new_budget: Option<i64>,
    ) -> IncreaseDecision {
        IncreaseDecision {
            ad_id: ad.ad_id.clone(),
            action,
            reason,
            current_budget: ad.daily_budget,
            today_conversions: today.conversions,
            today_spend: today.spend,
            today_cpa: cpa,
            new_budget,
        }
    }

    /// Apply the tiered increase rules. `budget_cap` is the
    /// advertiser's configured per-ad ceiling, when any.
    pub fn evaluate(
        &self,
        ad: &EligibleAd,
        appeal: &Appeal,
        today: DayMetrics,
        budget_cap: Option<i64>,
    ) -> IncreaseDecision {
        if today.conversions == 0 {
            return self.decide(
                ad,
                today,
                None,
                IncreaseAction::Skip,
                "no conversions today".into(),
                None,
            );
        }

        let cpa = today.spend as f64 / today.conversions as f64;
        if cpa > appeal.target_cpa as f64 {
            return self.decide(
                ad,
                today,
                Some(cpa),
                IncreaseAction::Continue,
                format!(
                    "today CPA {:.0} exceeds target {}",
                    cpa, appeal.target_cpa
                ),
                None,
            );
        }

        let t = &self.tiers;
        let budget = ad.daily_budget;
        let gate_failed = if budget < t.low_ceiling {
            None
        } else if budget <= t.mid_ceiling {
            (today.conversions < t.mid_min_conversions).then(|| {
                format!(
                    "mid tier needs {} conversions, have {}",
                    t.mid_min_conversions, today.conversions
                )
            })
        } else if budget <= t.high_ceiling {
            (today.conversions < t.high_min_conversions).then(|| {
                format!(
                    "high tier needs {} conversions, have {}",
                    t.high_min_conversions, today.conversions
                )
            })
        } else {
            Some(format!(
                "budget {} above hard cap tier {}",
                budget, t.high_ceiling
            ))
        };
        if let Some(reason) = gate_failed {
            return self.decide(ad, today, Some(cpa), IncreaseAction::Continue, reason, None);
        }

        let mut new_budget = (budget as f64 * t.increase_multiplier).round() as i64;
        if let Some(cap) = budget_cap {
            if budget >= cap {
                return self.decide(
                    ad,
                    today,
                    Some(cpa),
                    IncreaseAction::Continue,
                    format!("budget {} already at configured cap {}", budget, cap),
                    None,
                );
            }
            new_budget = new_budget.min(cap);
        }
        new_budget = new_budget.clamp(t.platform_min_budget, t.platform_max_budget);

        if new_budget <= budget {
            return self.decide(
                ad,
                today,
                Some(cpa),
                IncreaseAction::Continue,
                format!("increase would not raise budget past {}", budget),
                None,
            );
        }

        self.decide(
            ad,
            today,
            Some(cpa),
            IncreaseAction::Increase,
            format!(
                "CPA {:.0} within target {} at budget {}, raising to {}",
                cpa, appeal.target_cpa, budget, new_budget
            ),
            Some(new_budget),
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use common::{ChannelKind, SheetLocation};

    pub(crate) fn test_appeal() -> Appeal {
        Appeal {
            channel: "videocall".into(),
            kind: ChannelKind::FrontCpo,
            target_cpa: 5_000,
            allowable_cpa: 8_000,
            target_front_cpo: 3_000,
            allowable_front_cpo: 6_000,
            allowable_reservation_cpo: Some(10_000),
            conversion_sheet: SheetLocation {
                document_id: "doc-conv".into(),
                tab: "conversions".into(),
            },
            front_sale_sheet: SheetLocation {
                document_id: "doc-front".into(),
                tab: "front".into(),
            },
        }
    }

    pub(crate) fn test_ad(budget: i64) -> EligibleAd {
        let record = common::AdRecord {
            ad_id: "ad-1".into(),
            name: "20240501_tanaka_springA_lp03".into(),
            ad_group_id: "grp-1".into(),
            campaign_id: "cmp-1".into(),
            daily_budget: budget,
            pooled_budget: false,
        };
        EligibleAd::from_record(record).unwrap()
    }

    fn evaluator() -> IncreaseEvaluator {
        IncreaseEvaluator::new(TierConfig::default())
    }

    fn day(spend: i64, conversions: u32) -> DayMetrics {
        DayMetrics { spend, conversions }
    }

    #[test]
    fn test_zero_conversions_skips() {
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), day(3_000, 0), None);
        assert_eq!(d.action, IncreaseAction::Skip);
        assert!(d.today_cpa.is_none());
    }

    #[test]
    fn test_cpa_over_target_continues() {
        // 6000 / 1 = 6000 > target 5000
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), day(6_000, 1), None);
        assert_eq!(d.action, IncreaseAction::Continue);
    }

    #[test]
    fn test_low_tier_always_increases() {
        // Budget below the low ceiling with good CPA: unconditional increase.
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), day(4_000, 1), None);
        assert_eq!(d.action, IncreaseAction::Increase);
        assert_eq!(d.new_budget, Some(6_000));
    }

    #[test]
    fn test_mid_tier_requires_minimum_conversions() {
        let ev = evaluator();
        let appeal = test_appeal();
        let d = ev.evaluate(&test_ad(20_000), &appeal, day(4_000, 1), None);
        assert_eq!(d.action, IncreaseAction::Continue);

        let d = ev.evaluate(&test_ad(20_000), &appeal, day(4_000, 2), None);
        assert_eq!(d.action, IncreaseAction::Increase);
        assert_eq!(d.new_budget, Some(24_000));
    }

    #[test]
    fn test_high_tier_requires_more_conversions() {
        let ev = evaluator();
        let appeal = test_appeal();
        let d = ev.evaluate(&test_ad(40_000), &appeal, day(9_000, 2), None);
        assert_eq!(d.action, IncreaseAction::Continue);

        let d = ev.evaluate(&test_ad(40_000), &appeal, day(9_000, 3), None);
        assert_eq!(d.action, IncreaseAction::Increase);
    }

    #[test]
    fn test_above_high_tier_never_increases() {
        let d = evaluator().evaluate(&test_ad(60_000), &test_appeal(), day(4_000, 10), None);
        assert_eq!(d.action, IncreaseAction::Continue);
    }

    #[test]
    fn test_configured_cap_blocks_increase() {
        // At or above the cap: never INCREASE regardless of CPA.
        let d = evaluator().evaluate(&test_ad(8_000), &test_appeal(), day(1_000, 5), Some(8_000));
        assert_eq!(d.action, IncreaseAction::Continue);

        let d = evaluator().evaluate(&test_ad(9_000), &test_appeal(), day(1_000, 5), Some(8_000));
        assert_eq!(d.action, IncreaseAction::Continue);
    }

    #[test]
    fn test_increase_clamped_to_cap() {
        // 5000 * 1.2 = 6000, cap 5500.
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), day(1_000, 1), Some(5_500));
        assert_eq!(d.action, IncreaseAction::Increase);
        assert_eq!(d.new_budget, Some(5_500));
    }

    #[test]
    fn test_increase_clamped_to_platform_max() {
        let mut tiers = TierConfig::default();
        tiers.high_ceiling = 2_000_000;
        tiers.mid_ceiling = 1_000_000;
        tiers.platform_max_budget = 1_000_000;
        let ev = IncreaseEvaluator::new(tiers);
        let d = ev.evaluate(&test_ad(1_500_000), &test_appeal(), day(1_000, 10), None);
        // 1.8M rounds above the platform max and cannot raise the budget.
        assert_eq!(d.action, IncreaseAction::Continue);
    }
}
