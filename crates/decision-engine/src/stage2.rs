//! Stage 2 — trailing-7-day pause / budget-decrease evaluation.
//!
//! Channel-specific CPA/CPO gates first; the individual-reservation
//! gate runs only on a CONTINUE and can weaken to a 20% decrease but
//! never override a pause.

use common::{Appeal, ChannelKind, EligibleAd};
use serde::Deserialize;

use crate::types::{PauseAction, PauseDecision, WindowMetrics};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Stage2Config {
    /// Below this many trailing impressions an under-spending ad is
    /// treated as too new to judge.
    pub min_impressions: i64,
    pub decrease_multiplier: f64,
    pub platform_min_budget: i64,
}

impl Default for Stage2Config {
    fn default() -> Self {
        Self {
            min_impressions: 1_000,
            decrease_multiplier: 0.8,
            platform_min_budget: 1_000,
        }
    }
}

/// Evaluates the trailing-window pause rules for one ad.
#[derive(Debug, Clone)]
pub struct PauseEvaluator {
    config: Stage2Config,
}

impl PauseEvaluator {
    pub fn new(config: Stage2Config) -> Self {
        Self { config }
    }

    fn base(&self, ad: &EligibleAd, w: &WindowMetrics) -> PauseDecision {
        let cpa = (w.conversions > 0).then(|| w.spend as f64 / w.conversions as f64);
        let front_cpo = (w.front_sales > 0).then(|| w.spend as f64 / w.front_sales as f64);
        PauseDecision {
            ad_id: ad.ad_id.clone(),
            action: PauseAction::Continue,
            reason: String::new(),
            last7d_spend: w.spend,
            last7d_impressions: w.impressions,
            last7d_conversions: w.conversions,
            last7d_front_sales: w.front_sales,
            last7d_cpa: cpa,
            last7d_front_cpo: front_cpo,
            last7d_reservation_count: None,
            last7d_reservation_cpo: None,
            new_budget_after_decrease: None,
        }
    }

    fn with(mut d: PauseDecision, action: PauseAction, reason: String) -> PauseDecision {
        d.action = action;
        d.reason = reason;
        d
    }

    /// Apply the channel-specific pause rules over the trailing window.
    pub fn evaluate(&self, ad: &EligibleAd, appeal: &Appeal, w: &WindowMetrics) -> PauseDecision {
        let d = self.base(ad, w);

        // New-creative protection: too little spend and delivery to judge.
        if w.spend < appeal.allowable_cpa && w.impressions < self.config.min_impressions {
            return Self::with(
                d,
                PauseAction::SkipNewCreative,
                format!(
                    "too new to judge: spend {} below allowable CPA {} and impressions {} below {}",
                    w.spend, appeal.allowable_cpa, w.impressions, self.config.min_impressions
                ),
            );
        }

        match appeal.kind {
            ChannelKind::FrontCpo => self.evaluate_front_cpo(appeal, w, d),
            ChannelKind::CpaOnly => self.evaluate_cpa_only(appeal, w, d),
        }
    }

    fn evaluate_front_cpo(
        &self,
        appeal: &Appeal,
        w: &WindowMetrics,
        d: PauseDecision,
    ) -> PauseDecision {
        if w.front_sales >= 1 {
            let front_cpo = w.spend as f64 / w.front_sales as f64;
            if front_cpo > appeal.allowable_front_cpo as f64 {
                return Self::with(
                    d,
                    PauseAction::Pause,
                    format!(
                        "front CPO {:.0} exceeds allowable {}",
                        front_cpo, appeal.allowable_front_cpo
                    ),
                );
            }
            return Self::with(
                d,
                PauseAction::Continue,
                format!(
                    "front CPO {:.0} within allowable {}",
                    front_cpo, appeal.allowable_front_cpo
                ),
            );
        }

        if w.conversions == 0 {
            return Self::with(
                d,
                PauseAction::Pause,
                "no conversions and no front sales in the window".into(),
            );
        }
        if w.spend >= appeal.allowable_front_cpo {
            return Self::with(
                d,
                PauseAction::Pause,
                format!(
                    "spend {} reached allowable front CPO {} with no front sale",
                    w.spend, appeal.allowable_front_cpo
                ),
            );
        }

        let cpa = w.spend as f64 / w.conversions as f64;
        if cpa > appeal.allowable_cpa as f64 {
            return Self::with(
                d,
                PauseAction::Pause,
                format!("CPA {:.0} exceeds allowable {}", cpa, appeal.allowable_cpa),
            );
        }
        Self::with(
            d,
            PauseAction::Continue,
            format!("CPA {:.0} within allowable {}", cpa, appeal.allowable_cpa),
        )
    }

    fn evaluate_cpa_only(
        &self,
        appeal: &Appeal,
        w: &WindowMetrics,
        d: PauseDecision,
    ) -> PauseDecision {
        if w.conversions == 0 {
            return Self::with(d, PauseAction::Pause, "no conversions in the window".into());
        }
        let cpa = w.spend as f64 / w.conversions as f64;
        if cpa > appeal.allowable_cpa as f64 {
            return Self::with(
                d,
                PauseAction::Pause,
                format!("CPA {:.0} exceeds allowable {}", cpa, appeal.allowable_cpa),
            );
        }
        Self::with(
            d,
            PauseAction::Continue,
            format!("CPA {:.0} within allowable {}", cpa, appeal.allowable_cpa),
        )
    }

    /// The per-creative reservation gate. Runs only on a CONTINUE —
    /// any other action is returned untouched. Strictly weaker than
    /// PAUSE: its worst outcome when reservations exist is a 20%
    /// budget decrease.
    pub fn apply_reservation_gate(
        &self,
        decision: PauseDecision,
        current_budget: i64,
        allowable_reservation_cpo: i64,
        reservation_count: u32,
    ) -> PauseDecision {
        if decision.action != PauseAction::Continue {
            return decision;
        }

        let mut d = decision;
        d.last7d_reservation_count = Some(reservation_count);
        let spend = d.last7d_spend;

        if reservation_count == 0 {
            // Inclusive on the pause side: spend == allowable pauses.
            if spend >= allowable_reservation_cpo {
                return Self::with(
                    d,
                    PauseAction::Pause,
                    format!(
                        "no reservations and spend {} reached allowable reservation CPO {}",
                        spend, allowable_reservation_cpo
                    ),
                );
            }
            return Self::with(
                d,
                PauseAction::Continue,
                format!(
                    "no reservations yet, spend {} below allowable reservation CPO {}",
                    spend, allowable_reservation_cpo
                ),
            );
        }

        let cpo = spend as f64 / reservation_count as f64;
        d.last7d_reservation_cpo = Some(cpo);
        if cpo > allowable_reservation_cpo as f64 {
            let new_budget = ((current_budget as f64 * self.config.decrease_multiplier).floor()
                as i64)
                .max(self.config.platform_min_budget);
            d.new_budget_after_decrease = Some(new_budget);
            return Self::with(
                d,
                PauseAction::Decrease20Pct,
                format!(
                    "reservation CPO {:.0} exceeds allowable {}, decreasing budget to {}",
                    cpo, allowable_reservation_cpo, new_budget
                ),
            );
        }
        // Inclusive on the continue side: cpo == allowable continues.
        Self::with(
            d,
            PauseAction::Continue,
            format!(
                "reservation CPO {:.0} within allowable {}",
                cpo, allowable_reservation_cpo
            ),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage1::tests::{test_ad, test_appeal};

    fn evaluator() -> PauseEvaluator {
        PauseEvaluator::new(Stage2Config::default())
    }

    fn window(spend: i64, impressions: i64, conversions: u32, front_sales: u32) -> WindowMetrics {
        WindowMetrics {
            spend,
            impressions,
            conversions,
            front_sales,
        }
    }

    fn cpa_only_appeal() -> Appeal {
        let mut appeal = test_appeal();
        appeal.channel = "seminar".into();
        appeal.kind = ChannelKind::CpaOnly;
        appeal.allowable_reservation_cpo = None;
        appeal
    }

    #[test]
    fn test_new_creative_protection_short_circuits() {
        // spend 2000 < allowable CPA 8000, impressions 500 < 1000.
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), &window(2_000, 500, 0, 0));
        assert_eq!(d.action, PauseAction::SkipNewCreative);
    }

    #[test]
    fn test_enough_impressions_disables_protection() {
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), &window(2_000, 5_000, 0, 0));
        // No conversions, no front sales: pause, not new-creative skip.
        assert_eq!(d.action, PauseAction::Pause);
    }

    #[test]
    fn test_front_cpo_over_allowable_pauses() {
        // 14000 / 2 = 7000 > allowable 6000.
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), &window(14_000, 9_000, 3, 2));
        assert_eq!(d.action, PauseAction::Pause);
        assert_eq!(d.last7d_front_cpo, Some(7_000.0));
    }

    #[test]
    fn test_front_cpo_within_allowable_continues() {
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), &window(10_000, 9_000, 3, 2));
        assert_eq!(d.action, PauseAction::Continue);
    }

    #[test]
    fn test_no_front_sales_spend_over_bar_pauses() {
        // Conversions exist but spend 9000 >= allowable front CPO 6000.
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), &window(9_000, 9_000, 2, 0));
        assert_eq!(d.action, PauseAction::Pause);
    }

    #[test]
    fn test_no_front_sales_falls_back_to_cpa() {
        // spend 5000 < front bar 6000; CPA 5000/2=2500 <= 8000: continue.
        let d = evaluator().evaluate(&test_ad(5_000), &test_appeal(), &window(5_000, 9_000, 2, 0));
        assert_eq!(d.action, PauseAction::Continue);

        // CPA 5000/1=5000 fine; raise spend so CPA breaks the bar but
        // keep it under the front bar: impossible with these thresholds
        // (allowable front CPO < allowable CPA), so use 1 conversion at
        // spend just under the front bar with a lower allowable CPA.
        let mut appeal = test_appeal();
        appeal.allowable_cpa = 4_000;
        let d = evaluator().evaluate(&test_ad(5_000), &appeal, &window(5_000, 9_000, 1, 0));
        assert_eq!(d.action, PauseAction::Pause);
    }

    #[test]
    fn test_cpa_only_channel_rules() {
        let ev = evaluator();
        let appeal = cpa_only_appeal();
        // Zero conversions with enough delivery: pause.
        let d = ev.evaluate(&test_ad(5_000), &appeal, &window(9_000, 9_000, 0, 0));
        assert_eq!(d.action, PauseAction::Pause);
        // CPA 9000 > 8000: pause.
        let d = ev.evaluate(&test_ad(5_000), &appeal, &window(9_000, 9_000, 1, 0));
        assert_eq!(d.action, PauseAction::Pause);
        // CPA 4500 <= 8000: continue.
        let d = ev.evaluate(&test_ad(5_000), &appeal, &window(9_000, 9_000, 2, 0));
        assert_eq!(d.action, PauseAction::Continue);
    }

    #[test]
    fn test_reservation_gate_never_overrides_pause() {
        let ev = evaluator();
        let paused = ev.evaluate(&test_ad(5_000), &test_appeal(), &window(14_000, 9_000, 3, 2));
        assert_eq!(paused.action, PauseAction::Pause);
        let after = ev.apply_reservation_gate(paused, 5_000, 10_000, 0);
        assert_eq!(after.action, PauseAction::Pause);
        assert!(after.last7d_reservation_count.is_none());
    }

    #[test]
    fn test_reservation_zero_spend_at_allowable_pauses() {
        // Boundary inclusive on the pause side: spend == allowable.
        let ev = evaluator();
        let base = ev.evaluate(&test_ad(5_000), &test_appeal(), &window(10_000, 9_000, 3, 2));
        assert_eq!(base.action, PauseAction::Continue);
        let after = ev.apply_reservation_gate(base, 5_000, 10_000, 0);
        assert_eq!(after.action, PauseAction::Pause);
    }

    #[test]
    fn test_reservation_zero_spend_below_allowable_continues() {
        let ev = evaluator();
        let base = ev.evaluate(&test_ad(5_000), &test_appeal(), &window(9_999, 9_000, 3, 2));
        assert_eq!(base.action, PauseAction::Continue);
        let after = ev.apply_reservation_gate(base, 5_000, 10_000, 0);
        assert_eq!(after.action, PauseAction::Continue);
        assert_eq!(after.last7d_reservation_count, Some(0));
    }

    #[test]
    fn test_reservation_cpo_at_allowable_continues() {
        // Boundary inclusive on the continue side: cpo == allowable.
        let ev = evaluator();
        let base = ev.evaluate(&test_ad(5_000), &test_appeal(), &window(10_000, 9_000, 3, 2));
        let after = ev.apply_reservation_gate(base, 5_000, 10_000, 1);
        assert_eq!(after.action, PauseAction::Continue);
        assert_eq!(after.last7d_reservation_cpo, Some(10_000.0));
    }

    #[test]
    fn test_reservation_cpo_over_allowable_decreases() {
        let ev = evaluator();
        let base = ev.evaluate(&test_ad(5_555), &test_appeal(), &window(11_000, 9_000, 3, 2));
        assert_eq!(base.action, PauseAction::Continue);
        let after = ev.apply_reservation_gate(base, 5_555, 10_000, 1);
        assert_eq!(after.action, PauseAction::Decrease20Pct);
        // floor(5555 * 0.8) = 4444, above the platform minimum.
        assert_eq!(after.new_budget_after_decrease, Some(4_444));
    }

    #[test]
    fn test_decrease_floors_at_platform_minimum() {
        let ev = evaluator();
        let base = ev.evaluate(&test_ad(1_100), &test_appeal(), &window(11_000, 9_000, 3, 2));
        assert_eq!(base.action, PauseAction::Continue);
        let after = ev.apply_reservation_gate(base, 1_100, 10_000, 1);
        assert_eq!(after.action, PauseAction::Decrease20Pct);
        // floor(1100 * 0.8) = 880 < platform min 1000.
        assert_eq!(after.new_budget_after_decrease, Some(1_000));
    }
}
