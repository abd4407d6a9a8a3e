//! Subsequent-round evaluation: Stage 1's increase logic, gated on the
//! ad having produced at least one new conversion since its last
//! snapshot. Keeps the intraday increase check monotonic and
//! non-repeating.

use common::{Appeal, EligibleAd};

use crate::stage1::IncreaseEvaluator;
use crate::types::{DayMetrics, IncreaseDecision};

#[derive(Debug, Clone)]
pub struct FollowupEvaluator {
    inner: IncreaseEvaluator,
}

impl FollowupEvaluator {
    pub fn new(inner: IncreaseEvaluator) -> Self {
        Self { inner }
    }

    /// `baseline` is the conversion count recorded by the ad's most
    /// recent snapshot today; no snapshot means a baseline of zero.
    pub fn evaluate(
        &self,
        ad: &EligibleAd,
        appeal: &Appeal,
        today: DayMetrics,
        baseline: Option<u32>,
        budget_cap: Option<i64>,
    ) -> IncreaseDecision {
        let baseline = baseline.unwrap_or(0);
        if today.conversions <= baseline {
            // The skip still carries today's real count: it becomes the
            // baseline the next round compares against.
            let mut d = IncreaseDecision::skip(
                &ad.ad_id,
                ad.daily_budget,
                format!(
                    "no new conversions since last check ({} <= {})",
                    today.conversions, baseline
                ),
            );
            d.today_conversions = today.conversions;
            d.today_spend = today.spend;
            d.today_cpa =
                (today.conversions > 0).then(|| today.spend as f64 / today.conversions as f64);
            return d;
        }
        self.inner.evaluate(ad, appeal, today, budget_cap)
    }
}
