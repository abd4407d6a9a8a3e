//! Decision records.
//!
//! A closed tagged union with one variant per decision shape, carrying
//! enough raw metrics to reconstruct each decision from its inputs.

use serde::{Deserialize, Serialize};

/// Outcome of Stage 1 or the subsequent-round evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IncreaseAction {
    Increase,
    Continue,
    Skip,
}

/// Outcome of Stage 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PauseAction {
    Pause,
    Continue,
    SkipNewCreative,
    #[serde(rename = "DECREASE_20PCT")]
    Decrease20Pct,
}

/// Same-day spend and conversions for one ad.
#[derive(Debug, Clone, Copy, Default)]
pub struct DayMetrics {
    pub spend: i64,
    pub conversions: u32,
}

/// Trailing-window totals for one ad.
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowMetrics {
    pub spend: i64,
    pub impressions: i64,
    pub conversions: u32,
    pub front_sales: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncreaseDecision {
    pub ad_id: String,
    pub action: IncreaseAction,
    pub reason: String,
    pub current_budget: i64,
    pub today_conversions: u32,
    pub today_spend: i64,
    pub today_cpa: Option<f64>,
    pub new_budget: Option<i64>,
}

impl IncreaseDecision {
    /// A SKIP with no metrics attached, used when evaluation could not
    /// run at all (unparsable name, upstream failure).
    pub fn skip(ad_id: &str, current_budget: i64, reason: impl Into<String>) -> Self {
        Self {
            ad_id: ad_id.to_string(),
            action: IncreaseAction::Skip,
            reason: reason.into(),
            current_budget,
            today_conversions: 0,
            today_spend: 0,
            today_cpa: None,
            new_budget: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseDecision {
    pub ad_id: String,
    pub action: PauseAction,
    pub reason: String,
    pub last7d_spend: i64,
    pub last7d_impressions: i64,
    pub last7d_conversions: u32,
    pub last7d_front_sales: u32,
    pub last7d_cpa: Option<f64>,
    pub last7d_front_cpo: Option<f64>,
    pub last7d_reservation_count: Option<u32>,
    pub last7d_reservation_cpo: Option<f64>,
    pub new_budget_after_decrease: Option<i64>,
}

/// Every decision the engine can emit. Consumption sites match
/// exhaustively so a new action cannot fall through silently.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Decision {
    Increase(IncreaseDecision),
    Pause(PauseDecision),
}

impl Decision {
    pub fn ad_id(&self) -> &str {
        match self {
            Self::Increase(d) => &d.ad_id,
            Self::Pause(d) => &d.ad_id,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::Increase(d) => &d.reason,
            Self::Pause(d) => &d.reason,
        }
    }

    /// Stable label recorded in snapshots and the audit log.
    pub fn action_label(&self) -> &'static str {
        match self {
            Self::Increase(d) => match d.action {
                IncreaseAction::Increase => "INCREASE",
                IncreaseAction::Continue => "CONTINUE",
                IncreaseAction::Skip => "SKIP",
            },
            Self::Pause(d) => match d.action {
                PauseAction::Pause => "PAUSE",
                PauseAction::Continue => "CONTINUE",
                PauseAction::SkipNewCreative => "SKIP_NEW_CREATIVE",
                PauseAction::Decrease20Pct => "DECREASE_20PCT",
            },
        }
    }
}
