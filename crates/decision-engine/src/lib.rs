//! Budget decision engine.
//!
//! Three evaluators over trailing realized metrics: the same-day
//! tiered increase (Stage 1), the trailing-7-day pause/decrease
//! (Stage 2), and the subsequent-round delta check. All evaluators are
//! pure; the orchestrator fetches inputs and applies side effects.

pub mod followup;
pub mod metrics;
pub mod stage1;
pub mod stage2;
pub mod types;

pub use followup::FollowupEvaluator;
pub use metrics::{aggregate, AdTotals};
pub use stage1::{IncreaseEvaluator, TierConfig};
pub use stage2::{PauseEvaluator, Stage2Config};
pub use types::{
    DayMetrics, Decision, IncreaseAction, IncreaseDecision, PauseAction, PauseDecision,
    WindowMetrics,
};
