//! Optimization orchestrator.
//!
//! Runs the hourly cycle per advertiser: decides first round vs
//! subsequent round, feeds the evaluators with counted conversions and
//! aggregated report metrics, applies mutations (unless dry-run),
//! writes snapshots, and purges old ones. Per-ad failures downgrade to
//! a skip decision and never abort the batch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use counter::RegistrationCounter;
use decision_engine::{
    aggregate, AdTotals, DayMetrics, Decision, FollowupEvaluator, IncreaseAction,
    IncreaseDecision, IncreaseEvaluator, PauseAction, PauseDecision, PauseEvaluator,
    WindowMetrics,
};
use common::{Appeal, ChannelKind, EligibleAd};
use platform_client::PlatformClient;
use sheets_client::{RetryPolicy, SheetCache, SheetsClient};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{AdvertiserConfig, AppConfig};
use crate::lock::JobLock;
use crate::store::{AuditEntry, SnapshotRow, SnapshotStore};

const JOB_NAME: &str = "hourly-budget-optimization";

/// The one platform write an ad may receive in a run.
#[derive(Debug, Clone, PartialEq)]
enum PlannedMutation {
    SetBudget {
        new_budget: i64,
        action: &'static str,
        reason: String,
        source: &'static str,
    },
    PauseAd {
        reason: String,
    },
}

/// Collapse both stage decisions into the recorded decision and at most
/// one mutation. A terminal Stage 2 action preempts a Stage 1 increase,
/// so an ad is never increased and then paused or decreased from a
/// stale budget in the same run.
fn plan_ad_update(
    increase: IncreaseDecision,
    pause: Option<PauseDecision>,
    increase_source: &'static str,
) -> (Decision, Option<PlannedMutation>) {
    match pause {
        Some(p) if p.action == PauseAction::Pause => {
            let mutation = PlannedMutation::PauseAd {
                reason: p.reason.clone(),
            };
            (Decision::Pause(p), Some(mutation))
        }
        Some(p) if p.action == PauseAction::Decrease20Pct => {
            let mutation = p.new_budget_after_decrease.map(|new_budget| {
                PlannedMutation::SetBudget {
                    new_budget,
                    action: "DECREASE_20PCT",
                    reason: p.reason.clone(),
                    source: "stage2",
                }
            });
            (Decision::Pause(p), mutation)
        }
        _ => {
            let mutation = match (increase.action, increase.new_budget) {
                (IncreaseAction::Increase, Some(new_budget)) => {
                    Some(PlannedMutation::SetBudget {
                        new_budget,
                        action: "INCREASE",
                        reason: increase.reason.clone(),
                        source: increase_source,
                    })
                }
                _ => None,
            };
            (Decision::Increase(increase), mutation)
        }
    }
}

/// A SKIP that keeps today's counted metrics, so the snapshot baseline
/// stays truthful after a failure.
fn skip_with_metrics(mut increase: IncreaseDecision, reason: String) -> IncreaseDecision {
    increase.action = IncreaseAction::Skip;
    increase.new_budget = None;
    increase.reason = reason;
    increase
}

/// Per-action result counters for one advertiser's run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunCounters {
    pub increased: usize,
    pub continued: usize,
    pub paused: usize,
    pub skipped: usize,
    pub decreased: usize,
}

impl RunCounters {
    fn record(&mut self, decision: &Decision) {
        match decision {
            Decision::Increase(d) => match d.action {
                IncreaseAction::Increase => self.increased += 1,
                IncreaseAction::Continue => self.continued += 1,
                IncreaseAction::Skip => self.skipped += 1,
            },
            Decision::Pause(d) => match d.action {
                PauseAction::Pause => self.paused += 1,
                PauseAction::Continue => self.continued += 1,
                PauseAction::SkipNewCreative => self.skipped += 1,
                PauseAction::Decrease20Pct => self.decreased += 1,
            },
        }
    }
}

pub struct Orchestrator {
    config: AppConfig,
    tz: FixedOffset,
    sheets: Arc<SheetsClient>,
    counter: RegistrationCounter,
    store: SnapshotStore,
    lock: JobLock,
    stage1: IncreaseEvaluator,
    stage2: PauseEvaluator,
    followup: FollowupEvaluator,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> Result<Self> {
        let tz = FixedOffset::east_opt(config.schedule.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow!("invalid utc_offset_hours {}", config.schedule.utc_offset_hours))?;

        let api_key = std::env::var(&config.sheets.api_key_env)
            .with_context(|| format!("{} must be set", config.sheets.api_key_env))?;
        let cache = SheetCache::new(
            StdDuration::from_secs(config.sheets.cache_ttl_secs),
            config.sheets.cache_max_entries,
        );
        let retry = RetryPolicy::new(
            config.sheets.retry_max_attempts,
            StdDuration::from_millis(config.sheets.retry_base_delay_ms),
        );
        let sheets = Arc::new(SheetsClient::new(api_key, cache, retry));

        let counter = RegistrationCounter::new(Arc::clone(&sheets), config.counter.clone());
        let store = SnapshotStore::open(&config.store_path)?;
        let lock = JobLock::new(StdDuration::from_secs(config.schedule.lock_timeout_secs));
        let stage1 = IncreaseEvaluator::new(config.tiers);
        let stage2 = PauseEvaluator::new(config.stage2);
        let followup = FollowupEvaluator::new(stage1.clone());

        Ok(Self {
            config,
            tz,
            sheets,
            counter,
            store,
            lock,
            stage1,
            stage2,
            followup,
        })
    }

    fn now_local(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.tz)
    }

    /// Unix timestamp of local midnight for the given local time.
    fn day_start(now: &DateTime<FixedOffset>) -> i64 {
        now.timestamp() - i64::from(now.num_seconds_from_midnight())
    }

    /// Run every configured advertiser under the job lock. A held lock
    /// means another trigger is in flight: no-op, not an error.
    pub async fn run_all(&self, dry_run: bool) -> Result<()> {
        let Some(_guard) = self.lock.try_acquire(JOB_NAME) else {
            warn!("'{}' is already running, skipping this trigger", JOB_NAME);
            return Ok(());
        };

        for adv in &self.config.advertisers {
            match self.run_advertiser(adv, dry_run).await {
                Ok(counters) => info!(
                    advertiser = %adv.id,
                    increased = counters.increased,
                    continued = counters.continued,
                    paused = counters.paused,
                    skipped = counters.skipped,
                    decreased = counters.decreased,
                    "advertiser run complete"
                ),
                Err(e) => error!("advertiser {} run failed: {:#}", adv.id, e),
            }
        }
        Ok(())
    }

    pub async fn run_advertiser(
        &self,
        adv: &AdvertiserConfig,
        dry_run: bool,
    ) -> Result<RunCounters> {
        let run_id = Uuid::new_v4();
        let now = self.now_local();
        if now.hour() > self.config.schedule.last_operating_hour {
            info!(
                advertiser = %adv.id,
                "local hour {} past operating cutoff {}, skipping run",
                now.hour(),
                self.config.schedule.last_operating_hour
            );
            return Ok(RunCounters::default());
        }

        // Every run must see fresh sheet data at least once.
        self.sheets.invalidate_all();

        let appeal = self
            .config
            .appeal_for(&adv.channel)
            .ok_or_else(|| anyhow!("advertiser {} has unknown channel {}", adv.id, adv.channel))?
            .clone();
        let token = std::env::var(&adv.credential_env)
            .with_context(|| format!("{} must be set", adv.credential_env))?;
        let platform = PlatformClient::new(self.config.platform.base_url.clone(), token);

        let mut ads = Vec::new();
        for record in platform.list_enabled_ads(&adv.id).await? {
            match EligibleAd::from_record(record) {
                Ok(ad) => ads.push(ad),
                Err(e) => warn!("quarantining malformed ad record: {}", e),
            }
        }

        let today = now.date_naive();
        let day_start = Self::day_start(&now);
        let first_round = self.store.is_first_round_today(&adv.id, day_start)?;
        info!(
            run_id = %run_id,
            advertiser = %adv.id,
            first_round,
            dry_run,
            ads = ads.len(),
            "starting optimization round"
        );

        let today_totals = aggregate(&platform.get_report_rows(&adv.id, today, today).await?);
        let window_from = today - Duration::days(6);
        let week_totals = if first_round {
            aggregate(&platform.get_report_rows(&adv.id, window_from, today).await?)
        } else {
            HashMap::new()
        };

        let mut counters = RunCounters::default();
        let mut snapshots = Vec::with_capacity(ads.len());
        let now_ts = Utc::now().timestamp();

        let increase_source = if first_round { "stage1" } else { "followup" };
        for ad in &ads {
            let spend_today = today_totals.get(&ad.ad_id).copied().unwrap_or_default().spend;

            let increase = if first_round {
                self.evaluate_stage1(&platform, adv, &appeal, ad, today, spend_today)
                    .await
            } else {
                self.evaluate_followup(&platform, adv, &appeal, ad, today, day_start, spend_today)
                    .await
            }
            .unwrap_or_else(|e| {
                warn!("ad {} increase evaluation failed: {:#}", ad.ad_id, e);
                IncreaseDecision::skip(&ad.ad_id, ad.daily_budget, format!("error: {:#}", e))
            });

            // A Stage 2 failure leaves the window unjudged, so the
            // whole ad downgrades to a skip rather than applying an
            // increase that a pause might have preempted.
            let (increase, pause) = if first_round {
                let totals = week_totals.get(&ad.ad_id).copied().unwrap_or_default();
                match self
                    .evaluate_stage2(&appeal, ad, window_from, today, totals)
                    .await
                {
                    Ok(decision) => (increase, decision),
                    Err(e) => {
                        warn!("ad {} pause evaluation failed: {:#}", ad.ad_id, e);
                        (skip_with_metrics(increase, format!("error: {:#}", e)), None)
                    }
                }
            } else {
                (increase, None)
            };

            // Stage 2 terminal actions win the snapshot; the increase
            // decision carries today's metrics either way.
            let (final_decision, mutation) =
                plan_ad_update(increase.clone(), pause, increase_source);

            let final_decision = match (dry_run, mutation) {
                (false, Some(m)) => match self.apply_mutation(&platform, adv, ad, &m).await {
                    Ok(()) => final_decision,
                    Err(e) => {
                        warn!("ad {} mutation failed: {:#}", ad.ad_id, e);
                        Decision::Increase(skip_with_metrics(
                            increase.clone(),
                            format!("error: {:#}", e),
                        ))
                    }
                },
                _ => final_decision,
            };
            counters.record(&final_decision);

            snapshots.push(SnapshotRow {
                advertiser_id: adv.id.clone(),
                ad_id: ad.ad_id.clone(),
                conversions: increase.today_conversions,
                spend: increase.today_spend,
                cpa: increase.today_cpa,
                budget: ad.daily_budget,
                action: final_decision.action_label().to_string(),
                reason: final_decision.reason().to_string(),
                created_at: now_ts,
            });
        }

        self.store.save(&snapshots)?;
        let cutoff = now_ts - self.config.schedule.snapshot_retention_days * 86_400;
        let purged = self.store.purge_older_than(cutoff)?;
        if purged > 0 {
            info!("purged {} snapshots past retention", purged);
        }

        Ok(counters)
    }

    /// The advertiser's configured cap, or the platform resolver's
    /// effective minimum across the ad's group/campaign.
    async fn budget_cap_for(
        &self,
        platform: &PlatformClient,
        adv: &AdvertiserConfig,
        ad: &EligibleAd,
    ) -> Result<Option<i64>> {
        if adv.budget_cap.is_some() {
            return Ok(adv.budget_cap);
        }
        let cap = if ad.pooled_budget {
            platform.campaign_budget_cap(&ad.campaign_id).await?
        } else {
            platform.ad_group_budget_cap(&ad.ad_group_id).await?
        };
        Ok(cap.map(|c| c.cap))
    }

    /// Route a budget write to the campaign (pooled) or ad group, and
    /// audit it only after the platform accepted it.
    async fn apply_budget(
        &self,
        platform: &PlatformClient,
        adv: &AdvertiserConfig,
        ad: &EligibleAd,
        new_budget: i64,
        action: &str,
        reason: &str,
        source: &str,
    ) -> Result<()> {
        if ad.pooled_budget {
            platform.set_campaign_budget(&ad.campaign_id, new_budget).await?;
        } else {
            platform.set_ad_group_budget(&ad.ad_group_id, new_budget).await?;
        }
        self.store.record_audit(&AuditEntry {
            advertiser_id: adv.id.clone(),
            ad_id: ad.ad_id.clone(),
            action: action.to_string(),
            before_value: ad.daily_budget.to_string(),
            after_value: new_budget.to_string(),
            reason: reason.to_string(),
            source: source.to_string(),
            created_at: Utc::now().timestamp(),
        })?;
        Ok(())
    }

    async fn apply_mutation(
        &self,
        platform: &PlatformClient,
        adv: &AdvertiserConfig,
        ad: &EligibleAd,
        mutation: &PlannedMutation,
    ) -> Result<()> {
        match mutation {
            PlannedMutation::SetBudget {
                new_budget,
                action,
                reason,
                source,
            } => {
                self.apply_budget(platform, adv, ad, *new_budget, action, reason, source)
                    .await
            }
            PlannedMutation::PauseAd { reason } => {
                platform.set_ad_status(&ad.ad_id, false).await?;
                self.store.record_audit(&AuditEntry {
                    advertiser_id: adv.id.clone(),
                    ad_id: ad.ad_id.clone(),
                    action: "PAUSE".into(),
                    before_value: "ENABLED".into(),
                    after_value: "PAUSED".into(),
                    reason: reason.clone(),
                    source: "stage2".into(),
                    created_at: Utc::now().timestamp(),
                })?;
                Ok(())
            }
        }
    }

    async fn evaluate_stage1(
        &self,
        platform: &PlatformClient,
        adv: &AdvertiserConfig,
        appeal: &Appeal,
        ad: &EligibleAd,
        today: NaiveDate,
        spend_today: i64,
    ) -> Result<IncreaseDecision> {
        let Some(parsed) = &ad.parsed_name else {
            return Ok(IncreaseDecision::skip(
                &ad.ad_id,
                ad.daily_budget,
                "display name does not follow the naming convention",
            ));
        };

        let path = appeal.registration_path(&parsed.lp_name);
        let conversions = self
            .counter
            .count_registrations(&appeal.conversion_sheet, &path, today, today)
            .await?;
        let metrics = DayMetrics {
            spend: spend_today,
            conversions: conversions.count,
        };
        let cap = self.budget_cap_for(platform, adv, ad).await?;
        Ok(self.stage1.evaluate(ad, appeal, metrics, cap))
    }

    async fn evaluate_followup(
        &self,
        platform: &PlatformClient,
        adv: &AdvertiserConfig,
        appeal: &Appeal,
        ad: &EligibleAd,
        today: NaiveDate,
        day_start: i64,
        spend_today: i64,
    ) -> Result<IncreaseDecision> {
        let Some(parsed) = &ad.parsed_name else {
            return Ok(IncreaseDecision::skip(
                &ad.ad_id,
                ad.daily_budget,
                "display name does not follow the naming convention",
            ));
        };

        let path = appeal.registration_path(&parsed.lp_name);
        let conversions = self
            .counter
            .count_registrations(&appeal.conversion_sheet, &path, today, today)
            .await?;
        let metrics = DayMetrics {
            spend: spend_today,
            conversions: conversions.count,
        };
        let baseline = self
            .store
            .last_snapshot(&adv.id, &ad.ad_id, day_start)?
            .map(|s| s.conversions);
        let cap = self.budget_cap_for(platform, adv, ad).await?;
        Ok(self.followup.evaluate(ad, appeal, metrics, baseline, cap))
    }

    async fn evaluate_stage2(
        &self,
        appeal: &Appeal,
        ad: &EligibleAd,
        from: NaiveDate,
        to: NaiveDate,
        totals: AdTotals,
    ) -> Result<Option<PauseDecision>> {
        // Unparsable names were already skipped by Stage 1.
        let Some(parsed) = &ad.parsed_name else {
            return Ok(None);
        };

        let path = appeal.registration_path(&parsed.lp_name);
        let conversions = self
            .counter
            .count_registrations(&appeal.conversion_sheet, &path, from, to)
            .await?;
        let front_sales = match appeal.kind {
            ChannelKind::FrontCpo => {
                self.counter
                    .count_registrations(&appeal.front_sale_sheet, &path, from, to)
                    .await?
                    .count
            }
            ChannelKind::CpaOnly => 0,
        };
        let window = WindowMetrics {
            spend: totals.spend,
            impressions: totals.impressions,
            conversions: conversions.count,
            front_sales,
        };

        let mut decision = self.stage2.evaluate(ad, appeal, &window);
        if decision.action == PauseAction::Continue {
            if let Some(allowable) = appeal.allowable_reservation_cpo {
                let reservation_path =
                    appeal.reservation_path(&parsed.lp_name, &parsed.creative_name);
                let reservations = self
                    .counter
                    .count_reservations(&appeal.conversion_sheet, &reservation_path, from, to)
                    .await?;
                decision = self.stage2.apply_reservation_gate(
                    decision,
                    ad.daily_budget,
                    allowable,
                    reservations.count,
                );
            }
        }

        Ok(Some(decision))
    }
}
