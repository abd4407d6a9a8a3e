//! REST client for the ad platform.
//!
//! Covers: enabled-ad listing, performance reports, budget and status
//! mutations, budget-cap queries. Authenticated with a per-advertiser
//! bearer token.

use chrono::NaiveDate;
use common::{AdRecord, Error, ReportRow};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Async REST client for the ad-platform API.
#[derive(Debug, Clone)]
pub struct PlatformClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

/// The effective minimum budget cap across an ad group or campaign,
/// with the ad currently binding it.
#[derive(Debug, Clone, Deserialize)]
pub struct BudgetCap {
    pub cap: i64,
    pub binding_ad_id: String,
}

#[derive(Debug, Deserialize)]
struct AdsResponse {
    ads: Vec<AdRecord>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    rows: Vec<ReportRow>,
}

#[derive(Debug, Serialize)]
struct BudgetBody {
    daily_budget: i64,
}

#[derive(Debug, Serialize)]
struct StatusBody {
    status: &'static str,
}

impl PlatformClient {
    pub fn new(base_url: String, token: String) -> Self {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url,
            token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, Error> {
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let message = resp.text().await.unwrap_or_default();
            return Err(Error::PlatformApi { status, message });
        }
        Ok(resp)
    }

    // ── Read endpoints ────────────────────────────────────────────────

    /// Fetch every currently-enabled ad for an advertiser. Handles
    /// pagination automatically.
    pub async fn list_enabled_ads(&self, advertiser_id: &str) -> Result<Vec<AdRecord>, Error> {
        let mut all_ads = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let path = format!("/v1/advertisers/{}/ads", advertiser_id);
            let mut req = self
                .client
                .get(self.url(&path))
                .bearer_auth(&self.token)
                .query(&[("status", "ENABLED"), ("limit", "200")]);
            if let Some(ref c) = cursor {
                req = req.query(&[("cursor", c.as_str())]);
            }

            let resp = req.send().await.map_err(|e| Error::Http(e.to_string()))?;
            let resp = Self::check(resp).await?;
            let body: AdsResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;

            let count = body.ads.len();
            all_ads.extend(body.ads);
            debug!("fetched {} ads (total: {})", count, all_ads.len());

            match body.cursor {
                Some(c) if !c.is_empty() => cursor = Some(c),
                _ => break,
            }
        }

        Ok(all_ads)
    }

    /// Per-ad, per-day report rows for the window, both delivery modes.
    pub async fn get_report_rows(
        &self,
        advertiser_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<ReportRow>, Error> {
        let path = format!("/v1/advertisers/{}/reports", advertiser_id);
        let resp = self
            .client
            .get(self.url(&path))
            .bearer_auth(&self.token)
            .query(&[
                ("date_from", from.format("%Y-%m-%d").to_string()),
                ("date_to", to.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        let resp = Self::check(resp).await?;
        let body: ReportResponse = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        debug!(
            "fetched {} report rows for {}..{}",
            body.rows.len(),
            from,
            to
        );
        Ok(body.rows)
    }

    // ── Budget-cap resolver ───────────────────────────────────────────

    async fn budget_cap(&self, path: String) -> Result<Option<BudgetCap>, Error> {
        let resp = self
            .client
            .get(self.url(&path))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        // No configured cap is modeled as 404.
        if resp.status().as_u16() == 404 {
            return Ok(None);
        }
        let resp = Self::check(resp).await?;
        let cap: BudgetCap = resp.json().await.map_err(|e| Error::Http(e.to_string()))?;
        Ok(Some(cap))
    }

    /// Effective minimum daily-budget cap across an ad group.
    pub async fn ad_group_budget_cap(&self, ad_group_id: &str) -> Result<Option<BudgetCap>, Error> {
        self.budget_cap(format!("/v1/ad_groups/{}/budget_cap", ad_group_id))
            .await
    }

    /// Effective minimum daily-budget cap across a campaign.
    pub async fn campaign_budget_cap(&self, campaign_id: &str) -> Result<Option<BudgetCap>, Error> {
        self.budget_cap(format!("/v1/campaigns/{}/budget_cap", campaign_id))
            .await
    }

    // ── Write endpoints ───────────────────────────────────────────────

    /// Set a campaign's pooled daily budget.
    pub async fn set_campaign_budget(&self, campaign_id: &str, daily_budget: i64) -> Result<(), Error> {
        let path = format!("/v1/campaigns/{}/daily_budget", campaign_id);
        debug!("setting campaign {} budget to {}", campaign_id, daily_budget);
        let resp = self
            .client
            .put(self.url(&path))
            .bearer_auth(&self.token)
            .json(&BudgetBody { daily_budget })
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Set an ad group's daily budget.
    pub async fn set_ad_group_budget(&self, ad_group_id: &str, daily_budget: i64) -> Result<(), Error> {
        let path = format!("/v1/ad_groups/{}/daily_budget", ad_group_id);
        debug!("setting ad group {} budget to {}", ad_group_id, daily_budget);
        let resp = self
            .client
            .put(self.url(&path))
            .bearer_auth(&self.token)
            .json(&BudgetBody { daily_budget })
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }

    /// Enable or disable an ad.
    pub async fn set_ad_status(&self, ad_id: &str, enabled: bool) -> Result<(), Error> {
        let path = format!("/v1/ads/{}/status", ad_id);
        let status = if enabled { "ENABLED" } else { "PAUSED" };
        debug!("setting ad {} status to {}", ad_id, status);
        let resp = self
            .client
            .put(self.url(&path))
            .bearer_auth(&self.token)
            .json(&StatusBody { status })
            .send()
            .await
            .map_err(|e| Error::Http(e.to_string()))?;
        Self::check(resp).await?;
        Ok(())
    }
}
