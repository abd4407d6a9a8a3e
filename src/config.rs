use common::Appeal;
use counter::CounterConfig;
use decision_engine::{Stage2Config, TierConfig};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub platform: PlatformConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub tiers: TierConfig,
    #[serde(default)]
    pub stage2: Stage2Config,
    #[serde(default)]
    pub counter: CounterConfig,
    #[serde(default = "default_store_path")]
    pub store_path: String,
    pub advertisers: Vec<AdvertiserConfig>,
    pub channels: Vec<Appeal>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub base_url: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: "https://ads-api.example.com".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SheetsConfig {
    /// Env var holding the spreadsheet API key.
    pub api_key_env: String,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub retry_max_attempts: u32,
    pub retry_base_delay_ms: u64,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_key_env: "SHEETS_API_KEY".into(),
            cache_ttl_secs: 300,
            cache_max_entries: 32,
            retry_max_attempts: 3,
            retry_base_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Runs abort when the local hour is past this (24h clock).
    pub last_operating_hour: u32,
    /// Operating timezone as a fixed UTC offset.
    pub utc_offset_hours: i32,
    pub lock_timeout_secs: u64,
    pub snapshot_retention_days: i64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            last_operating_hour: 21,
            utc_offset_hours: 9,
            lock_timeout_secs: 1_800,
            snapshot_retention_days: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdvertiserConfig {
    pub id: String,
    /// Env var holding this advertiser's platform API token.
    pub credential_env: String,
    /// Name of the channel (in `channels`) this advertiser runs on.
    pub channel: String,
    /// Optional per-ad/ad-group daily-budget ceiling. When unset, the
    /// platform's budget-cap resolver is consulted instead.
    #[serde(default)]
    pub budget_cap: Option<i64>,
}

fn default_store_path() -> String {
    "ad-budget-bot.sqlite".into()
}

impl AppConfig {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        for adv in &self.advertisers {
            if self.appeal_for(&adv.channel).is_none() {
                anyhow::bail!(
                    "advertiser {} references unknown channel '{}'",
                    adv.id,
                    adv.channel
                );
            }
        }
        Ok(())
    }

    pub fn appeal_for(&self, channel: &str) -> Option<&Appeal> {
        self.channels.iter().find(|a| a.channel == channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ChannelKind;

    const MINIMAL: &str = r#"
        [[advertisers]]
        id = "adv-1"
        credential_env = "ADV1_TOKEN"
        channel = "videocall"

        [[channels]]
        channel = "videocall"
        kind = "front_cpo"
        target_cpa = 5000
        allowable_cpa = 8000
        target_front_cpo = 3000
        allowable_front_cpo = 6000
        allowable_reservation_cpo = 10000
        conversion_sheet = { document_id = "doc1", tab = "conv" }
        front_sale_sheet = { document_id = "doc1", tab = "front" }
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: AppConfig = toml::from_str(MINIMAL).unwrap();
        config.validate().unwrap();
        assert_eq!(config.schedule.last_operating_hour, 21);
        assert_eq!(config.schedule.utc_offset_hours, 9);
        assert_eq!(config.sheets.cache_max_entries, 32);
        let appeal = config.appeal_for("videocall").unwrap();
        assert_eq!(appeal.kind, ChannelKind::FrontCpo);
        assert_eq!(appeal.allowable_reservation_cpo, Some(10_000));
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let raw = MINIMAL.replace("channel = \"videocall\"\n\n", "channel = \"missing\"\n\n");
        let config: AppConfig = toml::from_str(&raw).unwrap();
        assert!(config.validate().is_err());
    }
}
